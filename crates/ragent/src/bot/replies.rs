//! Fixed reply texts

pub const LISTENING: &str = "**RAgent SYS**: Listening to your messages now.";
pub const STOPPED: &str = "**RAgent SYS**: Stopped listening to messages.";
pub const FORGOTTEN: &str = "**RAgent SYS**: All messages forgotten & stopped listening to yall";
pub const STATUS_LISTENING: &str = "**RAgent SYS**: Listening to yall👂";
pub const STATUS_NOT_LISTENING: &str = "**RAgent SYS**: Not Listening 🙉";
pub const SYNCED: &str = "**RAgent SYS**: Command tree synced.";
pub const NOT_OWNER: &str = "**RAgent SYS**: You must be the owner to use this command!";

pub const NOT_LISTENING_COMMAND: &str =
    "I'm not listening to what y'all saying. \nRun \"/listen\" if you want me to start listening.";
pub const NOT_LISTENING_MENTION: &str =
    "I'm not listening to what y'all saying 🙈🙉🙊. \nRun \"/listen\" if you want me to start listening.";
pub const EMPTY_QUERY: &str = "**RAgent SYS**: Empty Input?";
pub const EMPTY_MENTION: &str = "What?";
pub const EMPTY_KNOWLEDGE_BASE: &str = "**RAgent SYS**: Hey, RAgent's knowledge base is empty now. Please say something before using rag function.";
pub const APOLOGY: &str = "**RAgent SYS**: The bot encountered an error, will try to fix it soon.";
