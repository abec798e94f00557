//! Activity journal with async queue mechanism

mod logger;
pub mod types;

pub use logger::{ActivityLogger, LoggerConfig};
pub use types::{ActivityLog, ActivityStatus, ActivityType};

#[cfg(test)]
pub(crate) use logger::tests::wait_for_lines;
