//! Transport-safe reply segmentation
//!
//! Splits generated markdown into pieces no longer than the transport limit,
//! preferring headings/titles/list items over whitespace over a hard cut, and
//! keeping every piece well-formed with respect to ``` code fences: a fence left
//! open at a split is closed synthetically and reopened at the start of the next
//! piece, with the same language tag unless that tag is too long to carry.

use once_cell::sync::Lazy;
use regex::Regex;

pub const FENCE: &str = "```";
const SYNTHETIC_CLOSE: &str = "\n```";
const SYNTHETIC_CLOSE_CHARS: usize = 4;

/// Below this limit there is no room for fence overhead; plain cuts are used
const MIN_FENCE_AWARE_LIMIT: usize = 32;

/// Heading, bold title, numbered list item; checked in this order
static STRUCTURAL_BREAKS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r"\n#{1,6}\s", r"\n\*\*", r"\n\d+\.\s"]
        .iter()
        .map(|p| Regex::new(p).expect("structural break pattern"))
        .collect()
});

/// Paragraph, line, sentence, word; the split goes after the separator
const SOFT_BREAKS: &[&[&str]] = &[&["\n\n"], &["\n"], &[". ", "! ", "? "], &[" "]];

/// One transport-sized piece of a reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub content: String,
    /// Language tag of the synthetic opening fence this piece starts with
    pub reopened_tag: Option<String>,
    /// A synthetic closing fence was appended; the next piece reopens it
    pub continues_fence: bool,
}

impl Segment {
    fn new(opening: Option<(String, String)>, body: &str, continues_fence: bool) -> Self {
        let (reopened_tag, mut content) = match opening {
            Some((tag, fence)) => (Some(tag), fence),
            None => (None, String::new()),
        };
        content.push_str(body);
        if continues_fence {
            content.push_str(SYNTHETIC_CLOSE);
        }
        Self {
            content,
            reopened_tag,
            continues_fence,
        }
    }

    /// Content with the synthetic fence delimiters stripped
    pub fn body(&self) -> &str {
        let start = self
            .reopened_tag
            .as_deref()
            .map_or(0, |tag| opening_fence(tag).len());
        let end = if self.continues_fence {
            self.content.len() - SYNTHETIC_CLOSE.len()
        } else {
            self.content.len()
        };
        &self.content[start..end]
    }
}

pub struct MessageSegmenter {
    limit: usize,
}

impl MessageSegmenter {
    /// `limit` is counted in characters, the unit Discord caps messages in
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
        }
    }

    pub fn segment(&self, text: &str) -> Vec<String> {
        self.segment_detailed(text)
            .into_iter()
            .map(|s| s.content)
            .collect()
    }

    pub fn segment_detailed(&self, text: &str) -> Vec<Segment> {
        if char_len(text) <= self.limit {
            return vec![Segment::new(None, text, false)];
        }
        if self.limit < MIN_FENCE_AWARE_LIMIT {
            return self.hard_cut(text);
        }

        let mut segments = Vec::new();
        let mut offset = 0;
        let mut open_tag: Option<String> = None;

        while offset < text.len() {
            let opening = open_tag.as_deref().map(|tag| self.reopen(tag));
            let prefix_chars = opening.as_ref().map_or(0, |(_, fence)| char_len(fence));
            let rest = &text[offset..];

            if prefix_chars + char_len(rest) <= self.limit {
                segments.push(Segment::new(opening, rest, false));
                break;
            }

            let budget = self.limit - prefix_chars - SYNTHETIC_CLOSE_CHARS;
            let window_end = advance_chars(text, offset, budget);
            let mut split = self.find_break(text, offset, window_end);
            split = avoid_cutting_delimiter(text, offset, split);

            let mut fences = scan_fences(text, offset, split, open_tag.as_deref());

            // Never leave a fence header (``` + tag line) torn across two pieces
            if let Some(opener) = fences.unclosed_opener {
                let header_stop = text[opener..]
                    .find('\n')
                    .map_or(text.len(), |i| opener + i + 1);
                if split <= header_stop && opener > offset {
                    split = opener;
                    fences = scan_fences(text, offset, split, open_tag.as_deref());
                }
            }

            let continues = fences.open_tag.is_some();
            segments.push(Segment::new(opening, &text[offset..split], continues));

            open_tag = fences.open_tag;
            offset = split;
        }

        segments
    }

    /// Synthetic opening fence for `tag`. A tag whose fence plus the closing
    /// delimiter would take more than a quarter of the limit is dropped, and
    /// the block is reopened as a bare ``` fence with `reopened_tag` set to "".
    fn reopen(&self, tag: &str) -> (String, String) {
        let fence = opening_fence(tag);
        if char_len(&fence) + SYNTHETIC_CLOSE_CHARS > self.limit / 4 {
            (String::new(), opening_fence(""))
        } else {
            (tag.to_string(), fence)
        }
    }

    /// Best split in `(offset, window_end]`
    fn find_break(&self, text: &str, offset: usize, window_end: usize) -> usize {
        let structural_floor = advance_chars(text, offset, self.limit / 4).min(window_end);
        let window = &text[structural_floor..window_end];
        for pattern in STRUCTURAL_BREAKS.iter() {
            if let Some(m) = pattern.find_iter(window).last() {
                let at = structural_floor + m.start();
                if at > offset {
                    return at;
                }
            }
        }

        let soft_floor = advance_chars(text, offset, self.limit * 3 / 4).min(window_end);
        let window = &text[soft_floor..window_end];
        for tier in SOFT_BREAKS {
            let best = tier
                .iter()
                .filter_map(|sep| window.rfind(sep).map(|i| soft_floor + i + sep.len()))
                .max();
            if let Some(at) = best {
                if at > offset {
                    return at;
                }
            }
        }

        window_end
    }

    fn hard_cut(&self, text: &str) -> Vec<Segment> {
        let mut segments = Vec::new();
        let mut offset = 0;
        while offset < text.len() {
            let end = advance_chars(text, offset, self.limit);
            segments.push(Segment::new(None, &text[offset..end], false));
            offset = end;
        }
        segments
    }
}

/// Convenience wrapper around [`MessageSegmenter`]
pub fn segment(text: &str, limit: usize) -> Vec<String> {
    MessageSegmenter::new(limit).segment(text)
}

struct FenceScan {
    /// Tag of the fence still open at the end of the window
    open_tag: Option<String>,
    /// Byte offset of the delimiter that opened it, if inside the window
    unclosed_opener: Option<usize>,
}

fn scan_fences(text: &str, start: usize, end: usize, carried: Option<&str>) -> FenceScan {
    let mut open_tag = carried.map(str::to_string);
    let mut unclosed_opener = None;

    for (rel, _) in text[start..end].match_indices(FENCE) {
        let at = start + rel;
        if open_tag.is_none() {
            open_tag = Some(fence_tag(text, at));
            unclosed_opener = Some(at);
        } else {
            open_tag = None;
            unclosed_opener = None;
        }
    }

    FenceScan {
        open_tag,
        unclosed_opener,
    }
}

/// Language tag following the delimiter at `at`, up to the end of the line
fn fence_tag(text: &str, at: usize) -> String {
    let after = &text[at + FENCE.len()..];
    let line = after.split('\n').next().unwrap_or("");
    line.trim().to_string()
}

fn opening_fence(tag: &str) -> String {
    format!("{}{}\n", FENCE, tag)
}

/// Pull `split` back to the start of a ``` it would otherwise cut in half
fn avoid_cutting_delimiter(text: &str, offset: usize, split: usize) -> usize {
    for back in 1..FENCE.len() {
        let Some(start) = split.checked_sub(back) else {
            break;
        };
        if start <= offset || !text.is_char_boundary(start) {
            continue;
        }
        if text[start..].starts_with(FENCE) {
            return start;
        }
    }
    split
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Byte offset `n` characters after `from`, clamped to the end of `text`
fn advance_chars(text: &str, from: usize, n: usize) -> usize {
    text[from..]
        .char_indices()
        .nth(n)
        .map_or(text.len(), |(i, _)| from + i)
}
