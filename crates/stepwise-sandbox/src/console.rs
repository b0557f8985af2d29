//! Captured `console.*` output.

use std::sync::{Mutex, OnceLock};

use regex::Regex;

use crate::value::lock;

const ANSI_PATTERN: &str =
    r"[\x1B\x{9B}][\[()#;?]*(?:[0-9]{1,4}(?:;[0-9]{0,4})*)?[0-9A-ORZcf-nqry=><]";

fn ansi_regex() -> Option<&'static Regex> {
    static ANSI: OnceLock<Option<Regex>> = OnceLock::new();
    ANSI.get_or_init(|| Regex::new(ANSI_PATTERN).ok()).as_ref()
}

/// Remove terminal escape sequences.
pub fn strip_ansi(text: &str) -> String {
    match ansi_regex() {
        Some(re) => re.replace_all(text, "").into_owned(),
        None => text.to_string(),
    }
}

/// Line buffer standing in for a terminal during one script run.
#[derive(Debug, Default)]
pub struct BufferConsole {
    buffer: Mutex<String>,
}

impl BufferConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self, line: &str) {
        let mut buffer = lock(&self.buffer);
        buffer.push_str(line);
        buffer.push('\n');
    }

    /// Everything logged so far, without colour codes.
    pub fn output(&self) -> String {
        strip_ansi(&lock(&self.buffer))
    }
}
