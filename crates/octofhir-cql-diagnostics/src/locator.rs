//! Source locators

use serde::{Deserialize, Serialize};
use std::fmt;

/// Line/character range of a construct, as carried by ELM annotations
///
/// Lines and characters are 1-based. The end position is inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Locator {
    pub start_line: usize,
    pub start_char: usize,
    pub end_line: usize,
    pub end_char: usize,
}

impl Locator {
    /// Create a locator from explicit positions
    pub const fn new(
        start_line: usize,
        start_char: usize,
        end_line: usize,
        end_char: usize,
    ) -> Self {
        Self {
            start_line,
            start_char,
            end_line,
            end_char,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}-{}:{}",
            self.start_line, self.start_char, self.end_line, self.end_char
        )
    }
}
