//! Character-indexed view of the text under verification
//!
//! All match positions are character offsets into this buffer, so multi-byte
//! UTF-8 input never splits a code point. Line/column translation is only
//! done when reporting, not during matching.

/// Input text held as characters for O(1) offset access.
#[derive(Debug, Clone)]
pub struct InputStream {
    chars: Vec<char>,
}

impl InputStream {
    pub fn new(text: &str) -> Self {
        InputStream {
            chars: text.chars().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn at(&self, offset: usize) -> Option<char> {
        self.chars.get(offset).copied()
    }

    /// Characters from `offset`, at most `len` of them.
    pub fn slice(&self, offset: usize, len: usize) -> &[char] {
        let end = (offset + len).min(self.chars.len());
        let start = offset.min(end);
        &self.chars[start..end]
    }

    /// 1-based line and column of a character offset. An offset one past the
    /// end reports the position just after the last character.
    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        let mut line = 1;
        let mut column = 1;
        for &ch in self.chars.iter().take(offset) {
            if ch == '\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
        }
        (line, column)
    }
}
