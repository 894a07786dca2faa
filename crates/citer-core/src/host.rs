//! Host application seams
//!
//! citer never draws UI or edits text itself; the host (an editor plugin,
//! the `citer` CLI, a test) implements these traits.

/// One row of a picker list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub primary: String,
    pub secondary: String,
}

impl Choice {
    pub fn new(primary: impl Into<String>, secondary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary: secondary.into(),
        }
    }

    /// First line is the primary text, the remaining lines the secondary
    pub fn from_lines(text: &str) -> Self {
        let mut lines = text.lines();
        let primary = lines.next().unwrap_or_default().to_string();
        let secondary = lines.collect::<Vec<_>>().join(" ");
        Self { primary, secondary }
    }
}

/// Selection UI
pub trait Picker {
    /// Show `choices` and return the picked index, `None` when cancelled
    fn choose(&mut self, choices: &[Choice]) -> Option<usize>;

    /// Ask for one line of text, `None` when cancelled
    fn prompt(&mut self, label: &str) -> Option<String>;
}

/// The active edit position in the document
pub trait EditPoint {
    fn insert(&mut self, text: &str);

    /// Replace every literal occurrence of `pattern`; returns the count
    fn replace_all(&mut self, pattern: &str, replacement: &str) -> usize;
}

/// Non-blocking status notices
pub trait StatusLine {
    fn notify(&mut self, message: &str);
}

/// An in-memory document, handy for hosts that edit a buffer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextBuffer {
    pub text: String,
    /// Byte offset of the cursor
    pub cursor: usize,
}

impl TextBuffer {
    pub fn new(text: impl Into<String>, cursor: usize) -> Self {
        let text = text.into();
        let mut cursor = cursor.min(text.len());
        while !text.is_char_boundary(cursor) {
            cursor -= 1;
        }
        Self { text, cursor }
    }

    /// Cursor at the end of `text`
    pub fn at_end(text: impl Into<String>) -> Self {
        let text = text.into();
        let cursor = text.len();
        Self { text, cursor }
    }
}

impl EditPoint for TextBuffer {
    fn insert(&mut self, text: &str) {
        self.text.insert_str(self.cursor, text);
        self.cursor += text.len();
    }

    fn replace_all(&mut self, pattern: &str, replacement: &str) -> usize {
        if pattern.is_empty() {
            return 0;
        }
        let mut count = 0;
        let mut out = String::with_capacity(self.text.len());
        let mut new_cursor = self.cursor;
        let mut rest = self.text.as_str();
        let mut offset = 0;
        while let Some(pos) = rest.find(pattern) {
            out.push_str(&rest[..pos]);
            out.push_str(replacement);
            let start = offset + pos;
            if start + pattern.len() <= self.cursor {
                new_cursor = new_cursor + replacement.len() - pattern.len();
            }
            offset = start + pattern.len();
            rest = &rest[pos + pattern.len()..];
            count += 1;
        }
        out.push_str(rest);
        self.text = out;
        self.cursor = new_cursor.min(self.text.len());
        count
    }
}

/// Collects notices in order
#[derive(Debug, Clone, Default)]
pub struct NoticeLog {
    pub messages: Vec<String>,
}

impl StatusLine for NoticeLog {
    fn notify(&mut self, message: &str) {
        self.messages.push(message.to_string());
    }
}
