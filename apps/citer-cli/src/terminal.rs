//! Terminal implementations of the host traits
//!
//! Lists and prompts go to stderr so stdout only carries inserted text.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use citer_core::{Choice, EditPoint, Picker, StatusLine, TextBuffer};

/// Numbered list on `output`, selection read from `input`
pub struct LinePicker<R, W> {
    input: R,
    output: W,
}

impl LinePicker<io::StdinLock<'static>, io::Stderr> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stderr())
    }
}

impl<R: BufRead, W: Write> LinePicker<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => {
                let line = line.trim().to_string();
                (!line.is_empty()).then_some(line)
            }
        }
    }
}

impl<R: BufRead, W: Write> Picker for LinePicker<R, W> {
    fn choose(&mut self, choices: &[Choice]) -> Option<usize> {
        if choices.is_empty() {
            let _ = writeln!(self.output, "(nothing to choose from)");
            return None;
        }
        let width = choices.len().to_string().len();
        for (i, choice) in choices.iter().enumerate() {
            let _ = writeln!(self.output, "{:>width$}. {}", i + 1, choice.primary);
            if !choice.secondary.is_empty() {
                let _ = writeln!(self.output, "{:>width$}  {}", "", choice.secondary);
            }
        }
        let _ = write!(self.output, "> ");
        let _ = self.output.flush();

        let picked: usize = self.read_line()?.parse().ok()?;
        (1..=choices.len()).contains(&picked).then(|| picked - 1)
    }

    fn prompt(&mut self, label: &str) -> Option<String> {
        let _ = write!(self.output, "{}: ", label);
        let _ = self.output.flush();
        self.read_line()
    }
}

/// Notices on stderr
pub struct StderrStatus;

impl StatusLine for StderrStatus {
    fn notify(&mut self, message: &str) {
        eprintln!("{}", message);
    }
}

/// Where inserted text ends up
pub enum Target {
    /// A document on disk, edited at a byte offset
    Document { path: PathBuf, buffer: TextBuffer },
    /// No document: inserted text is collected and printed
    Stdout { inserted: String },
}

impl Target {
    pub fn open(path: &Path, at: Option<usize>) -> io::Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e),
        };
        let buffer = match at {
            Some(offset) => TextBuffer::new(text, offset),
            None => TextBuffer::at_end(text),
        };
        Ok(Target::Document {
            path: path.to_path_buf(),
            buffer,
        })
    }

    pub fn stdout() -> Self {
        Target::Stdout {
            inserted: String::new(),
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Target::Document { buffer, .. } => &buffer.text,
            Target::Stdout { inserted } => inserted,
        }
    }

    /// Write the document back, or print what was inserted
    pub fn finish(self) -> io::Result<()> {
        match self {
            Target::Document { path, buffer } => fs::write(path, buffer.text),
            Target::Stdout { inserted } => {
                if !inserted.is_empty() {
                    println!("{}", inserted);
                }
                Ok(())
            }
        }
    }
}

impl EditPoint for Target {
    fn insert(&mut self, text: &str) {
        match self {
            Target::Document { buffer, .. } => buffer.insert(text),
            Target::Stdout { inserted } => inserted.push_str(text),
        }
    }

    fn replace_all(&mut self, pattern: &str, replacement: &str) -> usize {
        match self {
            Target::Document { buffer, .. } => buffer.replace_all(pattern, replacement),
            Target::Stdout { inserted } => {
                let count = inserted.matches(pattern).count();
                *inserted = inserted.replace(pattern, replacement);
                count
            }
        }
    }
}
