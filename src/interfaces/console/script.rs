use crate::domain::user::UserId;
use crate::error::{RentalError, Result};
use std::io::BufRead;

/// One inbound message: who sent it and what they typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptLine {
    pub sender: UserId,
    pub text: String,
    /// 1-based position in the source, for error reports.
    pub line: usize,
}

/// Reads `<sender-id> <text>` lines from any buffered source (file, stdin).
///
/// Blank lines and lines starting with `#` are skipped.
pub struct ScriptReader<R: BufRead> {
    source: R,
}

impl<R: BufRead> ScriptReader<R> {
    pub fn new(source: R) -> Self {
        Self { source }
    }

    /// Lazily yields parsed lines; a malformed line yields an error and
    /// reading continues with the next one.
    pub fn lines(self) -> impl Iterator<Item = Result<ScriptLine>> {
        self.source
            .lines()
            .enumerate()
            .filter_map(|(index, raw)| match raw {
                Err(e) => Some(Err(RentalError::from(e))),
                Ok(raw) => parse_line(index + 1, raw.trim()),
            })
    }
}

fn parse_line(line: usize, raw: &str) -> Option<Result<ScriptLine>> {
    if raw.is_empty() || raw.starts_with('#') {
        return None;
    }
    let (sender, text) = raw.split_once(char::is_whitespace).unwrap_or((raw, ""));
    let parsed = sender
        .parse::<UserId>()
        .map_err(|_| {
            RentalError::validation(format!("line {line}: '{sender}' is not a valid sender id"))
        })
        .map(|sender| ScriptLine {
            sender,
            text: text.trim().to_string(),
            line,
        });
    Some(parsed)
}
