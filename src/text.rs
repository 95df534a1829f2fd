// Copyright (C) 2022-2025 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of logwire.
//
// logwire is free software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// logwire is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even
// the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details.
//
// You should have received a copy of the GNU General Public License along with logwire.  If not,
// see <http://www.gnu.org/licenses/>.

//! Human-readable formatting of log entries.
//!
//! [`TextFormatter`] renders [`LogEntry`] packets one line at a time according to a small pattern
//! language: `%name%` tokens are replaced by fields of the entry, everything else is copied
//! verbatim. The recognized tokens are:
//!
//! | token            | replaced by                                  |
//! |------------------|----------------------------------------------|
//! | `%timestamp%`    | the entry's time, `YYYY-MM-DD HH:MM:SS.mmm`  |
//! | `%level%`        | the packet [`Level`]                          |
//! | `%title%`        | the entry's title                            |
//! | `%session%`      | the session name                             |
//! | `%appname%`      | the application name                         |
//! | `%hostname%`     | the host name                                |
//! | `%process%`      | the process id                               |
//! | `%thread%`       | the thread id                                |
//! | `%logentrytype%` | the [`LogEntryType`]                          |
//!
//! Unknown tokens are copied through unchanged. Packets other than log entries produce no text.
//!
//! [`Level`]: crate::level::Level

use crate::{
    formatter::Formatter,
    packet::{LogEntry, LogEntryType, Packet, PacketKind},
};

use std::io::Write;

/// The pattern used when none is configured
pub const DEFAULT_PATTERN: &str = "[%timestamp%] %level%: %title%";

/// UTF-8 byte order mark, written at the head of new text logs
pub const BOM: [u8; 3] = [0xef, 0xbb, 0xbf];

const INDENT: &str = "   ";

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Literal(String),
    Timestamp,
    Level,
    Title,
    Session,
    AppName,
    HostName,
    Process,
    Thread,
    LogEntryType,
}

fn parse_pattern(pattern: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut rest = pattern;
    while let Some(start) = rest.find('%') {
        literal.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let token = after.find('%').and_then(|end| {
            let token = match after[..end].to_ascii_lowercase().as_str() {
                "timestamp" => Token::Timestamp,
                "level" => Token::Level,
                "title" => Token::Title,
                "session" => Token::Session,
                "appname" => Token::AppName,
                "hostname" => Token::HostName,
                "process" => Token::Process,
                "thread" => Token::Thread,
                "logentrytype" => Token::LogEntryType,
                _ => return None,
            };
            Some((token, end))
        });
        match token {
            Some((token, end)) => {
                if !literal.is_empty() {
                    tokens.push(Token::Literal(std::mem::take(&mut literal)));
                }
                tokens.push(token);
                rest = &after[end + 1..];
            }
            None => {
                literal.push('%');
                rest = after;
            }
        }
    }
    literal.push_str(rest);
    if !literal.is_empty() {
        tokens.push(Token::Literal(literal));
    }
    tokens
}

/// A [`Formatter`] that produces one line of text per log entry.
pub struct TextFormatter {
    tokens: Vec<Token>,
    indent: bool,
    depth: usize,
    line: String,
}

impl std::default::Default for TextFormatter {
    fn default() -> Self {
        TextFormatter::new(DEFAULT_PATTERN)
    }
}

impl TextFormatter {
    pub fn new(pattern: &str) -> TextFormatter {
        TextFormatter {
            tokens: parse_pattern(pattern),
            indent: false,
            depth: 0,
            line: String::new(),
        }
    }
    /// Indent the titles of entries between matching enter/leave method entries
    pub fn with_indent(mut self, indent: bool) -> TextFormatter {
        self.indent = indent;
        self
    }

    fn render(&mut self, level: crate::level::Level, entry: &LogEntry) {
        use std::fmt::Write;

        if self.indent && entry.log_entry_type == LogEntryType::LeaveMethod {
            self.depth = self.depth.saturating_sub(1);
        }
        self.line.clear();
        for token in &self.tokens {
            // Writing to a `String` cannot fail.
            let _ = match token {
                Token::Literal(text) => write!(self.line, "{}", text),
                Token::Timestamp => write!(
                    self.line,
                    "{}",
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f")
                ),
                Token::Level => write!(self.line, "{}", level),
                Token::Title => {
                    if self.indent {
                        for _ in 0..self.depth {
                            self.line.push_str(INDENT);
                        }
                    }
                    write!(self.line, "{}", entry.title)
                }
                Token::Session => write!(self.line, "{}", entry.session_name),
                Token::AppName => write!(self.line, "{}", entry.app_name),
                Token::HostName => write!(self.line, "{}", entry.host_name),
                Token::Process => write!(self.line, "{}", entry.process_id),
                Token::Thread => write!(self.line, "{}", entry.thread_id),
                Token::LogEntryType => write!(self.line, "{:?}", entry.log_entry_type),
            };
        }
        self.line.push_str("\r\n");
        if self.indent && entry.log_entry_type == LogEntryType::EnterMethod {
            self.depth += 1;
        }
    }
}

impl Formatter for TextFormatter {
    fn compile(&mut self, packet: &Packet) -> usize {
        match packet.kind() {
            PacketKind::LogEntry(entry) => {
                self.render(packet.level(), entry);
                self.line.len()
            }
            _ => {
                self.line.clear();
                0
            }
        }
    }
    fn write(&mut self, sink: &mut dyn Write) -> std::io::Result<()> {
        if !self.line.is_empty() {
            sink.write_all(self.line.as_bytes())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::level::Level;
    use crate::packet::*;
    use chrono::prelude::*;

    fn entry(entry_type: LogEntryType, title: &str) -> Packet {
        let mut e = LogEntry::new(entry_type, ViewerId::Title);
        e.title = title.to_string();
        e.session_name = "Main".to_string();
        e.timestamp = Utc.with_ymd_and_hms(2022, 6, 23, 16, 10, 55).unwrap();
        Packet::log_entry(Level::Warning, e)
    }

    #[test]
    fn default_pattern() {
        let mut f = TextFormatter::default();
        let mut out = Vec::new();
        f.format(&entry(LogEntryType::Warning, "Hello, world!"), &mut out)
            .unwrap();
        assert_eq!(
            std::str::from_utf8(&out).unwrap(),
            "[2022-06-23 16:10:55.000] Warning: Hello, world!\r\n"
        );
    }

    #[test]
    fn custom_pattern_and_unknown_tokens() {
        let mut f = TextFormatter::new("%session%|%nope%|100%|%title%");
        let mut out = Vec::new();
        f.format(&entry(LogEntryType::Message, "x"), &mut out).unwrap();
        assert_eq!(
            std::str::from_utf8(&out).unwrap(),
            "Main|%nope%|100%|x\r\n"
        );
    }

    #[test]
    fn indentation() {
        let mut f = TextFormatter::new("%title%").with_indent(true);
        let mut out = Vec::new();
        f.format(&entry(LogEntryType::EnterMethod, "m"), &mut out).unwrap();
        f.format(&entry(LogEntryType::Message, "inside"), &mut out).unwrap();
        f.format(&entry(LogEntryType::LeaveMethod, "m"), &mut out).unwrap();
        assert_eq!(
            std::str::from_utf8(&out).unwrap(),
            "m\r\n   inside\r\nm\r\n"
        );
    }

    #[test]
    fn non_entries_produce_nothing() {
        let mut f = TextFormatter::default();
        let p = Packet::watch(Level::Debug, Watch::new("a", "b", WatchType::String));
        assert_eq!(f.compile(&p), 0);
        let mut out = Vec::new();
        f.write(&mut out).unwrap();
        assert!(out.is_empty());
    }
}
