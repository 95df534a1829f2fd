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

//! Packet severity levels.
//!
//! [`Level`] orders packets from the chattiest ([`Level::Debug`]) to the administrative
//! ([`Level::Control`]); every protocol filters on it and the backlog uses it to decide when to
//! flush.

type StdResult<T, E> = std::result::Result<T, E>;

/// Packet severity, in increasing order.
///
/// [`Level::Control`] is reserved for administrative packets (control commands, the log header):
/// it sorts above everything else so that it is never filtered out, but it never triggers a
/// backlog flush.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Level {
    /// debug-level message
    #[default]
    Debug = 0,
    /// more detail than usual
    Verbose = 1,
    /// normal, informational message
    Message = 2,
    /// warning conditions
    Warning = 3,
    /// error conditions
    Error = 4,
    /// the application cannot continue
    Fatal = 5,
    /// administrative packets
    Control = 6,
}

impl Level {
    /// Parse a level name as it appears in an options string (case-insensitive)
    pub fn parse(text: &str) -> Option<Level> {
        match text.trim().to_ascii_lowercase().as_str() {
            "debug" => Some(Level::Debug),
            "verbose" => Some(Level::Verbose),
            "message" => Some(Level::Message),
            "warning" => Some(Level::Warning),
            "error" => Some(Level::Error),
            "fatal" => Some(Level::Fatal),
            "control" => Some(Level::Control),
            _ => None,
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> StdResult<(), std::fmt::Error> {
        write!(
            f,
            "{}",
            match self {
                Level::Debug => "Debug",
                Level::Verbose => "Verbose",
                Level::Message => "Message",
                Level::Warning => "Warning",
                Level::Error => "Error",
                Level::Fatal => "Fatal",
                Level::Control => "Control",
            }
        )
    }
}

impl std::str::FromStr for Level {
    type Err = String;
    fn from_str(s: &str) -> StdResult<Self, Self::Err> {
        Level::parse(s).ok_or_else(|| format!("{} is not a level", s))
    }
}

/// Map a [`tracing`] level onto ours.
///
/// [`tracing`]: https://docs.rs/tracing/latest/tracing/index.html
pub fn default_level_mapping(level: &tracing::Level) -> Level {
    match *level {
        tracing::Level::TRACE => Level::Debug,
        tracing::Level::DEBUG => Level::Verbose,
        tracing::Level::INFO => Level::Message,
        tracing::Level::WARN => Level::Warning,
        tracing::Level::ERROR => Level::Error,
    }
}

#[cfg(test)]
mod level_tests {
    use super::*;
    #[test]
    fn test_ordering() {
        assert!(Level::Debug < Level::Verbose);
        assert!(Level::Error < Level::Fatal);
        assert!(Level::Fatal < Level::Control);
        assert_eq!(Level::Warning as i32, 3);
        assert_eq!(format!("{}", Level::Message), "Message".to_string());
    }
    #[test]
    fn test_parse() {
        assert_eq!(Level::parse(" ERROR "), Some(Level::Error));
        assert_eq!("verbose".parse::<Level>(), Ok(Level::Verbose));
        assert!(Level::parse("loud").is_none());
        assert_eq!(default_level_mapping(&tracing::Level::WARN), Level::Warning);
    }
}
