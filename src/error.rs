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

//! [logwire](crate) errors

use backtrace::Backtrace;

/// [logwire](crate) error type
///
/// [logwire](crate) eschews libraries like [thiserror], [anyhow] & [Snafu] in favor of a
/// straightforward enumeration with a few match arms chosen on the basis what the caller will need
/// to respond.
///
/// [thiserror]: https://docs.rs/thiserror
/// [anyhow]: https://docs.rs/anyhow
/// [Snafu]: https://docs.rs/snafu/latest/snafu
#[non_exhaustive]
pub enum Error {
    /// A connections or options string could not be parsed
    ConfigurationSyntax {
        message: String,
        position: usize,
        back: Backtrace,
    },
    /// A protocol was handed an option it doesn't understand
    InvalidOption {
        protocol: String,
        key: String,
        back: Backtrace,
    },
    /// A connections string named a protocol we don't have
    UnknownProtocol { name: String, back: Backtrace },
    /// A destination failed to connect, write, disconnect or dispatch
    Protocol {
        name: String,
        options: String,
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
        back: Backtrace,
    },
    /// The peer didn't follow the banner exchange
    Handshake { message: String, back: Backtrace },
    /// I/O error
    Io {
        source: std::io::Error,
        back: Backtrace,
    },
    /// The asynchronous worker couldn't be started
    Scheduler { message: String, back: Backtrace },
}

impl Error {
    pub(crate) fn syntax<S: Into<String>>(message: S, position: usize) -> Error {
        Error::ConfigurationSyntax {
            message: message.into(),
            position,
            back: Backtrace::new(),
        }
    }
    pub(crate) fn handshake<S: Into<String>>(message: S) -> Error {
        Error::Handshake {
            message: message.into(),
            back: Backtrace::new(),
        }
    }
    /// True if this error came out of the connections/options grammar or option validation
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::ConfigurationSyntax { .. }
                | Error::InvalidOption { .. }
                | Error::UnknownProtocol { .. }
        )
    }
}

impl std::convert::From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io {
            source: err,
            back: Backtrace::new(),
        }
    }
}

impl std::fmt::Display for Error {
    // `Error` is non-exhaustive so that adding variants won't be a breaking change to our
    // callers. That means the compiler won't catch us if we miss a variant here, so we
    // always include a `_` arm.
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::ConfigurationSyntax {
                message, position, ..
            } => write!(f, "{} at position {}", message, position),
            Error::InvalidOption { protocol, key, .. } => write!(
                f,
                "Option \"{}\" is not available for protocol \"{}\"",
                key, protocol
            ),
            Error::UnknownProtocol { name, .. } => write!(f, "Protocol \"{}\" not found", name),
            Error::Protocol {
                name,
                options,
                source,
                ..
            } => write!(f, "{} protocol [{}]: {}", name, options, source),
            Error::Handshake { message, .. } => write!(f, "Handshake failed: {}", message),
            Error::Io { source, .. } => write!(f, "I/O error: {}", source),
            Error::Scheduler { message, .. } => write!(f, "Scheduler error: {}", message),
            _ => write!(f, "Other logwire error"),
        }
    }
}

impl std::fmt::Debug for Error {
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::ConfigurationSyntax { back, .. } => write!(f, "{}\n{:#?}", self, back),
            Error::InvalidOption { back, .. } => write!(f, "{}\n{:#?}", self, back),
            Error::UnknownProtocol { back, .. } => write!(f, "{}\n{:#?}", self, back),
            Error::Protocol { back, .. } => write!(f, "{}\n{:#?}", self, back),
            Error::Handshake { back, .. } => write!(f, "{}\n{:#?}", self, back),
            Error::Io { back, .. } => write!(f, "{}\n{:#?}", self, back),
            Error::Scheduler { back, .. } => write!(f, "{}\n{:#?}", self, back),
            err => write!(f, "logwire error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Protocol { source, .. } => Some(source.as_ref()),
            Error::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
