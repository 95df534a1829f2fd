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

//! The destination transport layer.
//!
//! This module defines the [`Transport`] trait that all destination drivers must support, along
//! with the drivers themselves:
//!
//! | name   | driver               | destination                                         |
//! |--------|----------------------|-----------------------------------------------------|
//! | `tcp`  | [`TcpTransport`]     | a console listening on a TCP port                   |
//! | `file` | [`FileTransport`]    | a binary log file the console can open later        |
//! | `text` | [`FileTransport`]    | a plain-text log file                               |
//! | `pipe` | [`PipeTransport`]    | a console on this host, via a local channel         |
//! | `mem`  | [`MemoryTransport`]  | a bounded in-memory buffer, dumped on request       |
//!
//! A [`Transport`] only knows how to move packets; connection policy (lazy connects, reconnects,
//! backlogs, asynchronous operation) lives in [`Protocol`], which drives a transport through this
//! trait.
//!
//! # Examples
//!
//! ```rust
//! use logwire::transport::create;
//! let transpo = create("tcp").unwrap();
//! assert_eq!(transpo.name(), "tcp");
//! assert!(create("carrier-pigeon").is_err());
//! ```
//!
//! [`Protocol`]: crate::protocol::Protocol

pub mod file;
pub mod memory;
pub mod pipe;
pub mod tcp;

pub use file::FileTransport;
pub use memory::MemoryTransport;
pub use pipe::PipeTransport;
pub use tcp::TcpTransport;

use crate::{
    error::{Error, Result},
    options::LookupTable,
    packet::Packet,
    protocol::ProtocolCommand,
};

use backtrace::Backtrace;

use std::io::{BufRead, Write};
use std::sync::Arc;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                      transport mechanisms                                      //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Operations all destination drivers must support.
///
/// Methods are only ever called by the owning [`Protocol`], one at a time, under its lock (or on
/// its scheduler's worker thread), so implementations needn't synchronize internally.
///
/// [`Protocol`]: crate::protocol::Protocol
pub trait Transport: Send {
    /// The name by which this transport is selected in a connections string
    fn name(&self) -> &'static str;
    /// Whether `key` is an option specific to this transport
    fn is_valid_option(&self, key: &str) -> bool;
    /// Configure this transport; unknown keys have already been rejected.
    fn load_options(&mut self, options: &LookupTable);
    /// Open the destination
    fn connect(&mut self) -> Result<()>;
    /// Re-open the destination after a failure; returns whether it is now open.
    fn reconnect(&mut self) -> Result<bool> {
        self.connect().map(|_| true)
    }
    /// Send one packet to the (open) destination
    fn write_packet(&mut self, packet: &Arc<Packet>) -> Result<()>;
    /// Close the destination; must be safe to call when it isn't open.
    fn disconnect(&mut self) -> Result<()>;
    /// Carry out a custom action; the default does nothing.
    fn dispatch(&mut self, _command: &ProtocolCommand) -> Result<()> {
        Ok(())
    }
    /// Whether a log header should be written each time this transport connects
    fn writes_log_header(&self) -> bool {
        true
    }
}

/// Construct the transport registered under `name` (with its default options).
pub fn create(name: &str) -> Result<Box<dyn Transport>> {
    match name.trim().to_lowercase().as_str() {
        "tcp" => Ok(Box::new(TcpTransport::default())),
        "file" => Ok(Box::new(FileTransport::binary())),
        "text" => Ok(Box::new(FileTransport::text())),
        "pipe" => Ok(Box::new(PipeTransport::default())),
        "mem" => Ok(Box::new(MemoryTransport::default())),
        _ => Err(Error::UnknownProtocol {
            name: name.to_string(),
            back: Backtrace::new(),
        }),
    }
}

/// The banner we announce ourselves with after reading the server's
pub(crate) fn client_banner() -> String {
    format!("logwire Rust Library v{}\n", env!("CARGO_PKG_VERSION"))
}

/// Read the server's banner line, then send ours.
pub(crate) fn handshake<R: BufRead, W: Write>(reader: &mut R, writer: &mut W) -> Result<()> {
    let mut banner = String::new();
    if reader.read_line(&mut banner)? == 0 || !banner.ends_with('\n') {
        return Err(Error::handshake(
            "Could not read server banner correctly: connection has been closed unexpectedly",
        ));
    }
    tracing::debug!(target: "logwire::transport", "server banner: {}", banner.trim_end());
    writer.write_all(client_banner().as_bytes())?;
    writer.flush()?;
    Ok(())
}
