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

//! Sending packets to a console on this host over a local channel.
//!
//! On Unix the channel is a Unix-domain stream socket: `pipename` is taken as a path if it
//! contains a separator, & otherwise names a socket in the temporary directory. On Windows it is
//! the named pipe `\\.\pipe\<pipename>`. Either way the console opens with the same banner
//! exchange as over TCP, but packets are not acknowledged.

use crate::{
    binary::BinaryFormatter,
    error::Result,
    formatter::Formatter,
    options::LookupTable,
    packet::Packet,
    transport::{handshake, Transport},
};

use std::{
    io::{BufReader, BufWriter, Read, Write},
    sync::Arc,
};

pub const DEFAULT_PIPE_NAME: &str = "logwire";

type Channel = (Box<dyn Read + Send>, Box<dyn Write + Send>);

#[cfg(unix)]
pub(crate) fn channel_path(name: &str) -> std::path::PathBuf {
    if name.contains('/') {
        std::path::PathBuf::from(name)
    } else {
        std::env::temp_dir().join(name)
    }
}

#[cfg(unix)]
fn open_channel(name: &str) -> std::io::Result<Channel> {
    let stream = std::os::unix::net::UnixStream::connect(channel_path(name))?;
    Ok((Box::new(stream.try_clone()?), Box::new(stream)))
}

#[cfg(windows)]
fn open_channel(name: &str) -> std::io::Result<Channel> {
    let pipe = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(format!(r"\\.\pipe\{}", name))?;
    Ok((Box::new(pipe.try_clone()?), Box::new(pipe)))
}

#[cfg(not(any(unix, windows)))]
fn open_channel(_name: &str) -> std::io::Result<Channel> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "no local channel on this platform",
    ))
}

/// Sending packets via a Unix socket or Windows named pipe
pub struct PipeTransport {
    pipe_name: String,
    formatter: BinaryFormatter,
    writer: Option<BufWriter<Box<dyn Write + Send>>>,
}

impl std::default::Default for PipeTransport {
    fn default() -> Self {
        PipeTransport::new(DEFAULT_PIPE_NAME)
    }
}

impl PipeTransport {
    pub fn new<S: Into<String>>(pipe_name: S) -> PipeTransport {
        PipeTransport {
            pipe_name: pipe_name.into(),
            formatter: BinaryFormatter::new(),
            writer: None,
        }
    }
}

impl Transport for PipeTransport {
    fn name(&self) -> &'static str {
        "pipe"
    }
    fn is_valid_option(&self, key: &str) -> bool {
        key == "pipename"
    }
    fn load_options(&mut self, options: &LookupTable) {
        self.pipe_name = options.get_string("pipename", DEFAULT_PIPE_NAME);
    }
    fn connect(&mut self) -> Result<()> {
        let (reader, writer) = open_channel(&self.pipe_name)?;
        let mut reader = BufReader::new(reader);
        let mut writer = BufWriter::new(writer);
        handshake(&mut reader, &mut writer)?;
        tracing::debug!(target: "logwire::transport", "connected to pipe {}", self.pipe_name);
        self.writer = Some(writer);
        Ok(())
    }
    fn write_packet(&mut self, packet: &Arc<Packet>) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            self.formatter.format(packet, writer)?;
            writer.flush()?;
        }
        Ok(())
    }
    fn disconnect(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }
}
