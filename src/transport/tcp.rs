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

//! Sending packets to a console over TCP.
//!
//! After connecting, the console sends a banner line & we reply with ours. Thereafter every
//! packet is acknowledged by the console with a two-byte answer, which we read (and discard)
//! before the write is considered complete.

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
    net::{Shutdown, TcpStream, ToSocketAddrs},
    sync::Arc,
    time::Duration,
};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 4228;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30000);

const BUFFER_SIZE: usize = 0x2000;

struct Connection {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

/// Sending packets via TCP streams
pub struct TcpTransport {
    host: String,
    port: u16,
    timeout: Duration,
    formatter: BinaryFormatter,
    conn: Option<Connection>,
}

impl std::default::Default for TcpTransport {
    fn default() -> Self {
        TcpTransport::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl TcpTransport {
    /// Construct a [`Transport`] implementation that will connect to `host`:`port`.
    pub fn new<S: Into<String>>(host: S, port: u16) -> TcpTransport {
        TcpTransport {
            host: host.into(),
            port,
            timeout: DEFAULT_TIMEOUT,
            formatter: BinaryFormatter::new(),
            conn: None,
        }
    }
    pub fn with_timeout(mut self, timeout: Duration) -> TcpTransport {
        self.timeout = timeout;
        self
    }

    fn open(&self) -> Result<TcpStream> {
        let timeout = if self.timeout.is_zero() {
            None
        } else {
            Some(self.timeout)
        };
        let mut last_err = None;
        for addr in (self.host.as_str(), self.port).to_socket_addrs()? {
            let attempt = match timeout {
                Some(t) => TcpStream::connect_timeout(&addr, t),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => {
                    stream.set_read_timeout(timeout)?;
                    stream.set_write_timeout(timeout)?;
                    stream.set_nodelay(true)?;
                    return Ok(stream);
                }
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err
            .unwrap_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{} did not resolve to any address", self.host),
                )
            })
            .into())
    }
}

impl Transport for TcpTransport {
    fn name(&self) -> &'static str {
        "tcp"
    }
    fn is_valid_option(&self, key: &str) -> bool {
        matches!(key, "host" | "port" | "timeout")
    }
    fn load_options(&mut self, options: &LookupTable) {
        self.host = options.get_string("host", DEFAULT_HOST);
        self.port = u16::try_from(options.get_integer("port", DEFAULT_PORT as i64))
            .unwrap_or(DEFAULT_PORT);
        self.timeout = Duration::from_millis(
            u64::try_from(options.get_integer("timeout", DEFAULT_TIMEOUT.as_millis() as i64))
                .unwrap_or(0),
        );
    }
    fn connect(&mut self) -> Result<()> {
        let stream = self.open()?;
        let mut reader = BufReader::new(stream.try_clone()?);
        let mut writer = BufWriter::with_capacity(BUFFER_SIZE, stream.try_clone()?);
        handshake(&mut reader, &mut writer)?;
        tracing::debug!(target: "logwire::transport", "connected to {}:{}", self.host, self.port);
        self.conn = Some(Connection {
            stream,
            reader,
            writer,
        });
        Ok(())
    }
    fn write_packet(&mut self, packet: &Arc<Packet>) -> Result<()> {
        let conn = match self.conn.as_mut() {
            Some(conn) => conn,
            None => return Ok(()),
        };
        self.formatter.format(packet, &mut conn.writer)?;
        conn.writer.flush()?;
        let mut answer = [0u8; 2];
        conn.reader.read_exact(&mut answer)?;
        Ok(())
    }
    fn disconnect(&mut self) -> Result<()> {
        if let Some(mut conn) = self.conn.take() {
            let res = conn.writer.flush();
            // The peer may well have gone away already; there's nothing to be done about that.
            let _ = conn.stream.shutdown(Shutdown::Both);
            res?;
        }
        Ok(())
    }
}
