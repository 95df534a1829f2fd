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

//! Keeping the most recent packets in memory.
//!
//! The `mem` protocol never touches the outside world on its own: packets accumulate in a
//! bounded [`PacketQueue`] (oldest evicted first) until somebody dispatches a
//! [`ProtocolCommand`] carrying a writer, at which point the whole queue is written out in either
//! the binary file format or as text.

use crate::{
    binary::BinaryFormatter,
    error::Result,
    formatter::Formatter,
    options::LookupTable,
    packet::Packet,
    protocol::ProtocolCommand,
    queue::{PacketQueue, DEFAULT_BACKLOG},
    text::{TextFormatter, BOM, DEFAULT_PATTERN},
    transport::{file::MAGIC, Transport},
};

use std::{io::Write, sync::Arc};

/// Buffering packets in memory
pub struct MemoryTransport {
    max_size: usize,
    as_text: bool,
    pattern: String,
    indent: bool,
    queue: PacketQueue,
}

impl std::default::Default for MemoryTransport {
    fn default() -> Self {
        MemoryTransport {
            max_size: DEFAULT_BACKLOG,
            as_text: false,
            pattern: DEFAULT_PATTERN.to_string(),
            indent: false,
            queue: PacketQueue::new(DEFAULT_BACKLOG),
        }
    }
}

impl MemoryTransport {
    /// Number of packets currently held
    pub fn count(&self) -> usize {
        self.queue.count()
    }

    fn dump(&self, sink: &mut dyn Write) -> std::io::Result<()> {
        if self.as_text {
            sink.write_all(&BOM)?;
            let mut formatter = TextFormatter::new(&self.pattern).with_indent(self.indent);
            for packet in self.queue.iter() {
                formatter.format(packet, sink)?;
            }
        } else {
            sink.write_all(MAGIC)?;
            let mut formatter = BinaryFormatter::new();
            for packet in self.queue.iter() {
                formatter.format(packet, sink)?;
            }
        }
        sink.flush()
    }
}

impl Transport for MemoryTransport {
    fn name(&self) -> &'static str {
        "mem"
    }
    fn is_valid_option(&self, key: &str) -> bool {
        matches!(key, "maxsize" | "astext" | "pattern" | "indent")
    }
    fn load_options(&mut self, options: &LookupTable) {
        self.max_size = options.get_size("maxsize", DEFAULT_BACKLOG as u64) as usize;
        self.as_text = options.get_bool("astext", false);
        self.pattern = options.get_string("pattern", DEFAULT_PATTERN);
        self.indent = options.get_bool("indent", false);
        self.queue.set_backlog(self.max_size);
    }
    fn connect(&mut self) -> Result<()> {
        self.queue = PacketQueue::new(self.max_size);
        Ok(())
    }
    fn write_packet(&mut self, packet: &Arc<Packet>) -> Result<()> {
        self.queue.push(packet.clone());
        Ok(())
    }
    fn disconnect(&mut self) -> Result<()> {
        self.queue.clear();
        Ok(())
    }
    fn dispatch(&mut self, command: &ProtocolCommand) -> Result<()> {
        if let Some(writer) = command.writer() {
            let mut sink = writer.lock().unwrap_or_else(|err| err.into_inner());
            self.dump(&mut **sink)?;
        }
        Ok(())
    }
    fn writes_log_header(&self) -> bool {
        false
    }
}
