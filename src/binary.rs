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

//! The binary wire format.
//!
//! [`BinaryFormatter`] is a [`Formatter`] that produces the legacy binary records the console
//! reads. Every record is framed as:
//!
//! ```text
//! +----------------+-----------------------+-------------------
//! | type (u16, LE) | payload length (u32)  | payload ...
//! +----------------+-----------------------+-------------------
//! ```
//!
//! All integers in the payload are little-endian & 32-bit, strings are UTF-8 and are preceded (in
//! a fixed-size block at the head of the payload) by their byte lengths. Timestamps are the
//! console's "fractional days since 1899-12-30" doubles; see [`timestamp_to_wire`].

use crate::{
    formatter::Formatter,
    packet::{ControlCommand, LogEntry, LogHeader, Packet, PacketKind, ProcessFlow, Watch},
};

use bytes::{BufMut, Bytes};
use chrono::prelude::*;

use std::io::Write;

/// .NET ticks (hundreds of nanoseconds since 0001-01-01) at the Unix epoch
const TICKS_EPOCH: i64 = 621_355_968_000_000_000;
const MICROSECONDS_PER_DAY: i64 = 86_400_000_000;
/// Days from 1899-12-30 to 1970-01-01
const DAY_OFFSET: f64 = 25_569.0;

/// Payload bytes are handed to the sink in chunks of this size
const COPY_BUFFER_SIZE: usize = 0x2000;
const DEFAULT_BUFFER_CAPACITY: usize = 0x2000;
/// A record larger than this causes the compile buffer to be re-allocated at its default size
const MAX_BUFFER_CAPACITY: usize = 10 * 1024 * 1024;

/// Convert `timestamp` to the console's representation.
///
/// The integral part of the result is the number of whole days since 1899-12-30 & the fractional
/// part the fraction of the day elapsed. The computation runs in integer microseconds, splitting
/// days from the time-of-day with truncating division, so it matches the console's own arithmetic
/// bit for bit.
pub fn timestamp_to_wire(timestamp: &DateTime<Utc>) -> f64 {
    let ticks = TICKS_EPOCH
        + timestamp.timestamp() * 10_000_000
        + (timestamp.timestamp_subsec_nanos() / 100) as i64;
    let micros = (ticks - TICKS_EPOCH) / 10;
    let days = micros / MICROSECONDS_PER_DAY;
    let rest = micros % MICROSECONDS_PER_DAY;
    days as f64 + DAY_OFFSET + rest as f64 / MICROSECONDS_PER_DAY as f64
}

/// Lengths that don't fit the wire's signed 32-bit fields are written as zero.
fn wire_len(len: usize) -> i32 {
    i32::try_from(len).unwrap_or(0)
}

/// Strings & payloads whose length can't be represented are dropped rather than written, so that
/// the frame stays consistent with the (zeroed) length fields.
fn representable(bytes: &[u8]) -> &[u8] {
    if i32::try_from(bytes.len()).is_ok() {
        bytes
    } else {
        &[]
    }
}

/// A [`Formatter`] producing the legacy binary wire format.
pub struct BinaryFormatter {
    buffer: Vec<u8>,
    payload: Option<Bytes>,
    packet_type: u16,
    size: usize,
}

impl std::default::Default for BinaryFormatter {
    fn default() -> Self {
        BinaryFormatter::new()
    }
}

impl BinaryFormatter {
    pub fn new() -> BinaryFormatter {
        BinaryFormatter {
            buffer: Vec::with_capacity(DEFAULT_BUFFER_CAPACITY),
            payload: None,
            packet_type: 0,
            size: 0,
        }
    }

    fn compile_log_entry(&mut self, entry: &LogEntry) {
        let app = representable(entry.app_name.as_bytes());
        let session = representable(entry.session_name.as_bytes());
        let title = representable(entry.title.as_bytes());
        let host = representable(entry.host_name.as_bytes());
        let data = entry
            .data
            .clone()
            .filter(|d| i32::try_from(d.len()).is_ok());

        let buf = &mut self.buffer;
        buf.put_i32_le(entry.log_entry_type as i32);
        buf.put_i32_le(entry.viewer_id as i32);
        buf.put_i32_le(wire_len(app.len()));
        buf.put_i32_le(wire_len(session.len()));
        buf.put_i32_le(wire_len(title.len()));
        buf.put_i32_le(wire_len(host.len()));
        buf.put_i32_le(wire_len(data.as_ref().map_or(0, |d| d.len())));
        buf.put_u32_le(u32::try_from(entry.process_id).unwrap_or(0));
        buf.put_u32_le(u32::try_from(entry.thread_id).unwrap_or(0));
        buf.put_f64_le(timestamp_to_wire(&entry.timestamp));
        buf.put_i32_le(entry.color.to_i32());
        buf.put_slice(app);
        buf.put_slice(session);
        buf.put_slice(title);
        buf.put_slice(host);
        self.payload = data;
    }

    fn compile_control_command(&mut self, command: &ControlCommand) {
        let data = command
            .data
            .clone()
            .filter(|d| i32::try_from(d.len()).is_ok());
        self.buffer.put_i32_le(command.control_command_type as i32);
        self.buffer
            .put_i32_le(wire_len(data.as_ref().map_or(0, |d| d.len())));
        self.payload = data;
    }

    fn compile_process_flow(&mut self, flow: &ProcessFlow) {
        let title = representable(flow.title.as_bytes());
        let host = representable(flow.host_name.as_bytes());
        let buf = &mut self.buffer;
        buf.put_i32_le(flow.process_flow_type as i32);
        buf.put_i32_le(wire_len(title.len()));
        buf.put_i32_le(wire_len(host.len()));
        buf.put_i32_le(i32::try_from(flow.process_id).unwrap_or(0));
        buf.put_i32_le(i32::try_from(flow.thread_id).unwrap_or(0));
        buf.put_f64_le(timestamp_to_wire(&flow.timestamp));
        buf.put_slice(title);
        buf.put_slice(host);
    }

    fn compile_watch(&mut self, watch: &Watch) {
        let name = representable(watch.name.as_bytes());
        let value = representable(watch.value.as_bytes());
        let buf = &mut self.buffer;
        buf.put_i32_le(wire_len(name.len()));
        buf.put_i32_le(wire_len(value.len()));
        buf.put_i32_le(watch.watch_type as i32);
        buf.put_f64_le(timestamp_to_wire(&watch.timestamp));
        buf.put_slice(name);
        buf.put_slice(value);
    }

    fn compile_log_header(&mut self, header: &LogHeader) {
        let content = header.content();
        let content = representable(content.as_bytes());
        self.buffer.put_i32_le(wire_len(content.len()));
        self.buffer.put_slice(content);
    }
}

impl Formatter for BinaryFormatter {
    fn compile(&mut self, packet: &Packet) -> usize {
        // One outlier shouldn't pin a huge allocation for the life of the destination.
        if self.size > MAX_BUFFER_CAPACITY || self.buffer.capacity() > MAX_BUFFER_CAPACITY {
            self.buffer = Vec::with_capacity(DEFAULT_BUFFER_CAPACITY);
        }
        self.buffer.clear();
        self.payload = None;

        match packet.kind() {
            PacketKind::LogEntry(x) => self.compile_log_entry(x),
            PacketKind::Watch(x) => self.compile_watch(x),
            PacketKind::ControlCommand(x) => self.compile_control_command(x),
            PacketKind::ProcessFlow(x) => self.compile_process_flow(x),
            PacketKind::LogHeader(x) => self.compile_log_header(x),
        }

        self.packet_type = packet.packet_type() as u16;
        self.size = self.buffer.len() + self.payload.as_ref().map_or(0, |d| d.len());
        self.size
    }

    fn write(&mut self, sink: &mut dyn Write) -> std::io::Result<()> {
        if self.size == 0 {
            return Ok(());
        }
        let mut header = [0u8; 6];
        header[..2].copy_from_slice(&self.packet_type.to_le_bytes());
        header[2..].copy_from_slice(&u32::try_from(self.size).unwrap_or(0).to_le_bytes());
        sink.write_all(&header)?;
        sink.write_all(&self.buffer)?;
        if let Some(data) = &self.payload {
            for chunk in data.chunks(COPY_BUFFER_SIZE) {
                sink.write_all(chunk)?;
            }
        }
        Ok(())
    }
}
