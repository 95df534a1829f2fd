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

//! The packet model.
//!
//! Everything [logwire](crate) delivers is a [`Packet`]: a severity [`Level`], a thread-safety
//! flag, and one of five kinds of payload ([`PacketKind`]). Packets are built by producers (the
//! [`Engine`] helpers, the tracing [`Layer`]), wrapped in an [`Arc`] and handed to every configured
//! protocol; nothing mutates them after that.
//!
//! [`Engine`]: crate::engine::Engine
//! [`Layer`]: crate::layer::Layer

use crate::{host, level::Level};

use bytes::Bytes;
use chrono::prelude::*;

use std::sync::{Arc, Mutex, MutexGuard};

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                      discriminants & enums                                     //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Packet type codes as they appear in the wire frame header
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PacketType {
    ControlCommand = 1,
    LogEntry = 4,
    Watch = 5,
    ProcessFlow = 6,
    LogHeader = 7,
}

/// What sort of log entry this is; drives the icon & filtering in the viewer
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LogEntryType {
    Separator = 0,
    EnterMethod = 1,
    LeaveMethod = 2,
    ResetCallstack = 3,
    Message = 100,
    Warning = 101,
    Error = 102,
    InternalError = 103,
    Comment = 104,
    VariableValue = 105,
    Checkpoint = 106,
    Debug = 107,
    Verbose = 108,
    Fatal = 109,
    Conditional = 110,
    Assert = 111,
    Text = 200,
    Binary = 201,
    Graphic = 202,
    Source = 203,
    Object = 204,
    WebContent = 205,
    System = 206,
    MemoryStatistic = 207,
    DatabaseResult = 208,
    DatabaseStructure = 209,
}

impl LogEntryType {
    /// The entry type a plain message at `level` would carry
    pub fn for_level(level: Level) -> LogEntryType {
        match level {
            Level::Debug => LogEntryType::Debug,
            Level::Verbose => LogEntryType::Verbose,
            Level::Message | Level::Control => LogEntryType::Message,
            Level::Warning => LogEntryType::Warning,
            Level::Error => LogEntryType::Error,
            Level::Fatal => LogEntryType::Fatal,
        }
    }
}

/// Which viewer the console should use to display a log entry's payload
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ViewerId {
    None = -1,
    Title = 0,
    Data = 1,
    List = 2,
    ValueList = 3,
    Inspector = 4,
    Table = 5,
    Web = 100,
    Binary = 200,
    HtmlSource = 300,
    JavaScriptSource = 301,
    VbScriptSource = 302,
    PerlSource = 303,
    SqlSource = 304,
    IniSource = 305,
    PythonSource = 306,
    XmlSource = 307,
    Bitmap = 400,
    Jpeg = 401,
    Icon = 402,
    Metafile = 403,
}

/// Display hint for a watch value
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WatchType {
    Char = 0,
    String = 1,
    Integer = 2,
    Float = 3,
    Boolean = 4,
    Address = 5,
    Timestamp = 6,
    Object = 7,
}

/// Process-flow markers
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ProcessFlowType {
    EnterMethod = 0,
    LeaveMethod = 1,
    EnterThread = 2,
    LeaveThread = 3,
    EnterProcess = 4,
    LeaveProcess = 5,
}

/// Administrative commands for the console
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ControlCommandType {
    ClearLog = 0,
    ClearWatches = 1,
    ClearAutoViews = 2,
    ClearAll = 3,
    ClearProcessFlow = 4,
}

/// An ARGB color
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    /// The console's "no color set" value
    pub const TRANSPARENT: Color = Color::rgba(0xff, 0xff, 0xff, 0x00);

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Color {
        Color { r, g, b, a }
    }
    pub const fn rgb(r: u8, g: u8, b: u8) -> Color {
        Color::rgba(r, g, b, 0xff)
    }
    /// Pack as `R | G<<8 | B<<16 | A<<24`
    pub fn to_i32(self) -> i32 {
        (self.r as u32 | (self.g as u32) << 8 | (self.b as u32) << 16 | (self.a as u32) << 24) as i32
    }
}

impl std::default::Default for Color {
    fn default() -> Self {
        Color::TRANSPARENT
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          packet kinds                                          //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A log message, optionally carrying a binary payload for one of the console's viewers
#[derive(Clone, Debug, PartialEq)]
pub struct LogEntry {
    pub log_entry_type: LogEntryType,
    pub viewer_id: ViewerId,
    pub app_name: String,
    pub session_name: String,
    pub title: String,
    pub host_name: String,
    pub data: Option<Bytes>,
    pub process_id: u64,
    pub thread_id: u64,
    pub timestamp: DateTime<Utc>,
    pub color: Color,
}

impl LogEntry {
    const HEADER_SIZE: usize = 48;

    /// A log entry stamped with the current time, process & thread
    pub fn new(log_entry_type: LogEntryType, viewer_id: ViewerId) -> LogEntry {
        LogEntry {
            log_entry_type,
            viewer_id,
            app_name: String::new(),
            session_name: String::new(),
            title: String::new(),
            host_name: String::new(),
            data: None,
            process_id: std::process::id() as u64,
            thread_id: host::current_thread_id(),
            timestamp: Utc::now(),
            color: Color::default(),
        }
    }
    fn size(&self) -> usize {
        LogEntry::HEADER_SIZE
            + self.app_name.len()
            + self.session_name.len()
            + self.title.len()
            + self.host_name.len()
            + self.data.as_ref().map_or(0, |d| d.len())
    }
}

/// A named value the console shows in its watches panel
#[derive(Clone, Debug, PartialEq)]
pub struct Watch {
    pub name: String,
    pub value: String,
    pub watch_type: WatchType,
    pub timestamp: DateTime<Utc>,
}

impl Watch {
    const HEADER_SIZE: usize = 20;

    pub fn new<N: Into<String>, V: Into<String>>(
        name: N,
        value: V,
        watch_type: WatchType,
    ) -> Watch {
        Watch {
            name: name.into(),
            value: value.into(),
            watch_type,
            timestamp: Utc::now(),
        }
    }
    fn size(&self) -> usize {
        Watch::HEADER_SIZE + self.name.len() + self.value.len()
    }
}

/// Enter/leave markers for methods, threads & processes
#[derive(Clone, Debug, PartialEq)]
pub struct ProcessFlow {
    pub process_flow_type: ProcessFlowType,
    pub title: String,
    pub host_name: String,
    pub process_id: u64,
    pub thread_id: u64,
    pub timestamp: DateTime<Utc>,
}

impl ProcessFlow {
    const HEADER_SIZE: usize = 28;

    pub fn new<T: Into<String>>(process_flow_type: ProcessFlowType, title: T) -> ProcessFlow {
        ProcessFlow {
            process_flow_type,
            title: title.into(),
            host_name: String::new(),
            process_id: std::process::id() as u64,
            thread_id: host::current_thread_id(),
            timestamp: Utc::now(),
        }
    }
    fn size(&self) -> usize {
        ProcessFlow::HEADER_SIZE + self.title.len() + self.host_name.len()
    }
}

/// An administrative command for the console
#[derive(Clone, Debug, PartialEq)]
pub struct ControlCommand {
    pub control_command_type: ControlCommandType,
    pub data: Option<Bytes>,
}

impl ControlCommand {
    const HEADER_SIZE: usize = 8;

    pub fn new(control_command_type: ControlCommandType) -> ControlCommand {
        ControlCommand {
            control_command_type,
            data: None,
        }
    }
    fn size(&self) -> usize {
        ControlCommand::HEADER_SIZE + self.data.as_ref().map_or(0, |d| d.len())
    }
}

/// Identifies the sending application; written by each protocol right after it connects
#[derive(Clone, Debug, PartialEq)]
pub struct LogHeader {
    pub app_name: String,
    pub host_name: String,
}

impl LogHeader {
    const HEADER_SIZE: usize = 4;

    pub fn new<A: Into<String>, H: Into<String>>(app_name: A, host_name: H) -> LogHeader {
        LogHeader {
            app_name: app_name.into(),
            host_name: host_name.into(),
        }
    }
    /// The `key=value` text blob that goes on the wire
    pub fn content(&self) -> String {
        format!(
            "hostname={}\r\nappname={}\r\n",
            self.host_name, self.app_name
        )
    }
    fn size(&self) -> usize {
        LogHeader::HEADER_SIZE + self.content().len()
    }
}

/// The five kinds of packet
#[derive(Clone, Debug, PartialEq)]
pub enum PacketKind {
    LogEntry(LogEntry),
    Watch(Watch),
    ControlCommand(ControlCommand),
    ProcessFlow(ProcessFlow),
    LogHeader(LogHeader),
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          struct Packet                                         //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A unit of delivery.
///
/// When a packet is marked thread-safe, every protocol holds its lock for the duration of the
/// write, so concurrent asynchronous protocols serialize on it.
#[derive(Debug)]
pub struct Packet {
    level: Level,
    thread_safe: bool,
    lock: Mutex<()>,
    kind: PacketKind,
}

impl Packet {
    pub fn new(level: Level, kind: PacketKind) -> Packet {
        Packet {
            level,
            thread_safe: false,
            lock: Mutex::new(()),
            kind,
        }
    }
    pub fn log_entry(level: Level, entry: LogEntry) -> Packet {
        Packet::new(level, PacketKind::LogEntry(entry))
    }
    pub fn watch(level: Level, watch: Watch) -> Packet {
        Packet::new(level, PacketKind::Watch(watch))
    }
    pub fn process_flow(level: Level, flow: ProcessFlow) -> Packet {
        Packet::new(level, PacketKind::ProcessFlow(flow))
    }
    /// Control commands always travel at [`Level::Control`]
    pub fn control_command(command: ControlCommand) -> Packet {
        Packet::new(Level::Control, PacketKind::ControlCommand(command))
    }
    /// Log headers always travel at [`Level::Control`]
    pub fn log_header(header: LogHeader) -> Packet {
        Packet::new(Level::Control, PacketKind::LogHeader(header))
    }
    pub fn with_thread_safe(mut self, thread_safe: bool) -> Packet {
        self.thread_safe = thread_safe;
        self
    }
    pub fn into_shared(self) -> Arc<Packet> {
        Arc::new(self)
    }
    pub fn level(&self) -> Level {
        self.level
    }
    pub fn kind(&self) -> &PacketKind {
        &self.kind
    }
    pub(crate) fn kind_mut(&mut self) -> &mut PacketKind {
        &mut self.kind
    }
    pub fn is_thread_safe(&self) -> bool {
        self.thread_safe
    }
    pub fn packet_type(&self) -> PacketType {
        match &self.kind {
            PacketKind::LogEntry(_) => PacketType::LogEntry,
            PacketKind::Watch(_) => PacketType::Watch,
            PacketKind::ControlCommand(_) => PacketType::ControlCommand,
            PacketKind::ProcessFlow(_) => PacketType::ProcessFlow,
            PacketKind::LogHeader(_) => PacketType::LogHeader,
        }
    }
    /// Accounting size in bytes, used by the backlog & scheduler queues
    pub fn size(&self) -> usize {
        match &self.kind {
            PacketKind::LogEntry(x) => x.size(),
            PacketKind::Watch(x) => x.size(),
            PacketKind::ControlCommand(x) => x.size(),
            PacketKind::ProcessFlow(x) => x.size(),
            PacketKind::LogHeader(x) => x.size(),
        }
    }
    /// Take this packet's lock if it is thread-safe; the guard is held for the write.
    pub fn lock(&self) -> Option<MutexGuard<'_, ()>> {
        if self.thread_safe {
            // The mutex guards no data, so a poisoned lock is as good as a healthy one.
            Some(self.lock.lock().unwrap_or_else(|err| err.into_inner()))
        } else {
            None
        }
    }
}
