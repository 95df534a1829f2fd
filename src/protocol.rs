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

//! Connection policy for one destination.
//!
//! A [`Protocol`] wraps a [`Transport`] and decides *when* it gets used:
//!
//! - packets below the configured `level` are dropped
//! - with `backlog.enabled`, packets below `backlog.flushon` are held in a bounded
//!   [`PacketQueue`] & only sent (oldest first) once a packet at or above that level comes along;
//!   unless `backlog.keepopen` is also set, the destination is opened for the flush & closed again
//!   right after
//! - with `reconnect`, a destination that went away is re-opened on the next write (but not more
//!   often than `reconnect.interval`)
//! - with `async.enabled`, all of the above happens on a [`Scheduler`] worker thread and callers
//!   only ever wait on the scheduler's queue; the worker lives from `connect` to `disconnect`
//!
//! In synchronous mode, failures are returned to the caller. In asynchronous mode there's no
//! caller left to return them to, so they're handed to the protocol's [`ErrorHandler`] (and logged).

use crate::{
    error::{Error, Result},
    host::{default_app_name, default_host_name},
    level::Level,
    options::LookupTable,
    packet::{LogHeader, Packet},
    queue::{PacketQueue, DEFAULT_BACKLOG},
    scheduler::{CommandTarget, Scheduler, SchedulerCommand},
    transport::{self, Transport},
};

use backtrace::Backtrace;

use std::{
    any::Any,
    io::Write,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, RwLock,
    },
    time::{Duration, Instant},
};

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                        protocol commands                                       //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A writer that can travel inside a [`ProtocolCommand`]
pub type SharedWriter = Mutex<Box<dyn Write + Send>>;

/// A custom action for a destination, identified by an integer and carrying arbitrary state.
///
/// The only destination that currently acts on one is `mem`, which dumps its buffer into the
/// [`SharedWriter`] the command carries (the action code is ignored).
#[derive(Clone)]
pub struct ProtocolCommand {
    action: i32,
    state: Option<Arc<dyn Any + Send + Sync>>,
}

impl ProtocolCommand {
    pub fn new(action: i32, state: Option<Arc<dyn Any + Send + Sync>>) -> ProtocolCommand {
        ProtocolCommand { action, state }
    }
    /// A command whose state is `writer`
    pub fn with_writer(action: i32, writer: Arc<SharedWriter>) -> ProtocolCommand {
        ProtocolCommand {
            action,
            state: Some(writer as Arc<dyn Any + Send + Sync>),
        }
    }
    pub fn action(&self) -> i32 {
        self.action
    }
    pub fn state(&self) -> Option<&(dyn Any + Send + Sync)> {
        self.state.as_deref()
    }
    /// The command's state, if that's a [`SharedWriter`]
    pub fn writer(&self) -> Option<&SharedWriter> {
        self.state()?.downcast_ref::<SharedWriter>()
    }
}

impl std::fmt::Debug for ProtocolCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolCommand")
            .field("action", &self.action)
            .field("has_state", &self.state.is_some())
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                            settings                                            //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Options every protocol understands
const COMMON_OPTIONS: &[&str] = &[
    "level",
    "caption",
    "reconnect",
    "reconnect.interval",
    "backlog.enabled",
    "backlog.queue",
    "backlog.flushon",
    "backlog.keepopen",
    "async.enabled",
    "async.queue",
    "async.throttle",
    "async.clearondisconnect",
];

/// The protocol-level options, resolved
#[derive(Clone, Debug, PartialEq)]
pub struct ProtocolSettings {
    pub level: Level,
    pub caption: String,
    pub reconnect: bool,
    pub reconnect_interval: Duration,
    pub backlog_enabled: bool,
    pub backlog_queue: usize,
    pub flush_on: Level,
    pub backlog_keep_open: bool,
    pub async_enabled: bool,
    pub async_queue: usize,
    pub async_throttle: bool,
    pub async_clear_on_disconnect: bool,
}

impl ProtocolSettings {
    fn load(name: &str, options: &LookupTable) -> ProtocolSettings {
        let default_queue = DEFAULT_BACKLOG as u64;
        ProtocolSettings {
            level: options.get_level("level", Level::Debug),
            caption: options.get_string("caption", name),
            reconnect: options.get_bool("reconnect", false),
            reconnect_interval: options.get_timespan("reconnect.interval", Duration::ZERO),
            backlog_enabled: options.get_bool("backlog.enabled", false),
            backlog_queue: options.get_size("backlog.queue", default_queue) as usize,
            flush_on: options.get_level("backlog.flushon", Level::Error),
            backlog_keep_open: options.get_bool("backlog.keepopen", false),
            async_enabled: options.get_bool("async.enabled", false),
            async_queue: options.get_size("async.queue", default_queue) as usize,
            async_throttle: options.get_bool("async.throttle", true),
            async_clear_on_disconnect: options.get_bool("async.clearondisconnect", false),
        }
    }
    /// Whether the destination stays open between writes
    pub fn keep_open(&self) -> bool {
        !self.backlog_enabled || self.backlog_keep_open
    }
}

/// Callback for errors that can't be returned to anyone
pub type ErrorHandler = Arc<dyn Fn(&Error) + Send + Sync>;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          protocol core                                         //
////////////////////////////////////////////////////////////////////////////////////////////////////

struct State {
    transport: Box<dyn Transport>,
    connected: bool,
    backlog: PacketQueue,
    /// When we last tore the connection down
    disconnected_at: Option<Instant>,
}

/// Everything a protocol shares with its scheduler's worker thread.
struct Core {
    name: &'static str,
    options: String,
    settings: ProtocolSettings,
    app_name: String,
    host_name: String,
    state: Mutex<State>,
    failed: AtomicBool,
    on_error: RwLock<Option<ErrorHandler>>,
}

impl Core {
    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic in a transport leaves us no worse off than a failed write would; carry on.
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }

    fn wrap(&self, err: Error) -> Error {
        self.failed.store(true, Ordering::SeqCst);
        Error::Protocol {
            name: self.name.to_string(),
            options: self.options.clone(),
            source: Box::new(err),
            back: Backtrace::new(),
        }
    }

    fn report(&self, err: &Error) {
        tracing::warn!(target: "logwire::protocol", "{}: {}", self.settings.caption, err);
        let handler = self
            .on_error
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .clone();
        if let Some(handler) = handler {
            handler(err);
        }
    }

    /// Open the transport & announce ourselves.
    fn internal_connect(&self, state: &mut State) -> Result<()> {
        state.transport.connect()?;
        self.write_log_header(state)
    }
    fn internal_reconnect(&self, state: &mut State) -> Result<bool> {
        if state.transport.reconnect()? {
            self.write_log_header(state)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
    fn write_log_header(&self, state: &mut State) -> Result<()> {
        if state.transport.writes_log_header() {
            let header = Packet::log_header(LogHeader::new(&self.app_name, &self.host_name));
            state.transport.write_packet(&header.into_shared())?;
        }
        Ok(())
    }

    fn reset(&self, state: &mut State) -> Result<()> {
        state.connected = false;
        state.backlog.clear();
        state.disconnected_at = Some(Instant::now());
        state.transport.disconnect()
    }

    /// Try to re-open the destination, unless we tried too recently; failures are swallowed.
    fn reconnect(&self, state: &mut State) {
        if let Some(at) = state.disconnected_at {
            if at.elapsed() < self.settings.reconnect_interval {
                return;
            }
        }
        match self.internal_reconnect(state) {
            Ok(true) => {
                tracing::debug!(target: "logwire::protocol", "{}: reconnected", self.settings.caption);
                state.connected = true;
                self.failed.store(false, Ordering::SeqCst);
            }
            Ok(false) | Err(_) => {
                self.failed.store(true, Ordering::SeqCst);
                // We're already down; a failure to tear down is nothing new.
                let _ = self.reset(state);
            }
        }
    }

    /// Write one packet through the transport, connecting first if need be.
    fn forward(&self, state: &mut State, packet: &Arc<Packet>, disconnect: bool) -> Result<()> {
        if !state.connected {
            if !self.settings.keep_open() {
                self.internal_connect(state)?;
                state.connected = true;
                self.failed.store(false, Ordering::SeqCst);
            } else {
                self.reconnect(state);
            }
        }
        if state.connected {
            {
                let _guard = packet.lock();
                state.transport.write_packet(packet)?;
            }
            if disconnect {
                state.connected = false;
                state.transport.disconnect()?;
            }
        }
        Ok(())
    }

    fn flush_backlog(&self, state: &mut State) -> Result<()> {
        while let Some(packet) = state.backlog.pop() {
            self.forward(state, &packet, false)?;
        }
        Ok(())
    }

    fn internal_write(&self, state: &mut State, packet: &Arc<Packet>) -> Result<()> {
        let keep_open = self.settings.keep_open();
        if self.settings.backlog_enabled {
            if packet.level() >= self.settings.flush_on && packet.level() != Level::Control {
                self.flush_backlog(state)?;
                self.forward(state, packet, !keep_open)
            } else {
                state.backlog.push(packet.clone());
                Ok(())
            }
        } else {
            self.forward(state, packet, !keep_open)
        }
    }

    fn impl_connect(&self) -> Result<()> {
        let mut state = self.lock();
        if state.connected || !self.settings.keep_open() {
            return Ok(());
        }
        match self.internal_connect(&mut state) {
            Ok(()) => {
                tracing::debug!(target: "logwire::protocol", "{}: connected", self.settings.caption);
                state.connected = true;
                self.failed.store(false, Ordering::SeqCst);
                Ok(())
            }
            Err(err) => {
                let _ = self.reset(&mut state);
                Err(self.wrap(err))
            }
        }
    }

    fn impl_disconnect(&self) -> Result<()> {
        let mut state = self.lock();
        if state.connected {
            tracing::debug!(target: "logwire::protocol", "{}: disconnecting", self.settings.caption);
            self.reset(&mut state).map_err(|err| self.wrap(err))
        } else {
            state.backlog.clear();
            Ok(())
        }
    }

    fn impl_write_packet(&self, packet: &Arc<Packet>) -> Result<()> {
        if packet.level() < self.settings.level {
            return Ok(());
        }
        let mut state = self.lock();
        if !state.connected && !self.settings.reconnect && self.settings.keep_open() {
            return Ok(());
        }
        match self.internal_write(&mut state, packet) {
            Ok(()) => Ok(()),
            Err(err) => {
                let _ = self.reset(&mut state);
                Err(self.wrap(err))
            }
        }
    }

    fn impl_dispatch(&self, command: &ProtocolCommand) -> Result<()> {
        let mut state = self.lock();
        if state.connected {
            state
                .transport
                .dispatch(command)
                .map_err(|err| self.wrap(err))
        } else {
            Ok(())
        }
    }

    fn impl_reset(&self) -> Result<()> {
        let mut state = self.lock();
        self.reset(&mut state).map_err(|err| self.wrap(err))
    }
}

impl CommandTarget for Core {
    fn execute(&self, command: SchedulerCommand) {
        let res = match command {
            SchedulerCommand::Connect => self.impl_connect(),
            SchedulerCommand::WritePacket(packet) => self.impl_write_packet(&packet),
            SchedulerCommand::Disconnect => self.impl_disconnect(),
            SchedulerCommand::Dispatch(command) => self.impl_dispatch(&command),
        };
        if let Err(err) = res {
            self.report(&err);
        }
    }
    fn failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                         struct Protocol                                        //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// One configured destination.
///
/// All operations take `&self`; in synchronous mode they serialize on an internal lock, in
/// asynchronous mode on the scheduler's queue. An asynchronous protocol runs a worker thread only
/// while it's connected: [`connect`](Protocol::connect) starts one & [`disconnect`](Protocol::disconnect)
/// drains it & waits for it to exit.
pub struct Protocol {
    core: Arc<Core>,
    scheduler: RwLock<Option<Arc<Scheduler>>>,
}

impl Protocol {
    /// Build the protocol registered under `name`, configured by `options` (e.g.
    /// `"host=localhost,reconnect=true"`).
    pub fn create(name: &str, options: &str) -> Result<Protocol> {
        Protocol::new(transport::create(name)?, options)
    }
    /// Configure `transport` by `options`; log headers will carry the default application &
    /// host names.
    pub fn new(transport: Box<dyn Transport>, options: &str) -> Result<Protocol> {
        Protocol::with_context(transport, options, &default_app_name(), &default_host_name())
    }
    /// Configure `transport` by `options`; log headers will name `app_name` on `host_name`.
    pub fn with_context(
        mut transport: Box<dyn Transport>,
        options: &str,
        app_name: &str,
        host_name: &str,
    ) -> Result<Protocol> {
        let name = transport.name();
        let table = LookupTable::parse(options)?;
        if let Some(key) = table
            .keys()
            .find(|key| !COMMON_OPTIONS.contains(key) && !transport.is_valid_option(key))
        {
            return Err(Error::InvalidOption {
                protocol: name.to_string(),
                key: key.to_string(),
                back: Backtrace::new(),
            });
        }
        let settings = ProtocolSettings::load(name, &table);
        transport.load_options(&table);

        let core = Arc::new(Core {
            name,
            options: options.trim().to_string(),
            app_name: app_name.to_string(),
            host_name: host_name.to_string(),
            state: Mutex::new(State {
                transport,
                connected: false,
                backlog: PacketQueue::new(settings.backlog_queue),
                disconnected_at: None,
            }),
            failed: AtomicBool::new(false),
            on_error: RwLock::new(None),
            settings,
        });
        Ok(Protocol {
            core,
            scheduler: RwLock::new(None),
        })
    }

    /// The name under which the transport is registered
    pub fn name(&self) -> &str {
        self.core.name
    }
    /// This protocol's `caption` (which defaults to its name)
    pub fn caption(&self) -> &str {
        &self.core.settings.caption
    }
    /// The options string this protocol was configured with
    pub fn options(&self) -> &str {
        &self.core.options
    }
    pub fn settings(&self) -> &ProtocolSettings {
        &self.core.settings
    }
    pub fn is_async(&self) -> bool {
        self.core.settings.async_enabled
    }
    pub fn is_connected(&self) -> bool {
        self.core.lock().connected
    }
    /// Whether the last connection attempt or write failed
    pub fn is_failed(&self) -> bool {
        self.core.failed.load(Ordering::SeqCst)
    }
    /// Install the callback for errors raised on the worker thread
    pub fn set_error_handler(&self, handler: ErrorHandler) {
        *self
            .core
            .on_error
            .write()
            .unwrap_or_else(|err| err.into_inner()) = Some(handler);
    }

    /// The running scheduler, if any
    fn scheduler(&self) -> Option<Arc<Scheduler>> {
        self.scheduler
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .clone()
    }
    /// Take the running scheduler out of service (the caller stops it)
    fn take_scheduler(&self) -> Option<Arc<Scheduler>> {
        self.scheduler
            .write()
            .unwrap_or_else(|err| err.into_inner())
            .take()
    }

    fn schedule(&self, command: SchedulerCommand) {
        let accepted = match self.scheduler() {
            Some(scheduler) => scheduler.schedule(command),
            None => false,
        };
        if !accepted {
            tracing::debug!(target: "logwire::protocol", "{}: command dropped by the scheduler", self.caption());
        }
    }

    /// Open the destination (a no-op unless it's kept open between writes)
    ///
    /// In asynchronous mode this starts the worker thread (if it isn't running already) & queues
    /// the connect; failures go to the error handler.
    pub fn connect(&self) -> Result<()> {
        if !self.is_async() {
            return self.core.impl_connect();
        }
        {
            let mut slot = self.scheduler.write().unwrap_or_else(|err| err.into_inner());
            if slot.is_none() {
                let scheduler = Scheduler::new(self.core.clone())
                    .with_threshold(self.core.settings.async_queue)
                    .with_throttle(self.core.settings.async_throttle);
                scheduler.start()?;
                *slot = Some(Arc::new(scheduler));
            }
        }
        self.schedule(SchedulerCommand::Connect);
        Ok(())
    }
    /// Close the destination & discard any backlog
    ///
    /// In asynchronous mode the disconnect is queued behind any pending commands (unless
    /// `async.clearondisconnect` is set, in which case they're discarded) & the worker thread is
    /// stopped; when this returns, the queue has been worked off & the destination closed.
    pub fn disconnect(&self) -> Result<()> {
        if !self.is_async() {
            return self.core.impl_disconnect();
        }
        if let Some(scheduler) = self.take_scheduler() {
            if self.core.settings.async_clear_on_disconnect {
                scheduler.clear();
            }
            if !scheduler.schedule(SchedulerCommand::Disconnect) {
                tracing::debug!(target: "logwire::protocol", "{}: disconnect dropped by the scheduler", self.caption());
            }
            scheduler.stop();
        }
        Ok(())
    }
    pub fn write_packet(&self, packet: Arc<Packet>) -> Result<()> {
        if packet.level() < self.core.settings.level {
            return Ok(());
        }
        if self.is_async() {
            self.schedule(SchedulerCommand::WritePacket(packet));
            Ok(())
        } else {
            self.core.impl_write_packet(&packet)
        }
    }
    /// Hand `command` to the destination, if it's connected
    pub fn dispatch(&self, command: ProtocolCommand) -> Result<()> {
        if self.is_async() {
            self.schedule(SchedulerCommand::Dispatch(command));
            Ok(())
        } else {
            self.core.impl_dispatch(&command)
        }
    }
    /// Tear the destination down immediately, bypassing any scheduler
    pub fn reset(&self) -> Result<()> {
        self.core.impl_reset()
    }

    /// Stop the worker (letting it drain) & disconnect; `Drop` does this for you.
    pub fn dispose(&mut self) {
        if let Some(scheduler) = self.take_scheduler() {
            scheduler.stop();
        }
        if let Err(err) = self.core.impl_disconnect() {
            self.core.report(&err);
        }
    }
}

impl std::ops::Drop for Protocol {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Protocol")
            .field("name", &self.core.name)
            .field("options", &self.core.options)
            .field("async", &self.is_async())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::packet::{LogEntry, LogEntryType, PacketKind, ViewerId};
    use std::sync::mpsc;

    #[derive(Debug, Default)]
    struct Log {
        connects: usize,
        disconnects: usize,
        written: Vec<String>,
        dispatched: Vec<i32>,
    }

    /// A transport that records what happens to it & fails (or dawdles) on demand
    #[derive(Clone, Default)]
    struct Mock {
        log: Arc<Mutex<Log>>,
        fail_connect: Arc<AtomicBool>,
        fail_write: Arc<AtomicBool>,
        /// Sleep a little on every write
        slow: Arc<AtomicBool>,
        /// Block in `connect` while set
        hold: Arc<AtomicBool>,
    }

    impl Mock {
        fn written(&self) -> Vec<String> {
            self.log.lock().unwrap().written.clone()
        }
        fn connects(&self) -> usize {
            self.log.lock().unwrap().connects
        }
        fn disconnects(&self) -> usize {
            self.log.lock().unwrap().disconnects
        }
    }

    fn refused() -> Error {
        std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused").into()
    }

    impl Transport for Mock {
        fn name(&self) -> &'static str {
            "mock"
        }
        fn is_valid_option(&self, key: &str) -> bool {
            key == "color"
        }
        fn load_options(&mut self, _options: &LookupTable) {}
        fn connect(&mut self) -> Result<()> {
            self.log.lock().unwrap().connects += 1;
            while self.hold.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(1));
            }
            if self.fail_connect.load(Ordering::SeqCst) {
                Err(refused())
            } else {
                Ok(())
            }
        }
        fn write_packet(&mut self, packet: &Arc<Packet>) -> Result<()> {
            if self.fail_write.load(Ordering::SeqCst) {
                return Err(refused());
            }
            if self.slow.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(50));
            }
            let label = match packet.kind() {
                PacketKind::LogEntry(entry) => entry.title.clone(),
                PacketKind::LogHeader(_) => "<header>".to_string(),
                other => packet_type_of(other).to_string(),
            };
            self.log.lock().unwrap().written.push(label);
            Ok(())
        }
        fn disconnect(&mut self) -> Result<()> {
            self.log.lock().unwrap().disconnects += 1;
            Ok(())
        }
        fn dispatch(&mut self, command: &ProtocolCommand) -> Result<()> {
            self.log.lock().unwrap().dispatched.push(command.action());
            Ok(())
        }
    }

    fn packet_type_of(kind: &PacketKind) -> &'static str {
        match kind {
            PacketKind::Watch(_) => "watch",
            PacketKind::ProcessFlow(_) => "flow",
            PacketKind::ControlCommand(_) => "control",
            _ => "other",
        }
    }

    fn entry(level: Level, title: &str) -> Arc<Packet> {
        let mut entry = LogEntry::new(LogEntryType::for_level(level), ViewerId::Title);
        entry.title = title.to_string();
        Packet::log_entry(level, entry).into_shared()
    }

    fn long_entry(level: Level, tag: &str) -> Arc<Packet> {
        entry(level, &format!("{}{}", tag, "x".repeat(600)))
    }

    /// Wait for the worker to get stuck in `connect`, then let it go after a little while.
    fn release_later(mock: &Mock) -> std::thread::JoinHandle<()> {
        while mock.connects() == 0 {
            std::thread::sleep(Duration::from_millis(1));
        }
        let hold = mock.hold.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            hold.store(false, Ordering::SeqCst);
        })
    }

    fn protocol(mock: &Mock, options: &str) -> Protocol {
        Protocol::with_context(Box::new(mock.clone()), options, "app", "host").unwrap()
    }

    #[test]
    fn options() {
        let mock = Mock::default();
        let proto = protocol(&mock, "level=warning,color=red,caption=\"my mock\"");
        assert_eq!(proto.settings().level, Level::Warning);
        assert_eq!(proto.caption(), "my mock");
        assert_eq!(proto.name(), "mock");
        assert!(proto.settings().keep_open());

        let err = Protocol::with_context(Box::new(mock.clone()), "port=1", "app", "host")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidOption { ref key, .. } if key == "port"));
        let err = Protocol::with_context(Box::new(mock), "level", "app", "host").unwrap_err();
        assert!(matches!(err, Error::ConfigurationSyntax { .. }));
        assert!(matches!(
            Protocol::create("smoke-signals", ""),
            Err(Error::UnknownProtocol { .. })
        ));
    }

    #[test]
    fn connect_writes_header_and_filters_levels() {
        let mock = Mock::default();
        let proto = protocol(&mock, "level=message");
        proto.connect().unwrap();
        assert!(proto.is_connected());
        proto.write_packet(entry(Level::Debug, "quiet")).unwrap();
        proto.write_packet(entry(Level::Message, "loud")).unwrap();
        proto.disconnect().unwrap();
        proto.disconnect().unwrap();
        assert_eq!(mock.written(), vec!["<header>", "loud"]);
        assert_eq!(mock.connects(), 1);
        assert_eq!(mock.disconnects(), 1);
    }

    #[test]
    fn writes_before_connect_are_skipped() {
        let mock = Mock::default();
        let proto = protocol(&mock, "");
        proto.write_packet(entry(Level::Error, "nobody home")).unwrap();
        assert!(mock.written().is_empty());
        assert_eq!(mock.connects(), 0);
    }

    #[test]
    fn backlog_flushes_on_error() {
        let mock = Mock::default();
        let proto = protocol(&mock, "backlog.enabled=true,backlog.flushon=error");
        assert!(!proto.settings().keep_open());
        // connect is a no-op when the destination isn't kept open
        proto.connect().unwrap();
        assert_eq!(mock.connects(), 0);

        proto.write_packet(entry(Level::Message, "one")).unwrap();
        proto.write_packet(entry(Level::Warning, "two")).unwrap();
        assert!(mock.written().is_empty());

        proto.write_packet(entry(Level::Error, "boom")).unwrap();
        assert_eq!(mock.written(), vec!["<header>", "one", "two", "boom"]);
        assert_eq!(mock.connects(), 1);
        assert_eq!(mock.disconnects(), 1);
        assert!(!proto.is_connected());

        // The backlog starts over
        proto.write_packet(entry(Level::Fatal, "again")).unwrap();
        assert_eq!(mock.written().len(), 6);
        assert_eq!(mock.connects(), 2);
    }

    #[test]
    fn backlog_discarded_on_disconnect() {
        let mock = Mock::default();
        let proto = protocol(&mock, "backlog.enabled=true,backlog.keepopen=true");
        proto.connect().unwrap();
        proto.write_packet(entry(Level::Message, "held")).unwrap();
        proto.disconnect().unwrap();
        proto.connect().unwrap();
        proto.write_packet(entry(Level::Error, "flush")).unwrap();
        assert_eq!(mock.written(), vec!["<header>", "<header>", "flush"]);
    }

    #[test]
    fn write_failure_resets_and_surfaces() {
        let mock = Mock::default();
        let proto = protocol(&mock, "");
        proto.connect().unwrap();
        mock.fail_write.store(true, Ordering::SeqCst);
        let err = proto.write_packet(entry(Level::Message, "x")).unwrap_err();
        assert!(matches!(err, Error::Protocol { ref name, .. } if name == "mock"));
        assert!(!proto.is_connected());
        assert!(proto.is_failed());
        assert_eq!(mock.disconnects(), 1);
    }

    #[test]
    fn reconnect_throttled_by_interval() {
        let mock = Mock::default();
        let proto = protocol(&mock, "reconnect=true,reconnect.interval=5s");
        mock.fail_connect.store(true, Ordering::SeqCst);
        assert!(proto.connect().is_err());
        assert!(proto.is_failed());
        assert_eq!(mock.connects(), 1);

        // The destination comes back, but we tried less than five seconds ago
        mock.fail_connect.store(false, Ordering::SeqCst);
        proto.write_packet(entry(Level::Message, "a")).unwrap();
        std::thread::sleep(Duration::from_millis(1000));
        proto.write_packet(entry(Level::Message, "b")).unwrap();
        assert_eq!(mock.connects(), 1);
        assert!(mock.written().is_empty());
    }

    #[test]
    fn reconnect_without_interval() {
        let mock = Mock::default();
        let proto = protocol(&mock, "reconnect=true");
        mock.fail_connect.store(true, Ordering::SeqCst);
        assert!(proto.connect().is_err());

        // Still down: the attempt is swallowed
        proto.write_packet(entry(Level::Message, "lost")).unwrap();
        assert_eq!(mock.connects(), 2);
        assert!(proto.is_failed());

        mock.fail_connect.store(false, Ordering::SeqCst);
        proto.write_packet(entry(Level::Message, "found")).unwrap();
        assert_eq!(mock.connects(), 3);
        assert!(!proto.is_failed());
        assert_eq!(mock.written(), vec!["<header>", "found"]);
    }

    #[test]
    fn dispatch_only_when_connected() {
        let mock = Mock::default();
        let proto = protocol(&mock, "");
        proto.dispatch(ProtocolCommand::new(1, None)).unwrap();
        proto.connect().unwrap();
        proto.dispatch(ProtocolCommand::new(2, None)).unwrap();
        assert_eq!(mock.log.lock().unwrap().dispatched, vec![2]);
    }

    #[test]
    fn async_preserves_order() {
        let mock = Mock::default();
        let mut proto = protocol(&mock, "async.enabled=true");
        assert!(proto.is_async());
        proto.connect().unwrap();
        for i in 0..100 {
            proto.write_packet(entry(Level::Message, &i.to_string())).unwrap();
        }
        proto.dispose();
        let written = mock.written();
        assert_eq!(written.len(), 101);
        assert_eq!(written[0], "<header>");
        for (i, title) in written[1..].iter().enumerate() {
            assert_eq!(title, &i.to_string());
        }
        assert_eq!(mock.disconnects(), 1);
    }

    #[test]
    fn async_errors_go_to_handler() {
        let mock = Mock::default();
        mock.fail_connect.store(true, Ordering::SeqCst);
        let proto = protocol(&mock, "async.enabled=true");
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        proto.set_error_handler(Arc::new(move |err: &Error| {
            let _ = tx.lock().unwrap().send(err.to_string());
        }));
        // Returns immediately, error or no
        proto.connect().unwrap();
        let message = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(message.starts_with("mock protocol"), "{}", message);
    }

    #[test]
    fn thread_safe_packets_are_locked_during_write() {
        let mock = Mock::default();
        let proto = protocol(&mock, "");
        proto.connect().unwrap();
        let packet = entry(Level::Message, "shared");
        let packet = Arc::new(
            Arc::try_unwrap(packet)
                .unwrap()
                .with_thread_safe(true),
        );
        proto.write_packet(packet.clone()).unwrap();
        // The lock was released after the write
        assert!(packet.lock().is_some());
    }

    #[test]
    fn reset_discards_backlog_and_restarts_interval() {
        let mock = Mock::default();
        let proto = protocol(&mock, "backlog.enabled=true,backlog.keepopen=true,reconnect=true");
        proto.connect().unwrap();
        proto.write_packet(entry(Level::Message, "held")).unwrap();
        proto.reset().unwrap();
        assert!(!proto.is_connected());
        assert_eq!(mock.disconnects(), 1);
        // The next flush reconnects, but "held" is gone
        proto.write_packet(entry(Level::Error, "flush")).unwrap();
        assert_eq!(mock.written(), vec!["<header>", "<header>", "flush"]);
        assert_eq!(mock.connects(), 2);

        let mock = Mock::default();
        let proto = protocol(&mock, "reconnect=true,reconnect.interval=5s");
        proto.connect().unwrap();
        proto.reset().unwrap();
        proto.write_packet(entry(Level::Message, "too soon")).unwrap();
        assert_eq!(mock.connects(), 1);
        assert_eq!(mock.written(), vec!["<header>"]);
    }

    #[test]
    fn backlog_queue_keeps_the_newest() {
        let mock = Mock::default();
        let proto = protocol(&mock, "backlog.enabled=true,backlog.queue=1");
        assert_eq!(proto.settings().backlog_queue, 1024);
        for tag in ["a", "b", "c"] {
            proto.write_packet(long_entry(Level::Message, tag)).unwrap();
        }
        assert!(mock.written().is_empty());
        proto.write_packet(entry(Level::Error, "boom")).unwrap();
        let written = mock.written();
        assert_eq!(written.len(), 3);
        assert_eq!(written[0], "<header>");
        assert!(written[1].starts_with('c'));
        assert_eq!(written[2], "boom");
    }

    #[test]
    fn async_disconnect_drains_and_stops() {
        let mock = Mock::default();
        mock.slow.store(true, Ordering::SeqCst);
        let proto = protocol(&mock, "async.enabled=true");
        // Nothing runs until we connect
        proto.write_packet(entry(Level::Message, "early")).unwrap();
        assert!(proto.scheduler().is_none());

        proto.connect().unwrap();
        for i in 0..5 {
            proto.write_packet(entry(Level::Message, &i.to_string())).unwrap();
        }
        proto.disconnect().unwrap();
        assert_eq!(mock.written(), vec!["<header>", "0", "1", "2", "3", "4"]);
        assert_eq!(mock.disconnects(), 1);
        assert!(!proto.is_connected());
        assert!(proto.scheduler().is_none());

        // Writes after the disconnect go nowhere; a new connect starts a new worker
        proto.write_packet(entry(Level::Message, "late")).unwrap();
        proto.connect().unwrap();
        proto.write_packet(entry(Level::Message, "again")).unwrap();
        proto.disconnect().unwrap();
        assert_eq!(mock.connects(), 2);
        assert_eq!(mock.disconnects(), 2);
        assert_eq!(mock.written()[6..], ["<header>", "again"]);
    }

    #[test]
    fn async_clear_on_disconnect() {
        let mock = Mock::default();
        mock.hold.store(true, Ordering::SeqCst);
        let proto = protocol(&mock, "async.enabled=true,async.clearondisconnect=true");
        proto.connect().unwrap();
        let releaser = release_later(&mock);
        for i in 0..3 {
            proto.write_packet(entry(Level::Message, &i.to_string())).unwrap();
        }
        proto.disconnect().unwrap();
        releaser.join().unwrap();
        assert_eq!(mock.written(), vec!["<header>"]);
        assert_eq!(mock.disconnects(), 1);
    }

    #[test]
    fn async_queue_options_reach_the_scheduler() {
        let mock = Mock::default();
        let proto = protocol(&mock, "async.enabled=true");
        proto.connect().unwrap();
        let scheduler = proto.scheduler().unwrap();
        assert_eq!(scheduler.threshold(), DEFAULT_BACKLOG);
        assert!(scheduler.is_throttled());
        drop(scheduler);
        proto.disconnect().unwrap();

        let mock = Mock::default();
        mock.hold.store(true, Ordering::SeqCst);
        let proto = protocol(&mock, "async.enabled=true,async.queue=1,async.throttle=false");
        proto.connect().unwrap();
        let scheduler = proto.scheduler().unwrap();
        assert_eq!(scheduler.threshold(), 1024);
        assert!(!scheduler.is_throttled());
        drop(scheduler);

        // The worker's stuck connecting, so only the newest write fits in the queue
        let releaser = release_later(&mock);
        for tag in ["a", "b", "c", "d"] {
            proto.write_packet(long_entry(Level::Message, tag)).unwrap();
        }
        proto.disconnect().unwrap();
        releaser.join().unwrap();
        let written = mock.written();
        assert_eq!(written.len(), 2);
        assert_eq!(written[0], "<header>");
        assert!(written[1].starts_with('d'));
    }
}
