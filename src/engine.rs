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

//! The delivery engine.
//!
//! An [`Engine`] owns the set of [`Protocol`]s named by a connections string and forwards every
//! packet it's handed to each of them. There is no global instance: construct one with
//! [`Engine::builder`], share it (in an [`Arc`]) with whatever produces packets (e.g. the
//! [`Layer`](crate::layer::Layer)), and drop it when you're done; dropping disconnects every
//! destination, draining any asynchronous queues first.
//!
//! # Examples
//!
//! ```rust
//! use logwire::{engine::Engine, level::Level};
//! let engine = Engine::builder()
//!     .app_name("doctest")
//!     .connections("mem(maxsize=64)")
//!     .build()
//!     .unwrap();
//! engine.enable();
//! engine.log(Level::Message, "main", "Hello, world!");
//! ```

use crate::{
    connections::parse_connections,
    error::{Error, Result},
    host::{default_app_name, default_host_name},
    level::Level,
    packet::{
        ControlCommand, LogEntry, LogEntryType, Packet, PacketKind, ProcessFlow, ViewerId, Watch,
    },
    protocol::{ErrorHandler, Protocol, ProtocolCommand},
};

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, RwLock, RwLockReadGuard,
};

/// Forwards packets to every configured destination
pub struct Engine {
    app_name: String,
    host_name: String,
    connections: RwLock<String>,
    protocols: RwLock<Vec<Protocol>>,
    enabled: AtomicBool,
    on_error: Option<ErrorHandler>,
}

/// Builder for [`Engine`]
pub struct EngineBuilder {
    app_name: Option<String>,
    host_name: Option<String>,
    connections: String,
    on_error: Option<ErrorHandler>,
}

impl EngineBuilder {
    /// Application name stamped on packets & log headers (defaults to the executable's name)
    pub fn app_name<S: Into<String>>(mut self, app_name: S) -> Self {
        self.app_name = Some(app_name.into());
        self
    }
    /// Host name stamped on packets & log headers (defaults to this host's name)
    pub fn host_name<S: Into<String>>(mut self, host_name: S) -> Self {
        self.host_name = Some(host_name.into());
        self
    }
    /// Destinations, e.g. `tcp(host=localhost),file(filename="app.sil",async.enabled=true)`
    pub fn connections<S: Into<String>>(mut self, connections: S) -> Self {
        self.connections = connections.into();
        self
    }
    /// Called with every destination error the engine can't return to a caller
    pub fn error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(handler));
        self
    }
    /// Parse the connections & build the engine (disabled; call [`Engine::enable`])
    pub fn build(self) -> Result<Engine> {
        let engine = Engine {
            app_name: self.app_name.unwrap_or_else(default_app_name),
            host_name: self.host_name.unwrap_or_else(default_host_name),
            connections: RwLock::new(String::new()),
            protocols: RwLock::new(Vec::new()),
            enabled: AtomicBool::new(false),
            on_error: self.on_error,
        };
        engine.set_connections(&self.connections)?;
        Ok(engine)
    }
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder {
            app_name: None,
            host_name: None,
            connections: String::new(),
            on_error: None,
        }
    }
    pub fn app_name(&self) -> &str {
        &self.app_name
    }
    pub fn host_name(&self) -> &str {
        &self.host_name
    }
    /// The connections string currently in effect
    pub fn connections(&self) -> String {
        self.connections
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .clone()
    }
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn protocols(&self) -> RwLockReadGuard<'_, Vec<Protocol>> {
        self.protocols.read().unwrap_or_else(|err| err.into_inner())
    }

    fn report(&self, err: &Error) {
        tracing::warn!(target: "logwire::engine", "{}", err);
        if let Some(handler) = &self.on_error {
            handler(err);
        }
    }

    /// Replace the current destinations with those named in `connections`.
    ///
    /// Either every entry parses & validates, or nothing changes. The old destinations are
    /// disconnected; if the engine is enabled, the new ones are connected.
    pub fn set_connections(&self, connections: &str) -> Result<()> {
        let mut protocols = Vec::new();
        parse_connections(connections, |name, options| {
            let protocol = Protocol::with_context(
                crate::transport::create(name)?,
                options,
                &self.app_name,
                &self.host_name,
            )?;
            if let Some(handler) = &self.on_error {
                protocol.set_error_handler(handler.clone());
            }
            protocols.push(protocol);
            Ok(())
        })?;
        tracing::debug!(target: "logwire::engine", "{} destination(s) configured", protocols.len());

        if self.is_enabled() {
            for protocol in &protocols {
                if let Err(err) = protocol.connect() {
                    self.report(&err);
                }
            }
        }
        let old = std::mem::replace(
            &mut *self.protocols.write().unwrap_or_else(|err| err.into_inner()),
            protocols,
        );
        *self.connections.write().unwrap_or_else(|err| err.into_inner()) = connections.to_string();
        // Dropping the old protocols disconnects them (after draining any async queues).
        drop(old);
        Ok(())
    }

    /// Connect every destination & start forwarding packets
    pub fn enable(&self) {
        if self.enabled.swap(true, Ordering::SeqCst) {
            return;
        }
        for protocol in self.protocols().iter() {
            if let Err(err) = protocol.connect() {
                self.report(&err);
            }
        }
    }
    /// Stop forwarding packets & disconnect every destination, waiting for asynchronous queues to
    /// drain
    pub fn disable(&self) {
        if !self.enabled.swap(false, Ordering::SeqCst) {
            return;
        }
        for protocol in self.protocols().iter() {
            if let Err(err) = protocol.disconnect() {
                self.report(&err);
            }
        }
    }

    /// Forward `packet` to every destination.
    ///
    /// When any destination is asynchronous the packet is marked thread-safe, so that its
    /// writes on the various worker threads serialize.
    pub fn send_packet(&self, mut packet: Packet) {
        if !self.is_enabled() {
            return;
        }
        let protocols = self.protocols();
        if protocols.is_empty() {
            return;
        }
        self.stamp(packet.kind_mut());
        let any_async = protocols.iter().any(|p| p.is_async());
        let packet = packet.with_thread_safe(any_async).into_shared();
        for protocol in protocols.iter() {
            if let Err(err) = protocol.write_packet(packet.clone()) {
                self.report(&err);
            }
        }
    }

    /// Fill in the application & host names where the producer left them blank
    fn stamp(&self, kind: &mut PacketKind) {
        match kind {
            PacketKind::LogEntry(entry) => {
                if entry.app_name.is_empty() {
                    entry.app_name = self.app_name.clone();
                }
                if entry.host_name.is_empty() {
                    entry.host_name = self.host_name.clone();
                }
            }
            PacketKind::ProcessFlow(flow) => {
                if flow.host_name.is_empty() {
                    flow.host_name = self.host_name.clone();
                }
            }
            _ => (),
        }
    }

    pub fn send_log_entry(&self, level: Level, entry: LogEntry) {
        self.send_packet(Packet::log_entry(level, entry))
    }
    pub fn send_watch(&self, level: Level, watch: Watch) {
        self.send_packet(Packet::watch(level, watch))
    }
    pub fn send_process_flow(&self, level: Level, flow: ProcessFlow) {
        self.send_packet(Packet::process_flow(level, flow))
    }
    pub fn send_control_command(&self, command: ControlCommand) {
        self.send_packet(Packet::control_command(command))
    }

    /// Send a plain message titled `title` in session `session`
    pub fn log(&self, level: Level, session: &str, title: &str) {
        let mut entry = LogEntry::new(LogEntryType::for_level(level), ViewerId::Title);
        entry.session_name = session.to_string();
        entry.title = title.to_string();
        self.send_log_entry(level, entry)
    }

    /// Hand `command` to the destination whose caption is `caption`; returns false if there is
    /// no such destination.
    pub fn dispatch(&self, caption: &str, command: ProtocolCommand) -> bool {
        let protocols = self.protocols();
        match protocols.iter().find(|p| p.caption() == caption) {
            Some(protocol) => {
                if let Err(err) = protocol.dispatch(command) {
                    self.report(&err);
                }
                true
            }
            None => false,
        }
    }
}

impl std::ops::Drop for Engine {
    fn drop(&mut self) {
        self.disable();
    }
}
