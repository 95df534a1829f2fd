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

//! # General logwire Documentation
//!
//! ## Introduction
//!
//! General (i.e. not documenting a particular struct or a method) documentation goes here.
//!
//! ## From Packets to the Wire
//!
//! Everything [logwire](crate) delivers is a [Packet]: a log entry, a watch (a named value the
//! console tracks over time), a process-flow marker (entering or leaving a method, thread or
//! process), a control command (clearing one of the console's panels), or a log header
//! announcing the application & host. Each packet carries a [Level]; every destination drops
//! packets below its configured level.
//!
//! [Packet]: crate::packet::Packet
//! [Level]: crate::level::Level
//!
//! Delivery happens in three steps:
//!
//! 1. the [Engine] hands the packet to each of its [Protocol]s
//! 2. the [Protocol] decides whether & when the packet goes out (level filter, backlog,
//!    reconnection, asynchronous queueing)
//! 3. the protocol's [Transport] formats the packet & writes it to the destination
//!
//! [Engine]: crate::engine::Engine
//! [Protocol]: crate::protocol::Protocol
//! [Transport]: crate::transport::Transport
//!
//! ### The Wire Format
//!
//! The [BinaryFormatter] writes each packet as a six-byte header (a little-endian `u16` packet
//! type followed by a little-endian `u32` payload length) and then the payload. All integers in
//! the payload are little-endian; strings are UTF-8, prefixed by their length in a fixed header;
//! timestamps are OLE automation dates (days since 1899-12-30, as an `f64`) at microsecond
//! resolution; colors are packed as `r | g << 8 | b << 16 | a << 24`.
//!
//! [BinaryFormatter]: crate::binary::BinaryFormatter
//!
//! Binary log files start with the four bytes `SILF`; text log files start with a UTF-8
//! byte-order mark.
//!
//! ### Configuring Destinations
//!
//! Destinations are named in a connections string:
//!
//! ```text
//! tcp(host=console.local,reconnect=true,reconnect.interval=10s),
//! file(filename="logs/app.sil",rotate=daily,async.enabled=true)
//! ```
//!
//! Every protocol understands `level`, `caption`, `reconnect`, `reconnect.interval`,
//! `backlog.enabled`, `backlog.queue`, `backlog.flushon`, `backlog.keepopen`, `async.enabled`,
//! `async.queue`, `async.throttle` & `async.clearondisconnect`; the drivers add their own (see
//! [transport](crate::transport)). Sizes are in kilobytes unless suffixed with `kb`, `mb` or `gb`;
//! time spans are in seconds unless suffixed with `ms`, `s`, `m`, `h` or `d`. An option a protocol
//! doesn't understand is an error.
//!
//! ### Synchronous & Asynchronous Operation
//!
//! By default a protocol does its I/O on the caller's thread, and a destination failure is
//! returned to the caller (the [Engine] hands it to its error handler). With `async.enabled` each
//! protocol gets a worker thread and a queue bounded at `async.queue` bytes: callers block when the
//! queue is full if `async.throttle` is set, and otherwise the oldest queued operations are
//! discarded. The worker runs from `connect` until `disconnect` (or `Engine::disable`), which waits
//! for it to work off its queue. Destination failures on the worker thread go to the error
//! handler.
//!
//! ## How This Process Plugs-In to the Tracing Framework
//!
//! The [Layer] implements [tracing_subscriber::layer::Layer], so it can be "stacked" on top of
//! other layers in your tracing [Subscriber]. When it receives an [Event] it hands it to its
//! "tracing formatter" to get a [Packet], which it gives to its [Engine]. [Span] entry & exit can
//! be reported as process-flow packets, too.
//!
//! [Layer]: crate::layer::Layer
//! [Subscriber]: tracing::Subscriber
//! [Event]: tracing::Event
//! [Span]: tracing::Span
