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

//! A logging-telemetry client that delivers structured packets to a remote viewer
//!
//! # Introduction
//!
//! [logwire](crate) sends log entries, variable watches, process-flow markers & control commands
//! to one or more destinations (a console listening on TCP, a console on this host over a local
//! channel, a log file, or an in-memory buffer) in a compact binary format a viewer understands.
//! Delivery is ordered per destination, and can be made asynchronous so that the application
//! never waits on a slow or absent console.
//!
//! The [`tracing`] crate provides the producer side: a [`Layer`] turns [`tracing`] [`Event`]s
//! (and optionally [`Span`] transitions) into packets, so an application instrumented with
//! [`tracing`] needs no further changes.
//!
//! [`tracing`]: https://docs.rs/tracing/latest/tracing/index.html
//! [`Layer`]: crate::layer::Layer
//! [`Event`]: https://docs.rs/tracing/0.1.35/tracing/struct.Event.html
//! [`Span`]: https://docs.rs/tracing/0.1.35/tracing/struct.Span.html
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use tracing::info;
//! use logwire::{engine::Engine, layer::Layer};
//! use tracing_subscriber::registry::Registry;
//! use tracing_subscriber::layer::SubscriberExt; // Needed to get `with()`
//!
//! let engine = Arc::new(
//!     Engine::builder()
//!         .app_name("my-app")
//!         .connections("tcp(host=localhost,reconnect=true,async.enabled=true)")
//!         .build()
//!         .unwrap(),
//! );
//! engine.enable();
//! let subscriber = Registry::default().with(Layer::new(engine.clone()));
//! tracing::subscriber::set_global_default(subscriber).unwrap();
//!
//! info!("Hello, world!");
//! ```
//!
//! Packets can also be sent without going through [`tracing`]:
//!
//! ```rust
//! use logwire::{
//!     engine::Engine,
//!     level::Level,
//!     packet::{Watch, WatchType},
//! };
//!
//! let engine = Engine::builder().connections("mem()").build().unwrap();
//! engine.enable();
//! engine.send_watch(Level::Debug, Watch::new("queue depth", "17", WatchType::Integer));
//! ```
//!
//! See [the general documentation](crate::_docs) for more.

pub mod _docs;
pub mod binary;
pub mod connections;
pub mod engine;
pub mod error;
pub mod formatter;
pub mod host;
pub mod layer;
pub mod level;
pub mod options;
pub mod packet;
pub mod protocol;
pub mod queue;
pub mod rotation;
pub mod scheduler;
pub mod text;
pub mod tracing;
pub mod transport;
