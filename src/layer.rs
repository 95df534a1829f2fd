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

//! [logwire](crate) [`Layer`] implementation.
//!
//! [`Layer`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/layer/trait.Layer.html
//!
//! The [`Layer`] turns [`tracing`] notifications into packets (by way of a [`TracingFormatter`])
//! and hands them to an [`Engine`], which forwards them to its destinations. Consumers are free
//! to implement [`TracingFormatter`] for themselves & build a [`Layer`] around it with
//! [`Layer::with_formatter`].
//!
//! Events whose target is `logwire` (or lies beneath it) are this crate's own diagnostics and are
//! never forwarded.

use crate::{
    engine::Engine,
    tracing::{DefaultTracingFormatter, TracingFormatter},
};

use tracing::Event;
use tracing_subscriber::layer::Context;

use std::sync::Arc;

// When the tracing-log feature is enabled, use NormalizeEvent to recover the metadata of events
// that originated from the `log` crate, the way tracing-subscriber's fmt layer does.
#[cfg(feature = "tracing-log")]
use tracing_log::NormalizeEvent;

/// Whether `target` names one of this crate's own diagnostics
fn is_internal(target: &str) -> bool {
    target == "logwire" || target.starts_with("logwire::")
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          struct Layer                                          //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A [`tracing-subscriber`]-compliant [`Layer`] implementation that will send [`Event`]s &
/// [`Span`]s to every destination of an [`Engine`].
///
/// [`tracing-subscriber`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/index.html
/// [`Layer`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/layer/trait.Layer.html
/// [`Span`]: https://docs.rs/tracing/0.1.35/tracing/struct.Span.html
/// [`Event`]: https://docs.rs/tracing/0.1.35/tracing/struct.Event.html
pub struct Layer<S, F: TracingFormatter<S>>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    engine: Arc<Engine>,
    tracing_formatter: F,
    // The Subscriber implementation type is only needed to transmit it to the TracingFormatter
    // trait.
    subscriber_type: std::marker::PhantomData<S>,
}

impl<S> Layer<S, DefaultTracingFormatter>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    /// Construct a [`Layer`] that sends every event to `engine` as a log entry
    pub fn new(engine: Arc<Engine>) -> Self {
        Layer::with_formatter(engine, DefaultTracingFormatter::default())
    }
}

impl<S, F: TracingFormatter<S>> Layer<S, F>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    /// Construct a [`Layer`] that maps [`tracing`] entities to packets by `tracing_formatter`
    pub fn with_formatter(engine: Arc<Engine>, tracing_formatter: F) -> Self {
        Layer {
            engine,
            tracing_formatter,
            subscriber_type: std::marker::PhantomData,
        }
    }
    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    fn send(&self, res: std::result::Result<Option<crate::packet::Packet>, F::Error>) {
        match res {
            Ok(Some(packet)) => self.engine.send_packet(packet),
            Ok(None) => (),
            Err(err) => tracing::error!(target: "logwire::layer", "while formatting: {}", err),
        }
    }
}

impl<S, F> tracing_subscriber::layer::Layer<S> for Layer<S, F>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    F: TracingFormatter<S> + 'static,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        if !self.engine.is_enabled() {
            return;
        }
        // For native tracing events, normalized_metadata() returns None and we use the event's
        // own metadata.
        #[cfg(feature = "tracing-log")]
        let normalized_meta = event.normalized_metadata();
        #[cfg(feature = "tracing-log")]
        let meta = normalized_meta.as_ref().unwrap_or_else(|| event.metadata());
        #[cfg(not(feature = "tracing-log"))]
        let meta = event.metadata();

        if is_internal(meta.target()) {
            return;
        }
        self.send(self.tracing_formatter.on_event(event, meta, ctx));
    }
    fn on_enter(&self, id: &tracing_core::span::Id, ctx: Context<'_, S>) {
        if self.engine.is_enabled() {
            self.send(self.tracing_formatter.on_enter(id, ctx));
        }
    }
    fn on_exit(&self, id: &tracing_core::span::Id, ctx: Context<'_, S>) {
        if self.engine.is_enabled() {
            self.send(self.tracing_formatter.on_exit(id, ctx));
        }
    }
}

#[cfg(test)]
mod smoke {
    use super::*;
    use crate::{
        binary::decode,
        packet::PacketType,
        protocol::{ProtocolCommand, SharedWriter},
    };
    use std::{io::Write, sync::Mutex};
    use tracing_subscriber::layer::SubscriberExt;

    #[derive(Clone, Default)]
    struct Sink(Arc<Mutex<Vec<u8>>>);

    impl Write for Sink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn dump(engine: &Engine) -> Vec<u8> {
        let sink = Sink::default();
        let writer: Arc<SharedWriter> = Arc::new(Mutex::new(Box::new(sink.clone())));
        assert!(engine.dispatch("mem", ProtocolCommand::with_writer(0, writer)));
        let bytes = sink.0.lock().unwrap().clone();
        bytes
    }

    #[test]
    fn events() {
        assert!(is_internal("logwire::protocol"));
        assert!(!is_internal("logwire_app"));

        let engine = Arc::new(
            Engine::builder()
                .app_name("layer-test")
                .connections("mem(astext=true,pattern=\"%level%|%session%|%title%\")")
                .build()
                .unwrap(),
        );
        engine.enable();
        let subscriber = tracing_subscriber::registry().with(Layer::new(engine.clone()));
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "app", answer = 42, "Hello, world!");
            tracing::warn!(target: "app::db", "slow query");
            tracing::debug!(target: "logwire::protocol", "never forwarded");
        });

        let bytes = dump(&engine);
        assert_eq!(
            std::str::from_utf8(&bytes[3..]).unwrap(),
            "Message|app|Hello, world! answer=42\r\nWarning|app::db|slow query\r\n"
        );
    }

    #[test]
    fn spans() {
        let engine = Arc::new(Engine::builder().connections("mem()").build().unwrap());
        engine.enable();
        let layer = Layer::with_formatter(
            engine.clone(),
            DefaultTracingFormatter::default().with_spans(true),
        );
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!(target: "app", "work");
            span.in_scope(|| tracing::info!(target: "app", "inside"));
        });

        let bytes = dump(&engine);
        let frames = decode::frames(&bytes[4..]);
        let types: Vec<u16> = frames.iter().map(|f| f.packet_type).collect();
        assert_eq!(
            types,
            vec![
                PacketType::ProcessFlow as u16,
                PacketType::LogEntry as u16,
                PacketType::ProcessFlow as u16
            ]
        );
        let (flow_type, title, host, ..) = decode::process_flow(&frames[0].payload);
        assert_eq!(flow_type, crate::packet::ProcessFlowType::EnterMethod as i32);
        assert_eq!(title, "work");
        assert_eq!(host, engine.host_name());
    }

    #[test]
    fn disabled_engine_drops_everything() {
        let engine = Arc::new(Engine::builder().connections("mem()").build().unwrap());
        let subscriber = tracing_subscriber::registry().with(Layer::new(engine.clone()));
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("dropped");
        });
        engine.enable();
        assert_eq!(dump(&engine), b"SILF".to_vec());
    }
}
