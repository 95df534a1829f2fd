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

//! Primitives for mapping [`tracing`] entities to packets.
//!
//! [`TracingFormatter`] implementations decide which [`Event`]s & [`Span`] transitions become
//! packets, and what those packets say. This module provides one implementation,
//! [`DefaultTracingFormatter`], which turns each event into a [`LogEntry`] titled by its
//! "message" field (followed by any other fields as `name=value` pairs), and can optionally
//! report span entry & exit as [`ProcessFlow`] packets.
//!
//! [`Event`]: https://docs.rs/tracing/0.1.35/tracing/struct.Event.html
//! [`Span`]: https://docs.rs/tracing/0.1.35/tracing/struct.Span.html

use crate::{
    level::{default_level_mapping, Level},
    packet::{LogEntry, LogEntryType, Packet, ProcessFlow, ProcessFlowType, ViewerId},
};

use backtrace::Backtrace;

type StdResult<T, E> = std::result::Result<T, E>;

/// Map [`tracing`] [`Span`]s & [`Event`]s to [`Packet`]s.
///
/// [`tracing`]: https://docs.rs/tracing/latest/tracing/index.html
/// [`Span`]: https://docs.rs/tracing/0.1.35/tracing/struct.Span.html
/// [`Event`]: https://docs.rs/tracing/0.1.35/tracing/struct.Event.html
///
/// Each method is invoked upon the corresponding [`tracing`] notification & indicates whether
/// it shall produce a packet, and if so, which. Application & host names may be left blank; the
/// [`Engine`](crate::engine::Engine) fills them in.
pub trait TracingFormatter<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    type Error: std::error::Error + Send + Sync + 'static;
    /// An event has occurred; `meta` is its metadata (normalized, for events from the `log`
    /// crate).
    fn on_event(
        &self,
        event: &tracing::Event,
        meta: &tracing::Metadata,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) -> StdResult<Option<Packet>, Self::Error>;
    /// A span with the given ID was entered
    fn on_enter(
        &self,
        _id: &tracing_core::span::Id,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) -> StdResult<Option<Packet>, Self::Error> {
        Ok(Option::None)
    }
    /// A span with the given ID was exited
    fn on_exit(
        &self,
        _id: &tracing_core::span::Id,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) -> StdResult<Option<Packet>, Self::Error> {
        Ok(Option::None)
    }
}

#[non_exhaustive]
pub enum Error {
    /// The event had neither a message nor any other field to make a title from
    NoMessageField { name: &'static str, back: Backtrace },
}

impl std::fmt::Display for Error {
    // `Error` is non-exhaustive so that adding variants won't be a breaking change to our
    // callers. That means the compiler won't catch us if we miss a variant here, so we
    // always include a `_` arm.
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::NoMessageField { name, .. } => {
                write!(f, "No message field found in event {}", name)
            }
            _ => write!(f, "tracing formatter error"),
        }
    }
}

impl std::fmt::Debug for Error {
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::NoMessageField { back, .. } => write!(f, "{}\n{:#?}", self, back),
            _ => write!(f, "{}", self),
        }
    }
}

impl std::error::Error for Error {}

/// Collects an event's "message" field & renders the rest as `name=value`
#[derive(Default)]
struct TitleVisitor {
    message: Option<String>,
    fields: Vec<String>,
}

impl tracing::field::Visit for TitleVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else if !field.name().starts_with("log.") {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        // The tracing macros pre-format the `message` field as `std::fmt::Arguments`, whose
        // `Debug` implementation prints without enclosing double-quotes.
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value));
        } else if !field.name().starts_with("log.") {
            // (the `log.*` fields are how tracing-log smuggles `log` metadata through)
            self.fields.push(format!("{}={:?}", field.name(), value));
        }
    }
}

/// The title for `event`: its message, then its other fields; `None` if it has neither.
pub(crate) fn title_for(event: &tracing::Event) -> Option<String> {
    let mut visitor = TitleVisitor::default();
    event.record(&mut visitor);
    let mut parts = Vec::with_capacity(visitor.fields.len() + 1);
    parts.extend(visitor.message);
    parts.extend(visitor.fields);
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

/// The stock [`TracingFormatter`].
///
/// Events become [`LogEntry`] packets: the title is built from the event's fields, the session
/// is the event's target, and the [`Level`] comes from a configurable mapping (by default
/// [`default_level_mapping`]). With [`with_spans`](DefaultTracingFormatter::with_spans), entering
/// & exiting a span produce "enter method" & "leave method" [`ProcessFlow`] packets named after
/// the span.
pub struct DefaultTracingFormatter {
    map_level: Box<dyn Fn(&tracing::Level) -> Level + Send + Sync>,
    spans: bool,
}

impl std::default::Default for DefaultTracingFormatter {
    fn default() -> Self {
        DefaultTracingFormatter {
            map_level: Box::new(default_level_mapping),
            spans: false,
        }
    }
}

impl DefaultTracingFormatter {
    /// Report span entry & exit
    pub fn with_spans(mut self, spans: bool) -> Self {
        self.spans = spans;
        self
    }
    /// Replace the mapping from [`tracing::Level`] to [`Level`]
    pub fn with_level_mapping<F>(mut self, map_level: F) -> Self
    where
        F: Fn(&tracing::Level) -> Level + Send + Sync + 'static,
    {
        self.map_level = Box::new(map_level);
        self
    }

    fn flow<S>(
        &self,
        flow_type: ProcessFlowType,
        id: &tracing_core::span::Id,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) -> Option<Packet>
    where
        S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    {
        if !self.spans {
            return None;
        }
        let span = ctx.span(id)?;
        let level = (*self.map_level)(span.metadata().level());
        Some(Packet::process_flow(
            level,
            ProcessFlow::new(flow_type, span.name()),
        ))
    }
}

impl<S> TracingFormatter<S> for DefaultTracingFormatter
where
    S: tracing_core::subscriber::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    type Error = Error;
    fn on_event(
        &self,
        event: &tracing::Event,
        meta: &tracing::Metadata,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) -> StdResult<Option<Packet>, Error> {
        let title = title_for(event).ok_or(Error::NoMessageField {
            name: event.metadata().name(),
            back: Backtrace::new(),
        })?;
        let level = (*self.map_level)(meta.level());
        let mut entry = LogEntry::new(LogEntryType::for_level(level), ViewerId::Title);
        entry.session_name = meta.target().to_string();
        entry.title = title;
        Ok(Some(Packet::log_entry(level, entry)))
    }
    fn on_enter(
        &self,
        id: &tracing_core::span::Id,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) -> StdResult<Option<Packet>, Error> {
        Ok(self.flow(ProcessFlowType::EnterMethod, id, ctx))
    }
    fn on_exit(
        &self,
        id: &tracing_core::span::Id,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) -> StdResult<Option<Packet>, Error> {
        Ok(self.flow(ProcessFlowType::LeaveMethod, id, ctx))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tracing::{Callsite, Event};

    struct TestCallsite {
        metadata: &'static tracing::Metadata<'static>,
    }
    impl tracing_core::callsite::Callsite for TestCallsite {
        fn set_interest(&self, _interest: tracing_core::subscriber::Interest) {}
        fn metadata(&self) -> &tracing::Metadata<'static> {
            self.metadata
        }
    }

    static CALLSITE: TestCallsite = {
        static METADATA: tracing::Metadata = tracing::Metadata::new(
            "test event metadata",
            "test-target",
            tracing::Level::INFO,
            Some(file!()),
            Some(line!()),
            Some(module_path!()),
            tracing::field::FieldSet::new(
                &["message"],
                tracing_core::callsite::Identifier(&CALLSITE),
            ),
            tracing_core::metadata::Kind::EVENT,
        );
        TestCallsite {
            metadata: &METADATA,
        }
    };

    static FIELDS_CALLSITE: TestCallsite = {
        static METADATA: tracing::Metadata = tracing::Metadata::new(
            "test event metadata",
            "test-target",
            tracing::Level::INFO,
            Some(file!()),
            Some(line!()),
            Some(module_path!()),
            tracing::field::FieldSet::new(
                &["answer"],
                tracing_core::callsite::Identifier(&FIELDS_CALLSITE),
            ),
            tracing_core::metadata::Kind::EVENT,
        );
        TestCallsite {
            metadata: &METADATA,
        }
    };

    #[test]
    #[allow(clippy::redundant_closure_call)]
    fn titles() {
        // Event takes the ValueSet by reference, so keep it alive in a closure argument.
        (|value_set: ::tracing::field::ValueSet| {
            let event = Event::new(CALLSITE.metadata(), &value_set);
            assert_eq!(title_for(&event).unwrap(), "Hello, 世界!");
        })(tracing::valueset!(
            CALLSITE.metadata().fields(),
            "{}",
            "Hello, 世界!"
        ));

        (|value_set: ::tracing::field::ValueSet| {
            let event = Event::new(FIELDS_CALLSITE.metadata(), &value_set);
            assert_eq!(title_for(&event).unwrap(), "answer=\"forty-two\"");
        })(tracing::valueset!(
            FIELDS_CALLSITE.metadata().fields(),
            answer = ?"forty-two"
        ));
    }

    /// Records the title of every event it sees
    struct Titles(Arc<Mutex<Vec<Option<String>>>>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for Titles {
        fn on_event(&self, event: &Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
            self.0.lock().unwrap().push(title_for(event));
        }
    }

    #[test]
    fn titles_with_message_and_fields() {
        use tracing_subscriber::layer::SubscriberExt;

        let titles = Arc::new(Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::registry().with(Titles(titles.clone()));
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(answer = 42, "Hello, 世界!");
            tracing::info!(log.target = "elsewhere", "bridged");
            tracing::info!(answer = 42, question = "unknown");
        });
        assert_eq!(
            *titles.lock().unwrap(),
            vec![
                Some("Hello, 世界! answer=42".to_string()),
                Some("bridged".to_string()),
                Some("answer=42 question=unknown".to_string()),
            ]
        );
    }

    #[test]
    fn level_mapping() {
        let f = DefaultTracingFormatter::default().with_level_mapping(|_| Level::Fatal);
        assert_eq!((*f.map_level)(&tracing::Level::TRACE), Level::Fatal);
        assert!(!f.spans);
        assert!(DefaultTracingFormatter::default().with_spans(true).spans);
    }
}
