// Copyright (C) 2022 Michael Herstine <sp1ff@pobox.com>
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

//! Test writing binary & text log files (asynchronously) to the directory named on the command
//! line, or the current directory.

use logwire::{engine::Engine, layer::Layer, tracing::DefaultTracingFormatter};
use tracing::{debug, error, info, info_span, trace, warn};
use tracing_subscriber::{
    layer::SubscriberExt, // Needed to get `with()`
    registry::Registry,
};

use std::{path::PathBuf, sync::Arc};

pub fn main() {
    let dir = PathBuf::from(std::env::args().nth(1).unwrap_or_else(|| ".".to_string()));
    let connections = format!(
        "file(filename=\"{}\",async.enabled=true),text(filename=\"{}\",indent=true)",
        dir.join("file-test.sil").display(),
        dir.join("file-test.txt").display()
    );
    let engine = Arc::new(
        Engine::builder()
            .app_name("file-test")
            .connections(connections)
            .error_handler(|err| eprintln!("{}", err))
            .build()
            .unwrap(),
    );
    engine.enable();
    let subscriber = Registry::default().with(Layer::with_formatter(
        engine.clone(),
        DefaultTracingFormatter::default().with_spans(true),
    ));
    let _guard = tracing::subscriber::set_default(subscriber);

    info_span!("writing").in_scope(|| {
        trace!("你好, log file.");
        debug!("你好, log file.");
        info!("你好, log file.");
        warn!("你好, log file.");
        error!("你好, log file.");
    });

    // Drain the asynchronous queue & close the files.
    engine.disable();
}
