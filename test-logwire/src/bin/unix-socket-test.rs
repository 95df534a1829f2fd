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

//! Test writing to a console listening on the Unix socket `logwire` in the temporary directory
//! (or at the path named on the command line).

use logwire::{engine::Engine, layer::Layer};
use tracing::{debug, error, info, trace, warn};
use tracing_subscriber::{
    layer::SubscriberExt, // Needed to get `with()`
    registry::Registry,
};

use std::sync::Arc;

pub fn main() {
    let pipe = std::env::args().nth(1).unwrap_or_else(|| "logwire".to_string());
    let engine = Arc::new(
        Engine::builder()
            .app_name("unix-socket-test")
            .connections(format!("pipe(pipename=\"{}\")", pipe))
            .error_handler(|err| eprintln!("{}", err))
            .build()
            .unwrap(),
    );
    engine.enable();
    let subscriber = Registry::default().with(Layer::new(engine.clone()));
    let _guard = tracing::subscriber::set_default(subscriber);

    trace!("你好, Unix domain socket.");
    debug!("你好, Unix domain socket.");
    info!("你好, Unix domain socket.");
    warn!("你好, Unix domain socket.");
    error!("你好, Unix domain socket.");
}
