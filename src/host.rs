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

//! Facts about the running process: host name, application name & a numeric thread id.

use std::sync::atomic::{AtomicU64, Ordering};

/// Attempt to figure-out a host name for the log header & log entries.
///
/// This will first simply try [gethostname()], and if that fails fall back to an IP address for
/// this host. It cannot fail; if neither can be had it returns "localhost".
///
/// [gethostname()]: https://man7.org/linux/man-pages/man2/gethostname.2.html
pub fn default_host_name() -> String {
    // `hostname::get()` returns an `Result<OsString,_>`, which is really kind of a hassle to work
    // with...
    hostname::get()
        .ok()
        .map(|hn| hn.to_string_lossy().into_owned())
        .filter(|hn| !hn.is_empty())
        // vvv will return the Some(hostname), or call the closure :=> Option<String>
        .or_else(|| local_ip_address::local_ip().ok().map(|ip| ip.to_string()))
        .unwrap_or_else(|| "localhost".to_string())
}

/// Attempt to figure-out an application name.
///
/// This implementation relies on [`std::env::current_exe`]. It cannot fail; if for any reason that
/// value cannot be retrieved, it simply returns "Auto".
pub fn default_app_name() -> String {
    std::env::current_exe() // :=> StdResult<PathBuf, std::io::Error>
        .ok()
        .and_then(|pbuf| {
            pbuf.file_stem()
                .map(|os_str| os_str.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "Auto".to_string())
}

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ID: u64 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
}

/// A small, stable, process-unique number for the calling thread.
///
/// [`std::thread::ThreadId`] has no stable integer representation, so threads are simply numbered
/// in the order in which they first ask.
pub fn current_thread_id() -> u64 {
    THREAD_ID.with(|id| *id)
}
