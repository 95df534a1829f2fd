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

//! Log file rotation.
//!
//! A file destination configured with `rotate=<mode>` starts a new file whenever the wall clock
//! crosses into a new hour/day/week/month. [`FileRotater`] tracks the current period & says when
//! that happens; [`file_name_for`] derives the name of the file to open for a given moment.
//! Deleting old parts is not this module's business.

use chrono::prelude::*;

use std::path::{Path, PathBuf};

/// How often a log file is replaced by a new one
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum FileRotate {
    #[default]
    None,
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl FileRotate {
    pub fn parse(text: &str) -> Option<FileRotate> {
        match text.trim().to_lowercase().as_str() {
            "none" => Some(FileRotate::None),
            "hourly" => Some(FileRotate::Hourly),
            "daily" => Some(FileRotate::Daily),
            "weekly" => Some(FileRotate::Weekly),
            "monthly" => Some(FileRotate::Monthly),
            _ => None,
        }
    }
}

/// Identifies the rotation period a moment falls in; two moments in the same period compare equal.
fn period(mode: FileRotate, t: &DateTime<Utc>) -> Option<(i32, u32, u32)> {
    match mode {
        FileRotate::None => None,
        FileRotate::Hourly => Some((t.year(), t.ordinal(), t.hour())),
        FileRotate::Daily => Some((t.year(), t.ordinal(), 0)),
        FileRotate::Weekly => {
            let week = t.iso_week();
            Some((week.year(), week.week(), 0))
        }
        FileRotate::Monthly => Some((t.year(), t.month(), 0)),
    }
}

/// Tracks the current rotation period of one log file
#[derive(Clone, Debug, Default)]
pub struct FileRotater {
    mode: FileRotate,
    current: Option<(i32, u32, u32)>,
}

impl FileRotater {
    pub fn new(mode: FileRotate) -> FileRotater {
        FileRotater {
            mode,
            current: None,
        }
    }
    pub fn mode(&self) -> FileRotate {
        self.mode
    }
    /// Record `now` as the start of the current file
    pub fn initialize(&mut self, now: &DateTime<Utc>) {
        self.current = period(self.mode, now);
    }
    /// Returns true if `now` falls in a later period than the current file (and adopts it).
    pub fn update(&mut self, now: &DateTime<Utc>) -> bool {
        let next = period(self.mode, now);
        if next != self.current {
            self.current = next;
            true
        } else {
            false
        }
    }
}

/// The file to open at `now` for the configured `base` name.
///
/// Without rotation (and without a size limit) that's just `base`; otherwise the timestamp is
/// spliced in before the extension: `log.sil` becomes `log-2022-06-23-16-10-55.sil`.
pub fn file_name_for(base: &Path, timestamped: bool, now: &DateTime<Utc>) -> PathBuf {
    if !timestamped {
        return base.to_path_buf();
    }
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match base.extension() {
        Some(ext) => format!(
            "{}-{}.{}",
            stem,
            now.format("%Y-%m-%d-%H-%M-%S"),
            ext.to_string_lossy()
        ),
        None => format!("{}-{}", stem, now.format("%Y-%m-%d-%H-%M-%S")),
    };
    base.with_file_name(name)
}
