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

//! Typed access to a protocol's options.
//!
//! [`LookupTable`] holds the `(key, value)` pairs of one options string & offers typed getters
//! with defaults. A value that can't be interpreted as the requested type is treated as missing, so
//! the getter returns its default: a mistyped `port=42x` yields the default port rather than an
//! error.

use crate::{connections::parse_options, error::Result, level::Level, rotation::FileRotate};

use std::collections::HashMap;
use std::time::Duration;

const KB: u64 = 1024;
const MB: u64 = 1024 * KB;
const GB: u64 = 1024 * MB;

/// Case-insensitive map from option names to their textual values
#[derive(Clone, Debug, Default)]
pub struct LookupTable {
    items: HashMap<String, String>,
}

impl LookupTable {
    pub fn new() -> LookupTable {
        LookupTable::default()
    }
    /// Build a table from an options string such as `host=localhost, port=4228`
    pub fn parse(options: &str) -> Result<LookupTable> {
        let mut table = LookupTable::new();
        parse_options(options, |key, value| {
            table.put(key, value);
            Ok(())
        })?;
        Ok(table)
    }
    /// Later values for the same key replace earlier ones.
    pub fn put(&mut self, key: &str, value: &str) {
        self.items.insert(key.to_lowercase(), value.to_string());
    }
    pub fn contains(&self, key: &str) -> bool {
        self.items.contains_key(&key.to_lowercase())
    }
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(|k| k.as_str())
    }
    pub fn len(&self) -> usize {
        self.items.len()
    }
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
    fn get(&self, key: &str) -> Option<&str> {
        self.items.get(&key.to_lowercase()).map(|v| v.as_str())
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or(default).to_string()
    }
    /// `true`, `1` & `yes` (any case) are true; any other value is false.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(v) => matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes"),
            None => default,
        }
    }
    pub fn get_integer(&self, key: &str, default: i64) -> i64 {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }
    pub fn get_level(&self, key: &str, default: Level) -> Level {
        self.get(key).and_then(Level::parse).unwrap_or(default)
    }
    /// A size in bytes; values may carry a `kb`, `mb` or `gb` suffix & a bare number means
    /// kilobytes.
    pub fn get_size(&self, key: &str, default: u64) -> u64 {
        self.get(key).and_then(parse_size).unwrap_or(default)
    }
    /// A duration; values may carry an `ms`, `s`, `m`, `h` or `d` suffix & a bare number means
    /// seconds.
    pub fn get_timespan(&self, key: &str, default: Duration) -> Duration {
        self.get(key).and_then(parse_timespan).unwrap_or(default)
    }
    pub fn get_rotate(&self, key: &str, default: FileRotate) -> FileRotate {
        self.get(key).and_then(FileRotate::parse).unwrap_or(default)
    }
}

/// Split "12kb" into (12, "kb")
fn split_unit(text: &str) -> Option<(u64, String)> {
    let text = text.trim().to_lowercase();
    let idx = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let number = text[..idx].parse().ok()?;
    Some((number, text[idx..].trim().to_string()))
}

fn parse_size(text: &str) -> Option<u64> {
    let (number, unit) = split_unit(text)?;
    let factor = match unit.as_str() {
        "" | "kb" => KB,
        "mb" => MB,
        "gb" => GB,
        _ => return None,
    };
    number.checked_mul(factor)
}

fn parse_timespan(text: &str) -> Option<Duration> {
    let (number, unit) = split_unit(text)?;
    let seconds = match unit.as_str() {
        "ms" => return Some(Duration::from_millis(number)),
        "" | "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        _ => return None,
    };
    number.checked_mul(seconds).map(Duration::from_secs)
}
