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

//! Parsing connections & options strings.
//!
//! Destinations are configured with a compact textual syntax:
//!
//! ```text
//! tcp(host=localhost, port=4228), file(filename="c:\logs\a,b.sil", append=true)
//! ```
//!
//! or, more formally:
//!
//! ```text
//! connections := entry (',' entry)*
//! entry       := name '(' options ')'
//! options     := pair (',' pair)*
//! pair        := key '=' value
//! ```
//!
//! Values may be double-quoted in order to embed commas (and parentheses); within a quoted value a
//! doubled quote (`""`) stands for one literal quote.
//!
//! Parsing happens in two passes. [`parse_connections`] splits a connections string into
//! `(name, options)` entries, leaving each options string untouched (quotes and all), and
//! [`parse_options`] splits one options string into unquoted `(key, value)` pairs. Both report
//! what they find to a callback as they go, so a caller may stop at the first entry it dislikes by
//! returning an error.
//!
//! # Examples
//!
//! ```rust
//! use logwire::connections::parse_connections;
//! let mut entries = Vec::new();
//! parse_connections("tcp(host=localhost,port=4228), mem()", |name, options| {
//!     entries.push((name.to_string(), options.to_string()));
//!     Ok(())
//! })
//! .unwrap();
//! assert_eq!(entries[0], ("tcp".to_string(), "host=localhost,port=4228".to_string()));
//! assert_eq!(entries[1], ("mem".to_string(), "".to_string()));
//! ```

use crate::error::{Error, Result};

fn skip_whitespace(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() && chars[i].is_whitespace() {
        i += 1;
    }
    i
}

/// Split `connections` into `(name, options)` entries, handing each to `on_entry`.
///
/// Names are trimmed & lower-cased; options are trimmed but otherwise passed through verbatim.
pub fn parse_connections<F>(connections: &str, mut on_entry: F) -> Result<()>
where
    F: FnMut(&str, &str) -> Result<()>,
{
    let chars: Vec<char> = connections.chars().collect();
    let mut i = 0;
    loop {
        i = skip_whitespace(&chars, i);
        if i >= chars.len() {
            return Ok(());
        }

        let start = i;
        let mut name = String::new();
        while i < chars.len() && chars[i] != '(' {
            name.push(chars[i]);
            i += 1;
        }
        if i >= chars.len() {
            return Err(Error::syntax("Missing \"(\"", i));
        }
        let name = name.trim().to_lowercase();
        if name.is_empty() {
            return Err(Error::syntax("Missing protocol name", start));
        }
        i += 1; // '('

        let mut options = String::new();
        let mut quoted = false;
        while i < chars.len() && (quoted || chars[i] != ')') {
            // A doubled quote inside a quoted value flips this twice, which is exactly right.
            if chars[i] == '"' {
                quoted = !quoted;
            }
            options.push(chars[i]);
            i += 1;
        }
        if i >= chars.len() {
            return Err(Error::syntax(
                if quoted {
                    "Missing closing quote"
                } else {
                    "Missing \")\""
                },
                i,
            ));
        }
        i += 1; // ')'

        on_entry(&name, options.trim())?;

        i = skip_whitespace(&chars, i);
        if i < chars.len() {
            if chars[i] != ',' {
                return Err(Error::syntax("Missing \",\"", i));
            }
            i = skip_whitespace(&chars, i + 1);
            if i >= chars.len() {
                return Err(Error::syntax("Missing protocol name", i));
            }
        }
    }
}

/// Split one options string into `(key, value)` pairs, handing each to `on_option`.
///
/// Keys are trimmed & lower-cased; quoted values are unquoted (with `""` collapsed to `"`),
/// unquoted values are trimmed.
pub fn parse_options<F>(options: &str, mut on_option: F) -> Result<()>
where
    F: FnMut(&str, &str) -> Result<()>,
{
    let chars: Vec<char> = options.chars().collect();
    let mut i = 0;
    loop {
        i = skip_whitespace(&chars, i);
        if i >= chars.len() {
            return Ok(());
        }

        let start = i;
        let mut key = String::new();
        while i < chars.len() && chars[i] != '=' && chars[i] != ',' {
            key.push(chars[i]);
            i += 1;
        }
        if i >= chars.len() || chars[i] != '=' {
            return Err(Error::syntax("Missing \"=\"", i));
        }
        let key = key.trim().to_lowercase();
        if key.is_empty() {
            return Err(Error::syntax("Missing option name", start));
        }
        i += 1; // '='

        i = skip_whitespace(&chars, i);
        let mut value = String::new();
        if i < chars.len() && chars[i] == '"' {
            i += 1;
            loop {
                if i >= chars.len() {
                    return Err(Error::syntax("Missing closing quote", i));
                }
                if chars[i] == '"' {
                    if i + 1 < chars.len() && chars[i + 1] == '"' {
                        value.push('"');
                        i += 2;
                        continue;
                    }
                    i += 1;
                    break;
                }
                value.push(chars[i]);
                i += 1;
            }
            i = skip_whitespace(&chars, i);
            if i < chars.len() && chars[i] != ',' {
                return Err(Error::syntax("Missing \",\"", i));
            }
        } else {
            while i < chars.len() && chars[i] != ',' {
                value.push(chars[i]);
                i += 1;
            }
            value = value.trim().to_string();
        }
        if i < chars.len() {
            i += 1; // ','
        }

        on_option(&key, &value)?;
    }
}
