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

//! Packet formatting primitives.
//!
//! This module defines the [`Formatter`] trait.

use crate::packet::Packet;

use std::io::Write;

/// Operations all formatters must support
/// ======================================
///
/// # Introduction
///
/// The trip from an emitted packet to the remote console occurs in three parts:
///
/// 1. building the [`Packet`] (the producer's job)
///
/// 2. turning that packet into bytes the destination understands
///
/// 3. transporting those bytes to the destination
///
/// [`Formatter`] implements step 2 in this process.
///
/// # Design
///
/// Formatting is split into [`compile`](Formatter::compile) & [`write`](Formatter::write) so that a
/// transport can learn the size of the record before committing it to the sink (the file
/// transport uses this to decide whether to roll-over to a new file). Implementations keep the
/// compiled record in an internal buffer between the two calls, which is why both take `&mut
/// self`; each transport owns its formatter.
///
/// A compiled size of zero means "nothing to write for this packet", and
/// [`write`](Formatter::write) must then emit nothing.
pub trait Formatter: Send {
    /// Prepare `packet` for writing; return the size of the compiled record, not counting any
    /// framing [`write`](Formatter::write) adds.
    fn compile(&mut self, packet: &Packet) -> usize;
    /// Write the most recently compiled packet to `sink`
    fn write(&mut self, sink: &mut dyn Write) -> std::io::Result<()>;
    /// [`compile`](Formatter::compile) then [`write`](Formatter::write)
    fn format(&mut self, packet: &Packet, sink: &mut dyn Write) -> std::io::Result<()> {
        self.compile(packet);
        self.write(sink)
    }
}
