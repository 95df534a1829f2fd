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

//! The bounded packet queue.
//!
//! [`PacketQueue`] is a FIFO of shared packets with a running byte total. Whenever that total
//! exceeds the configured backlog the oldest packets are discarded, so a queue can never hold more
//! than (roughly) its backlog in memory no matter how fast packets arrive. Protocols use it to
//! defer low-severity packets until something worth flushing for shows up, and the memory
//! transport uses it as its store.

use crate::packet::Packet;

use std::collections::VecDeque;
use std::sync::Arc;

/// Bookkeeping cost charged per queued item on top of the packet's own size, so that a queue of
/// many tiny packets still counts as "full" eventually.
pub const OVERHEAD: usize = 24;

/// Default backlog: 2 MiB
pub const DEFAULT_BACKLOG: usize = 2048 * 1024;

/// A size-accounted FIFO of packets with oldest-first eviction.
#[derive(Debug)]
pub struct PacketQueue {
    items: VecDeque<Arc<Packet>>,
    backlog: usize,
    size: usize,
}

impl std::default::Default for PacketQueue {
    fn default() -> Self {
        PacketQueue::new(DEFAULT_BACKLOG)
    }
}

impl PacketQueue {
    pub fn new(backlog: usize) -> PacketQueue {
        PacketQueue {
            items: VecDeque::new(),
            backlog,
            size: 0,
        }
    }
    /// Append `packet`, then discard from the head until the queue fits its backlog again.
    ///
    /// Note that a single packet larger than the backlog evicts everything, including itself.
    pub fn push(&mut self, packet: Arc<Packet>) {
        self.size += packet.size() + OVERHEAD;
        self.items.push_back(packet);
        self.resize();
    }
    /// Remove & return the oldest packet
    pub fn pop(&mut self) -> Option<Arc<Packet>> {
        let packet = self.items.pop_front()?;
        self.size -= packet.size() + OVERHEAD;
        Some(packet)
    }
    pub fn clear(&mut self) {
        while self.pop().is_some() {}
    }
    pub fn backlog(&self) -> usize {
        self.backlog
    }
    /// Change the backlog; the queue is trimmed to fit immediately.
    pub fn set_backlog(&mut self, backlog: usize) {
        self.backlog = backlog;
        self.resize();
    }
    /// Running byte total (packet sizes plus per-item overhead)
    pub fn size(&self) -> usize {
        self.size
    }
    pub fn count(&self) -> usize {
        self.items.len()
    }
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
    /// Walk the queued packets, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Packet>> {
        self.items.iter()
    }
    fn resize(&mut self) {
        while self.size > self.backlog {
            if self.pop().is_none() {
                self.size = 0;
                break;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::level::Level;
    use crate::packet::*;

    use proptest::prelude::*;

    /// A watch named `tag` whose accounting size is exactly `size` (at least 26: the watch header
    /// plus a six-digit name)
    fn packet(tag: usize, size: usize) -> Arc<Packet> {
        Arc::new(Packet::watch(
            Level::Debug,
            Watch::new(format!("{:06}", tag), "x".repeat(size - 26), WatchType::String),
        ))
    }

    #[test]
    fn fifo() {
        let mut q = PacketQueue::new(10_000);
        for i in 0..5 {
            q.push(packet(i, 30));
        }
        assert_eq!(q.count(), 5);
        assert_eq!(q.size(), 5 * (30 + OVERHEAD));
        for i in 0..5 {
            let p = q.pop().unwrap();
            match p.kind() {
                PacketKind::Watch(w) => assert_eq!(w.name.parse::<usize>().unwrap(), i),
                _ => panic!("not a watch"),
            }
        }
        assert!(q.pop().is_none());
        assert_eq!(q.size(), 0);
    }

    #[test]
    fn eviction_keeps_newest() {
        // Each item costs 100 bytes; a backlog of 250 holds two.
        let mut q = PacketQueue::new(250);
        for i in 0..5 {
            q.push(packet(i, 100 - OVERHEAD));
        }
        assert_eq!(q.count(), 2);
        assert_eq!(q.size(), 200);
        let names: Vec<usize> = q
            .iter()
            .map(|p| match p.kind() {
                PacketKind::Watch(w) => w.name.parse().unwrap(),
                _ => panic!("not a watch"),
            })
            .collect();
        assert_eq!(names, vec![3, 4]);

        q.set_backlog(150);
        assert_eq!(q.count(), 1);
        q.set_backlog(10);
        assert!(q.is_empty());
        assert_eq!(q.size(), 0);
    }

    #[test]
    fn oversized_packet_evicts_itself() {
        let mut q = PacketQueue::new(50);
        q.push(packet(0, 100));
        assert!(q.is_empty());
        assert_eq!(q.size(), 0);
    }

    #[test]
    fn clear() {
        let mut q = PacketQueue::default();
        q.push(packet(0, 40));
        q.push(packet(1, 40));
        q.clear();
        assert!(q.is_empty());
        assert_eq!(q.size(), 0);
        assert_eq!(q.backlog(), DEFAULT_BACKLOG);
    }

    #[derive(Clone, Debug)]
    enum Op {
        Push(usize),
        Pop,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => (26usize..200).prop_map(Op::Push),
            1 => Just(Op::Pop),
        ]
    }

    proptest! {
        #[test]
        fn never_exceeds_backlog_and_stays_fifo(
            backlog in 0usize..2_000,
            ops in proptest::collection::vec(op(), 0..200),
        ) {
            let mut q = PacketQueue::new(backlog);
            // A model of what should be in the queue: (tag, cost)
            let mut model: VecDeque<(usize, usize)> = VecDeque::new();
            for (tag, op) in ops.into_iter().enumerate() {
                match op {
                    Op::Push(size) => {
                        q.push(packet(tag, size));
                        model.push_back((tag, size + OVERHEAD));
                        while model.iter().map(|x| x.1).sum::<usize>() > backlog {
                            model.pop_front();
                        }
                    }
                    Op::Pop => {
                        let got = q.pop().map(|p| match p.kind() {
                            PacketKind::Watch(w) => w.name.parse::<usize>().unwrap(),
                            _ => unreachable!(),
                        });
                        prop_assert_eq!(got, model.pop_front().map(|x| x.0));
                    }
                }
                prop_assert!(q.size() <= backlog);
                prop_assert_eq!(q.size(), model.iter().map(|x| x.1).sum::<usize>());
                prop_assert_eq!(q.count(), model.len());
            }
        }
    }
}
