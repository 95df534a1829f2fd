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

//! Running protocol operations on a background thread.
//!
//! A [`Scheduler`] owns one worker thread and a byte-bounded FIFO of [`SchedulerCommand`]s.
//! Producers [`schedule`](Scheduler::schedule) commands; the worker pulls them off in batches &
//! hands them to its [`CommandTarget`] (in practice, a protocol operating asynchronously). When the
//! queue is full the scheduler either blocks the producer until the worker catches up
//! ("throttling") or evicts the oldest commands to make room.
//!
//! The queue is a [`VecDeque`] behind one [`Mutex`] with a single [`Condvar`] signalled whenever
//! the queue grows, shrinks or the scheduler is stopped; producers & the worker re-check their
//! own condition on each wake-up.

use crate::{
    error::{Error, Result},
    packet::Packet,
    protocol::ProtocolCommand,
    queue::{DEFAULT_BACKLOG, OVERHEAD},
};

use backtrace::Backtrace;

use std::{
    collections::VecDeque,
    sync::{Arc, Condvar, Mutex, MutexGuard},
    thread::JoinHandle,
};

/// Maximum number of commands the worker takes per trip through the lock
const BATCH_SIZE: usize = 16;

/// One deferred protocol operation
#[derive(Clone, Debug)]
pub enum SchedulerCommand {
    Connect,
    WritePacket(Arc<Packet>),
    Disconnect,
    Dispatch(ProtocolCommand),
}

impl SchedulerCommand {
    /// Accounting size: the wrapped packet's size, or nothing
    pub fn size(&self) -> usize {
        match self {
            SchedulerCommand::WritePacket(packet) => packet.size(),
            _ => 0,
        }
    }
    fn cost(&self) -> usize {
        self.size() + OVERHEAD
    }
}

/// Whoever the worker thread works for.
pub trait CommandTarget: Send + Sync {
    /// Carry out `command`; errors are the target's business.
    fn execute(&self, command: SchedulerCommand);
    /// Whether the target is currently in a failed state
    fn failed(&self) -> bool;
}

struct Monitor {
    items: VecDeque<SchedulerCommand>,
    size: usize,
    threshold: usize,
    throttle: bool,
    started: bool,
    stopped: bool,
}

impl Monitor {
    fn push(&mut self, command: SchedulerCommand) {
        self.size += command.cost();
        self.items.push_back(command);
    }
    fn pop(&mut self) -> Option<SchedulerCommand> {
        let command = self.items.pop_front()?;
        self.size -= command.cost();
        Some(command)
    }
    fn clear(&mut self) {
        self.items.clear();
        self.size = 0;
    }
    fn fits(&self, cost: usize) -> bool {
        self.size + cost <= self.threshold
    }
}

struct Inner {
    monitor: Mutex<Monitor>,
    cond: Condvar,
    target: Arc<dyn CommandTarget>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Monitor> {
        // The monitor's invariants hold between statements, so a panic elsewhere can't leave it
        // inconsistent.
        self.monitor.lock().unwrap_or_else(|err| err.into_inner())
    }
    fn wait<'a>(&self, guard: MutexGuard<'a, Monitor>) -> MutexGuard<'a, Monitor> {
        self.cond.wait(guard).unwrap_or_else(|err| err.into_inner())
    }

    /// Block until there's work; `None` means we've been stopped & the queue is drained.
    fn next_batch(&self) -> Option<Vec<SchedulerCommand>> {
        let mut monitor = self.lock();
        while monitor.items.is_empty() {
            if monitor.stopped {
                return None;
            }
            monitor = self.wait(monitor);
        }
        let mut batch = Vec::with_capacity(BATCH_SIZE);
        while batch.len() < BATCH_SIZE {
            match monitor.pop() {
                Some(command) => batch.push(command),
                None => break,
            }
        }
        self.cond.notify_all();
        Some(batch)
    }

    fn run(&self) {
        tracing::debug!(target: "logwire::scheduler", "worker started");
        while let Some(batch) = self.next_batch() {
            for command in batch {
                let stopping = self.lock().stopped;
                self.target.execute(command);
                if stopping && self.target.failed() {
                    // Don't sit through a backlog of writes to a destination that's down when
                    // we've been asked to shut down.
                    tracing::debug!(target: "logwire::scheduler", "target failed during shutdown; discarding queue");
                    self.lock().clear();
                    self.cond.notify_all();
                    return;
                }
            }
        }
        tracing::debug!(target: "logwire::scheduler", "worker exiting");
    }
}

/// A worker thread & its command queue
pub struct Scheduler {
    inner: Arc<Inner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// A scheduler working for `target`; nothing runs until [`start`](Scheduler::start).
    pub fn new(target: Arc<dyn CommandTarget>) -> Scheduler {
        Scheduler {
            inner: Arc::new(Inner {
                monitor: Mutex::new(Monitor {
                    items: VecDeque::new(),
                    size: 0,
                    threshold: DEFAULT_BACKLOG,
                    throttle: true,
                    started: false,
                    stopped: false,
                }),
                cond: Condvar::new(),
                target,
            }),
            worker: Mutex::new(None),
        }
    }
    /// Maximum number of bytes the queue may hold
    pub fn with_threshold(self, threshold: usize) -> Scheduler {
        self.inner.lock().threshold = threshold;
        self
    }
    /// Whether [`schedule`](Scheduler::schedule) blocks (true) or evicts (false) when full
    pub fn with_throttle(self, throttle: bool) -> Scheduler {
        self.inner.lock().throttle = throttle;
        self
    }

    /// Start the worker thread; starting twice is a no-op.
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock().unwrap_or_else(|err| err.into_inner());
        {
            let mut monitor = self.inner.lock();
            if monitor.started {
                return Ok(());
            }
            monitor.started = true;
        }
        let inner = self.inner.clone();
        let handle = std::thread::Builder::new()
            .name("logwire-scheduler".to_string())
            .spawn(move || inner.run())
            .map_err(|err| {
                self.inner.lock().started = false;
                Error::Scheduler {
                    message: format!("couldn't spawn the worker thread: {}", err),
                    back: Backtrace::new(),
                }
            })?;
        *worker = Some(handle);
        Ok(())
    }

    /// Ask the worker to finish up & wait for it; the worker drains the queue first unless the
    /// target fails along the way.
    pub fn stop(&self) {
        {
            let mut monitor = self.inner.lock();
            if !monitor.started || monitor.stopped {
                return;
            }
            monitor.stopped = true;
            self.inner.cond.notify_all();
        }
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!(target: "logwire::scheduler", "worker thread panicked");
            }
        }
    }

    /// Enqueue `command`; returns false if it was rejected.
    ///
    /// A command is rejected when the scheduler isn't running, or when it wouldn't fit in the
    /// queue even if the queue were empty.
    pub fn schedule(&self, command: SchedulerCommand) -> bool {
        let cost = command.cost();
        let mut monitor = self.inner.lock();
        if !monitor.started || monitor.stopped || cost > monitor.threshold {
            return false;
        }
        while !monitor.fits(cost) {
            if !monitor.throttle || self.inner.target.failed() {
                while !monitor.fits(cost) && monitor.pop().is_some() {}
            } else {
                monitor = self.inner.wait(monitor);
                if monitor.stopped {
                    return false;
                }
            }
        }
        monitor.push(command);
        self.inner.cond.notify_all();
        true
    }

    /// Discard every queued command
    pub fn clear(&self) {
        self.inner.lock().clear();
        self.inner.cond.notify_all();
    }
    /// Number of queued commands
    pub fn count(&self) -> usize {
        self.inner.lock().items.len()
    }
    /// Bytes currently accounted to queued commands
    pub fn size(&self) -> usize {
        self.inner.lock().size
    }
    pub fn is_stopped(&self) -> bool {
        self.inner.lock().stopped
    }
    pub fn threshold(&self) -> usize {
        self.inner.lock().threshold
    }
    pub fn is_throttled(&self) -> bool {
        self.inner.lock().throttle
    }
}

impl std::ops::Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::level::Level;
    use crate::packet::{Watch, WatchType};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    /// Records the names of the watches it's handed; blocks on `gate` while it's closed.
    struct Recorder {
        executed: Mutex<Vec<String>>,
        gate: Mutex<bool>,
        opened: Condvar,
        entered: Mutex<Option<mpsc::Sender<()>>>,
        failed: AtomicBool,
    }

    impl Recorder {
        fn new(open: bool, failed: bool) -> Arc<Recorder> {
            Arc::new(Recorder {
                executed: Mutex::new(Vec::new()),
                gate: Mutex::new(open),
                opened: Condvar::new(),
                entered: Mutex::new(None),
                failed: AtomicBool::new(failed),
            })
        }
        fn open(&self) {
            *self.gate.lock().unwrap() = true;
            self.opened.notify_all();
        }
        fn executed(&self) -> Vec<String> {
            self.executed.lock().unwrap().clone()
        }
    }

    impl CommandTarget for Recorder {
        fn execute(&self, command: SchedulerCommand) {
            if let Some(tx) = self.entered.lock().unwrap().take() {
                tx.send(()).unwrap();
            }
            let mut open = self.gate.lock().unwrap();
            while !*open {
                open = self.opened.wait(open).unwrap();
            }
            drop(open);
            if let SchedulerCommand::WritePacket(packet) = command {
                if let crate::packet::PacketKind::Watch(w) = packet.kind() {
                    self.executed.lock().unwrap().push(w.name.clone());
                }
            }
        }
        fn failed(&self) -> bool {
            self.failed.load(Ordering::SeqCst)
        }
    }

    fn write(name: &str) -> SchedulerCommand {
        SchedulerCommand::WritePacket(
            crate::packet::Packet::watch(Level::Message, Watch::new(name, "v", WatchType::String))
                .into_shared(),
        )
    }

    /// Start a scheduler whose worker is stuck executing "1" with room for two more commands.
    fn stuck(throttle: bool, failed: bool) -> (Arc<Recorder>, Arc<Scheduler>) {
        let target = Recorder::new(false, failed);
        let (tx, rx) = mpsc::channel();
        *target.entered.lock().unwrap() = Some(tx);
        let scheduler = Arc::new(
            Scheduler::new(target.clone())
                .with_threshold(2 * write("1").cost())
                .with_throttle(throttle),
        );
        scheduler.start().unwrap();
        assert!(scheduler.schedule(write("1")));
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(scheduler.schedule(write("2")));
        assert!(scheduler.schedule(write("3")));
        (target, scheduler)
    }

    #[test]
    fn throttle_blocks_until_drained() {
        let (target, scheduler) = stuck(true, false);
        let done = Arc::new(AtomicBool::new(false));
        let producer = {
            let (scheduler, done) = (scheduler.clone(), done.clone());
            std::thread::spawn(move || {
                let accepted = scheduler.schedule(write("4"));
                done.store(true, Ordering::SeqCst);
                accepted
            })
        };
        std::thread::sleep(Duration::from_millis(200));
        assert!(!done.load(Ordering::SeqCst));
        target.open();
        assert!(producer.join().unwrap());
        scheduler.stop();
        assert_eq!(target.executed(), vec!["1", "2", "3", "4"]);
    }

    #[test]
    fn evicts_oldest_without_throttle() {
        let (target, scheduler) = stuck(false, false);
        assert!(scheduler.schedule(write("4")));
        assert_eq!(scheduler.count(), 2);
        target.open();
        scheduler.stop();
        assert_eq!(target.executed(), vec!["1", "3", "4"]);
    }

    #[test]
    fn rejections() {
        let target = Recorder::new(true, false);
        let scheduler = Scheduler::new(target.clone()).with_threshold(write("1").cost());
        // not started
        assert!(!scheduler.schedule(write("1")));
        scheduler.start().unwrap();
        // too big to ever fit
        assert!(!scheduler.schedule(write("too long")));
        assert!(scheduler.schedule(write("1")));
        scheduler.stop();
        assert!(scheduler.is_stopped());
        // stopped
        assert!(!scheduler.schedule(write("2")));
        assert_eq!(target.executed(), vec!["1"]);
    }

    #[test]
    fn failed_target_shuts_down_fast() {
        let (target, scheduler) = stuck(true, true);
        let stopper = {
            let scheduler = scheduler.clone();
            std::thread::spawn(move || scheduler.stop())
        };
        while !scheduler.is_stopped() {
            std::thread::sleep(Duration::from_millis(10));
        }
        target.open();
        stopper.join().unwrap();
        // "1" was under way before the stop; "2" ran after it, found the target failed & the
        // worker gave up on "3".
        assert_eq!(target.executed(), vec!["1", "2"]);
        assert_eq!(scheduler.count(), 0);
    }

    #[test]
    fn command_sizes() {
        assert_eq!(SchedulerCommand::Connect.size(), 0);
        let cmd = write("abc");
        assert_eq!(cmd.size(), 20 + 3 + 1);
    }
}
