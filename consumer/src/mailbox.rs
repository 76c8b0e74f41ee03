// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Mailbox
//!
//! Ordered, unbounded queue shared by any number of producers and exactly one
//! consumer. Producers never block: [`Mailbox::send`] pushes the entry and
//! opens the gate. The consumer parks on the gate inside [`Mailbox::next`] when
//! the queue is empty.
//!
//! The gate is a single-shot `oneshot` pair. It is replaced after every
//! consumed entry instead of being reset, so a send racing with the consumer
//! re-arming its wait always lands on a gate the consumer will observe.
//!

use tokio::sync::oneshot;
use tracing::debug;

use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard, PoisonError},
};

/// Entry stored in a mailbox.
///
/// Ordinary payloads travel as [`Envelope::Data`]. The other variants are the
/// in-band control protocol understood by the consumption loop and are never
/// delivered to a handler.
#[derive(Debug)]
pub enum Envelope<M> {
    /// Payload for the handler.
    Data(M),
    /// Finish the backlog, then stop the loop.
    Stop,
    /// Stop the loop before any pending data. Always queued at the head.
    Halt,
    /// Barrier: resolved by the loop once everything queued before it has
    /// been handled.
    Sync(oneshot::Sender<()>),
}

impl<M> Envelope<M> {
    /// True for the entries that end a consumption loop.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Envelope::Stop | Envelope::Halt)
    }
}

impl<M> From<M> for Envelope<M> {
    fn from(message: M) -> Self {
        Envelope::Data(message)
    }
}

/// Side-effect free view of the head of a mailbox.
#[derive(Debug, Clone, PartialEq)]
pub enum Peeked<M> {
    Data(M),
    Stop,
    Halt,
    Sync,
}

/// Single-shot "message available" signal.
struct Gate {
    signal: Option<oneshot::Sender<()>>,
    wait: Option<oneshot::Receiver<()>>,
}

impl Gate {
    fn new() -> Self {
        let (signal, wait) = oneshot::channel();
        Self {
            signal: Some(signal),
            wait: Some(wait),
        }
    }

    /// Releases the gate. Opening an already open gate does nothing.
    fn open(&mut self) {
        if let Some(signal) = self.signal.take() {
            let _ = signal.send(());
        }
    }

    /// Hands out the waiting side. If a previous wait already took it, a
    /// fresh gate is allocated.
    fn arm(&mut self) -> oneshot::Receiver<()> {
        match self.wait.take() {
            Some(wait) => wait,
            None => {
                let (signal, wait) = oneshot::channel();
                self.signal = Some(signal);
                wait
            }
        }
    }
}

struct Inner<M> {
    queue: VecDeque<Envelope<M>>,
    gate: Gate,
}

/// Message queue of a consumer.
pub struct Mailbox<M> {
    inner: Mutex<Inner<M>>,
}

impl<M> Default for Mailbox<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Mailbox<M> {
    /// Creates an empty mailbox with an armed gate.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                gate: Gate::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<M>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues an entry and opens the gate.
    ///
    /// Entries go to the tail, except [`Envelope::Halt`] which goes to the
    /// head so it preempts the backlog. A halt sent while another halt is
    /// still waiting at the head is dropped.
    pub fn send(&self, entry: Envelope<M>) {
        let mut inner = self.lock();
        match entry {
            Envelope::Halt => {
                if matches!(inner.queue.front(), Some(Envelope::Halt)) {
                    debug!("Halt already pending, ignoring.");
                } else {
                    inner.queue.push_front(Envelope::Halt);
                }
            }
            entry => inner.queue.push_back(entry),
        }
        inner.gate.open();
    }

    /// Drops every queued entry and opens the gate.
    ///
    /// Pending sync requests are dropped with the rest; their callers resume
    /// without the barrier having been reached.
    pub fn purge(&self) {
        let mut inner = self.lock();
        let dropped = inner.queue.len();
        inner.queue.clear();
        inner.gate.open();
        debug!("Purged {} queued entries.", dropped);
    }

    /// Removes and returns the head, suspending while the queue is empty.
    ///
    /// The boolean is true when the returned entry is terminal (stop or
    /// halt). Only one task may await this at a time.
    pub async fn next(&self) -> (Envelope<M>, bool) {
        loop {
            let wait = {
                let mut inner = self.lock();
                if let Some(entry) = inner.queue.pop_front() {
                    inner.gate = Gate::new();
                    let terminal = entry.is_terminal();
                    return (entry, terminal);
                }
                inner.gate.arm()
            };
            // A dropped signal means the gate was replaced; re-check either way.
            let _ = wait.await;
        }
    }

    /// Number of queued entries, control entries included.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }
}

impl<M: Clone> Mailbox<M> {
    /// Returns a view of the head entry without removing it.
    pub fn peek(&self) -> Option<Peeked<M>> {
        self.lock().queue.front().map(|entry| match entry {
            Envelope::Data(message) => Peeked::Data(message.clone()),
            Envelope::Stop => Peeked::Stop,
            Envelope::Halt => Peeked::Halt,
            Envelope::Sync(_) => Peeked::Sync,
        })
    }
}
