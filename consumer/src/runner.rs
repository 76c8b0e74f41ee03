// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Consumption loop
//!
//! The `Runner` owns everything a consumer is made of: the mailbox, the
//! handler, the emission channel and the slot of the active loop. Every
//! [`Consumer`](crate::Consumer) clone shares one handle to it; the active
//! loop holds the runner directly, so it lives until that loop ends after
//! the last handle is gone.
//!
//! A loop is one spawned task:
//!
//! 1. Lock the handler for the lifetime of the loop.
//! 2. Take the next entry from the mailbox, parking while it is empty.
//! 3. Data goes to the handler; sync requests are resolved in place.
//! 4. Stop or halt end the loop, which then clears its own slot.
//!
//! Handler failures and panics are reported per message and never end the
//! loop. A panic escaping the loop itself is reported and the loop ends as if
//! it had been stopped. Neither reaches the callers of `wait`.
//!

use crate::{
    disposable::Disposables,
    mailbox::{Envelope, Mailbox},
    sink::Emission,
    Context, ConsumerOptions, Error, Handler,
};

use futures::{
    future::{BoxFuture, Shared},
    FutureExt,
};
use tokio::sync::{broadcast, Mutex as HandlerLock};
use tracing::{debug, error};

use std::{
    panic::AssertUnwindSafe,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

/// Completion of a loop, awaitable by any number of callers.
pub(crate) type LoopDone = Shared<BoxFuture<'static, ()>>;

/// Why a loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Stopped,
    Halted,
}

/// Handle of the active loop.
struct ActiveLoop {
    generation: u64,
    done: LoopDone,
}

#[derive(Default)]
struct LoopSlot {
    generation: u64,
    active: Option<ActiveLoop>,
}

pub(crate) struct Runner<H: Handler> {
    name: String,
    mailbox: Mailbox<H::Message>,
    handler: HandlerLock<H>,
    emitter: broadcast::Sender<Emission<H::Output>>,
    slot: Mutex<LoopSlot>,
    resources: Mutex<Disposables>,
}

impl<H: Handler> Runner<H> {
    pub(crate) fn new(handler: H, options: ConsumerOptions) -> Self {
        debug!("Creating new consumer {}.", options.name);
        let (emitter, _) = broadcast::channel(options.event_capacity.max(1));
        Self {
            name: options.name,
            mailbox: Mailbox::new(),
            handler: HandlerLock::new(handler),
            emitter,
            slot: Mutex::new(LoopSlot::default()),
            resources: Mutex::new(Disposables::new()),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn mailbox(&self) -> &Mailbox<H::Message> {
        &self.mailbox
    }

    pub(crate) fn emitter(&self) -> &broadcast::Sender<Emission<H::Output>> {
        &self.emitter
    }

    pub(crate) fn resources(&self) -> MutexGuard<'_, Disposables> {
        self.resources.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot(&self) -> MutexGuard<'_, LoopSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_running(&self) -> bool {
        self.slot().active.is_some()
    }

    /// Starts a loop unless one is already active.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub(crate) fn start(self: &Arc<Self>) {
        let mut slot = self.slot();
        if slot.active.is_some() {
            debug!("Consumer {} is already running.", self.name);
            return;
        }
        slot.generation += 1;
        let generation = slot.generation;

        let runner = Arc::clone(self);
        let task = tokio::spawn(async move { runner.run(generation).await });
        let name = self.name.clone();
        let done = async move {
            if let Err(err) = task.await {
                error!("Consumer {} loop task was lost: {}", name, err);
            }
        }
        .boxed()
        .shared();

        slot.active = Some(ActiveLoop { generation, done });
    }

    /// Future resolving when the active loop, if any, is over.
    pub(crate) fn done(&self) -> Option<LoopDone> {
        self.slot().active.as_ref().map(|active| active.done.clone())
    }

    async fn run(self: Arc<Self>, generation: u64) {
        debug!("Consumer {} is running.", self.name);
        match AssertUnwindSafe(self.consume()).catch_unwind().await {
            Ok(Exit::Stopped) => {
                debug!("Consumer {} is stopped.", self.name);
                self.emit(Emission::Complete);
            }
            Ok(Exit::Halted) => {
                debug!("Consumer {} is halted.", self.name);
            }
            Err(payload) => {
                error!(
                    "Consumer {} loop failed: {}",
                    self.name,
                    Error::from_panic(payload)
                );
            }
        }
        self.finish(generation);
    }

    async fn consume(&self) -> Exit {
        let mut handler = self.handler.lock().await;
        let mut ctx = Context::new(self.name.clone(), self.emitter.clone());
        loop {
            let (entry, terminal) = self.mailbox.next().await;
            if terminal {
                return match entry {
                    Envelope::Halt => Exit::Halted,
                    _ => Exit::Stopped,
                };
            }
            match entry {
                Envelope::Data(message) => {
                    self.dispatch(&mut handler, message, &mut ctx).await;
                }
                Envelope::Sync(signal) => {
                    if signal.send(()).is_err() {
                        debug!("Sync caller of consumer {} went away.", self.name);
                    }
                }
                // Terminal entries were handled above.
                Envelope::Stop | Envelope::Halt => {}
            }
        }
    }

    async fn dispatch(
        &self,
        handler: &mut H,
        message: H::Message,
        ctx: &mut Context<H::Output>,
    ) {
        let result = AssertUnwindSafe(handler.handle(message, ctx))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(Error::from_panic(payload)));
        match result {
            Ok(Some(output)) => ctx.next(output),
            Ok(None) => {}
            Err(err) => {
                error!("Consumer {} handler failed: {}", self.name, err);
                self.emit(Emission::Error(err));
            }
        }
    }

    fn emit(&self, emission: Emission<H::Output>) {
        // No observers is not a failure.
        let _ = self.emitter.send(emission);
    }

    /// Clears the slot if it still belongs to this loop.
    fn finish(&self, generation: u64) {
        let mut slot = self.slot();
        if slot
            .active
            .as_ref()
            .is_some_and(|active| active.generation == generation)
        {
            slot.active = None;
        }
    }
}
