// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Consumer
//!
//! The user-facing side of the crate: the [`Handler`] trait implemented by
//! message processing code, the [`Context`] handed to it, and the
//! [`Consumer`] handle used to feed and control the consumption loop.
//!

use crate::{
    disposable::Disposable,
    mailbox::{Envelope, Peeked},
    runner::Runner,
    sink::{Emission, Observer, Sink, Subscription},
    Error,
};

use async_trait::async_trait;
use tokio::sync::{broadcast, oneshot};
use tracing::debug;

use std::{fmt::Debug, marker::PhantomData, sync::Arc};

/// Default name of a consumer.
pub const DEFAULT_NAME: &str = "consumer";

/// Default capacity of the emission channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 10000;

/// Payload accepted by a consumer.
///
/// Implemented for every cloneable, thread-safe type.
pub trait Message: Clone + Send + Sync + 'static {}

impl<T> Message for T where T: Clone + Send + Sync + 'static {}

/// Result produced by a handler and broadcast to observers.
///
/// Implemented for every cloneable, printable, thread-safe type.
pub trait Output: Clone + Debug + Send + Sync + 'static {}

impl<T> Output for T where T: Clone + Debug + Send + Sync + 'static {}

/// Message processing logic of a consumer.
///
/// `handle` is called once per data message, in send order, never
/// concurrently. A returned `Some` is broadcast to observers. A returned error
/// is logged and broadcast as [`Emission::Error`]; the next message is
/// processed as usual.
///
/// # Examples
///
/// ```ignore
/// struct Doubler;
///
/// #[async_trait]
/// impl Handler for Doubler {
///     type Message = u64;
///     type Output = u64;
///
///     async fn handle(
///         &mut self,
///         message: u64,
///         _ctx: &mut Context<u64>,
///     ) -> Result<Option<u64>, Error> {
///         Ok(Some(message * 2))
///     }
/// }
/// ```
#[async_trait]
pub trait Handler: Send + 'static {
    /// Payload type of the mailbox.
    type Message: Message;
    /// Result type broadcast to observers.
    type Output: Output;

    /// Processes one message.
    async fn handle(
        &mut self,
        message: Self::Message,
        ctx: &mut Context<Self::Output>,
    ) -> Result<Option<Self::Output>, Error>;
}

/// Handler built from a synchronous closure.
pub struct HandlerFn<M, O, F> {
    handle: F,
    _phantom: PhantomData<fn(M) -> O>,
}

/// Wraps a closure so it can be spawned as a consumer.
pub fn handler_fn<M, O, F>(handle: F) -> HandlerFn<M, O, F>
where
    M: Message,
    O: Output,
    F: FnMut(M, &mut Context<O>) -> Result<Option<O>, Error> + Send + 'static,
{
    HandlerFn {
        handle,
        _phantom: PhantomData,
    }
}

#[async_trait]
impl<M, O, F> Handler for HandlerFn<M, O, F>
where
    M: Message,
    O: Output,
    F: FnMut(M, &mut Context<O>) -> Result<Option<O>, Error> + Send + 'static,
{
    type Message = M;
    type Output = O;

    async fn handle(
        &mut self,
        message: M,
        ctx: &mut Context<O>,
    ) -> Result<Option<O>, Error> {
        (self.handle)(message, ctx)
    }
}

/// Per-loop context given to the handler.
pub struct Context<O> {
    name: String,
    emitter: broadcast::Sender<Emission<O>>,
}

impl<O: Output> Context<O> {
    pub(crate) fn new(name: String, emitter: broadcast::Sender<Emission<O>>) -> Self {
        Self { name, emitter }
    }

    /// Name of the consumer running the handler.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Broadcasts a derived item to observers, on top of whatever the handler
    /// returns.
    pub fn next(&self, item: O) {
        if self.emitter.send(Emission::Next(item)).is_err() {
            debug!("Consumer {} has no observers, output dropped.", self.name);
        }
    }
}

/// Construction options of a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerOptions {
    /// Name used in logs and exposed through the context.
    pub name: String,
    /// Capacity of the emission channel. Slow observers beyond it lag.
    pub event_capacity: usize,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_owned(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl ConsumerOptions {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}

/// Spawns a consumer with default options and starts its loop.
///
/// # Panics
///
/// Panics when called outside a Tokio runtime.
pub fn spawn<H: Handler>(handler: H) -> Consumer<H> {
    spawn_with(handler, ConsumerOptions::default())
}

/// Spawns a consumer with the given options and starts its loop.
///
/// # Panics
///
/// Panics when called outside a Tokio runtime.
pub fn spawn_with<H: Handler>(handler: H, options: ConsumerOptions) -> Consumer<H> {
    let consumer = Consumer::new(handler, options);
    consumer.start();
    consumer
}

/// Handle to a consumer: a private mailbox processed one message at a time
/// by a [`Handler`].
///
/// Cloning the handle does not clone the consumer. Sending is always accepted,
/// whether or not a loop is running; messages accumulate until the next
/// [`Consumer::start`].
///
/// Dropping the last handle queues a stop token: a running loop finishes the
/// backlog and ends, releasing the handler, the mailbox and the emission
/// channel.
pub struct Consumer<H: Handler> {
    handle: Arc<Handle<H>>,
}

/// Shared by every clone of a consumer handle. The loop task only holds the
/// runner, so this is dropped with the last user-facing handle.
struct Handle<H: Handler> {
    runner: Arc<Runner<H>>,
}

impl<H: Handler> Drop for Handle<H> {
    fn drop(&mut self) {
        debug!("Last handle of consumer {} dropped.", self.runner.name());
        self.runner.mailbox().send(Envelope::Stop);
    }
}

impl<H: Handler> Clone for Consumer<H> {
    fn clone(&self) -> Self {
        Self {
            handle: Arc::clone(&self.handle),
        }
    }
}

impl<H: Handler> Consumer<H> {
    /// Creates a consumer without starting it.
    pub fn new(handler: H, options: ConsumerOptions) -> Self {
        Self {
            handle: Arc::new(Handle {
                runner: Arc::new(Runner::new(handler, options)),
            }),
        }
    }

    fn runner(&self) -> &Arc<Runner<H>> {
        &self.handle.runner
    }

    /// Name of the consumer.
    pub fn name(&self) -> &str {
        self.runner().name()
    }

    /// Starts the consumption loop. Does nothing if a loop is already running.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn start(&self) {
        self.runner().start();
    }

    /// True while a loop is scheduled or running.
    pub fn is_running(&self) -> bool {
        self.runner().is_running()
    }

    /// Queues a data message or a control entry.
    pub fn send(&self, entry: impl Into<Envelope<H::Message>>) {
        self.post(entry.into());
    }

    /// Queues a data message.
    pub fn next(&self, message: H::Message) {
        self.post(Envelope::Data(message));
    }

    fn post(&self, entry: Envelope<H::Message>) {
        self.runner().mailbox().send(entry);
    }

    /// Lets the loop finish everything queued so far, then waits for it to
    /// end.
    pub async fn stop(&self) {
        self.post(Envelope::Stop);
        self.wait().await;
    }

    /// Ends the loop before any pending data and waits for it. Pending
    /// messages stay queued until [`Consumer::purge`] or the next start.
    pub async fn halt(&self) {
        self.post(Envelope::Halt);
        self.wait().await;
    }

    /// Same as [`Consumer::halt`].
    pub async fn pause(&self) {
        self.halt().await;
    }

    /// Waits until every message queued before this call has been handled.
    ///
    /// Suspends until a loop reaches the barrier. Returns early, without the
    /// guarantee, if the request is purged.
    pub async fn sync(&self) {
        let (signal, wait) = oneshot::channel();
        self.post(Envelope::Sync(signal));
        if wait.await.is_err() {
            debug!("Sync request of consumer {} was discarded.", self.name());
        }
    }

    /// Waits for the current loop to end. Resolves at once when idle and
    /// never fails.
    pub async fn wait(&self) {
        if let Some(done) = self.runner().done() {
            done.await;
        }
    }

    /// Discards every queued entry.
    pub fn purge(&self) {
        self.runner().mailbox().purge();
    }

    /// Number of queued entries.
    pub fn pending(&self) -> usize {
        self.runner().mailbox().len()
    }

    /// View of the next entry without removing it.
    pub fn peek(&self) -> Option<Peeked<H::Message>> {
        self.runner().mailbox().peek()
    }

    /// Raw receiver of everything this consumer emits from now on.
    pub fn events(&self) -> broadcast::Receiver<Emission<H::Output>> {
        self.runner().emitter().subscribe()
    }

    /// Runs an observer against this consumer's emissions.
    ///
    /// Emissions are buffered up to `event_capacity`. An observer that falls
    /// further behind misses the oldest ones; the sink logs a warning with the
    /// number skipped and carries on with the newest.
    ///
    /// The subscription is not owned by the consumer; pass it to
    /// [`Consumer::own`] to release it together with the consumer.
    pub fn subscribe(&self, observer: impl Observer<H::Output>) -> Subscription {
        Sink::new(self.events(), observer).spawn()
    }

    /// Attaches a resource released when the consumer is disposed.
    pub fn own(&self, resource: impl Disposable + Send + 'static) {
        self.runner().resources().add(resource);
    }
}

impl<H: Handler> Disposable for Consumer<H> {
    /// Drops the backlog, halts the loop and releases owned resources.
    fn dispose(&mut self) {
        debug!("Disposing consumer {}.", self.name());
        self.purge();
        self.post(Envelope::Halt);
        self.runner().resources().dispose();
    }
}
