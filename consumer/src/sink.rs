// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Output sink and observer pattern implementation.
//!
//! Handler results are broadcast as [`Emission`]s. A [`Sink`] runs in its own
//! task, receives emissions from a broadcast channel and forwards them to an
//! [`Observer`]. Cancelling the [`Subscription`] detaches the observer without
//! touching the consumer's mailbox.

use crate::{disposable::Disposable, Error, Output};

use async_trait::async_trait;
use tokio::{
    select,
    sync::broadcast::{error::RecvError, Receiver as EmissionReceiver},
};
use tokio_util::sync::CancellationToken;

use tracing::{debug, warn};

use std::marker::PhantomData;

/// Item broadcast by a consumer to its observers.
#[derive(Debug, Clone, PartialEq)]
pub enum Emission<O> {
    /// Non-empty handler result, or an item pushed through the context.
    Next(O),
    /// A handler failed on one message. The loop keeps running.
    Error(Error),
    /// A loop ended on a stop token.
    Complete,
}

/// Receiver of consumer outputs.
///
/// Every method has an empty default, so an observer only implements the
/// notifications it cares about.
#[async_trait]
pub trait Observer<O: Output>: Send + Sync + 'static {
    /// Called for every output.
    async fn next(&self, _item: O) {}

    /// Called when a handler failed.
    async fn error(&self, _error: Error) {}

    /// Called when a loop ended on a stop token.
    async fn complete(&self) {}
}

/// Observer built from a plain sink function, only interested in outputs.
pub struct FnObserver<O, F> {
    sink: F,
    _phantom_output: PhantomData<fn(O)>,
}

/// Wraps a function so it can be subscribed as an observer.
pub fn observer_fn<O, F>(sink: F) -> FnObserver<O, F>
where
    O: Output,
    F: Fn(O) + Send + Sync + 'static,
{
    FnObserver {
        sink,
        _phantom_output: PhantomData,
    }
}

#[async_trait]
impl<O, F> Observer<O> for FnObserver<O, F>
where
    O: Output,
    F: Fn(O) + Send + Sync + 'static,
{
    async fn next(&self, item: O) {
        (self.sink)(item);
    }
}

/// A sink that receives emissions from a consumer and notifies an observer.
pub struct Sink<O: Output> {
    /// The observer that will be notified.
    observer: Box<dyn Observer<O>>,
    /// The broadcast receiver for consumer emissions.
    receiver: EmissionReceiver<Emission<O>>,
    /// Cancelled when the subscription is released.
    token: CancellationToken,
}

impl<O: Output> Sink<O> {
    /// Creates a new sink with the given receiver and observer.
    pub fn new(
        receiver: EmissionReceiver<Emission<O>>,
        observer: impl Observer<O>,
    ) -> Self {
        Sink {
            observer: Box::new(observer),
            receiver,
            token: CancellationToken::new(),
        }
    }

    /// Runs the sink in a background task and returns its subscription.
    pub fn spawn(mut self) -> Subscription {
        let subscription = Subscription::new(self.token.clone());
        tokio::spawn(async move {
            self.run().await;
        });
        subscription
    }

    /// Runs the sink's processing loop.
    ///
    /// Returns when the emission channel is closed (the last consumer handle
    /// was dropped and its loop ended) or the subscription is cancelled.
    /// Lagged receivers skip the items they missed, with a warning.
    pub async fn run(&mut self) {
        loop {
            select! {
                biased;
                _ = self.token.cancelled() => {
                    debug!("Subscription cancelled.");
                    break;
                }
                received = self.receiver.recv() => match received {
                    Ok(Emission::Next(item)) => {
                        debug!("Received output: {:?}. Notify to the observer.", item);
                        self.observer.next(item).await;
                    }
                    Ok(Emission::Error(error)) => {
                        self.observer.error(error).await;
                    }
                    Ok(Emission::Complete) => {
                        self.observer.complete().await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Observer lagged behind, skipped {} emissions.", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }
}

/// Handle to a running sink or stream bridge.
///
/// Dropping the handle leaves the task running; call
/// [`Subscription::unsubscribe`] or dispose it to stop it.
#[derive(Debug, Clone)]
pub struct Subscription {
    token: CancellationToken,
}

impl Subscription {
    pub(crate) fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Detaches the task behind this subscription.
    pub fn unsubscribe(&self) {
        self.token.cancel();
    }

    /// True once the subscription was cancelled.
    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Disposable for Subscription {
    fn dispose(&mut self) {
        self.unsubscribe();
    }
}
