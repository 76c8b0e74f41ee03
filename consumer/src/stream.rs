// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Bridge from an external stream into a consumer's mailbox.

use crate::{mailbox::Envelope, sink::Subscription, Consumer, Handler};

use futures::{Stream, StreamExt};
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// What happens when an absorbed stream ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AbsorbMode {
    /// Only forward items.
    #[default]
    Forward,
    /// Forward items, then send a stop token once the stream is exhausted.
    StopOnComplete,
}

impl<H: Handler> Consumer<H> {
    /// Forwards every item of `stream` into the mailbox from a background
    /// task.
    ///
    /// Cancelling the returned subscription stops forwarding; no stop token
    /// is sent in that case.
    pub fn absorb<S>(&self, stream: S, mode: AbsorbMode) -> Subscription
    where
        S: Stream<Item = H::Message> + Send + 'static,
    {
        let token = CancellationToken::new();
        let subscription = Subscription::new(token.clone());
        let consumer = self.clone();
        tokio::spawn(async move {
            let mut stream = Box::pin(stream);
            loop {
                select! {
                    biased;
                    _ = token.cancelled() => {
                        debug!("Stream into consumer {} cancelled.", consumer.name());
                        break;
                    }
                    item = stream.next() => match item {
                        Some(message) => consumer.next(message),
                        None => {
                            debug!("Stream into consumer {} completed.", consumer.name());
                            if mode == AbsorbMode::StopOnComplete {
                                consumer.send(Envelope::<H::Message>::Stop);
                            }
                            break;
                        }
                    }
                }
            }
        });
        subscription
    }
}
