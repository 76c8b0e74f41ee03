// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Single-consumer actors for Tokio.
//! Re-exports the `consumer` crate: an ordered mailbox drained by one loop, with in-band
//! stop, halt and sync control, plus the observer, disposal and stream bridges around it.

pub use consumer::{
    handler_fn, observer_fn, spawn, spawn_with, AbsorbMode, BoxedDisposable,
    Consumer, ConsumerOptions, Context, Disposable, Disposables, Emission,
    Envelope, Error as ConsumerError, FnObserver, Handler, HandlerFn, Mailbox,
    Message, Observer, Output, Peeked, Sink, Subscription,
};
