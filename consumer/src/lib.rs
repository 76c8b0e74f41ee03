// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Consumer
//!
//! A single-consumer actor: a private, ordered mailbox processed one message
//! at a time by a user supplied [`Handler`], independently of the tasks that
//! feed it.
//!
//! ## Overview
//!
//! A [`Consumer`] owns exactly one [`Mailbox`] and at most one consumption
//! loop. Producers call [`Consumer::send`] from anywhere; the loop takes
//! entries in order and hands data to the handler. Control entries travel
//! in-band through the same queue:
//!
//! - [`Envelope::Stop`] is queued at the tail. Everything sent before it is
//!   handled, then the loop ends.
//! - [`Envelope::Halt`] is queued at the head. The loop ends before touching
//!   the backlog, which stays queued until [`Consumer::purge`] or the next
//!   [`Consumer::start`].
//! - [`Envelope::Sync`] is queued at the tail and resolved by the loop when
//!   reached, giving [`Consumer::sync`] a flush barrier that does not stop
//!   the consumer.
//!
//! A stopped or halted consumer can be started again. Messages sent while no
//! loop runs simply accumulate.
//!
//! ## Lifecycle
//!
//! ```text
//! IDLE --start--> RUNNING --stop/halt--> IDLE
//! ```
//!
//! `start` on a running consumer does nothing. `stop`, `halt` and `wait`
//! suspend the caller until the loop is idle again; `sync` suspends it until
//! the barrier is reached.
//!
//! ## Errors
//!
//! Handler errors and panics are logged with `tracing`, broadcast to
//! observers as [`Emission::Error`], and the loop moves on to the next
//! message. Nothing a handler does reaches the callers of `send`, `stop`,
//! `halt`, `sync` or `wait`.
//!
//! ## Example
//!
//! ```ignore
//! use consumer::{handler_fn, spawn, Context, Envelope};
//!
//! #[tokio::main]
//! async fn main() {
//!     let consumer = spawn(handler_fn(|word: String, _ctx: &mut Context<usize>| {
//!         Ok(Some(word.len()))
//!     }));
//!
//!     let subscription = consumer.subscribe(consumer::observer_fn(|len: usize| {
//!         println!("length {}", len);
//!     }));
//!     consumer.own(subscription);
//!
//!     consumer.send("hello".to_owned());
//!     consumer.send("world".to_owned());
//!     consumer.sync().await;
//!
//!     consumer.send(Envelope::Stop);
//!     consumer.wait().await;
//! }
//! ```
//!
//! ## Collaborators
//!
//! - [`Observer`], [`Sink`] and [`Subscription`] expose handler results.
//! - [`Disposable`] and [`Disposables`] release subscriptions and consumers
//!   together.
//! - [`Consumer::absorb`] feeds a consumer from any `futures::Stream`.
//!

mod consumer;
mod disposable;
mod error;
mod mailbox;
mod runner;
mod sink;
mod stream;

pub use consumer::{
    handler_fn, spawn, spawn_with, Consumer, ConsumerOptions, Context, Handler,
    HandlerFn, Message, Output, DEFAULT_EVENT_CAPACITY, DEFAULT_NAME,
};
pub use disposable::{BoxedDisposable, Disposable, Disposables};
pub use error::Error;
pub use mailbox::{Envelope, Mailbox, Peeked};
pub use sink::{observer_fn, Emission, FnObserver, Observer, Sink, Subscription};
pub use stream::AbsorbMode;
