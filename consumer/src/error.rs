// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Errors module
//!
//! Errors never travel back to the callers of `send`, `stop`, `halt`, `sync` or
//! `wait`. They are what handlers return, what gets logged, and what observers
//! receive through [`Emission::Error`](crate::Emission::Error).
//!

use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::any::Any;

/// Error type for consumers and their handlers.
#[derive(Clone, Debug, Error, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// A handler failed while processing a message.
    #[error("Handler failed to process message: {0}.")]
    Handler(String),
    /// A handler or the consumption loop panicked.
    #[error("Panic while consuming messages: {0}.")]
    Panicked(String),
    /// Error that does not compromise the operation of the consumer.
    #[error("Error: {0}")]
    Functional(String),
}

impl Error {
    /// Builds a [`Error::Panicked`] from a caught panic payload.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let text = if let Some(text) = payload.downcast_ref::<&str>() {
            (*text).to_owned()
        } else if let Some(text) = payload.downcast_ref::<String>() {
            text.clone()
        } else {
            "unknown panic payload".to_owned()
        };
        Error::Panicked(text)
    }
}
