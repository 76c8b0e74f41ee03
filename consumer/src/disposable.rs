// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Disposable resources
//!
//! Plain ownership tree used to release subscriptions and consumers together.
//! Each node is owned by exactly one [`Disposables`] list; disposing a list
//! walks it depth-first, newest resource first.
//!

use tracing::debug;

/// A resource that can be released explicitly.
pub trait Disposable {
    /// Releases the resource. Calling it twice must be harmless.
    fn dispose(&mut self);
}

/// Boxed disposable.
pub type BoxedDisposable = Box<dyn Disposable + Send>;

/// Ordered list of owned resources.
#[derive(Default)]
pub struct Disposables {
    children: Vec<BoxedDisposable>,
    disposed: bool,
}

impl Disposables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes ownership of a resource. A list that was already disposed
    /// releases the resource on the spot.
    pub fn add(&mut self, mut child: impl Disposable + Send + 'static) {
        if self.disposed {
            debug!("Owner already disposed, releasing resource immediately.");
            child.dispose();
        } else {
            self.children.push(Box::new(child));
        }
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl Disposable for Disposables {
    fn dispose(&mut self) {
        self.disposed = true;
        while let Some(mut child) = self.children.pop() {
            child.dispose();
        }
    }
}

impl Drop for Disposables {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{Arc, Mutex};

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Disposable for Recorder {
        fn dispose(&mut self) {
            self.log.lock().unwrap().push(self.name);
        }
    }

    #[test]
    fn test_dispose_depth_first() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut root = Disposables::new();
        let mut branch = Disposables::new();
        branch.add(Recorder { name: "leaf", log: log.clone() });
        root.add(Recorder { name: "first", log: log.clone() });
        root.add(branch);
        root.add(Recorder { name: "last", log: log.clone() });
        assert_eq!(root.len(), 3);

        root.dispose();
        assert!(root.is_disposed());
        assert!(root.is_empty());
        assert_eq!(*log.lock().unwrap(), vec!["last", "leaf", "first"]);
    }

    #[test]
    fn test_add_after_dispose() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut root = Disposables::new();
        root.dispose();
        root.add(Recorder { name: "late", log: log.clone() });
        assert!(root.is_empty());
        assert_eq!(*log.lock().unwrap(), vec!["late"]);
    }

    #[test]
    fn test_drop_disposes() {
        let log = Arc::new(Mutex::new(Vec::new()));
        {
            let mut root = Disposables::new();
            root.add(Recorder { name: "owned", log: log.clone() });
        }
        assert_eq!(*log.lock().unwrap(), vec!["owned"]);
    }
}
