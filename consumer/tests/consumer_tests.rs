// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

// Integration tests for the consumer loop and its control protocol.

use consumer::{
    spawn, Consumer, ConsumerOptions, Context, Envelope, Error, Handler,
    Peeked,
};

use async_trait::async_trait;

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

// Defines a handler counting and recording every message.
#[derive(Clone, Default)]
pub struct Recorder {
    pub count: Arc<AtomicUsize>,
    pub seen: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Handler for Recorder {
    type Message = String;
    type Output = usize;

    async fn handle(
        &mut self,
        message: String,
        _ctx: &mut Context<usize>,
    ) -> Result<Option<usize>, Error> {
        self.seen.lock().unwrap().push(message);
        Ok(Some(self.count.fetch_add(1, Ordering::SeqCst) + 1))
    }
}

#[tokio::test]
async fn test_can_receive_and_stop() {
    let recorder = Recorder::default();
    let bob = spawn(recorder.clone());

    bob.send("hello".to_owned());
    bob.send("world".to_owned());
    bob.send(Envelope::Stop);
    bob.wait().await;

    assert_eq!(recorder.count(), 2);
    assert_eq!(recorder.seen(), vec!["hello", "world"]);
    assert!(!bob.is_running());
}

#[tokio::test]
async fn test_start_while_running_is_noop() {
    let recorder = Recorder::default();
    let bob = spawn(recorder.clone());

    bob.start();
    bob.start();
    bob.send("hello".to_owned());
    bob.send("world".to_owned());
    bob.send(Envelope::Stop);
    bob.wait().await;

    assert_eq!(recorder.count(), 2);
}

#[tokio::test]
async fn test_can_restart_and_receive_messages() {
    let recorder = Recorder::default();
    let bob = spawn(recorder.clone());

    for round in 0..2 {
        if round > 0 {
            bob.start();
        }
        bob.send("hello".to_owned());
        bob.send("world".to_owned());
        bob.stop().await;
        assert!(!bob.is_running());
    }

    assert_eq!(recorder.count(), 4);
}

#[tokio::test]
async fn test_pause_drops_backlog() {
    let recorder = Recorder::default();
    let bob = spawn(recorder.clone());

    for _ in 0..1000 {
        bob.send("hello".to_owned());
    }
    bob.send(Envelope::Halt);
    bob.wait().await;
    assert_eq!(bob.pending(), 1000);
    bob.purge();

    assert_eq!(recorder.count(), 0);
    assert_eq!(bob.pending(), 0);
    assert_eq!(bob.peek(), None);

    bob.start();
    for _ in 0..1000 {
        bob.send("again".to_owned());
    }
    bob.stop().await;
    assert_eq!(recorder.count(), 1000);
}

#[tokio::test]
async fn test_halt_keeps_backlog_until_restart() {
    let recorder = Recorder::default();
    let bob = Consumer::new(recorder.clone(), ConsumerOptions::default());

    for word in ["a", "b", "c"] {
        bob.send(word.to_owned());
    }
    bob.send(Envelope::Halt);
    bob.send(Envelope::Halt);
    bob.send("d".to_owned());
    assert_eq!(bob.peek(), Some(Peeked::Halt));
    assert_eq!(bob.pending(), 5);

    bob.start();
    bob.wait().await;
    assert_eq!(recorder.count(), 0);
    assert_eq!(bob.pending(), 4);

    bob.start();
    bob.stop().await;
    assert_eq!(recorder.seen(), vec!["a", "b", "c", "d"]);
}

#[tokio::test]
async fn test_pause_interrupts_running_backlog() {
    let recorder = Recorder::default();
    let bob = spawn(recorder.clone());

    bob.send("first".to_owned());
    bob.sync().await;
    for _ in 0..100 {
        bob.send("late".to_owned());
    }
    bob.pause().await;

    assert_eq!(recorder.count(), 1);
    assert_eq!(bob.pending(), 100);
}

#[tokio::test]
async fn test_can_sync_and_continue_processing() {
    let recorder = Recorder::default();
    let bob = spawn(recorder.clone());

    for i in 1..=1000 {
        bob.send("hello".to_owned());
        if i == 500 {
            bob.sync().await;
            assert_eq!(recorder.count(), 500);
            assert!(bob.is_running());
        }
    }
    bob.send(Envelope::Stop);
    bob.wait().await;
    assert_eq!(recorder.count(), 1000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sync_after_concurrent_producers() {
    let recorder = Recorder::default();
    let bob = spawn(recorder.clone());

    let producers: Vec<_> = (0..4)
        .map(|producer| {
            let bob = bob.clone();
            tokio::spawn(async move {
                for i in 0..125 {
                    bob.send(format!("{}-{}", producer, i));
                    if i % 25 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            })
        })
        .collect();
    for producer in producers {
        producer.await.unwrap();
    }

    bob.sync().await;
    assert_eq!(recorder.count(), 500);

    // Each producer's messages arrive in its own send order.
    let seen = recorder.seen();
    for producer in 0..4 {
        let prefix = format!("{}-", producer);
        let order: Vec<usize> = seen
            .iter()
            .filter_map(|message| message.strip_prefix(&prefix))
            .map(|index| index.parse().unwrap())
            .collect();
        assert_eq!(order, (0..125).collect::<Vec<_>>());
    }
    bob.stop().await;
}

#[tokio::test]
async fn test_sync_waits_for_start() {
    let recorder = Recorder::default();
    let bob = Consumer::new(recorder.clone(), ConsumerOptions::default());
    bob.send("queued".to_owned());

    let pending = tokio::time::timeout(Duration::from_millis(50), bob.sync()).await;
    assert!(pending.is_err());

    bob.start();
    bob.sync().await;
    assert_eq!(recorder.count(), 1);
    bob.stop().await;
}

#[tokio::test]
async fn test_purge_releases_sync_callers() {
    let recorder = Recorder::default();
    let bob = Consumer::new(recorder.clone(), ConsumerOptions::default());

    let syncing = {
        let bob = bob.clone();
        tokio::spawn(async move { bob.sync().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(bob.peek(), Some(Peeked::Sync));

    bob.purge();
    syncing.await.unwrap();
    assert_eq!(recorder.count(), 0);
}

#[tokio::test]
async fn test_wait_when_idle_resolves() {
    let bob = Consumer::new(Recorder::default(), ConsumerOptions::default());
    bob.wait().await;
    bob.stop().await;
    // Stop stays queued for the next loop.
    assert_eq!(bob.peek(), Some(Peeked::Stop));
}

// Defines a handler tracking how many invocations overlap.
#[derive(Clone, Default)]
pub struct Overlap {
    pub active: Arc<AtomicUsize>,
    pub max_active: Arc<AtomicUsize>,
    pub count: Arc<AtomicUsize>,
}

#[async_trait]
impl Handler for Overlap {
    type Message = u32;
    type Output = ();

    async fn handle(
        &mut self,
        _message: u32,
        _ctx: &mut Context<()>,
    ) -> Result<Option<()>, Error> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_repeated_start_never_doubles_delivery() {
    let overlap = Overlap::default();
    let bob = spawn(overlap.clone());

    let starters: Vec<_> = (0..4)
        .map(|_| {
            let bob = bob.clone();
            tokio::spawn(async move {
                for i in 0..250 {
                    bob.start();
                    bob.send(i);
                }
            })
        })
        .collect();
    for starter in starters {
        starter.await.unwrap();
    }
    bob.stop().await;

    assert_eq!(overlap.count.load(Ordering::SeqCst), 1000);
    assert_eq!(overlap.max_active.load(Ordering::SeqCst), 1);
}

// Defines a handler failing on every message.
#[derive(Clone, Default)]
pub struct AlwaysFails {
    pub attempts: Arc<AtomicUsize>,
}

#[async_trait]
impl Handler for AlwaysFails {
    type Message = u32;
    type Output = ();

    async fn handle(
        &mut self,
        message: u32,
        _ctx: &mut Context<()>,
    ) -> Result<Option<()>, Error> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(Error::Functional(format!("cannot handle {}", message)))
    }
}

#[tokio::test]
async fn test_wait_resolves_when_every_message_fails() {
    let failing = AlwaysFails::default();
    let bob = spawn(failing.clone());

    for i in 0..10 {
        bob.send(i);
    }
    bob.sync().await;
    bob.stop().await;

    assert_eq!(failing.attempts.load(Ordering::SeqCst), 10);
    assert!(!bob.is_running());
}
