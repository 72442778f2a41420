//! Send-with-retry behavior of BatchSender.

use super::harness::{events, registry_of, MockPool, SendBehavior};
use crate::config::PipelineConfig;
use crate::counters::ThroughputCounters;
use crate::event::EventBatch;
use crate::sender::{BatchSender, SendOutcome};
use std::sync::Arc;
use std::time::Duration;

fn sender_for(pools: &[Arc<MockPool>]) -> (BatchSender, Arc<ThroughputCounters>) {
    let counters = Arc::new(ThroughputCounters::new());
    let sender = BatchSender::new(
        "orders",
        registry_of(pools),
        counters.clone(),
        &PipelineConfig::default(),
    );
    (sender, counters)
}

#[tokio::test]
async fn delivers_on_first_attempt() {
    let pool = Arc::new(MockPool::new("a:1"));
    let (sender, counters) = sender_for(&[pool.clone()]);

    let outcome = sender.send(EventBatch::new(events(&["A", "B", "C"]))).await;

    assert_eq!(outcome, SendOutcome::Delivered { attempts: 1 });
    assert_eq!(counters.total_success(), 3);
    assert_eq!(counters.total_failure(), 0);
    assert_eq!(pool.acquired(), 1);
    assert_eq!(pool.released(), 1);
    assert_eq!(pool.broken(), 0);
    assert_eq!(pool.delivered()[0].bodies(), vec!["A", "B", "C"]);
}

#[tokio::test]
async fn always_failing_batch_is_retried_then_dropped() {
    let pool = Arc::new(MockPool::new("a:1"));
    pool.set_default(SendBehavior::Fail);
    let (sender, counters) = sender_for(&[pool.clone()]);

    let outcome = sender.send(EventBatch::new(events(&["A", "B"]))).await;

    assert_eq!(outcome, SendOutcome::Dropped { attempts: 3 });
    assert_eq!(pool.acquired(), 3);
    assert_eq!(pool.broken(), 3);
    assert_eq!(pool.released(), 0);
    assert_eq!(pool.sends().len(), 3);
    // Failures are counted per event, once per failed attempt
    assert_eq!(counters.total_failure(), 6);
    assert_eq!(counters.total_success(), 0);
}

#[tokio::test]
async fn success_on_attempt_k_counts_k_minus_one_failures() {
    for k in 1..=3u32 {
        let pool = Arc::new(MockPool::new("a:1"));
        for _ in 1..k {
            pool.queue(SendBehavior::Fail);
        }
        pool.set_default(SendBehavior::Ok);
        let (sender, counters) = sender_for(&[pool.clone()]);

        let outcome = sender.send(EventBatch::new(events(&["A", "B", "C", "D"]))).await;

        assert_eq!(outcome, SendOutcome::Delivered { attempts: k });
        assert_eq!(counters.total_success(), 4, "k = {}", k);
        assert_eq!(counters.total_failure(), 4 * (k as i64 - 1), "k = {}", k);
        assert_eq!(pool.broken(), (k - 1) as usize);
        assert_eq!(pool.released(), 1);
    }
}

#[tokio::test]
async fn transport_panic_evicts_client_and_retries() {
    let pool = Arc::new(MockPool::new("a:1"));
    pool.queue(SendBehavior::Panic);
    let (sender, counters) = sender_for(&[pool.clone()]);

    let outcome = sender.send(EventBatch::new(events(&["A", "B"]))).await;

    assert_eq!(outcome, SendOutcome::Delivered { attempts: 2 });
    assert_eq!(pool.broken(), 1);
    assert_eq!(pool.released(), 1);
    assert_eq!(pool.outstanding(), 0);
    assert_eq!(counters.total_failure(), 2);
    assert_eq!(counters.total_success(), 2);
}

#[tokio::test]
async fn acquire_failure_uses_attempt_but_not_failure_counter() {
    let pool = Arc::new(MockPool::new("a:1"));
    pool.fail_next_acquires(2);
    let (sender, counters) = sender_for(&[pool.clone()]);

    let outcome = sender.send(EventBatch::new(events(&["A"]))).await;

    assert_eq!(outcome, SendOutcome::Delivered { attempts: 3 });
    assert_eq!(pool.acquire_failures(), 2);
    assert_eq!(counters.total_failure(), 0);
    assert_eq!(counters.total_success(), 1);
}

#[tokio::test]
async fn acquire_failures_exhaust_attempts() {
    let pool = Arc::new(MockPool::new("a:1"));
    pool.fail_next_acquires(10);
    let (sender, counters) = sender_for(&[pool.clone()]);

    let outcome = sender.send(EventBatch::new(events(&["A"]))).await;

    assert_eq!(outcome, SendOutcome::Dropped { attempts: 3 });
    assert_eq!(pool.acquire_failures(), 3);
    assert_eq!(pool.acquired(), 0);
    assert_eq!(counters.total_failure(), 0);
    assert_eq!(counters.total_success(), 0);
}

#[tokio::test(start_paused = true)]
async fn acquire_waits_at_most_the_configured_timeout() {
    let pool = Arc::new(MockPool::new("a:1"));
    pool.set_hang_acquire(true);
    let (sender, _counters) = sender_for(&[pool.clone()]);

    let start = tokio::time::Instant::now();
    let outcome = sender.send(EventBatch::new(events(&["A"]))).await;
    let elapsed = start.elapsed();

    assert_eq!(outcome, SendOutcome::Dropped { attempts: 3 });
    assert_eq!(pool.acquired(), 0);
    assert!(elapsed >= Duration::from_secs(15), "took {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(16), "took {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn acquire_is_bounded_when_pool_ignores_timeout() {
    let pool = Arc::new(MockPool::new("a:1"));
    pool.set_stall_acquire(true);
    let (sender, counters) = sender_for(&[pool.clone()]);

    let start = tokio::time::Instant::now();
    let outcome = sender.send(EventBatch::new(events(&["A", "B"]))).await;
    let elapsed = start.elapsed();

    assert_eq!(outcome, SendOutcome::Dropped { attempts: 3 });
    assert_eq!(pool.acquired(), 0);
    assert_eq!(counters.total_failure(), 0);
    assert!(elapsed >= Duration::from_secs(15), "took {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(16), "took {:?}", elapsed);
}

#[tokio::test]
async fn retries_rotate_across_links() {
    let a = Arc::new(MockPool::new("a:1"));
    let b = Arc::new(MockPool::new("b:2"));
    a.set_default(SendBehavior::Fail);
    b.set_default(SendBehavior::Fail);
    let (sender, _counters) = sender_for(&[a.clone(), b.clone()]);

    sender.send(EventBatch::new(events(&["A"]))).await;

    // Rotation starts at the most recently added link
    let a_sends = a.sends().len();
    let b_sends = b.sends().len();
    assert_eq!(b_sends, 2);
    assert_eq!(a_sends, 1);
    assert_eq!(a.broken() + b.broken(), 3);
}

#[tokio::test]
async fn failover_to_healthy_link() {
    let bad = Arc::new(MockPool::new("bad:1"));
    let good = Arc::new(MockPool::new("good:2"));
    bad.set_default(SendBehavior::Fail);
    // `bad` is added last, so it is tried first
    let (sender, counters) = sender_for(&[good.clone(), bad.clone()]);

    let outcome = sender.send(EventBatch::new(events(&["A", "B"]))).await;

    assert_eq!(outcome, SendOutcome::Delivered { attempts: 2 });
    assert_eq!(bad.broken(), 1);
    assert_eq!(good.released(), 1);
    assert_eq!(good.delivered().len(), 1);
    assert_eq!(counters.total_failure(), 2);
    assert_eq!(counters.total_success(), 2);
}

#[tokio::test]
async fn every_acquired_client_is_returned() {
    let pool = Arc::new(MockPool::new("a:1"));
    pool.queue(SendBehavior::Fail);
    pool.queue(SendBehavior::Panic);
    pool.queue(SendBehavior::Ok);
    let (sender, _counters) = sender_for(&[pool.clone()]);

    sender.send(EventBatch::new(events(&["A"]))).await;
    sender.send(EventBatch::new(events(&["B"]))).await;

    assert_eq!(pool.acquired(), 4);
    assert_eq!(pool.outstanding(), 0);
}
