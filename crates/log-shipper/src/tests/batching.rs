//! Size and time triggers observed through a running pipeline.

use super::harness::{bodies, event, registry_of, settle, wait_until, MockPool};
use crate::config::PipelineConfig;
use crate::pipeline::Pipeline;
use std::sync::Arc;
use std::time::Duration;

fn config(batch_size: usize, workers: usize) -> PipelineConfig {
    PipelineConfig {
        batch_size,
        workers,
        shutdown_grace_ms: 100,
        ..Default::default()
    }
}

fn delivered_bodies(pool: &MockPool) -> Vec<Vec<String>> {
    pool.delivered().iter().map(|s| s.bodies()).collect()
}

#[tokio::test(start_paused = true)]
async fn size_trigger_then_time_trigger() {
    let pool = Arc::new(MockPool::new("a:1"));
    let pipeline = Pipeline::new("orders", config(2, 1), registry_of(&[pool.clone()])).unwrap();
    pipeline.start().unwrap();

    for body in ["A", "B", "C"] {
        pipeline.enqueue(event(body)).await.unwrap();
    }
    wait_until(|| pool.delivered().len() == 1).await;
    assert_eq!(delivered_bodies(&pool), vec![vec!["A", "B"]]);

    // C waits for the next arrival after the flush interval
    settle().await;
    assert_eq!(pool.delivered().len(), 1);

    tokio::time::advance(Duration::from_secs(1)).await;
    pipeline.enqueue(event("D")).await.unwrap();
    wait_until(|| pool.delivered().len() == 2).await;
    assert_eq!(delivered_bodies(&pool)[1], vec!["C"]);

    pipeline.stop().await;
}

#[tokio::test(start_paused = true)]
async fn partial_batch_not_sent_without_another_arrival() {
    let pool = Arc::new(MockPool::new("a:1"));
    let pipeline = Pipeline::new("orders", config(10, 2), registry_of(&[pool.clone()])).unwrap();
    pipeline.start().unwrap();

    pipeline.enqueue(event("A")).await.unwrap();
    pipeline.enqueue(event("B")).await.unwrap();

    tokio::time::advance(Duration::from_millis(999)).await;
    settle().await;
    assert!(pool.sends().is_empty());

    tokio::time::advance(Duration::from_secs(10)).await;
    settle().await;
    assert!(pool.sends().is_empty());

    pipeline.enqueue(event("C")).await.unwrap();
    wait_until(|| pool.delivered().len() == 1).await;
    assert_eq!(delivered_bodies(&pool), vec![vec!["A", "B"]]);

    pipeline.stop().await;
}

#[tokio::test(start_paused = true)]
async fn full_batches_precede_partial_and_keep_order() {
    let pool = Arc::new(MockPool::new("a:1"));
    let pipeline = Pipeline::new("orders", config(3, 1), registry_of(&[pool.clone()])).unwrap();
    pipeline.start().unwrap();

    for i in 0..10 {
        pipeline.enqueue(event(&i.to_string())).await.unwrap();
    }
    wait_until(|| pool.delivered().len() == 3).await;

    tokio::time::advance(Duration::from_secs(1)).await;
    pipeline.enqueue(event("tail-trigger")).await.unwrap();
    wait_until(|| pool.delivered().len() == 4).await;

    assert_eq!(
        delivered_bodies(&pool),
        vec![
            vec!["0", "1", "2"],
            vec!["3", "4", "5"],
            vec!["6", "7", "8"],
            vec!["9"],
        ]
    );

    pipeline.stop().await;
}

#[tokio::test(start_paused = true)]
async fn concurrent_workers_deliver_every_event_once() {
    let pool = Arc::new(MockPool::new("a:1"));
    let pipeline = Pipeline::new("orders", config(10, 4), registry_of(&[pool.clone()])).unwrap();
    pipeline.start().unwrap();

    for i in 0..100 {
        pipeline.enqueue(event(&i.to_string())).await.unwrap();
    }
    tokio::time::advance(Duration::from_secs(1)).await;
    pipeline.enqueue(event("tail-trigger")).await.unwrap();

    wait_until(|| pool.delivered().iter().map(|s| s.events.len()).sum::<usize>() == 100).await;

    let mut seen: Vec<u32> = pool
        .delivered()
        .iter()
        .flat_map(|s| bodies(&s.events))
        .map(|b| b.parse().unwrap())
        .collect();
    seen.sort_unstable();
    assert_eq!(seen, (0..100).collect::<Vec<_>>());
    for send in pool.delivered() {
        assert!(send.events.len() <= 10);
    }

    let snapshot = pipeline.monitor();
    assert_eq!(snapshot.success, 100);
    assert_eq!(snapshot.failure, 0);

    pipeline.stop().await;
}

#[tokio::test(start_paused = true)]
async fn idle_flush_interval_bounds_tail_latency() {
    let pool = Arc::new(MockPool::new("a:1"));
    let config = PipelineConfig {
        idle_flush_interval_ms: Some(1500),
        ..config(10, 1)
    };
    let pipeline = Pipeline::new("orders", config, registry_of(&[pool.clone()])).unwrap();
    pipeline.start().unwrap();

    pipeline.enqueue(event("A")).await.unwrap();
    settle().await;
    assert!(pool.sends().is_empty());

    tokio::time::advance(Duration::from_millis(1600)).await;
    wait_until(|| pool.delivered().len() == 1).await;
    assert_eq!(delivered_bodies(&pool), vec![vec!["A"]]);

    pipeline.stop().await;
}
