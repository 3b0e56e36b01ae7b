//! Concurrent end-to-end scenarios for `FifoQueue`, exercised across real
//! OS threads via `crossbeam::thread::scope` rather than single-threaded
//! sequential calls (those are covered by the in-module unit tests).

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use lockfree_collections::FifoQueue;

#[test]
fn spsc_strict_ordering() {
    let queue = FifoQueue::new();
    let produced = 1000;

    crossbeam::thread::scope(|scope| {
        scope.spawn(|_| {
            for i in 0..produced {
                queue.enqueue(i);
            }
        });

        scope.spawn(|_| {
            let mut received = Vec::with_capacity(produced as usize);
            while received.len() < produced as usize {
                if let Some(v) = queue.dequeue() {
                    received.push(v);
                }
            }
            let expected: Vec<i32> = (0..produced).collect();
            assert_eq!(received, expected);
        });
    })
    .unwrap();

    assert_eq!(queue.len(), 0);
}

#[test]
fn mpmc_exhaustive_consume() {
    const PRODUCERS: usize = 4;
    const PER_PRODUCER: i64 = 500;
    const CONSUMERS: usize = 3;

    let queue = FifoQueue::new();
    let consumed_count = AtomicUsize::new(0);
    let total_items = PRODUCERS as i64 * PER_PRODUCER;

    let results: Vec<Vec<i64>> = crossbeam::thread::scope(|scope| {
        for p in 0..PRODUCERS as i64 {
            let queue = &queue;
            scope.spawn(move |_| {
                let base = p * PER_PRODUCER;
                for i in 0..PER_PRODUCER {
                    queue.enqueue(base + i);
                }
            });
        }

        let mut handles = Vec::new();
        for _ in 0..CONSUMERS {
            let queue = &queue;
            let consumed_count = &consumed_count;
            handles.push(scope.spawn(move |_| {
                let mut mine = Vec::new();
                loop {
                    match queue.dequeue() {
                        Some(v) => {
                            mine.push(v);
                            consumed_count.fetch_add(1, Ordering::SeqCst);
                        }
                        None => {
                            if consumed_count.load(Ordering::SeqCst) >= total_items as usize {
                                break;
                            }
                            std::thread::yield_now();
                        }
                    }
                }
                mine
            }));
        }

        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
    .unwrap();

    let mut all_seen = HashSet::new();
    let mut sum = 0i64;
    for set in &results {
        for &v in set {
            assert!(all_seen.insert(v), "value {v} delivered more than once");
            sum += v;
        }
    }

    let expected_sum: i64 = (0..total_items).sum();
    assert_eq!(sum, expected_sum);
    assert_eq!(all_seen.len(), total_items as usize);
    assert_eq!(queue.len(), 0);
}

#[test]
fn sequential_fifo_smoke() {
    let queue = FifoQueue::new();
    queue.enqueue(1);
    queue.enqueue(2);
    queue.enqueue(3);
    assert_eq!(queue.dequeue(), Some(1));
    assert_eq!(queue.dequeue(), Some(2));
    assert_eq!(queue.dequeue(), Some(3));
    assert_eq!(queue.len(), 0);
}
