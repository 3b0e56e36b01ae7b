//! Lock-free concurrent container primitives for parallel runtimes, task
//! schedulers, and high-throughput producer/consumer pipelines.
//!
//! This crate provides two independent building blocks:
//!
//! - [`FifoQueue<T>`] — an unbounded, linked, lock-free multi-producer
//!   multi-consumer FIFO queue (Michael & Scott).
//! - [`StealDeque<T>`] — a bounded, circular, lock-free single-owner
//!   multi-thief work-stealing deque (Chase–Lev).
//!
//! Neither structure shares code with the other, and neither reclaims memory
//! during operation — both defer reclamation to [`Drop`]. Pick `FifoQueue`
//! for an unbounded MPMC channel between arbitrary threads; pick
//! `StealDeque` when one thread produces and consumes its own work locally
//! (LIFO) while other worker threads steal idle work from it (FIFO).

mod backoff;
mod fifo_queue;
mod steal_deque;

pub use fifo_queue::FifoQueue;
pub use steal_deque::{Steal, StealDeque};
