//! Concurrent directory traversal
//!
//! This module implements the traversal pool: a single scheduler control
//! flow feeding a fixed set of worker threads through bounded queues.
//!
//! # Architecture
//!
//! ```text
//!                  ┌───────────────────────────────┐
//!                  │          Scheduler            │
//!                  │  - outstanding-job counter    │
//!                  │  - FIFO overflow buffer       │
//!                  │  - non-blocking dispatch      │
//!                  └──────┬────────────────▲───────┘
//!                         │ input queue    │ event queue
//!                         │ (bounded)      │ (bounded)
//!        ┌────────────────┼────────────────┼────────────────┐
//!        │                │                │                │
//!  ┌─────▼─────┐    ┌─────▼─────┐          │          ┌─────▼─────┐
//!  │  Worker 1 │    │  Worker 2 │   ...    └──────────┤  Worker N │
//!  │ getdents64│    │ getdents64│      discoveries,   │ getdents64│
//!  │  + count  │    │  + count  │      completions    │  + count  │
//!  └───────────┘    └───────────┘                     └───────────┘
//! ```

pub mod queue;
pub mod scheduler;
pub mod worker;

pub use queue::{DirJob, QueueStats};
pub use scheduler::Scheduler;
pub use worker::Worker;
