//! The crawl frontier: a politeness-aware FIFO work queue with dedup and
//! in-progress accounting, shared by all workers of a crawl session.

pub mod item;
pub mod queue;

pub use item::{FetchItem, FetchStatus};
pub use queue::FetchQueue;
