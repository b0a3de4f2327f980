pub mod handler;
pub mod stats;
pub mod supervisor;
pub mod worker;

pub use handler::{CrawlHandler, DefaultHandler};
pub use stats::WorkerStats;
pub use supervisor::{
    CrawlSession, SessionError, SupervisorOptions, SupervisorOptionsBuilder,
    SupervisorOptionsBuilderError,
};
pub use worker::{
    Worker, WorkerId, WorkerOptions, WorkerOptionsBuilder, WorkerOptionsBuilderError,
};
