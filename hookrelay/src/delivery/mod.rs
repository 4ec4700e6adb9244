//! Delivery pipeline: fan-out, the per-delivery retry loop and the sweeper.

pub mod dispatcher;
pub mod retry;
pub mod sweeper;
pub mod worker;

pub use dispatcher::Dispatcher;
pub use sweeper::RetrySweeper;
pub use worker::{
    AttemptOutcome, DeliveryWorker, WorkerSettings, HEADER_EVENT, HEADER_ID, HEADER_SIGNATURE,
    HEADER_TIMESTAMP,
};
