// Order execution: sizing, submission, confirmation and polling
pub mod backoff;
pub mod executor;
pub mod order_confirmer;
pub mod poll;

pub use backoff::BackoffSchedule;
pub use executor::OrderExecutor;
pub use order_confirmer::OrderConfirmer;
pub use poll::{poll_until, shutdown_signalled, PollError, PollPolicy, Step};
