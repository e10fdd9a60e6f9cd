// Core modules
pub mod audit;
pub mod config;
pub mod error;
pub mod exchange;
pub mod execution;
pub mod models;
pub mod notify;
pub mod oracle;
pub mod risk;
pub mod round;

// Re-export commonly used types
pub use config::Settings;
pub use models::*;
pub use oracle::DecisionOracle;
pub use round::{Round, RoundManager, RoundOutcome, RoundStatus};

// Error handling
pub use error::{Error, Result};
