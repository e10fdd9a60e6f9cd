// Risk management module
pub mod circuit_breakers;
pub mod performance;

pub use circuit_breakers::{CircuitBreakers, StopReason, WinRateFloor};
pub use performance::{PerformanceAccumulator, PerformanceState, RoundResult};
