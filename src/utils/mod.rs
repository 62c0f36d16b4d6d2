// file: src/utils/mod.rs
// description: utility functions module exports
// reference: internal module structure

pub mod logging;
pub mod retry;
pub mod telemetry;
pub mod validation;

pub use retry::{Attempt, ExecutionMode, RetryPolicy, with_timeout};
pub use telemetry::{HealthCheck, HealthReport, HealthStatus, OperationTimer};
pub use validation::Validator;
