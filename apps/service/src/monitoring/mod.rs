/// Monitoring engine module - evaluates stored checks on a schedule
///
/// This module is responsible for:
/// - Validating stored check records
/// - Probing HTTP/HTTPS targets under a timeout
/// - Deriving up/down state, logging outcomes and alerting owners
/// - Scheduling the sweep and log rotation cycles
pub mod checker;
pub mod executor;
pub mod processor;
pub mod scheduler;
pub mod types;
pub mod validation;


pub use checker::{HttpTransport, ProbeTransport};
pub use executor::CheckExecutor;
pub use processor::OutcomeProcessor;
pub use scheduler::{Scheduler, SchedulerConfig};
pub use types::{CheckOutcome, CheckSpec, CheckState, LogRecord};
