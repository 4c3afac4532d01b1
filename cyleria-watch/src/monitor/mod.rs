//! Character monitor.
//!
//! - Alert rules over two observations of a character
//! - Shared rate limiting of profile requests
//! - The poll scheduler and the state lock it shares with subscription commands
//! - In-process broadcast of produced alerts

mod events;
mod rate_limiter;
pub mod rules;
mod service;
mod state;

pub use events::{AlertBroadcaster, AlertNotice};
pub use rate_limiter::{RateLimiter, RateLimiterConfig, SharedRateLimiter};
pub use rules::{AlertEvent, DEFAULT_LEVEL_THRESHOLD, apply, bucket, evaluate};
pub use service::{CycleReport, PollScheduler, PollSchedulerConfig, SchedulerPhase};
pub use state::{MonitorState, SharedState};
