//! Application use cases / business logic

pub mod feed_loop;
pub mod gate;
pub mod queue;
pub mod rate_limit;
pub mod resolve;
pub mod sheet_loop;

pub use feed_loop::{FeedPoller, FeedPollerConfig, PublishScheduler, SchedulerConfig};
pub use gate::{Eligibility, EligibilityGate, InvalidSchedulePolicy};
pub use queue::PublishQueue;
pub use rate_limit::RateLimiter;
pub use resolve::{ContentResolver, ResolveConfig, Resolution};
pub use sheet_loop::{RunLoopError, SheetLoop, SheetLoopConfig};
