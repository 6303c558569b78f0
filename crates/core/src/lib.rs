pub mod config;
pub mod constants;
pub mod errors;
pub mod providers;
pub mod retry;

pub use config::{AppConfig, ConfigValidator, ManagerOptions};
pub use errors::{ErrorKind, PipelineError, PipelineResult, ResultExt};
pub use providers::{Clock, RandomUuidGenerator, SystemClock, UuidGenerator};
pub use retry::{retry_with_backoff, BackoffPolicy, ConstantBackoff, ExponentialBackoff};
