use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Source of "now" so timestamps written to run rows are reproducible in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Source of run, job and experiment identifiers.
pub trait UuidGenerator: Send + Sync {
    fn new_uuid(&self) -> Uuid;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RandomUuidGenerator;

impl UuidGenerator for RandomUuidGenerator {
    fn new_uuid(&self) -> Uuid {
        Uuid::new_v4()
    }
}
