//! # Pipeline Testing Utils
//!
//! Test doubles for every store trait and collaborator port of the
//! resource manager.
//!
//! - **In-memory store**: one [`InMemoryStore`] implements all repositories,
//!   with per-operation failure injection
//! - **Fake cluster**: [`FakeClusterClient`] keeps objects in memory, applies
//!   merge patches and resource versions, and records every call
//! - **Builders**: execution templates, runs and jobs with sensible defaults
//! - **Helpers**: deterministic clock and id providers
//!
//! ```toml
//! [dev-dependencies]
//! pipeline-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod cluster;
pub mod helpers;
pub mod stores;

pub use builders::*;
pub use cluster::*;
pub use helpers::*;
pub use stores::*;
