pub mod archival_step;
pub mod custom_resources;
pub mod entities;
pub mod mutation;
pub mod ports;
pub mod repositories;
pub mod requests;
pub mod scheduled_workflow;
pub mod workflow;

pub use entities::*;
pub use mutation::{mutate, MutatedWorkflow, MutationRequest, RunIdentity};
pub use repositories::*;
pub use requests::*;
pub use scheduled_workflow::ScheduledWorkflow;
pub use workflow::Workflow;
