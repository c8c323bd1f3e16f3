//! ShipFlow cluster scheduler abstraction
//!
//! The deploy orchestrator only talks to the scheduler through the traits in
//! this crate. Provider crates (`shipflow-cloud-aws`) implement them.
//!
//! ```text
//! ┌──────────────────────────────┐
//! │        shipflow-deploy       │
//! │         (Orchestrator)       │
//! └──────────────┬───────────────┘
//!                │
//! ┌──────────────▼───────────────┐
//! │        shipflow-cloud        │
//! │  trait ClusterScheduler      │
//! │  trait RoleResolver          │
//! └──────────────┬───────────────┘
//!                │
//! ┌──────────────▼───────────────┐
//! │      shipflow-cloud-aws      │
//! │  (aws ecs / events / iam)    │
//! └──────────────────────────────┘
//! ```

pub mod error;
pub mod scheduler;

pub use error::{CloudError, Result};
pub use scheduler::{
    ClusterScheduler, RoleResolver, RuleTarget, RuleUpdate, RunTaskRequest, ServiceUpdate,
    TaskDefinitionHandle,
};
