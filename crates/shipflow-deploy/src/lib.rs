//! ShipFlow deployment orchestration
//!
//! Resolves a deploy request (service, run task or scheduled task) against the
//! deploy manifest, publishes the images, registers task definitions once per
//! run and applies the matching scheduler mutation.

pub mod error;
pub mod matcher;
pub mod orchestrator;
pub mod registrar;

pub use error::{DeployError, Result};
pub use matcher::{MatchedRule, ScheduleFilter, select_targets};
pub use orchestrator::{Collaborators, CommandOverride, DeployOptions, Orchestrator};
pub use registrar::RegistrationCache;
