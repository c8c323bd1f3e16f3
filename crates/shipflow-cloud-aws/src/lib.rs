//! AWS provider for ShipFlow
//!
//! Implements the ShipFlow collaborator traits on top of the `aws` CLI:
//!
//! - [`EcsScheduler`]: `ClusterScheduler` over `aws ecs` and `aws events`
//! - [`IamRoleResolver`]: `RoleResolver` over `aws iam get-role`
//! - [`EcrCredentials`]: registry `CredentialSource` over `aws ecr get-login-password`
//!
//! # Requirements
//!
//! - `aws` CLI v2 must be installed
//! - Authentication is managed through the aws CLI configuration (profile, env vars, SSO)
//!
//! # Example
//!
//! ```ignore
//! use shipflow_cloud_aws::{AwsCli, EcsScheduler};
//!
//! let cli = AwsCli::new(Some("ap-northeast-1".into()), None);
//! let scheduler = EcsScheduler::new(cli, "shipflow:deploy-id");
//! let exists = scheduler.service_exists("production", "web").await?;
//! ```

pub mod cli;
pub mod ecr;
pub mod ecs;
pub mod error;
pub mod iam;
pub mod task_definition;

pub use cli::AwsCli;
pub use ecr::{EcrCredentials, is_ecr_registry, registry_host};
pub use ecs::EcsScheduler;
pub use error::{AwsError, Result};
pub use iam::IamRoleResolver;
pub use task_definition::{TAG_PLACEHOLDER, to_register_input};
