//! Cluster scheduler trait definition

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shipflow_core::{ContainerOverride, LaunchType, NetworkConfiguration, ServiceTarget};
use std::fmt;

/// Reference to a registered task definition revision (ARN)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskDefinitionHandle(String);

impl TaskDefinitionHandle {
    pub fn new(arn: impl Into<String>) -> Self {
        Self(arn.into())
    }

    pub fn arn(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskDefinitionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mutable fields of an existing service
///
/// Only these fields are ever sent with "update service"; everything else on
/// the service stays as the operator configured it.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceUpdate {
    pub task_definition: TaskDefinitionHandle,
    pub desired_count: Option<u32>,
    pub force_new_deployment: Option<bool>,
    pub health_check_grace_period_seconds: Option<u32>,
    pub minimum_healthy_percent: Option<u32>,
    pub maximum_percent: Option<u32>,
}

impl ServiceUpdate {
    pub fn from_target(target: &ServiceTarget, task_definition: TaskDefinitionHandle) -> Self {
        Self {
            task_definition,
            desired_count: target.desired_count,
            force_new_deployment: target.force_new_deployment,
            health_check_grace_period_seconds: target.health_check_grace_period_seconds,
            minimum_healthy_percent: target.minimum_healthy_percent,
            maximum_percent: target.maximum_percent,
        }
    }
}

/// One-off task launch
#[derive(Debug, Clone, PartialEq)]
pub struct RunTaskRequest {
    pub task_definition: TaskDefinitionHandle,
    pub desired_count: u32,
    pub group: Option<String>,
    pub launch_type: Option<LaunchType>,
    pub network_configuration: Option<NetworkConfiguration>,
    pub container_overrides: Vec<ContainerOverride>,
    pub task_role_arn: Option<String>,
    pub task_execution_role_arn: Option<String>,
}

/// A scheduled rule target, fully resolved
#[derive(Debug, Clone, PartialEq)]
pub struct RuleTarget {
    /// Target id within the rule (the manifest target name)
    pub id: String,
    pub task_definition: TaskDefinitionHandle,
    pub desired_count: u32,
    pub container_overrides: Vec<ContainerOverride>,
    /// Role the event bus assumes to launch the task
    pub cloudwatch_event_iam_role_arn: String,
    pub task_role_arn: Option<String>,
    pub launch_type: Option<LaunchType>,
    pub network_configuration: Option<NetworkConfiguration>,
}

/// Replacement of a scheduled rule and its whole target list
#[derive(Debug, Clone, PartialEq)]
pub struct RuleUpdate {
    pub rule: String,
    pub expression: String,
    /// `None` leaves the scheduler default
    pub enabled: Option<bool>,
    pub description: Option<String>,
    pub targets: Vec<RuleTarget>,
}

/// Cluster scheduler abstraction
///
/// The deploy orchestrator drives every scheduler mutation through this
/// trait; adapters translate the calls to a concrete scheduler API.
#[async_trait]
pub trait ClusterScheduler: Send + Sync {
    /// Whether the service is registered (and active) in the cluster
    async fn service_exists(&self, cluster: &str, service: &str) -> Result<bool>;

    /// Point an existing service at a new task definition
    async fn update_service(&self, cluster: &str, service: &str, update: &ServiceUpdate)
    -> Result<()>;

    /// Start a one-off task and return the started task ids
    async fn run_task(&self, cluster: &str, request: &RunTaskRequest) -> Result<Vec<String>>;

    /// Register a task definition from file content, tagged with the deploy id
    async fn register_task_definition(
        &self,
        content: &str,
        deploy_id: &str,
    ) -> Result<TaskDefinitionHandle>;

    /// Create or replace a scheduled rule and all of its targets
    async fn update_rule(&self, cluster: &str, update: &RuleUpdate) -> Result<()>;
}

/// Resolves role names to ARNs
#[async_trait]
pub trait RoleResolver: Send + Sync {
    async fn role_arn(&self, name: &str) -> Result<String>;
}
