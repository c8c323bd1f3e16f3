//! ECS / EventBridge scheduler
//!
//! Services and one-off tasks go through `aws ecs`, scheduled rules through
//! `aws events`.

use crate::cli::AwsCli;
use crate::error::{AwsError, Result};
use crate::task_definition::to_register_input;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use shipflow_cloud::{
    ClusterScheduler, RuleTarget, RuleUpdate, RunTaskRequest, ServiceUpdate,
    TaskDefinitionHandle,
};
use shipflow_core::{ContainerOverride, NetworkConfiguration};

/// ECS scheduler backed by the aws CLI
pub struct EcsScheduler {
    cli: AwsCli,
    tag_key: String,
}

impl EcsScheduler {
    pub fn new(cli: AwsCli, tag_key: impl Into<String>) -> Self {
        Self {
            cli,
            tag_key: tag_key.into(),
        }
    }

    async fn cluster_arn(&self, cluster: &str) -> Result<String> {
        let response: DescribeClustersResponse = self
            .cli
            .call("ecs", "describe-clusters", &json!({ "clusters": [cluster] }))
            .await?;

        response
            .clusters
            .into_iter()
            .find(|c| c.status.as_deref() == Some("ACTIVE"))
            .map(|c| c.cluster_arn)
            .ok_or_else(|| AwsError::ClusterNotFound(cluster.to_string()))
    }

    /// Remove rule targets that are no longer in the target list
    async fn remove_stale_targets(&self, rule: &str, keep: &[RuleTarget]) -> Result<()> {
        let response: ListTargetsResponse = self
            .cli
            .call("events", "list-targets-by-rule", &json!({ "Rule": rule }))
            .await?;

        let stale = response.stale_ids(keep);
        if stale.is_empty() {
            return Ok(());
        }

        // 今回のデプロイに含まれないターゲットはルールから外れる
        tracing::warn!(
            rule = %rule,
            "Removing targets not in this deploy: {}",
            stale.join(", ")
        );
        let response: FailedEntriesResponse = self
            .cli
            .call("events", "remove-targets", &json!({ "Rule": rule, "Ids": stale }))
            .await?;
        response.check("remove-targets")
    }
}

#[async_trait]
impl ClusterScheduler for EcsScheduler {
    async fn service_exists(&self, cluster: &str, service: &str) -> shipflow_cloud::Result<bool> {
        let response: DescribeServicesResponse = self
            .cli
            .call(
                "ecs",
                "describe-services",
                &json!({ "cluster": cluster, "services": [service] }),
            )
            .await?;

        Ok(response
            .services
            .iter()
            .any(|s| s.service_name == service && s.status.as_deref() == Some("ACTIVE")))
    }

    async fn update_service(
        &self,
        cluster: &str,
        service: &str,
        update: &ServiceUpdate,
    ) -> shipflow_cloud::Result<()> {
        tracing::info!(cluster = %cluster, service = %service, "Updating service");
        let _: Value = self
            .cli
            .call(
                "ecs",
                "update-service",
                &update_service_input(cluster, service, update),
            )
            .await?;
        Ok(())
    }

    async fn run_task(
        &self,
        cluster: &str,
        request: &RunTaskRequest,
    ) -> shipflow_cloud::Result<Vec<String>> {
        let response: RunTaskResponse = self
            .cli
            .call("ecs", "run-task", &run_task_input(cluster, request))
            .await?;

        if let Some(failure) = response.failures.first() {
            return Err(AwsError::TaskLaunchFailed(format!(
                "{}: {}",
                failure.arn.as_deref().unwrap_or("-"),
                failure.reason.as_deref().unwrap_or("unknown reason")
            ))
            .into());
        }

        let tasks: Vec<String> = response.tasks.into_iter().map(|t| t.task_arn).collect();
        tracing::info!(cluster = %cluster, "Started {} task(s)", tasks.len());
        Ok(tasks)
    }

    async fn register_task_definition(
        &self,
        content: &str,
        deploy_id: &str,
    ) -> shipflow_cloud::Result<TaskDefinitionHandle> {
        let input = to_register_input(content, deploy_id, &self.tag_key)?;
        let response: RegisterTaskDefinitionResponse = self
            .cli
            .call("ecs", "register-task-definition", &input)
            .await?;

        let arn = response.task_definition.task_definition_arn;
        tracing::info!("Registered task definition: {}", arn);
        Ok(TaskDefinitionHandle::new(arn))
    }

    async fn update_rule(&self, cluster: &str, update: &RuleUpdate) -> shipflow_cloud::Result<()> {
        let cluster_arn = self.cluster_arn(cluster).await?;

        tracing::info!(rule = %update.rule, "Updating rule");
        let _: Value = self
            .cli
            .call("events", "put-rule", &put_rule_input(update))
            .await?;

        self.remove_stale_targets(&update.rule, &update.targets)
            .await?;

        let targets: Vec<Value> = update
            .targets
            .iter()
            .map(|target| rule_target_json(&cluster_arn, target))
            .collect::<Result<_>>()?;

        let response: FailedEntriesResponse = self
            .cli
            .call(
                "events",
                "put-targets",
                &json!({ "Rule": update.rule, "Targets": targets }),
            )
            .await?;
        response.check("put-targets")?;
        Ok(())
    }
}

fn update_service_input(cluster: &str, service: &str, update: &ServiceUpdate) -> Value {
    let mut input = Map::new();
    input.insert("cluster".into(), json!(cluster));
    input.insert("service".into(), json!(service));
    input.insert("taskDefinition".into(), json!(update.task_definition.arn()));

    if let Some(count) = update.desired_count {
        input.insert("desiredCount".into(), json!(count));
    }
    if let Some(force) = update.force_new_deployment {
        input.insert("forceNewDeployment".into(), json!(force));
    }
    if let Some(seconds) = update.health_check_grace_period_seconds {
        input.insert("healthCheckGracePeriodSeconds".into(), json!(seconds));
    }

    let mut deployment = Map::new();
    if let Some(max) = update.maximum_percent {
        deployment.insert("maximumPercent".into(), json!(max));
    }
    if let Some(min) = update.minimum_healthy_percent {
        deployment.insert("minimumHealthyPercent".into(), json!(min));
    }
    if !deployment.is_empty() {
        input.insert("deploymentConfiguration".into(), Value::Object(deployment));
    }

    Value::Object(input)
}

fn run_task_input(cluster: &str, request: &RunTaskRequest) -> Value {
    let mut input = Map::new();
    input.insert("cluster".into(), json!(cluster));
    input.insert("taskDefinition".into(), json!(request.task_definition.arn()));
    input.insert("count".into(), json!(request.desired_count));

    if let Some(group) = &request.group {
        input.insert("group".into(), json!(group));
    }
    if let Some(launch_type) = request.launch_type {
        input.insert("launchType".into(), json!(launch_type.as_str()));
    }
    if let Some(network) = &request.network_configuration {
        input.insert("networkConfiguration".into(), network_json(network, false));
    }

    let mut overrides = Map::new();
    if !request.container_overrides.is_empty() {
        overrides.insert(
            "containerOverrides".into(),
            container_overrides_json(&request.container_overrides),
        );
    }
    if let Some(arn) = &request.task_role_arn {
        overrides.insert("taskRoleArn".into(), json!(arn));
    }
    if let Some(arn) = &request.task_execution_role_arn {
        overrides.insert("executionRoleArn".into(), json!(arn));
    }
    if !overrides.is_empty() {
        input.insert("overrides".into(), Value::Object(overrides));
    }

    Value::Object(input)
}

fn put_rule_input(update: &RuleUpdate) -> Value {
    let mut input = Map::new();
    input.insert("Name".into(), json!(update.rule));
    input.insert("ScheduleExpression".into(), json!(update.expression));
    if let Some(enabled) = update.enabled {
        let state = if enabled { "ENABLED" } else { "DISABLED" };
        input.insert("State".into(), json!(state));
    }
    if let Some(description) = &update.description {
        input.insert("Description".into(), json!(description));
    }
    Value::Object(input)
}

/// EventBridge target. Parameters are PascalCase, the `Input` overrides are
/// a JSON string in ECS (camelCase) form.
fn rule_target_json(cluster_arn: &str, target: &RuleTarget) -> Result<Value> {
    let mut ecs = Map::new();
    ecs.insert("TaskDefinitionArn".into(), json!(target.task_definition.arn()));
    ecs.insert("TaskCount".into(), json!(target.desired_count));
    if let Some(launch_type) = target.launch_type {
        ecs.insert("LaunchType".into(), json!(launch_type.as_str()));
    }
    if let Some(network) = &target.network_configuration {
        ecs.insert("NetworkConfiguration".into(), network_json(network, true));
    }

    let mut value = Map::new();
    value.insert("Id".into(), json!(target.id));
    value.insert("Arn".into(), json!(cluster_arn));
    value.insert("RoleArn".into(), json!(target.cloudwatch_event_iam_role_arn));
    value.insert("EcsParameters".into(), Value::Object(ecs));

    let mut overrides = Map::new();
    if !target.container_overrides.is_empty() {
        overrides.insert(
            "containerOverrides".into(),
            container_overrides_json(&target.container_overrides),
        );
    }
    if let Some(arn) = &target.task_role_arn {
        overrides.insert("taskRoleArn".into(), json!(arn));
    }
    if !overrides.is_empty() {
        value.insert(
            "Input".into(),
            json!(serde_json::to_string(&Value::Object(overrides))?),
        );
    }

    Ok(Value::Object(value))
}

fn container_overrides_json(overrides: &[ContainerOverride]) -> Value {
    overrides
        .iter()
        .map(|o| {
            let mut value = Map::new();
            value.insert("name".into(), json!(o.name));
            if !o.command.is_empty() {
                value.insert("command".into(), json!(o.command));
            }
            if !o.environment.is_empty() {
                let environment: Vec<Value> = o
                    .environment
                    .iter()
                    .map(|kv| json!({ "name": kv.name, "value": kv.value }))
                    .collect();
                value.insert("environment".into(), Value::Array(environment));
            }
            if let Some(cpu) = o.cpu {
                value.insert("cpu".into(), json!(cpu));
            }
            if let Some(memory) = o.memory {
                value.insert("memory".into(), json!(memory));
            }
            Value::Object(value)
        })
        .collect()
}

/// `pascal` selects the EventBridge spelling of the awsvpc fields
fn network_json(network: &NetworkConfiguration, pascal: bool) -> Value {
    let vpc = &network.awsvpc_configuration;
    let (subnets, security_groups, assign_public_ip) = if pascal {
        ("Subnets", "SecurityGroups", "AssignPublicIp")
    } else {
        ("subnets", "securityGroups", "assignPublicIp")
    };

    let mut config = Map::new();
    config.insert(subnets.into(), json!(vpc.subnets));
    if !vpc.security_groups.is_empty() {
        config.insert(security_groups.into(), json!(vpc.security_groups));
    }
    if let Some(assign) = vpc.assign_public_ip {
        config.insert(assign_public_ip.into(), json!(assign.as_str()));
    }

    json!({ "awsvpcConfiguration": config })
}

#[derive(Debug, Deserialize)]
struct DescribeClustersResponse {
    #[serde(default)]
    clusters: Vec<ClusterInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClusterInfo {
    cluster_arn: String,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DescribeServicesResponse {
    #[serde(default)]
    services: Vec<ServiceInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceInfo {
    service_name: String,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunTaskResponse {
    #[serde(default)]
    tasks: Vec<TaskInfo>,
    #[serde(default)]
    failures: Vec<Failure>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskInfo {
    task_arn: String,
}

#[derive(Debug, Deserialize)]
struct Failure {
    arn: Option<String>,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterTaskDefinitionResponse {
    task_definition: RegisteredTaskDefinition,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisteredTaskDefinition {
    task_definition_arn: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListTargetsResponse {
    #[serde(default)]
    targets: Vec<TargetId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TargetId {
    id: String,
}

impl ListTargetsResponse {
    /// `keep` にない登録済みターゲットの ID
    fn stale_ids(self, keep: &[RuleTarget]) -> Vec<String> {
        self.targets
            .into_iter()
            .map(|t| t.id)
            .filter(|id| !keep.iter().any(|k| &k.id == id))
            .collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FailedEntriesResponse {
    #[serde(default)]
    failed_entry_count: u32,
    #[serde(default)]
    failed_entries: Vec<FailedEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FailedEntry {
    target_id: Option<String>,
    error_message: Option<String>,
}

impl FailedEntriesResponse {
    fn check(&self, operation: &str) -> Result<()> {
        if self.failed_entry_count == 0 {
            return Ok(());
        }
        let details: Vec<String> = self
            .failed_entries
            .iter()
            .map(|e| {
                format!(
                    "{}: {}",
                    e.target_id.as_deref().unwrap_or("-"),
                    e.error_message.as_deref().unwrap_or("unknown error")
                )
            })
            .collect();
        Err(AwsError::UnexpectedResponse(format!(
            "{} failed for {} target(s): {}",
            operation,
            self.failed_entry_count,
            details.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipflow_core::{AssignPublicIp, AwsVpcConfiguration, KeyValuePair, LaunchType};

    fn handle() -> TaskDefinitionHandle {
        TaskDefinitionHandle::new("arn:aws:ecs:ap-northeast-1:123:task-definition/batch:3")
    }

    fn network() -> NetworkConfiguration {
        NetworkConfiguration {
            awsvpc_configuration: AwsVpcConfiguration {
                subnets: vec!["subnet-1".to_string()],
                security_groups: vec!["sg-1".to_string()],
                assign_public_ip: Some(AssignPublicIp::Disabled),
            },
        }
    }

    #[test]
    fn test_update_service_input_only_sends_set_fields() {
        let update = ServiceUpdate {
            task_definition: handle(),
            desired_count: Some(2),
            force_new_deployment: None,
            health_check_grace_period_seconds: None,
            minimum_healthy_percent: Some(50),
            maximum_percent: None,
        };

        let input = update_service_input("prod", "web", &update);
        assert_eq!(
            input,
            json!({
                "cluster": "prod",
                "service": "web",
                "taskDefinition": handle().arn(),
                "desiredCount": 2,
                "deploymentConfiguration": { "minimumHealthyPercent": 50 }
            })
        );
    }

    #[test]
    fn test_run_task_input() {
        let request = RunTaskRequest {
            task_definition: handle(),
            desired_count: 1,
            group: Some("migration".to_string()),
            launch_type: Some(LaunchType::Fargate),
            network_configuration: Some(network()),
            container_overrides: vec![ContainerOverride::command("app", "rake db:migrate")],
            task_role_arn: Some("arn:aws:iam::123:role/app".to_string()),
            task_execution_role_arn: None,
        };

        let input = run_task_input("prod", &request);
        assert_eq!(input["count"], 1);
        assert_eq!(input["launchType"], "FARGATE");
        assert_eq!(
            input["networkConfiguration"],
            json!({ "awsvpcConfiguration": {
                "subnets": ["subnet-1"],
                "securityGroups": ["sg-1"],
                "assignPublicIp": "DISABLED"
            }})
        );
        assert_eq!(
            input["overrides"],
            json!({
                "containerOverrides": [{ "name": "app", "command": ["rake", "db:migrate"] }],
                "taskRoleArn": "arn:aws:iam::123:role/app"
            })
        );
    }

    #[test]
    fn test_put_rule_input_forwards_unset_fields_as_unset() {
        let mut update = RuleUpdate {
            rule: "nightly".to_string(),
            expression: "cron(0 3 * * ? *)".to_string(),
            enabled: None,
            description: None,
            targets: Vec::new(),
        };
        assert_eq!(
            put_rule_input(&update),
            json!({ "Name": "nightly", "ScheduleExpression": "cron(0 3 * * ? *)" })
        );

        update.enabled = Some(false);
        update.description = Some("nightly batch".to_string());
        let input = put_rule_input(&update);
        assert_eq!(input["State"], "DISABLED");
        assert_eq!(input["Description"], "nightly batch");
    }

    #[test]
    fn test_rule_target_json() {
        let target = RuleTarget {
            id: "report".to_string(),
            task_definition: handle(),
            desired_count: 3,
            container_overrides: vec![ContainerOverride {
                name: "batch".to_string(),
                command: vec!["bin/report".to_string()],
                environment: vec![KeyValuePair {
                    name: "MODE".to_string(),
                    value: "full".to_string(),
                }],
                cpu: None,
                memory: Some(512),
            }],
            cloudwatch_event_iam_role_arn: "arn:aws:iam::123:role/ecsEventsRole".to_string(),
            task_role_arn: None,
            launch_type: Some(LaunchType::Fargate),
            network_configuration: Some(network()),
        };

        let value = rule_target_json("arn:aws:ecs:ap-northeast-1:123:cluster/prod", &target).unwrap();
        assert_eq!(value["Id"], "report");
        assert_eq!(value["Arn"], "arn:aws:ecs:ap-northeast-1:123:cluster/prod");
        assert_eq!(value["RoleArn"], "arn:aws:iam::123:role/ecsEventsRole");
        assert_eq!(value["EcsParameters"]["TaskCount"], 3);
        assert_eq!(value["EcsParameters"]["LaunchType"], "FARGATE");
        assert_eq!(
            value["EcsParameters"]["NetworkConfiguration"]["awsvpcConfiguration"]["Subnets"],
            json!(["subnet-1"])
        );

        let input: Value = serde_json::from_str(value["Input"].as_str().unwrap()).unwrap();
        assert_eq!(
            input,
            json!({ "containerOverrides": [{
                "name": "batch",
                "command": ["bin/report"],
                "environment": [{ "name": "MODE", "value": "full" }],
                "memory": 512
            }]})
        );
    }

    #[test]
    fn test_rule_target_without_overrides_has_no_input() {
        let target = RuleTarget {
            id: "cleanup".to_string(),
            task_definition: handle(),
            desired_count: 1,
            container_overrides: Vec::new(),
            cloudwatch_event_iam_role_arn: "role".to_string(),
            task_role_arn: None,
            launch_type: None,
            network_configuration: None,
        };

        let value = rule_target_json("cluster", &target).unwrap();
        assert!(value.get("Input").is_none());
        assert!(value["EcsParameters"].get("LaunchType").is_none());
    }

    #[test]
    fn test_stale_ids_are_targets_missing_from_update() {
        let listed: ListTargetsResponse = serde_json::from_str(
            r#"{"Targets": [{"Id": "report", "Arn": "a"}, {"Id": "cleanup", "Arn": "a"}, {"Id": "legacy", "Arn": "a"}]}"#,
        )
        .unwrap();
        let keep = vec![RuleTarget {
            id: "report".to_string(),
            task_definition: handle(),
            desired_count: 1,
            container_overrides: Vec::new(),
            cloudwatch_event_iam_role_arn: "role".to_string(),
            task_role_arn: None,
            launch_type: None,
            network_configuration: None,
        }];

        assert_eq!(listed.stale_ids(&keep), vec!["cleanup", "legacy"]);

        let empty: ListTargetsResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.stale_ids(&keep).is_empty());
    }

    #[test]
    fn test_failed_entries_check() {
        let ok: FailedEntriesResponse =
            serde_json::from_str(r#"{"FailedEntryCount": 0, "FailedEntries": []}"#).unwrap();
        assert!(ok.check("put-targets").is_ok());

        let failed: FailedEntriesResponse = serde_json::from_str(
            r#"{"FailedEntryCount": 1, "FailedEntries": [{"TargetId": "report", "ErrorCode": "X", "ErrorMessage": "bad role"}]}"#,
        )
        .unwrap();
        let err = failed.check("put-targets").unwrap_err();
        assert!(err.to_string().contains("report: bad role"));
    }
}
