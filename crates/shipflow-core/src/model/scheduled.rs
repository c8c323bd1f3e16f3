//! スケジュールタスク定義
//!
//! `task_count` / `overrides` は旧フィールド名。読み込み時に
//! `desired_count` / `container_overrides` へ正規化され、使われていた
//! 旧フィールドは [`ScheduledTaskTarget::deprecations`] に記録されます。

use super::container::ContainerSpec;
use super::task::{ContainerOverride, LaunchType, NetworkConfiguration};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// スケジュールルール (cron / rate) とそのターゲット
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledRule {
    #[serde(rename = "rule")]
    pub name: String,
    /// `cron(...)` または `rate(...)`
    pub expression: String,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub targets: Vec<ScheduledTaskTarget>,
}

/// 正規化済みのスケジュールタスクターゲット
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawScheduledTaskTarget")]
pub struct ScheduledTaskTarget {
    pub name: String,
    pub path: PathBuf,
    pub containers: Vec<ContainerSpec>,
    /// このサービスのデプロイ時に連動して更新される
    pub depend_service: Option<String>,
    pub desired_count: u32,
    pub container_overrides: Option<Vec<ContainerOverride>>,
    pub launch_type: Option<LaunchType>,
    pub network_configuration: Option<NetworkConfiguration>,
    pub task_role: Option<String>,
    pub cloudwatch_event_iam_role: Option<String>,
    /// 設定で使われていた旧フィールド
    pub deprecations: Vec<DeprecatedField>,
}

/// 非推奨フィールド
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeprecatedField {
    TaskCount,
    Overrides,
}

impl DeprecatedField {
    pub fn legacy_name(&self) -> &'static str {
        match self {
            DeprecatedField::TaskCount => "task_count",
            DeprecatedField::Overrides => "overrides",
        }
    }

    pub fn replacement(&self) -> &'static str {
        match self {
            DeprecatedField::TaskCount => "desired_count",
            DeprecatedField::Overrides => "container_overrides",
        }
    }
}

impl std::fmt::Display for DeprecatedField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "\"{}\" parameter is deprecated. Set \"{}\" instead.",
            self.legacy_name(),
            self.replacement()
        )
    }
}

#[derive(Deserialize)]
struct RawScheduledTaskTarget {
    name: String,
    path: PathBuf,
    #[serde(default)]
    containers: Vec<ContainerSpec>,
    #[serde(default)]
    depend_service: Option<String>,
    #[serde(default)]
    desired_count: Option<u32>,
    #[serde(default)]
    task_count: Option<u32>,
    #[serde(default)]
    container_overrides: Option<Vec<ContainerOverride>>,
    #[serde(default)]
    overrides: Option<Vec<ContainerOverride>>,
    #[serde(default)]
    launch_type: Option<LaunchType>,
    #[serde(default)]
    network_configuration: Option<NetworkConfiguration>,
    #[serde(default)]
    task_role: Option<String>,
    #[serde(default)]
    cloudwatch_event_iam_role: Option<String>,
}

impl From<RawScheduledTaskTarget> for ScheduledTaskTarget {
    fn from(raw: RawScheduledTaskTarget) -> Self {
        let mut deprecations = Vec::new();
        if raw.task_count.is_some() {
            deprecations.push(DeprecatedField::TaskCount);
        }
        if raw.overrides.is_some() {
            deprecations.push(DeprecatedField::Overrides);
        }

        // 新しいフィールド名が両方指定されていればそちらを優先
        let desired_count = raw.desired_count.or(raw.task_count).unwrap_or(1);
        let container_overrides = raw.container_overrides.or(raw.overrides);

        Self {
            name: raw.name,
            path: raw.path,
            containers: raw.containers,
            depend_service: raw.depend_service,
            desired_count,
            container_overrides,
            launch_type: raw.launch_type,
            network_configuration: raw.network_configuration,
            task_role: raw.task_role,
            cloudwatch_event_iam_role: raw.cloudwatch_event_iam_role,
            deprecations,
        }
    }
}

impl ScheduledRule {
    /// 指定サービスに依存するターゲットを持つか
    pub fn depends_on(&self, service: &str) -> bool {
        self.targets.iter().any(|t| t.depends_on(service))
    }
}

impl ScheduledTaskTarget {
    pub fn depends_on(&self, service: &str) -> bool {
        self.depend_service.as_deref() == Some(service)
    }
}
