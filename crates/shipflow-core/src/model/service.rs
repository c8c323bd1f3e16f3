//! サービス・run task 定義

use super::container::ContainerSpec;
use super::task::{ContainerOverride, LaunchType, NetworkConfiguration};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 常駐サービス定義
///
/// YAML形式：
/// ```yaml
/// services:
///   api:
///     path: deploy/api.yml
///     desired_count: 2
///     containers:
///       - name: web
///         build: .
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceTarget {
    /// マップのキーから設定される
    #[serde(skip)]
    pub name: String,
    /// タスク定義ファイル (config ディレクトリからの相対パス)
    pub path: PathBuf,
    #[serde(default)]
    pub containers: Vec<ContainerSpec>,
    #[serde(default)]
    pub desired_count: Option<u32>,
    #[serde(default)]
    pub force_new_deployment: Option<bool>,
    #[serde(default)]
    pub health_check_grace_period_seconds: Option<u32>,
    #[serde(default)]
    pub minimum_healthy_percent: Option<u32>,
    #[serde(default)]
    pub maximum_percent: Option<u32>,
}

/// 単発実行タスク定義
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunTaskTarget {
    #[serde(skip)]
    pub name: String,
    pub path: PathBuf,
    #[serde(default)]
    pub containers: Vec<ContainerSpec>,
    #[serde(default)]
    pub desired_count: Option<u32>,
    /// タスクグループ名
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub network_configuration: Option<NetworkConfiguration>,
    #[serde(default)]
    pub launch_type: Option<LaunchType>,
    /// タスクロール名 (ARN に解決される)
    #[serde(default)]
    pub task_role: Option<String>,
    /// タスク実行ロール名 (ARN に解決される)
    #[serde(default)]
    pub task_execution_role: Option<String>,
    #[serde(default)]
    pub container_overrides: Option<Vec<ContainerOverride>>,
}
