//! deploy.yml のルート

use super::scheduled::ScheduledRule;
use super::service::{RunTaskTarget, ServiceTarget};
use crate::error::{ManifestError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// リポジトリ単位のデプロイ設定
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeployManifest {
    #[serde(default)]
    pub clusters: Vec<ClusterConfig>,
}

/// クラスタ単位のデプロイ設定
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub name: String,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceTarget>,
    #[serde(default)]
    pub run_tasks: BTreeMap<String, RunTaskTarget>,
    #[serde(default)]
    pub scheduled_tasks: Vec<ScheduledRule>,
}

impl DeployManifest {
    pub fn cluster(&self, name: &str) -> Result<&ClusterConfig> {
        self.clusters
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| ManifestError::ClusterNotFound(name.to_string()))
    }

    pub fn service(&self, cluster: &str, name: &str) -> Result<&ServiceTarget> {
        self.cluster(cluster)?
            .services
            .get(name)
            .ok_or_else(|| ManifestError::ServiceNotFound {
                cluster: cluster.to_string(),
                name: name.to_string(),
            })
    }

    pub fn run_task(&self, cluster: &str, name: &str) -> Result<&RunTaskTarget> {
        self.cluster(cluster)?
            .run_tasks
            .get(name)
            .ok_or_else(|| ManifestError::RunTaskNotFound {
                cluster: cluster.to_string(),
                name: name.to_string(),
            })
    }
}

impl ClusterConfig {
    pub fn has_scheduled_tasks(&self) -> bool {
        !self.scheduled_tasks.is_empty()
    }
}
