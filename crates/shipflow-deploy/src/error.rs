use shipflow_build::BuildError;
use shipflow_cloud::CloudError;
use shipflow_core::{ManifestError, SourceError};
use thiserror::Error;

/// デプロイ処理のエラー
#[derive(Error, Debug)]
pub enum DeployError {
    /// リクエストがマニフェストやクラスタの状態と整合しない
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("Orchestrator is not ready (call ready() first)")]
    NotReady,

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error(transparent)]
    Source(SourceError),

    #[error(transparent)]
    Manifest(ManifestError),
}

impl DeployError {
    pub fn is_validation(&self) -> bool {
        matches!(self, DeployError::Validation(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DeployError::NotFound { .. })
    }
}

impl From<ManifestError> for DeployError {
    fn from(err: ManifestError) -> Self {
        match err {
            ManifestError::ClusterNotFound(name) => DeployError::NotFound {
                kind: "cluster",
                name,
            },
            ManifestError::ServiceNotFound { cluster, name } => DeployError::NotFound {
                kind: "service",
                name: format!("{}/{}", cluster, name),
            },
            ManifestError::RunTaskNotFound { cluster, name } => DeployError::NotFound {
                kind: "run task",
                name: format!("{}/{}", cluster, name),
            },
            other => DeployError::Manifest(other),
        }
    }
}

impl From<SourceError> for DeployError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::CommitNotFound(name) => DeployError::NotFound {
                kind: "commit",
                name,
            },
            SourceError::Manifest(err) => err.into(),
            other => DeployError::Source(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, DeployError>;
