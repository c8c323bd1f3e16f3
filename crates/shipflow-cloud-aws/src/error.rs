//! AWS provider error types

use shipflow_build::BuildError;
use shipflow_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AwsError {
    #[error("aws CLI not found. Please install: https://aws.amazon.com/cli/")]
    AwsCliNotFound,

    #[error("aws {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Cluster not found: {0}")]
    ClusterNotFound(String),

    #[error("Role not found: {0}")]
    RoleNotFound(String),

    #[error("Invalid task definition: {0}")]
    InvalidTaskDefinition(String),

    #[error("Task launch failed: {0}")]
    TaskLaunchFailed(String),

    #[error("Unexpected aws response: {0}")]
    UnexpectedResponse(String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AwsError>;

impl From<AwsError> for CloudError {
    fn from(err: AwsError) -> Self {
        match err {
            AwsError::ClusterNotFound(_) | AwsError::RoleNotFound(_) => {
                CloudError::ResourceNotFound(err.to_string())
            }
            AwsError::InvalidTaskDefinition(message) => CloudError::InvalidTaskDefinition(message),
            AwsError::AwsCliNotFound | AwsError::CommandFailed { .. } => {
                CloudError::CommandFailed(err.to_string())
            }
            AwsError::IoError(e) => CloudError::Io(e),
            AwsError::JsonError(e) => CloudError::Json(e),
            other => CloudError::ApiError(other.to_string()),
        }
    }
}

impl AwsError {
    /// レジストリ認証エラーに変換
    pub fn into_auth_error(self, registry: &str) -> BuildError {
        BuildError::AuthFailed {
            registry: registry.to_string(),
            message: self.to_string(),
        }
    }
}
