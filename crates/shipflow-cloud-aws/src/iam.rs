use crate::cli::AwsCli;
use crate::error::AwsError;
use async_trait::async_trait;
use serde::Deserialize;
use shipflow_cloud::RoleResolver;

/// IAM ロール名を ARN に解決する
pub struct IamRoleResolver {
    cli: AwsCli,
}

impl IamRoleResolver {
    pub fn new(cli: AwsCli) -> Self {
        Self { cli }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetRoleResponse {
    role: RoleInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RoleInfo {
    arn: String,
}

#[async_trait]
impl RoleResolver for IamRoleResolver {
    async fn role_arn(&self, name: &str) -> shipflow_cloud::Result<String> {
        // ARN がそのまま書かれている場合は問い合わせない
        if is_arn(name) {
            return Ok(name.to_string());
        }

        let response: GetRoleResponse = self
            .cli
            .run_json(&["iam", "get-role", "--role-name", name])
            .await
            .map_err(|e| match e {
                AwsError::CommandFailed { stderr, .. } if stderr.contains("NoSuchEntity") => {
                    AwsError::RoleNotFound(name.to_string())
                }
                other => other,
            })?;

        Ok(response.role.arn)
    }
}

fn is_arn(name: &str) -> bool {
    name.starts_with("arn:")
}
