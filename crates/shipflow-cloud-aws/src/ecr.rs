//! ECR ログイン
//!
//! `aws ecr get-login-password` の結果をプッシュ時の認証情報として使う。

use crate::cli::AwsCli;
use crate::error::Result;
use async_trait::async_trait;
use serde::Deserialize;
use shipflow_build::{BuildResult, CredentialSource, DockerCredentials};

/// ECR のログインユーザー名 (固定)
const ECR_USERNAME: &str = "AWS";

/// ECR のレジストリ認証
pub struct EcrCredentials {
    cli: AwsCli,
}

impl EcrCredentials {
    pub fn new(cli: AwsCli) -> Self {
        Self { cli }
    }

    /// 呼び出し元アカウントの既定レジストリ
    pub async fn default_registry(&self) -> Result<String> {
        let identity: CallerIdentity = self.cli.run_json(&["sts", "get-caller-identity"]).await?;
        let region = self.cli.resolve_region().await?;
        Ok(registry_host(&identity.account, &region))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CallerIdentity {
    account: String,
}

#[async_trait]
impl CredentialSource for EcrCredentials {
    async fn credentials(&self, registry: &str) -> BuildResult<Option<DockerCredentials>> {
        let password = self
            .cli
            .run(&["ecr", "get-login-password"])
            .await
            .map_err(|e| e.into_auth_error(registry))?;

        Ok(Some(login_credentials(registry, password.trim())))
    }
}

fn login_credentials(registry: &str, password: &str) -> DockerCredentials {
    DockerCredentials {
        username: Some(ECR_USERNAME.to_string()),
        password: Some(password.to_string()),
        serveraddress: Some(registry.to_string()),
        ..Default::default()
    }
}

/// アカウントとリージョンから ECR のホスト名を組み立てる
pub fn registry_host(account_id: &str, region: &str) -> String {
    format!("{}.dkr.ecr.{}.amazonaws.com", account_id, region)
}

pub fn is_ecr_registry(host: &str) -> bool {
    host.contains(".dkr.ecr.") && host.ends_with(".amazonaws.com")
}
