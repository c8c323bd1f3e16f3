//! レジストリ認証処理
//!
//! プッシュ時の認証情報を [`CredentialSource`] として抽象化します。
//! デフォルト実装の [`RegistryAuth`] は Docker config.json と
//! credential helper から認証情報を取得します。

use crate::error::{BuildError, BuildResult};
use async_trait::async_trait;
use base64::Engine;
use bollard::auth::DockerCredentials;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// レジストリ認証情報の取得元
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// レジストリの認証情報を取得 (不要な場合は None)
    async fn credentials(&self, registry: &str) -> BuildResult<Option<DockerCredentials>>;
}

/// `~/.docker/config.json` のうち認証に関わる部分
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DockerConfig {
    #[serde(default)]
    auths: HashMap<String, AuthEntry>,
    #[serde(default)]
    creds_store: Option<String>,
    #[serde(default)]
    cred_helpers: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct AuthEntry {
    auth: Option<String>,
}

impl DockerConfig {
    /// ファイルがなければ None
    fn load(path: &Path) -> BuildResult<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let invalid = |message: String| BuildError::AuthFailed {
            registry: path.display().to_string(),
            message,
        };
        let content = std::fs::read_to_string(path)
            .map_err(|e| invalid(format!("cannot read docker config: {}", e)))?;
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| invalid(format!("cannot parse docker config: {}", e)))
    }

    /// レジストリ個別の helper を優先し、なければ credsStore
    fn helper_for(&self, registry: &str) -> Option<&str> {
        self.cred_helpers
            .get(registry)
            .or(self.creds_store.as_ref())
            .map(String::as_str)
    }
}

/// `docker-credential-<helper> get` の出力
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HelperCredentials {
    username: String,
    secret: String,
}

/// `docker-credential-<helper> get` を実行する。helper が失敗したら None
async fn run_credential_helper(
    helper: &str,
    registry: &str,
) -> BuildResult<Option<DockerCredentials>> {
    let program = format!("docker-credential-{}", helper);
    let auth_failed = |message: String| BuildError::AuthFailed {
        registry: registry.to_string(),
        message,
    };

    let mut child = Command::new(&program)
        .arg("get")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| auth_failed(format!("{} could not be started: {}", program, e)))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(registry.as_bytes())
            .await
            .map_err(|e| auth_failed(format!("{}: {}", program, e)))?;
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| auth_failed(format!("{}: {}", program, e)))?;

    if !output.status.success() {
        tracing::debug!(
            helper = %program,
            "No credentials for {}: {}",
            registry,
            String::from_utf8_lossy(&output.stderr).trim()
        );
        return Ok(None);
    }

    let found: HelperCredentials = serde_json::from_slice(&output.stdout)
        .map_err(|e| auth_failed(format!("unexpected {} output: {}", program, e)))?;

    Ok(Some(DockerCredentials {
        username: Some(found.username),
        password: Some(found.secret),
        serveraddress: Some(registry.to_string()),
        ..Default::default()
    }))
}

/// `docker login` 済みの認証情報を使う
#[derive(Debug)]
pub struct RegistryAuth {
    config_path: PathBuf,
}

impl Default for RegistryAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryAuth {
    /// `$DOCKER_CONFIG/config.json`、未設定なら `~/.docker/config.json`
    pub fn new() -> Self {
        let docker_dir = match std::env::var_os("DOCKER_CONFIG") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::home_dir()
                .map(|home| home.join(".docker"))
                .unwrap_or_else(|| PathBuf::from(".docker")),
        };

        Self::with_config_path(docker_dir.join("config.json"))
    }

    pub fn with_config_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }
}

#[async_trait]
impl CredentialSource for RegistryAuth {
    async fn credentials(&self, registry: &str) -> BuildResult<Option<DockerCredentials>> {
        let Some(config) = DockerConfig::load(&self.config_path)? else {
            tracing::debug!(path = %self.config_path.display(), "No docker config, pushing without credentials");
            return Ok(None);
        };

        let inline = config.auths.get(registry).and_then(|entry| entry.auth.as_deref());
        if let Some(encoded) = inline
            && let Some(credentials) = decode_auth(encoded, registry)?
        {
            return Ok(Some(credentials));
        }

        match config.helper_for(registry) {
            Some(helper) => match run_credential_helper(helper, registry).await {
                Ok(credentials) => Ok(credentials),
                Err(e) => {
                    tracing::warn!("{}", e);
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }
}

/// Base64エンコードされた "username:password" をデコード
pub fn decode_auth(auth_b64: &str, registry: &str) -> BuildResult<Option<DockerCredentials>> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(auth_b64.trim())
        .map_err(|e| BuildError::AuthFailed {
            registry: registry.to_string(),
            message: format!("Failed to decode auth: {}", e),
        })?;

    let auth_str = String::from_utf8(decoded).map_err(|e| BuildError::AuthFailed {
        registry: registry.to_string(),
        message: format!("Invalid UTF-8 in auth: {}", e),
    })?;

    Ok(auth_str
        .split_once(':')
        .map(|(username, password)| DockerCredentials {
            username: Some(username.to_string()),
            password: Some(password.to_string()),
            serveraddress: Some(registry.to_string()),
            ..Default::default()
        }))
}
