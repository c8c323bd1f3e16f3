//! イメージプッシュ処理
//!
//! ビルドしたイメージにデプロイIDのタグを付けてレジストリにプッシュします。

use crate::auth::CredentialSource;
use crate::builder::LocalImage;
use crate::error::{BuildError, BuildResult};
use async_trait::async_trait;
use bollard::Docker;
use bollard::auth::DockerCredentials;
use bollard::models::PushImageInfo;
use futures_util::StreamExt;
use std::sync::Mutex;

/// イメージレジストリ
#[async_trait]
pub trait ImageRegistry: Send + Sync {
    /// レジストリにログインする
    async fn authenticate(&self) -> BuildResult<()>;

    /// ローカルイメージを `tag` でプッシュし、リモートのイメージ参照を返す
    async fn push(&self, image: &LocalImage, tag: &str) -> BuildResult<String>;
}

/// Docker Engine API でプッシュするレジストリ
pub struct DockerRegistry {
    docker: Docker,
    /// レジストリホスト (例: 123456789012.dkr.ecr.ap-northeast-1.amazonaws.com)
    registry: String,
    credential_source: Box<dyn CredentialSource>,
    credentials: Mutex<Option<DockerCredentials>>,
}

impl DockerRegistry {
    pub fn new(
        docker: Docker,
        registry: impl Into<String>,
        credential_source: Box<dyn CredentialSource>,
    ) -> Self {
        Self {
            docker,
            registry: registry.into().trim_end_matches('/').to_string(),
            credential_source,
            credentials: Mutex::new(None),
        }
    }

    /// プッシュ先のイメージ名 (タグなし)
    pub fn remote_image(&self, repository: &str) -> String {
        format!("{}/{}", self.registry, repository)
    }

    fn cached_credentials(&self) -> Option<DockerCredentials> {
        self.credentials
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    fn store_credentials(&self, credentials: Option<DockerCredentials>) {
        if let Ok(mut guard) = self.credentials.lock() {
            *guard = credentials;
        }
    }

    fn handle_progress(&self, image: &str, info: &PushImageInfo) {
        if let Some(status) = &info.status {
            match status.as_str() {
                // 準備中は表示をスキップ（ノイズ軽減）
                "Preparing" | "Waiting" | "Pushing" => {}
                _ => tracing::debug!(image = %image, "{}", status),
            }
        }
    }
}

#[async_trait]
impl ImageRegistry for DockerRegistry {
    async fn authenticate(&self) -> BuildResult<()> {
        let credentials = self.credential_source.credentials(&self.registry).await?;
        if credentials.is_none() {
            tracing::warn!("No credentials for registry {}, pushing anonymously", self.registry);
        } else {
            tracing::info!("Authenticated to registry {}", self.registry);
        }
        self.store_credentials(credentials);
        Ok(())
    }

    async fn push(&self, image: &LocalImage, tag: &str) -> BuildResult<String> {
        validate_tag(tag)?;

        let remote = self.remote_image(&image.repository);
        let full_image = format!("{}:{}", remote, tag);

        #[allow(deprecated)]
        let tag_options = bollard::image::TagImageOptions {
            repo: remote.clone(),
            tag: tag.to_string(),
        };
        self.docker
            .tag_image(&image.reference, Some(tag_options))
            .await?;

        tracing::info!(container = %image.container, "Pushing {}", full_image);

        #[allow(deprecated)]
        let options = bollard::image::PushImageOptions::<String> {
            tag: tag.to_string(),
        };

        let credentials = self.cached_credentials();
        #[allow(deprecated)]
        let mut stream = self.docker.push_image(&remote, Some(options), credentials);

        let mut error_message: Option<String> = None;
        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(err) = &info.error {
                        error_message = Some(err.clone());
                    } else {
                        self.handle_progress(&full_image, &info);
                    }
                }
                Err(e) => {
                    return Err(BuildError::PushFailed {
                        message: e.to_string(),
                    });
                }
            }
        }

        if let Some(err) = error_message {
            return Err(BuildError::PushFailed { message: err });
        }

        tracing::info!(container = %image.container, "Pushed {}", full_image);
        Ok(full_image)
    }
}

/// タグのバリデーション
///
/// Docker タグの制約:
/// - 128文字以下
/// - 英数字、ピリオド、ハイフン、アンダースコアのみ
/// - 先頭はピリオドまたはハイフンではない
pub fn validate_tag(tag: &str) -> BuildResult<()> {
    if tag.is_empty() {
        return Err(BuildError::InvalidTag {
            tag: "(empty)".to_string(),
        });
    }

    if tag.len() > 128 {
        return Err(BuildError::InvalidTag {
            tag: format!("Tag too long ({} characters, max 128)", tag.len()),
        });
    }

    if tag.starts_with('.') || tag.starts_with('-') {
        return Err(BuildError::InvalidTag {
            tag: tag.to_string(),
        });
    }

    if let Some(c) = tag
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && *c != '.' && *c != '-' && *c != '_')
    {
        return Err(BuildError::InvalidTag {
            tag: format!("Invalid character '{}' in tag: {}", c, tag),
        });
    }

    Ok(())
}
