use crate::context::ContextBuilder;
use crate::error::{BuildError, BuildResult};
use crate::resolver::BuildResolver;
use async_trait::async_trait;
use bollard::Docker;
use futures_util::stream::StreamExt;
use shipflow_core::ContainerSpec;
use std::collections::HashMap;
use std::path::Path;

/// ビルド済みのローカルイメージ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalImage {
    /// ビルド元のコンテナ名
    pub container: String,
    /// プッシュ先リポジトリ名
    pub repository: String,
    /// ローカルのイメージ参照 (name:tag)
    pub reference: String,
}

/// イメージのビルド
#[async_trait]
pub trait ImageBuild: Send + Sync {
    /// コンテナ定義からイメージをビルドする。`base_path` はビルド設定の基準ディレクトリ
    async fn build(&self, container: &ContainerSpec, base_path: &Path) -> BuildResult<LocalImage>;
}

/// Docker Engine API でビルドする
pub struct DockerImageBuilder {
    docker: Docker,
    variables: HashMap<String, String>,
    no_cache: bool,
}

impl DockerImageBuilder {
    pub fn new(docker: Docker) -> Self {
        Self {
            docker,
            variables: HashMap::new(),
            no_cache: false,
        }
    }

    /// ビルド引数の展開に使う変数
    pub fn with_variables(mut self, variables: HashMap<String, String>) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_no_cache(mut self, no_cache: bool) -> Self {
        self.no_cache = no_cache;
        self
    }

    /// コンテナ定義からローカルタグを決める
    pub fn local_tag(container: &ContainerSpec) -> String {
        format!("{}:latest", container.repository())
    }

    /// ビルド出力の処理
    fn handle_build_output(
        &self,
        container: &str,
        output: bollard::models::BuildInfo,
    ) -> BuildResult<()> {
        if let Some(stream) = output.stream {
            let line = stream.trim_end();
            if !line.is_empty() {
                tracing::debug!(container = %container, "{}", line);
            }
        }

        if let Some(error) = output.error {
            return Err(BuildError::BuildFailed {
                container: container.to_string(),
                message: error,
            });
        }

        if let Some(error_detail) = output.error_detail {
            let message = error_detail
                .message
                .unwrap_or_else(|| "Unknown build error".to_string());
            return Err(BuildError::BuildFailed {
                container: container.to_string(),
                message,
            });
        }

        if let Some(status) = output.status {
            tracing::debug!(container = %container, "{}", status);
        }

        Ok(())
    }
}

#[async_trait]
impl ImageBuild for DockerImageBuilder {
    async fn build(&self, container: &ContainerSpec, base_path: &Path) -> BuildResult<LocalImage> {
        let resolver = BuildResolver::new(base_path.to_path_buf());
        let context_path = resolver.resolve_context(&container.build)?;
        let dockerfile_path = resolver.resolve_dockerfile(&container.build)?;
        let build_args = resolver.resolve_build_args(&container.build, &self.variables);

        let tag = Self::local_tag(container);
        tracing::info!(
            container = %container.name,
            dockerfile = %dockerfile_path.display(),
            context = %context_path.display(),
            "Building image: {}",
            tag
        );

        let context_data = ContextBuilder::create_context(&context_path, &dockerfile_path)?;

        let build_args_refs: HashMap<&str, &str> = build_args
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        #[allow(deprecated)]
        let options = bollard::image::BuildImageOptions {
            dockerfile: "Dockerfile",
            t: tag.as_str(),
            buildargs: build_args_refs,
            target: container.build.target.as_deref().unwrap_or(""),
            nocache: self.no_cache,
            rm: true,
            forcerm: true,
            pull: true,
            ..Default::default()
        };

        use bytes::Bytes;
        use http_body_util::{Either, Full};
        let body = Full::new(Bytes::from(context_data));
        let mut stream = self
            .docker
            .build_image(options, None, Some(Either::Left(body)));

        while let Some(msg) = stream.next().await {
            let output = msg.map_err(BuildError::DockerConnection)?;
            self.handle_build_output(&container.name, output)?;
        }

        tracing::info!(container = %container.name, "Successfully built: {}", tag);

        Ok(LocalImage {
            container: container.name.clone(),
            repository: container.repository().to_string(),
            reference: tag,
        })
    }
}
