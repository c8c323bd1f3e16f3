use crate::builder::ImageBuild;
use crate::error::BuildResult;
use crate::pusher::ImageRegistry;
use shipflow_core::ContainerSpec;
use std::path::Path;

/// コンテナ定義をビルドしてレジストリにプッシュする
pub struct ArtifactPublisher<'a> {
    builder: &'a dyn ImageBuild,
    registry: &'a dyn ImageRegistry,
}

impl<'a> ArtifactPublisher<'a> {
    pub fn new(builder: &'a dyn ImageBuild, registry: &'a dyn ImageRegistry) -> Self {
        Self { builder, registry }
    }

    /// 定義順にビルドとプッシュを行い、プッシュできたイメージ数を返す
    ///
    /// 最初に失敗したコンテナでエラーを返す。それまでにプッシュしたイメージはそのまま残る。
    pub async fn publish(
        &self,
        containers: &[ContainerSpec],
        base_path: &Path,
        deploy_id: &str,
    ) -> BuildResult<usize> {
        let mut published = 0;

        for container in containers {
            let image = self.builder.build(container, base_path).await?;
            let remote = self.registry.push(&image, deploy_id).await?;
            tracing::info!(container = %container.name, image = %remote, "Published");
            published += 1;
        }

        Ok(published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::LocalImage;
    use crate::error::BuildError;
    use async_trait::async_trait;
    use shipflow_core::BuildSpec;
    use std::path::PathBuf;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeBuilder {
        fail_on: Option<String>,
        built: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ImageBuild for FakeBuilder {
        async fn build(&self, container: &ContainerSpec, _base_path: &Path) -> BuildResult<LocalImage> {
            if self.fail_on.as_deref() == Some(container.name.as_str()) {
                return Err(BuildError::BuildFailed {
                    container: container.name.clone(),
                    message: "exit code 1".to_string(),
                });
            }
            self.built.lock().unwrap().push(container.name.clone());
            Ok(LocalImage {
                container: container.name.clone(),
                repository: container.repository().to_string(),
                reference: format!("{}:latest", container.repository()),
            })
        }
    }

    #[derive(Default)]
    struct FakeRegistry {
        pushed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ImageRegistry for FakeRegistry {
        async fn authenticate(&self) -> BuildResult<()> {
            Ok(())
        }

        async fn push(&self, image: &LocalImage, tag: &str) -> BuildResult<String> {
            let remote = format!("registry.test/{}:{}", image.repository, tag);
            self.pushed.lock().unwrap().push(remote.clone());
            Ok(remote)
        }
    }

    fn container(name: &str) -> ContainerSpec {
        ContainerSpec {
            name: name.to_string(),
            repository: None,
            build: BuildSpec {
                context: PathBuf::from(name),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_publish_all_in_order() {
        let builder = FakeBuilder::default();
        let registry = FakeRegistry::default();
        let publisher = ArtifactPublisher::new(&builder, &registry);

        let count = publisher
            .publish(&[container("web"), container("sidecar")], Path::new("/repo"), "deploy-42")
            .await
            .unwrap();

        assert_eq!(count, 2);
        assert_eq!(
            *registry.pushed.lock().unwrap(),
            vec!["registry.test/web:deploy-42", "registry.test/sidecar:deploy-42"]
        );
    }

    #[tokio::test]
    async fn test_publish_stops_at_first_failure() {
        let builder = FakeBuilder {
            fail_on: Some("worker".to_string()),
            ..Default::default()
        };
        let registry = FakeRegistry::default();
        let publisher = ArtifactPublisher::new(&builder, &registry);

        let result = publisher
            .publish(
                &[container("web"), container("worker"), container("cron")],
                Path::new("/repo"),
                "deploy-1",
            )
            .await;

        assert!(matches!(result, Err(BuildError::BuildFailed { .. })));
        assert_eq!(*builder.built.lock().unwrap(), vec!["web"]);
        assert_eq!(registry.pushed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_publish_nothing() {
        let builder = FakeBuilder::default();
        let registry = FakeRegistry::default();
        let publisher = ArtifactPublisher::new(&builder, &registry);

        let count = publisher.publish(&[], Path::new("/repo"), "deploy-1").await.unwrap();
        assert_eq!(count, 0);
    }
}
