use crate::error::Result;
use shipflow_cloud::{ClusterScheduler, TaskDefinitionHandle};
use shipflow_core::CodeSource;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// タスク定義の登録結果 (デプロイ実行単位)
///
/// 同じタスク定義ファイルは1回のデプロイ中に一度だけ登録し、以降は同じハンドルを返す。
#[derive(Debug, Default)]
pub struct RegistrationCache {
    handles: HashMap<PathBuf, TaskDefinitionHandle>,
}

impl RegistrationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 解決済みパスで登録済みのハンドル
    pub fn get(&self, path: &Path) -> Option<&TaskDefinitionHandle> {
        self.handles.get(path)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// 登録済みのパスとハンドル (パス順)
    pub fn entries(&self) -> Vec<(&Path, &TaskDefinitionHandle)> {
        let mut entries: Vec<_> = self
            .handles
            .iter()
            .map(|(path, handle)| (path.as_path(), handle))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }

    /// タスク定義を登録する (登録済みならキャッシュを返す)
    ///
    /// `path` は config ディレクトリからの相対パス。キーには解決後の絶対パスを使うため、
    /// 別の書き方で同じファイルを指していても登録は一度になる。
    pub async fn register(
        &mut self,
        source: &dyn CodeSource,
        scheduler: &dyn ClusterScheduler,
        path: &Path,
        deploy_id: &str,
    ) -> Result<TaskDefinitionHandle> {
        let resolved = source.resolve_config_path(path);

        if let Some(handle) = self.handles.get(&resolved) {
            tracing::debug!(path = %resolved.display(), "Reusing task definition {}", handle);
            return Ok(handle.clone());
        }

        let content = source.read_task_definition(&resolved).await?;
        let handle = scheduler
            .register_task_definition(&content, deploy_id)
            .await?;

        tracing::info!(path = %resolved.display(), "Registered task definition {}", handle);
        self.handles.insert(resolved, handle.clone());
        Ok(handle)
    }
}
