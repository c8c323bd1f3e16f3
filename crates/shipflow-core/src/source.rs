//! ソースコード取得
//!
//! デプロイ対象リポジトリの作業コピーを最新化し、deploy.yml と
//! タスク定義ファイルを提供する。`GitSource` は git CLI のラッパー。

use crate::error::SourceError;
use crate::loader::parse_manifest;
use crate::model::DeployManifest;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

type Result<T> = std::result::Result<T, SourceError>;

/// deploy.yml の base path からの相対位置
pub const MANIFEST_PATH: &str = "config/deploy.yml";

/// デプロイ設定の取得元
#[async_trait]
pub trait CodeSource: Send + Sync {
    /// 作業コピーを最新化し、チェックアウトしたコミットを返す
    async fn update(&self) -> Result<String>;

    /// deploy.yml を読み込む
    async fn load_manifest(&self) -> Result<DeployManifest>;

    /// デプロイ設定の基準ディレクトリ (リポジトリルートと異なる場合がある)
    fn base_path(&self) -> &Path;

    /// config ディレクトリからの相対パスを絶対パスに解決
    fn resolve_config_path(&self, relative: &Path) -> PathBuf {
        normalize_path(&self.base_path().join("config").join(relative))
    }

    /// タスク定義ファイルの内容を読み込む
    async fn read_task_definition(&self, path: &Path) -> Result<String> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SourceError::TaskDefinitionRead {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
    }
}

/// `..` と `.` を取り除く (ファイルシステムには触れない)
fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// チェックアウト対象
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitRef {
    Branch(String),
    Tag(String),
}

impl GitRef {
    /// checkout に渡す名前
    fn checkout_target(&self) -> String {
        match self {
            GitRef::Branch(branch) => branch.clone(),
            GitRef::Tag(tag) => format!("refs/tags/{}", tag),
        }
    }

    /// reset --hard / show に使うリモート側の参照
    fn remote_ref(&self) -> String {
        match self {
            GitRef::Branch(branch) => format!("origin/{}", branch),
            GitRef::Tag(tag) => format!("refs/tags/{}", tag),
        }
    }
}

impl std::fmt::Display for GitRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GitRef::Branch(branch) => write!(f, "branch {}", branch),
            GitRef::Tag(tag) => write!(f, "tag {}", tag),
        }
    }
}

/// git CLI でリポジトリを扱うソース
#[derive(Debug, Clone)]
pub struct GitSource {
    remote: String,
    repos_path: PathBuf,
    /// リポジトリルートからの相対パス
    relative_base: Option<PathBuf>,
    base_path: PathBuf,
    git_ref: GitRef,
}

impl GitSource {
    /// # Arguments
    /// * `remote` - clone 元 URL
    /// * `repos_path` - 作業コピーの配置先
    /// * `relative_base` - deploy 設定を置くリポジトリ内ディレクトリ
    /// * `git_ref` - チェックアウトするブランチまたはタグ
    pub fn new(
        remote: impl Into<String>,
        repos_path: impl Into<PathBuf>,
        relative_base: Option<PathBuf>,
        git_ref: GitRef,
    ) -> Self {
        let repos_path = repos_path.into();
        let base_path = match &relative_base {
            Some(base) => repos_path.join(base),
            None => repos_path.clone(),
        };

        Self {
            remote: remote.into(),
            repos_path,
            relative_base,
            base_path,
            git_ref,
        }
    }

    /// GitHub の SSH clone URL
    pub fn github_uri(host: Option<&str>, account: &str, repository: &str) -> String {
        format!(
            "git@{}:{}/{}.git",
            host.unwrap_or("github.com"),
            account,
            repository
        )
    }

    /// チェックアウト対象が指すコミット (ブランチ・タグがなければ CommitNotFound)
    async fn resolve_commit(&self) -> Result<String> {
        let reference = format!("{}^{{commit}}", self.git_ref.remote_ref());
        match self
            .run_git(&["rev-parse", "--verify", "--quiet", &reference])
            .await
        {
            Ok(sha) => Ok(sha.trim().to_string()),
            Err(SourceError::CommandFailed { .. }) => {
                Err(SourceError::CommitNotFound(self.git_ref.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn ensure_clone(&self) -> Result<()> {
        if self.repos_path.join(".git").join("config").is_file() {
            return Ok(());
        }

        if self.repos_path.exists() {
            tokio::fs::remove_dir_all(&self.repos_path).await?;
        }
        if let Some(parent) = self.repos_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tracing::info!("Git clone: {}", self.remote);
        let path = self.repos_path.to_string_lossy().to_string();
        run_git_in(None, &["clone", "--recursive", &self.remote, &path]).await?;
        Ok(())
    }

    async fn run_git(&self, args: &[&str]) -> Result<String> {
        run_git_in(Some(&self.repos_path), args).await
    }

    fn manifest_repo_path(&self) -> String {
        let path = match &self.relative_base {
            Some(base) => normalize_path(&base.join(MANIFEST_PATH)),
            None => PathBuf::from(MANIFEST_PATH),
        };
        path.to_string_lossy().replace('\\', "/")
    }
}

/// git コマンドを実行して stdout を返す
async fn run_git_in(dir: Option<&Path>, args: &[&str]) -> Result<String> {
    let mut cmd = Command::new("git");
    if let Some(dir) = dir {
        cmd.current_dir(dir);
    }
    cmd.args(args);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    tracing::debug!("Running: git {}", args.join(" "));

    let output = cmd.output().await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => SourceError::GitNotFound,
        _ => SourceError::Io(e),
    })?;

    if !output.status.success() {
        return Err(SourceError::CommandFailed {
            command: args.first().copied().unwrap_or_default().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

#[async_trait]
impl CodeSource for GitSource {
    async fn update(&self) -> Result<String> {
        // 前回の作業コピーは破棄して clone し直す
        if self.repos_path.exists() {
            tokio::fs::remove_dir_all(&self.repos_path).await?;
        }
        self.ensure_clone().await?;

        tracing::info!("Git checkout: {}", self.git_ref);

        let checkout = self.git_ref.checkout_target();
        let reset_hard = self.git_ref.remote_ref();

        self.run_git(&["fetch", "--tags"]).await?;
        let commit = self.resolve_commit().await?;

        self.run_git(&["clean", "-ffd"]).await?;
        self.run_git(&["checkout", &checkout]).await?;
        self.run_git(&["reset", "--hard", &reset_hard]).await?;
        self.run_git(&["submodule", "update", "--init", "--recursive"])
            .await?;

        Ok(commit)
    }

    async fn load_manifest(&self) -> Result<DeployManifest> {
        self.ensure_clone().await?;
        self.run_git(&["fetch", "--tags"]).await?;

        let object = format!("{}:{}", self.git_ref.remote_ref(), self.manifest_repo_path());
        let content = self.run_git(&["show", &object]).await?;

        Ok(parse_manifest(&content)?)
    }

    fn base_path(&self) -> &Path {
        &self.base_path
    }
}
