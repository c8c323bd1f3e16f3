//! アプリケーション設定
//!
//! `settings.yml` の構造を定義します。すべての項目は省略可能で、
//! 省略時はデフォルト値が使われます。

use crate::error::{ConfigError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// スケジュールタスクの CloudWatch Events ロールのデフォルト名
pub const DEFAULT_EVENTS_ROLE: &str = "ecsEventsRole";

/// タスク定義登録時に付与するタグキーのデフォルト
pub const DEFAULT_TAG_KEY: &str = "shipflow:deploy-id";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// tracing のフィルタ (RUST_LOG 未設定時に使用)
    pub log_level: String,
    /// リポジトリの clone 先
    pub work_dir: PathBuf,
    pub github: GithubSettings,
    pub repositories: Vec<RepositorySettings>,
    pub aws: AwsSettings,
    pub deploy: DeploySettings,
}

impl Default for Settings {
    fn default() -> Self {
        let work_dir = dirs::data_local_dir()
            .map(|d| d.join("shipflow").join("repos"))
            .unwrap_or_else(|| PathBuf::from("tmp/repos"));

        Self {
            log_level: "info".to_string(),
            work_dir,
            github: GithubSettings::default(),
            repositories: Vec::new(),
            aws: AwsSettings::default(),
            deploy: DeploySettings::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GithubSettings {
    pub account: String,
    /// clone に使うホスト (デフォルト: github.com)
    pub host: Option<String>,
}

/// リポジトリ単位の設定
#[derive(Debug, Clone, Deserialize)]
pub struct RepositorySettings {
    pub name: String,
    /// コマンドから指定するための別名
    #[serde(default)]
    pub alias: Option<String>,
    /// リポジトリ内で deploy 設定を置くディレクトリ (モノレポ用)
    #[serde(default)]
    pub base_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AwsSettings {
    pub region: Option<String>,
    pub profile: Option<String>,
    /// ECR レジストリ (例: 123456789012.dkr.ecr.ap-northeast-1.amazonaws.com)
    pub registry: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeploySettings {
    pub default_events_role: String,
    pub tag_key: String,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            default_events_role: DEFAULT_EVENTS_ROLE.to_string(),
            tag_key: DEFAULT_TAG_KEY.to_string(),
        }
    }
}

impl Settings {
    /// YAML ファイルから設定を読み込む
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn from_yaml(content: &str) -> std::result::Result<Self, serde_yaml::Error> {
        // 空ファイルはデフォルト設定として扱う
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// 名前または別名でリポジトリ設定を探す
    pub fn find_repository(&self, name_or_alias: &str) -> Option<&RepositorySettings> {
        self.repositories
            .iter()
            .find(|r| r.alias.as_deref() == Some(name_or_alias))
            .or_else(|| self.repositories.iter().find(|r| r.name == name_or_alias))
    }

    /// 名前または別名でリポジトリ設定を取得 (見つからなければエラー)
    pub fn repository(&self, name_or_alias: &str) -> Result<&RepositorySettings> {
        self.find_repository(name_or_alias)
            .ok_or_else(|| ConfigError::RepositoryNotFound(name_or_alias.to_string()))
    }

    /// リポジトリの clone 先パス: {work_dir}/{account}/{repository}
    pub fn repository_path(&self, repository: &str) -> PathBuf {
        self.work_dir.join(&self.github.account).join(repository)
    }
}
