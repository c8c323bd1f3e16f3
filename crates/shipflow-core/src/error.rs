use std::path::PathBuf;
use thiserror::Error;

/// deploy.yml の読み込み・参照エラー
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("deploy.yml のパースに失敗しました: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("無効な設定: {0}")]
    InvalidConfig(String),

    #[error("クラスタが見つかりません: {0}")]
    ClusterNotFound(String),

    #[error("サービスが見つかりません: {cluster}/{name}")]
    ServiceNotFound { cluster: String, name: String },

    #[error("run task が見つかりません: {cluster}/{name}")]
    RunTaskNotFound { cluster: String, name: String },

    #[error("ファイル読み込みエラー: {path}\n理由: {message}")]
    IoError { path: PathBuf, message: String },
}

impl ManifestError {
    /// 参照先が存在しないことを示すエラーか
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ManifestError::ClusterNotFound(_)
                | ManifestError::ServiceNotFound { .. }
                | ManifestError::RunTaskNotFound { .. }
        )
    }
}

/// ソースコード取得 (git) のエラー
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("git コマンドが見つかりません")]
    GitNotFound,

    #[error("git {command} が失敗しました: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("コミットが見つかりません: {0}")]
    CommitNotFound(String),

    #[error("タスク定義ファイルを読み込めません: {path}\n理由: {message}")]
    TaskDefinitionRead { path: PathBuf, message: String },

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ManifestError>;
