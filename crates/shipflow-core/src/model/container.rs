//! コンテナ (ビルド単位) 定義

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// ビルド対象のコンテナ定義
///
/// YAML形式：
/// ```yaml
/// containers:
///   - name: web
///     build: .
///   - name: worker
///     repository: myapp-worker
///     build:
///       context: worker
///       dockerfile: worker/Dockerfile.prod
///       args:
///         RAILS_ENV: production
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// タスク定義内のコンテナ名
    pub name: String,
    /// プッシュ先のリポジトリ名 (省略時はコンテナ名)
    #[serde(default)]
    pub repository: Option<String>,
    pub build: BuildSpec,
}

impl ContainerSpec {
    pub fn repository(&self) -> &str {
        self.repository.as_deref().unwrap_or(&self.name)
    }
}

/// ビルド設定
///
/// 文字列のみの場合はビルドコンテキストとして扱う
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "BuildField")]
pub struct BuildSpec {
    /// ビルドコンテキスト (base path からの相対パス)
    pub context: PathBuf,
    /// Dockerfile (base path からの相対パス、省略時は {context}/Dockerfile)
    pub dockerfile: Option<PathBuf>,
    pub args: HashMap<String, String>,
    /// マルチステージビルドのターゲット
    pub target: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BuildField {
    Context(PathBuf),
    Detailed {
        #[serde(default = "default_context")]
        context: PathBuf,
        #[serde(default)]
        dockerfile: Option<PathBuf>,
        #[serde(default)]
        args: HashMap<String, String>,
        #[serde(default)]
        target: Option<String>,
    },
}

fn default_context() -> PathBuf {
    PathBuf::from(".")
}

impl From<BuildField> for BuildSpec {
    fn from(field: BuildField) -> Self {
        match field {
            BuildField::Context(context) => BuildSpec {
                context,
                ..Default::default()
            },
            BuildField::Detailed {
                context,
                dockerfile,
                args,
                target,
            } => BuildSpec {
                context,
                dockerfile,
                args,
                target,
            },
        }
    }
}

impl BuildSpec {
    /// Dockerfile のパス (base path からの相対)
    pub fn dockerfile_path(&self) -> PathBuf {
        self.dockerfile
            .clone()
            .unwrap_or_else(|| self.context.join("Dockerfile"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_as_context_string() {
        let spec: ContainerSpec = serde_yaml::from_str("name: web\nbuild: app\n").unwrap();
        assert_eq!(spec.build.context, PathBuf::from("app"));
        assert_eq!(spec.build.dockerfile_path(), PathBuf::from("app/Dockerfile"));
        assert_eq!(spec.repository(), "web");
    }

    #[test]
    fn test_build_detailed() {
        let yaml = r#"
name: worker
repository: myapp-worker
build:
  dockerfile: docker/Dockerfile.worker
  args:
    RAILS_ENV: production
  target: release
"#;
        let spec: ContainerSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.build.context, PathBuf::from("."));
        assert_eq!(
            spec.build.dockerfile_path(),
            PathBuf::from("docker/Dockerfile.worker")
        );
        assert_eq!(spec.build.args.get("RAILS_ENV").unwrap(), "production");
        assert_eq!(spec.build.target.as_deref(), Some("release"));
        assert_eq!(spec.repository(), "myapp-worker");
    }
}
