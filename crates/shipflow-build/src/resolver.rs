use crate::error::{BuildError, BuildResult};
use shipflow_core::BuildSpec;
use std::collections::HashMap;
use std::path::PathBuf;

/// コンテナ定義のビルド設定を base path 基準で解決する
pub struct BuildResolver {
    base_path: PathBuf,
}

impl BuildResolver {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    /// Dockerfileのパスを解決
    ///
    /// 明示的な指定がなければ {context}/Dockerfile
    pub fn resolve_dockerfile(&self, build: &BuildSpec) -> BuildResult<PathBuf> {
        let path = self.base_path.join(build.dockerfile_path());
        if !path.is_file() {
            return Err(BuildError::DockerfileNotFound(path));
        }

        tracing::debug!("Resolved Dockerfile: {}", path.display());
        Ok(path)
    }

    /// ビルドコンテキストのパスを解決
    pub fn resolve_context(&self, build: &BuildSpec) -> BuildResult<PathBuf> {
        let context = self.base_path.join(&build.context);

        if !context.exists() {
            return Err(BuildError::ContextNotFound(context));
        }

        if !context.is_dir() {
            return Err(BuildError::InvalidConfig(format!(
                "Build context is not a directory: {}",
                context.display()
            )));
        }

        Ok(context)
    }

    /// ビルド引数の変数展開
    pub fn resolve_build_args(
        &self,
        build: &BuildSpec,
        variables: &HashMap<String, String>,
    ) -> HashMap<String, String> {
        build
            .args
            .iter()
            .map(|(key, value)| {
                self.validate_build_arg(key);
                (key.clone(), expand_variables(value, variables))
            })
            .collect()
    }

    /// ビルド引数の検証（機密情報の警告）
    fn validate_build_arg(&self, key: &str) {
        let sensitive_patterns = ["password", "token", "secret", "api_key", "private_key"];

        let key_lower = key.to_lowercase();
        if sensitive_patterns.iter().any(|p| key_lower.contains(p)) {
            tracing::warn!(
                "ビルド引数 '{}' は機密情報を含む可能性があります。ビルド引数はイメージ履歴に記録されます。",
                key
            );
        }
    }
}

/// テンプレート文字列内の {VAR_NAME} を実際の値に置換
pub fn expand_variables(template: &str, variables: &HashMap<String, String>) -> String {
    let mut result = template.to_string();

    for (key, value) in variables {
        let placeholder = format!("{{{}}}", key);
        result = result.replace(&placeholder, value);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_resolve_dockerfile_default() {
        let temp_dir = tempdir().unwrap();
        let dockerfile_path = temp_dir.path().join("Dockerfile");
        fs::write(&dockerfile_path, "FROM alpine").unwrap();

        let resolver = BuildResolver::new(temp_dir.path().to_path_buf());
        let build = BuildSpec {
            context: PathBuf::from("."),
            ..Default::default()
        };

        let result = resolver.resolve_dockerfile(&build).unwrap();
        assert_eq!(result, temp_dir.path().join("./Dockerfile"));
    }

    #[test]
    fn test_resolve_dockerfile_explicit() {
        let temp_dir = tempdir().unwrap();
        fs::create_dir_all(temp_dir.path().join("docker")).unwrap();
        let dockerfile_path = temp_dir.path().join("docker/Dockerfile.worker");
        fs::write(&dockerfile_path, "FROM alpine").unwrap();

        let resolver = BuildResolver::new(temp_dir.path().to_path_buf());
        let build = BuildSpec {
            context: PathBuf::from("."),
            dockerfile: Some(PathBuf::from("docker/Dockerfile.worker")),
            ..Default::default()
        };

        assert_eq!(resolver.resolve_dockerfile(&build).unwrap(), dockerfile_path);
    }

    #[test]
    fn test_resolve_dockerfile_not_found() {
        let temp_dir = tempdir().unwrap();
        let resolver = BuildResolver::new(temp_dir.path().to_path_buf());
        let build = BuildSpec {
            context: PathBuf::from("api"),
            ..Default::default()
        };

        let result = resolver.resolve_dockerfile(&build);
        assert!(matches!(result, Err(BuildError::DockerfileNotFound(_))));
    }

    #[test]
    fn test_resolve_context() {
        let temp_dir = tempdir().unwrap();
        let ctx_dir = temp_dir.path().join("backend");
        fs::create_dir(&ctx_dir).unwrap();
        fs::write(temp_dir.path().join("README"), "readme").unwrap();

        let resolver = BuildResolver::new(temp_dir.path().to_path_buf());

        let build = BuildSpec {
            context: PathBuf::from("backend"),
            ..Default::default()
        };
        assert_eq!(resolver.resolve_context(&build).unwrap(), ctx_dir);

        let missing = BuildSpec {
            context: PathBuf::from("frontend"),
            ..Default::default()
        };
        assert!(matches!(
            resolver.resolve_context(&missing),
            Err(BuildError::ContextNotFound(_))
        ));

        let file = BuildSpec {
            context: PathBuf::from("README"),
            ..Default::default()
        };
        assert!(matches!(
            resolver.resolve_context(&file),
            Err(BuildError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_resolve_build_args() {
        let resolver = BuildResolver::new(PathBuf::from("/tmp"));

        let mut build = BuildSpec::default();
        build
            .args
            .insert("BASE".to_string(), "{REGISTRY}/base:node{NODE_VERSION}".to_string());

        let mut variables = HashMap::new();
        variables.insert("NODE_VERSION".to_string(), "20".to_string());
        variables.insert("REGISTRY".to_string(), "ghcr.io/myorg".to_string());

        let args = resolver.resolve_build_args(&build, &variables);
        assert_eq!(args.get("BASE").unwrap(), "ghcr.io/myorg/base:node20");
    }
}
