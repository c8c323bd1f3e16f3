//! deploy.yml ローダー
//!
//! パース、名前の補完、検証、非推奨フィールドの警告を一度にまとめて行う。
//! ここを通過したマニフェストは以降のデプロイ処理で検証不要。

use crate::error::{ManifestError, Result};
use crate::model::DeployManifest;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

/// deploy.yml の内容をパースして正規化済みのマニフェストを返す
#[instrument(skip(content), fields(content_size = content.len()))]
pub fn parse_manifest(content: &str) -> Result<DeployManifest> {
    debug!("Step 1: Parsing YAML");
    let mut manifest: DeployManifest = serde_yaml::from_str(content)?;

    debug!("Step 2: Normalizing");
    normalize(&mut manifest);

    debug!("Step 3: Validating");
    validate(&manifest)?;

    report_deprecations(&manifest);

    info!(clusters = manifest.clusters.len(), "Deploy manifest loaded");
    Ok(manifest)
}

/// ファイルから deploy.yml を読み込む
pub fn load_manifest_file(path: &Path) -> Result<DeployManifest> {
    let content = std::fs::read_to_string(path).map_err(|e| ManifestError::IoError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    parse_manifest(&content)
}

/// マップのキーをターゲット名として補完
fn normalize(manifest: &mut DeployManifest) {
    for cluster in &mut manifest.clusters {
        for (name, service) in cluster.services.iter_mut() {
            service.name = name.clone();
        }
        for (name, run_task) in cluster.run_tasks.iter_mut() {
            run_task.name = name.clone();
        }
    }
}

fn validate(manifest: &DeployManifest) -> Result<()> {
    let mut cluster_names = HashSet::new();

    for cluster in &manifest.clusters {
        if cluster.name.is_empty() {
            return Err(ManifestError::InvalidConfig(
                "クラスタ名が空です".to_string(),
            ));
        }
        if !cluster_names.insert(cluster.name.as_str()) {
            return Err(ManifestError::InvalidConfig(format!(
                "クラスタ '{}' が重複しています",
                cluster.name
            )));
        }

        for service in cluster.services.values() {
            ensure_path(&cluster.name, &service.name, &service.path)?;
        }
        for run_task in cluster.run_tasks.values() {
            ensure_path(&cluster.name, &run_task.name, &run_task.path)?;
        }

        let mut rule_names = HashSet::new();
        for rule in &cluster.scheduled_tasks {
            if !rule_names.insert(rule.name.as_str()) {
                return Err(ManifestError::InvalidConfig(format!(
                    "ルール '{}' がクラスタ '{}' 内で重複しています",
                    rule.name, cluster.name
                )));
            }
            if rule.expression.trim().is_empty() {
                return Err(ManifestError::InvalidConfig(format!(
                    "ルール '{}' に expression が指定されていません",
                    rule.name
                )));
            }
            for target in &rule.targets {
                if target.name.is_empty() {
                    return Err(ManifestError::InvalidConfig(format!(
                        "ルール '{}' に名前のないターゲットがあります",
                        rule.name
                    )));
                }
                ensure_path(&cluster.name, &target.name, &target.path)?;
            }
        }
    }

    Ok(())
}

fn ensure_path(cluster: &str, name: &str, path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(ManifestError::InvalidConfig(format!(
            "'{}/{}' にタスク定義の path が指定されていません",
            cluster, name
        )));
    }
    Ok(())
}

fn report_deprecations(manifest: &DeployManifest) {
    for cluster in &manifest.clusters {
        for rule in &cluster.scheduled_tasks {
            for target in &rule.targets {
                for field in &target.deprecations {
                    warn!(
                        cluster = %cluster.name,
                        rule = %rule.name,
                        target = %target.name,
                        "{}",
                        field
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DeprecatedField;
    use std::path::PathBuf;

    const MANIFEST: &str = r#"
clusters:
  - name: staging
    services:
      api:
        path: deploy/api.yml
        desired_count: 2
        containers:
          - name: web
            build: .
          - name: sidecar
            build:
              context: sidecar
    run_tasks:
      migrate:
        path: deploy/migrate.yml
        launch_type: FARGATE
        task_role: migrateRole
        containers:
          - name: web
            build: .
    scheduled_tasks:
      - rule: nightly
        expression: cron(0 3 * * ? *)
        enabled: true
        targets:
          - name: report
            path: deploy/report.yml
            depend_service: api
            task_count: 3
          - name: cleanup
            path: deploy/cleanup.yml
"#;

    #[test]
    fn test_parse_manifest() {
        let manifest = parse_manifest(MANIFEST).unwrap();
        let cluster = manifest.cluster("staging").unwrap();

        let api = manifest.service("staging", "api").unwrap();
        assert_eq!(api.name, "api");
        assert_eq!(api.path, PathBuf::from("deploy/api.yml"));
        assert_eq!(api.containers.len(), 2);
        assert_eq!(api.desired_count, Some(2));

        let migrate = manifest.run_task("staging", "migrate").unwrap();
        assert_eq!(migrate.name, "migrate");
        assert_eq!(migrate.task_role.as_deref(), Some("migrateRole"));

        assert!(cluster.has_scheduled_tasks());
        let rule = &cluster.scheduled_tasks[0];
        assert_eq!(rule.name, "nightly");
        assert_eq!(rule.enabled, Some(true));
        assert!(rule.description.is_none());
        assert_eq!(rule.targets[0].desired_count, 3);
        assert_eq!(rule.targets[0].deprecations, vec![DeprecatedField::TaskCount]);
        assert_eq!(rule.targets[1].desired_count, 1);
    }

    #[test]
    fn test_lookup_not_found() {
        let manifest = parse_manifest(MANIFEST).unwrap();

        let err = manifest.cluster("production").unwrap_err();
        assert!(matches!(err, ManifestError::ClusterNotFound(_)));
        assert!(err.is_not_found());

        let err = manifest.service("staging", "worker").unwrap_err();
        assert!(matches!(err, ManifestError::ServiceNotFound { .. }));

        let err = manifest.run_task("staging", "seed").unwrap_err();
        assert!(matches!(err, ManifestError::RunTaskNotFound { .. }));
    }

    #[test]
    fn test_missing_path_is_rejected() {
        let yaml = r#"
clusters:
  - name: staging
    services:
      api:
        path: ""
"#;
        let err = parse_manifest(yaml).unwrap_err();
        assert!(matches!(err, ManifestError::InvalidConfig(_)));
    }

    #[test]
    fn test_duplicate_rule_is_rejected() {
        let yaml = r#"
clusters:
  - name: staging
    scheduled_tasks:
      - rule: nightly
        expression: rate(1 day)
      - rule: nightly
        expression: rate(2 days)
"#;
        let err = parse_manifest(yaml).unwrap_err();
        assert!(matches!(err, ManifestError::InvalidConfig(_)));
    }

    #[test]
    fn test_duplicate_cluster_is_rejected() {
        let yaml = "clusters:\n  - name: a\n  - name: a\n";
        assert!(matches!(
            parse_manifest(yaml),
            Err(ManifestError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_invalid_yaml() {
        let result = parse_manifest("clusters: [");
        assert!(matches!(result, Err(ManifestError::Parse(_))));
    }

    #[test]
    fn test_load_manifest_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("deploy.yml");
        std::fs::write(&path, MANIFEST).unwrap();

        let manifest = load_manifest_file(&path).unwrap();
        assert_eq!(manifest.clusters.len(), 1);

        let missing = load_manifest_file(&temp_dir.path().join("nope.yml"));
        assert!(matches!(missing, Err(ManifestError::IoError { .. })));
    }
}
