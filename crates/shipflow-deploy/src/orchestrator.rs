//! デプロイオーケストレーター
//!
//! マニフェストを参照してイメージのビルドとプッシュ、タスク定義の登録、
//! スケジューラーの更新を順に実行する。1インスタンスが1回のデプロイ実行に対応し、
//! タスク定義の登録キャッシュはインスタンスごとに持つ。

use crate::error::{DeployError, Result};
use crate::matcher::{ScheduleFilter, resolve_rule_target, rule_update, select_targets};
use crate::registrar::RegistrationCache;
use shipflow_build::{ArtifactPublisher, ImageBuild, ImageRegistry, validate_tag};
use shipflow_cloud::{
    ClusterScheduler, RoleResolver, RunTaskRequest, ServiceUpdate, TaskDefinitionHandle,
};
use shipflow_config::DEFAULT_EVENTS_ROLE;
use shipflow_core::{CodeSource, ContainerOverride, ContainerSpec, DeployManifest};
use tracing::{info, instrument, warn};

/// デプロイで使う外部コンポーネント
pub struct Collaborators {
    pub source: Box<dyn CodeSource>,
    pub builder: Box<dyn ImageBuild>,
    pub registry: Box<dyn ImageRegistry>,
    pub scheduler: Box<dyn ClusterScheduler>,
    pub roles: Box<dyn RoleResolver>,
}

impl Collaborators {
    /// イメージをビルドしてプッシュする。1件もなければエラー
    async fn publish(&self, containers: &[ContainerSpec], deploy_id: &str) -> Result<usize> {
        let publisher = ArtifactPublisher::new(self.builder.as_ref(), self.registry.as_ref());
        let count = publisher
            .publish(containers, self.source.base_path(), deploy_id)
            .await?;

        if count == 0 {
            return Err(DeployError::Validation("no publishable image".to_string()));
        }
        Ok(count)
    }

    async fn role_arn(&self, role: Option<&str>) -> Result<Option<String>> {
        match role {
            Some(name) => Ok(Some(self.roles.role_arn(name).await?)),
            None => Ok(None),
        }
    }
}

/// デプロイの動作設定
#[derive(Debug, Clone)]
pub struct DeployOptions {
    /// スケジュールターゲットでロール未指定時のイベント実行ロール
    pub default_events_role: String,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            default_events_role: DEFAULT_EVENTS_ROLE.to_string(),
        }
    }
}

/// 起動コマンドの上書き (単一コンテナ)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOverride {
    pub container: String,
    /// 空白区切りのコマンド
    pub command: String,
}

impl CommandOverride {
    pub fn new(container: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            command: command.into(),
        }
    }

    fn to_container_override(&self) -> ContainerOverride {
        ContainerOverride::command(self.container.clone(), &self.command)
    }
}

pub struct Orchestrator {
    deps: Collaborators,
    options: DeployOptions,
    manifest: Option<DeployManifest>,
    cache: RegistrationCache,
}

impl Orchestrator {
    pub fn new(deps: Collaborators, options: DeployOptions) -> Self {
        Self {
            deps,
            options,
            manifest: None,
            cache: RegistrationCache::new(),
        }
    }

    /// `ready` で読み込んだマニフェスト
    pub fn manifest(&self) -> Option<&DeployManifest> {
        self.manifest.as_ref()
    }

    /// この実行で登録したタスク定義
    pub fn registrations(&self) -> &RegistrationCache {
        &self.cache
    }

    /// レジストリにログインし、作業コピーを最新化してマニフェストを読み込む
    ///
    /// チェックアウトしたコミットを返す。
    #[instrument(skip(self))]
    pub async fn ready(&mut self) -> Result<String> {
        info!("Authenticating to image registry");
        self.deps.registry.authenticate().await?;

        let commit = self.deps.source.update().await?;
        info!(commit = %commit, "Working copy updated");

        self.manifest = Some(self.deps.source.load_manifest().await?);
        Ok(commit)
    }

    /// 既存サービスを新しいタスク定義で更新する
    ///
    /// 同じクラスタにこのサービスに依存するスケジュールタスクがあれば、
    /// イメージを再ビルドせずにルールも更新する。
    #[instrument(skip(self, command_override), fields(cluster = %cluster, service = %service, deploy_id = %deploy_id))]
    pub async fn deploy_service(
        &mut self,
        cluster: &str,
        service: &str,
        command_override: Option<&CommandOverride>,
        deploy_id: &str,
    ) -> Result<TaskDefinitionHandle> {
        validate_deploy_id(deploy_id)?;
        let manifest = self.manifest.as_ref().ok_or(DeployError::NotReady)?;
        let target = manifest.service(cluster, service)?;
        let cascade = manifest
            .cluster(cluster)?
            .scheduled_tasks
            .iter()
            .any(|rule| rule.depends_on(service));

        if let Some(command_override) = command_override {
            warn!(
                container = %command_override.container,
                "Command override is not supported for service deploys, ignoring"
            );
        }

        if !self.deps.scheduler.service_exists(cluster, service).await? {
            return Err(DeployError::NotFound {
                kind: "service",
                name: format!("{}/{}", cluster, service),
            });
        }

        self.deps.publish(&target.containers, deploy_id).await?;
        let handle = self
            .cache
            .register(
                self.deps.source.as_ref(),
                self.deps.scheduler.as_ref(),
                &target.path,
                deploy_id,
            )
            .await?;

        let update = ServiceUpdate::from_target(target, handle.clone());
        self.deps
            .scheduler
            .update_service(cluster, service, &update)
            .await?;
        info!(task_definition = %handle, "Service updated");

        if cascade {
            self.deploy_scheduled_tasks(cluster, &ScheduleFilter::depend_service(service), deploy_id)
                .await?;
        }

        Ok(handle)
    }

    /// 単発タスクを実行する
    ///
    /// `command_override` を指定すると、そのコンテナの起動コマンドだけを上書きする
    /// (マニフェストの container_overrides は使わない)。
    #[instrument(skip(self, command_override), fields(cluster = %cluster, run_task = %run_task, deploy_id = %deploy_id))]
    pub async fn deploy_run_task(
        &mut self,
        cluster: &str,
        run_task: &str,
        command_override: Option<&CommandOverride>,
        deploy_id: &str,
    ) -> Result<TaskDefinitionHandle> {
        validate_deploy_id(deploy_id)?;
        let manifest = self.manifest.as_ref().ok_or(DeployError::NotReady)?;
        let target = manifest.run_task(cluster, run_task)?;

        let container_overrides = match command_override {
            Some(command_override) => vec![command_override.to_container_override()],
            None => target.container_overrides.clone().unwrap_or_default(),
        };

        self.deps.publish(&target.containers, deploy_id).await?;
        let handle = self
            .cache
            .register(
                self.deps.source.as_ref(),
                self.deps.scheduler.as_ref(),
                &target.path,
                deploy_id,
            )
            .await?;

        let request = RunTaskRequest {
            task_definition: handle.clone(),
            desired_count: target.desired_count.unwrap_or(1),
            group: target.group.clone(),
            launch_type: target.launch_type,
            network_configuration: target.network_configuration.clone(),
            container_overrides,
            task_role_arn: self.deps.role_arn(target.task_role.as_deref()).await?,
            task_execution_role_arn: self
                .deps
                .role_arn(target.task_execution_role.as_deref())
                .await?,
        };

        let tasks = self.deps.scheduler.run_task(cluster, &request).await?;
        info!(task_definition = %handle, "Started tasks: {}", tasks.join(", "));

        Ok(handle)
    }

    /// 指定ルール (とターゲット) を更新する
    ///
    /// ターゲットを指定した場合はそのターゲットのイメージを再ビルドする。
    pub async fn deploy_scheduled_task(
        &mut self,
        cluster: &str,
        rule: &str,
        target: Option<&str>,
        deploy_id: &str,
    ) -> Result<Vec<TaskDefinitionHandle>> {
        let filter = ScheduleFilter::rule(rule, target.map(str::to_string));
        self.deploy_scheduled_tasks(cluster, &filter, deploy_id)
            .await
    }

    /// 条件に一致するスケジュールルールをまとめて更新する
    ///
    /// ルール名を指定したのに一致するターゲットがなければエラー。
    /// ルール名を指定しない場合、一致しないルールは単に更新しない。
    #[instrument(skip(self), fields(cluster = %cluster, deploy_id = %deploy_id))]
    pub async fn deploy_scheduled_tasks(
        &mut self,
        cluster: &str,
        filter: &ScheduleFilter,
        deploy_id: &str,
    ) -> Result<Vec<TaskDefinitionHandle>> {
        validate_deploy_id(deploy_id)?;
        let manifest = self.manifest.as_ref().ok_or(DeployError::NotReady)?;
        let cluster_config = manifest.cluster(cluster)?;

        let mut handles = Vec::new();

        for matched in select_targets(&cluster_config.scheduled_tasks, filter) {
            let mut targets = Vec::with_capacity(matched.targets.len());

            for target in matched.targets {
                if filter.rebuilds_images() {
                    self.deps.publish(&target.containers, deploy_id).await?;
                }

                let handle = self
                    .cache
                    .register(
                        self.deps.source.as_ref(),
                        self.deps.scheduler.as_ref(),
                        &target.path,
                        deploy_id,
                    )
                    .await?;

                targets.push(
                    resolve_rule_target(
                        target,
                        handle.clone(),
                        self.deps.roles.as_ref(),
                        &self.options.default_events_role,
                    )
                    .await?,
                );
                handles.push(handle);
            }

            info!(rule = %matched.rule.name, "Updating rule with {} target(s)", targets.len());
            self.deps
                .scheduler
                .update_rule(cluster, &rule_update(matched.rule, targets))
                .await?;
        }

        if filter.rule.is_some() && handles.is_empty() {
            return Err(DeployError::Validation(
                "scheduled task target or rule is undefined".to_string(),
            ));
        }

        Ok(handles)
    }
}

fn validate_deploy_id(deploy_id: &str) -> Result<()> {
    validate_tag(deploy_id)
        .map_err(|e| DeployError::Validation(format!("invalid deploy id: {}", e)))
}
