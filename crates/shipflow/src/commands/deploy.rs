use anyhow::Context;
use colored::Colorize;
use shipflow_build::{CredentialSource, DockerImageBuilder, DockerRegistry, RegistryAuth};
use shipflow_cloud_aws::{AwsCli, EcrCredentials, EcsScheduler, IamRoleResolver, is_ecr_registry};
use shipflow_config::Settings;
use shipflow_core::{GitRef, GitSource};
use shipflow_deploy::{Collaborators, CommandOverride, DeployOptions, Orchestrator};
use std::collections::HashMap;

/// どこから何をどのクラスタへ
pub struct DeployRequest {
    pub repository: String,
    pub git_ref: GitRef,
    pub cluster: String,
    pub deploy_id: Option<String>,
    pub no_cache: bool,
}

pub enum DeployTarget {
    Service {
        name: String,
        command_override: Option<CommandOverride>,
    },
    RunTask {
        name: String,
        command_override: Option<CommandOverride>,
    },
    ScheduledTask {
        rule: String,
        target: Option<String>,
    },
}

pub async fn handle(
    settings: &Settings,
    request: DeployRequest,
    target: DeployTarget,
) -> anyhow::Result<()> {
    println!("{}", "デプロイを開始します...".blue().bold());
    println!("リポジトリ: {} ({})", request.repository.cyan(), request.git_ref);
    println!("クラスタ: {}", request.cluster.cyan());

    let mut orchestrator = build_orchestrator(settings, &request).await?;

    let commit = orchestrator
        .ready()
        .await
        .context("デプロイの準備に失敗しました")?;
    println!("コミット: {}", commit.cyan());

    let deploy_id = request.deploy_id.unwrap_or(commit);
    println!("デプロイID: {}", deploy_id.cyan());
    println!();

    match target {
        DeployTarget::Service {
            name,
            command_override,
        } => {
            println!("サービス {} を更新中...", name.cyan());
            orchestrator
                .deploy_service(
                    &request.cluster,
                    &name,
                    command_override.as_ref(),
                    &deploy_id,
                )
                .await?;
        }
        DeployTarget::RunTask {
            name,
            command_override,
        } => {
            println!("タスク {} を実行中...", name.cyan());
            orchestrator
                .deploy_run_task(
                    &request.cluster,
                    &name,
                    command_override.as_ref(),
                    &deploy_id,
                )
                .await?;
        }
        DeployTarget::ScheduledTask { rule, target } => {
            println!("ルール {} を更新中...", rule.cyan());
            let handles = orchestrator
                .deploy_scheduled_task(&request.cluster, &rule, target.as_deref(), &deploy_id)
                .await?;
            println!("  {}個のターゲットを更新しました", handles.len());
        }
    }

    println!();
    println!("{}", "✓ デプロイが完了しました".green().bold());
    println!("登録したタスク定義:");
    for (path, handle) in orchestrator.registrations().entries() {
        println!("  • {} ({})", handle.to_string().cyan(), path.display());
    }

    Ok(())
}

async fn build_orchestrator(
    settings: &Settings,
    request: &DeployRequest,
) -> anyhow::Result<Orchestrator> {
    let repository = settings.repository(&request.repository)?;
    let remote = GitSource::github_uri(
        settings.github.host.as_deref(),
        &settings.github.account,
        &repository.name,
    );
    let source = GitSource::new(
        remote,
        settings.repository_path(&repository.name),
        repository.base_path.clone(),
        request.git_ref.clone(),
    );

    let aws = AwsCli::new(settings.aws.region.clone(), settings.aws.profile.clone());
    let credentials = EcrCredentials::new(aws.clone());
    let registry = match &settings.aws.registry {
        Some(registry) => registry.clone(),
        None => credentials
            .default_registry()
            .await
            .context("ECR レジストリを特定できません。aws.registry を設定してください")?,
    };

    // ECR 以外は docker login 済みの認証情報を使う
    let credential_source: Box<dyn CredentialSource> = if is_ecr_registry(&registry) {
        Box::new(credentials)
    } else {
        Box::new(RegistryAuth::new())
    };

    let docker = connect_docker().await?;

    // ビルド引数の {VAR} はデプロイ実行環境の環境変数で展開する
    let builder = DockerImageBuilder::new(docker.clone())
        .with_variables(build_variables())
        .with_no_cache(request.no_cache);

    let deps = Collaborators {
        source: Box::new(source),
        builder: Box::new(builder),
        registry: Box::new(DockerRegistry::new(docker, registry, credential_source)),
        scheduler: Box::new(EcsScheduler::new(
            aws.clone(),
            settings.deploy.tag_key.clone(),
        )),
        roles: Box::new(IamRoleResolver::new(aws)),
    };
    let options = DeployOptions {
        default_events_role: settings.deploy.default_events_role.clone(),
    };

    Ok(Orchestrator::new(deps, options))
}

/// UTF-8 でない環境変数は展開対象から外す
fn build_variables() -> HashMap<String, String> {
    std::env::vars_os()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
        .collect()
}

/// Docker に接続して疎通を確認する
async fn connect_docker() -> anyhow::Result<bollard::Docker> {
    let docker = bollard::Docker::connect_with_local_defaults();
    let result = match docker {
        Ok(docker) => docker.ping().await.map(|_| docker),
        Err(e) => Err(e),
    };

    result.map_err(|e| {
        eprintln!();
        eprintln!("{}", "✗ Docker接続エラー".red().bold());
        eprintln!("  {}", e);
        eprintln!();
        eprintln!("{}", "解決方法:".yellow());
        eprintln!("  • Dockerが起動しているか確認してください");
        eprintln!("  • docker ps コマンドが正常に動作するか確認してください");
        anyhow::anyhow!("Docker接続に失敗しました")
    })
}
