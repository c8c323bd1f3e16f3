mod commands;

use clap::{Args, Parser, Subcommand};
use commands::deploy::{DeployRequest, DeployTarget};
use shipflow_core::GitRef;
use shipflow_deploy::CommandOverride;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "shipflow")]
#[command(version)]
#[command(about = "チャットから ECS へ。ビルドからデプロイまでを一つのコマンドで。", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// イメージをビルド・プッシュしてデプロイ
    #[command(subcommand)]
    Deploy(DeployCommands),
    /// deploy.yml を検証
    Validate {
        /// deploy.yml のパス
        #[arg(default_value = "config/deploy.yml")]
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum DeployCommands {
    /// 既存サービスを更新 (依存するスケジュールタスクも更新)
    Service {
        /// サービス名
        name: String,
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        command_override: OverrideArgs,
    },
    /// 単発タスクを実行
    #[command(name = "run-task")]
    RunTask {
        /// run task 名
        name: String,
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        command_override: OverrideArgs,
    },
    /// スケジュールタスクのルールを更新
    #[command(name = "scheduled-task")]
    ScheduledTask {
        /// ルール名
        #[arg(long)]
        rule: String,
        /// ターゲット名 (指定時はイメージも再ビルド)
        #[arg(long)]
        target: Option<String>,
        #[command(flatten)]
        source: SourceArgs,
    },
}

#[derive(Args)]
struct SourceArgs {
    /// リポジトリ名または別名
    #[arg(short, long, env = "SHIPFLOW_REPOSITORY")]
    repository: String,
    /// チェックアウトするブランチ
    #[arg(short, long, default_value = "main")]
    branch: String,
    /// チェックアウトするタグ (--branch より優先)
    #[arg(short, long, conflicts_with = "branch")]
    tag: Option<String>,
    /// デプロイ先クラスタ
    #[arg(short, long, env = "SHIPFLOW_CLUSTER")]
    cluster: String,
    /// デプロイ ID (イメージタグ)。省略時はチェックアウトしたコミット
    #[arg(short, long)]
    deploy_id: Option<String>,
    /// キャッシュを使わずにイメージをビルド
    #[arg(long)]
    no_cache: bool,
}

impl SourceArgs {
    fn into_request(self) -> DeployRequest {
        let git_ref = match self.tag {
            Some(tag) => GitRef::Tag(tag),
            None => GitRef::Branch(self.branch),
        };
        DeployRequest {
            repository: self.repository,
            git_ref,
            cluster: self.cluster,
            deploy_id: self.deploy_id,
            no_cache: self.no_cache,
        }
    }
}

#[derive(Args)]
struct OverrideArgs {
    /// コマンドを上書きするコンテナ
    #[arg(long, requires = "command")]
    container: Option<String>,
    /// 上書きするコマンド (空白区切り)
    #[arg(long, requires = "container")]
    command: Option<String>,
}

impl OverrideArgs {
    fn into_override(self) -> Option<CommandOverride> {
        match (self.container, self.command) {
            (Some(container), Some(command)) => Some(CommandOverride::new(container, command)),
            _ => None,
        }
    }
}

impl DeployCommands {
    fn into_parts(self) -> (DeployRequest, DeployTarget) {
        match self {
            DeployCommands::Service {
                name,
                source,
                command_override,
            } => (
                source.into_request(),
                DeployTarget::Service {
                    name,
                    command_override: command_override.into_override(),
                },
            ),
            DeployCommands::RunTask {
                name,
                source,
                command_override,
            } => (
                source.into_request(),
                DeployTarget::RunTask {
                    name,
                    command_override: command_override.into_override(),
                },
            ),
            DeployCommands::ScheduledTask {
                rule,
                target,
                source,
            } => (
                source.into_request(),
                DeployTarget::ScheduledTask { rule, target },
            ),
        }
    }
}

/// RUST_LOG が未設定なら設定ファイルの log_level を使う
fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = shipflow_config::load_settings();
    let log_level = settings
        .as_ref()
        .map(|s| s.log_level.as_str())
        .unwrap_or("info");
    init_tracing(log_level);

    match cli.command {
        // validate は設定ファイル不要
        Commands::Validate { file } => commands::validate::handle(&file),
        Commands::Deploy(deploy) => {
            let settings = settings?;
            let (request, target) = deploy.into_parts();
            commands::deploy::handle(&settings, request, target).await
        }
    }
}
