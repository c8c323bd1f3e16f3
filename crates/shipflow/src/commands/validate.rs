use colored::Colorize;
use shipflow_core::{DeployManifest, load_manifest_file};
use std::path::Path;

pub fn handle(file: &Path) -> anyhow::Result<()> {
    println!("{}", "deploy.yml を検証中...".blue());
    println!("ファイル: {}", file.display().to_string().cyan());

    match load_manifest_file(file) {
        Ok(manifest) => {
            println!("{}", "✓ deploy.yml は正常です！".green().bold());
            println!();
            print_summary(&manifest);
            Ok(())
        }
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ 設定エラー".red().bold());
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }
}

fn print_summary(manifest: &DeployManifest) {
    println!("サマリー:");
    println!("  クラスタ: {}個", manifest.clusters.len());

    for cluster in &manifest.clusters {
        println!("    - {}", cluster.name.cyan());

        if !cluster.services.is_empty() {
            println!("      サービス: {}個", cluster.services.len());
            for (name, service) in &cluster.services {
                println!(
                    "        - {} ({}個のコンテナ)",
                    name.cyan(),
                    service.containers.len()
                );
            }
        }

        if !cluster.run_tasks.is_empty() {
            println!("      タスク: {}個", cluster.run_tasks.len());
            for (name, run_task) in &cluster.run_tasks {
                println!(
                    "        - {} ({}個のコンテナ)",
                    name.cyan(),
                    run_task.containers.len()
                );
            }
        }

        if cluster.has_scheduled_tasks() {
            println!("      スケジュール: {}個", cluster.scheduled_tasks.len());
            for rule in &cluster.scheduled_tasks {
                println!("        - {} ({})", rule.name.cyan(), rule.expression);
                for target in &rule.targets {
                    let depends = target
                        .depend_service
                        .as_deref()
                        .map(|s| format!(", depends on {}", s))
                        .unwrap_or_default();
                    println!(
                        "          • {} (desired_count: {}{})",
                        target.name, target.desired_count, depends
                    );
                    for field in &target.deprecations {
                        println!("            {} {}", "⚠".yellow(), field);
                    }
                }
            }
        }
    }

    if !manifest.clusters.iter().any(|c| c.has_scheduled_tasks()) {
        println!("  {}", "スケジュールタスクはありません".dimmed());
    }
}
