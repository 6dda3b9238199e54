//! Hive - 指令驱动的 Bot 集群编排器
//!
//! 入口：初始化日志、按配置装配编排器，然后逐行读取标准输入。
//! 以 `:` 开头的是控制命令（:list / :start / :stop / :pause / :rotate / :proxies / :reload / :quit），其余行作为自然语言指令提交。

use anyhow::Context;
use hive::core::create_orchestrator_builder;
use hive::worker::WorkerFilter;
use hive::{observability, Orchestrator};
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "Commands: :list | :start <id> | :stop <id> | :pause <id> | :rotate <id> | :proxies | :reload | :quit\n\
Anything else is submitted as a command, e.g. \"get 500 listens on spotify\"";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let orchestrator = create_orchestrator_builder(None)
        .build()
        .await
        .context("Failed to build orchestrator")?;

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if !handle_line(&orchestrator, line).await {
                    break;
                }
            }
        }
    }

    orchestrator.shutdown().await;
    Ok(())
}

/// 处理一行输入；返回 false 表示退出
async fn handle_line(orchestrator: &Orchestrator, line: &str) -> bool {
    let (head, arg) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };

    match head {
        ":quit" | ":q" => return false,
        ":help" => println!("{HELP}"),
        ":list" => {
            for view in orchestrator.registry().list(&WorkerFilter::default()).await {
                let last = view
                    .activity
                    .last()
                    .map(|e| e.description.as_str())
                    .unwrap_or("-");
                println!(
                    "{}  {:<32} {:?}  health {}% ({:?})  last: {}",
                    view.id, view.name, view.status, view.health_percentage, view.health, last
                );
            }
        }
        ":start" => print_result(orchestrator.start_worker(arg).await),
        ":stop" => print_result(orchestrator.stop_worker(arg).await),
        ":pause" => print_result(orchestrator.pause_worker(arg).await),
        ":rotate" => match orchestrator.rotate_proxy(arg).await {
            Ok(Some(address)) => println!("rotated to {address}"),
            Ok(None) => println!("no healthy proxies available"),
            Err(e) => println!("error: {e}"),
        },
        ":proxies" => {
            let pool = orchestrator.pool();
            println!(
                "provider {}  total {}  healthy {}  blacklisted {}",
                pool.provider_name().await,
                pool.len().await,
                pool.healthy_count().await,
                pool.blacklisted_count().await
            );
            for record in pool.snapshot().await {
                println!(
                    "{:<24} {:<10} {:>5}ms  rate {:.2}{}",
                    record.address,
                    record.region,
                    record.latency_ms,
                    record.success_rate,
                    if record.blacklisted { "  [blacklisted]" } else { "" }
                );
            }
        }
        ":reload" => match orchestrator.pool().reload().await {
            Ok(total) => println!("reloaded {total} proxies"),
            Err(e) => println!("error: {e}"),
        },
        _ if head.starts_with(':') => println!("unknown command\n{HELP}"),
        _ => {
            let outcome = orchestrator.submit_command(line).await;
            match serde_json::to_string_pretty(&outcome) {
                Ok(json) => println!("{json}"),
                Err(_) => println!("{}", outcome.message),
            }
        }
    }
    true
}

fn print_result(result: Result<bool, hive::HiveError>) {
    match result {
        Ok(true) => println!("ok"),
        Ok(false) => println!("no change"),
        Err(e) => println!("error: {e}"),
    }
}
