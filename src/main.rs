//! hopchain 命令行工具
//!
//! 编辑代理链档案、编译 sing-box 配置并推送到运行时管理服务

mod cli;

use anyhow::{bail, Context};
use clap::Parser;
use cli::{print_error, print_info, print_success, print_table, Cli, Commands};
use hopchain::{
    config::{render_runtime_config, save_runtime_config, OutputFormat, SettingsManager},
    init_logger,
    link,
    logger::LoggerConfig,
    normalize, normalize_with_report, Compiler, DeployClient, RuntimeConfig, Topology,
};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logger(Some(LoggerConfig::for_cli(cli.verbose, cli.json_log)));

    if let Err(e) = run(cli).await {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut manager = SettingsManager::new();
    if let Some(path) = &cli.settings {
        manager
            .load_from_file(path)
            .with_context(|| format!("loading settings from {}", path.display()))?;
    }

    match cli.command {
        Commands::Init { path, force } => handle_init(&path, force),
        Commands::Compile {
            profile,
            output,
            format,
        } => handle_compile(&manager, &profile, output, format),
        Commands::Normalize { profile, output } => handle_normalize(&profile, output),
        Commands::Link {
            profile,
            source,
            target,
            inbound,
            output,
        } => handle_link(&profile, &source, &target, inbound, output),
        Commands::Remove {
            profile,
            tag,
            output,
        } => handle_remove(&profile, &tag, output),
        Commands::Groups { config } => handle_groups(&config),
        Commands::Deploy {
            profile,
            url,
            force,
            watch,
        } => handle_deploy(manager, &profile, url, force, watch).await,
    }
}

fn load_profile(path: &Path) -> anyhow::Result<Topology> {
    Topology::load_from_file(path).with_context(|| format!("loading profile {}", path.display()))
}

/// 保存修改后的档案，未指定输出时覆盖原文件
fn store_profile(topology: &Topology, profile: &Path, output: Option<PathBuf>) -> anyhow::Result<()> {
    let target = output.unwrap_or_else(|| profile.to_path_buf());
    topology
        .save_to_file(&target)
        .with_context(|| format!("writing profile {}", target.display()))?;
    print_success(&format!("档案已保存到: {}", target.display()));
    Ok(())
}

fn handle_init(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    Topology::default_profile().save_to_file(path)?;
    print_success(&format!("已写入初始档案: {}", path.display()));
    Ok(())
}

fn handle_compile(
    manager: &SettingsManager,
    profile: &Path,
    output: Option<PathBuf>,
    format: Option<OutputFormat>,
) -> anyhow::Result<()> {
    let topology = load_profile(profile)?;
    let compiler = Compiler::new(manager.settings().compiler.clone());
    let config = compiler.compile(&topology)?;

    match output {
        Some(path) => {
            let format = format.unwrap_or_else(|| OutputFormat::from_path(&path));
            save_runtime_config(&config, &path, format)?;
            print_success(&format!("配置已导出到: {} ({})", path.display(), format));
        }
        None => println!("{}", render_runtime_config(&config, format.unwrap_or_default())?),
    }
    Ok(())
}

fn handle_normalize(profile: &Path, output: Option<PathBuf>) -> anyhow::Result<()> {
    let mut topology = load_profile(profile)?;
    let report = normalize_with_report(&mut topology);

    if !report.changed {
        print_info("档案无需修复");
        if output.is_none() {
            return Ok(());
        }
    } else {
        print_info("修复结果:");
        println!("  节点库修复: {}", report.library_repaired);
        println!("  删除放置: {}", report.placements_pruned);
        println!("  改写入站: {}", report.inbounds_rewritten);
        println!("  改写节点: {}", report.nodes_rewritten);
        println!("  清空池成员: {}", report.managed_cleared);
    }
    store_profile(&topology, profile, output)
}

fn handle_link(
    profile: &Path,
    source: &str,
    target: &str,
    source_is_inbound: bool,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut topology = load_profile(profile)?;
    normalize(&mut topology);
    let decision = link(&mut topology, source, target, source_is_inbound);
    if let Some(reason) = decision.reason() {
        bail!("{}", reason);
    }
    print_success(&format!("已连接 {} -> {}", source, target));
    store_profile(&topology, profile, output)
}

fn handle_remove(profile: &Path, tag: &str, output: Option<PathBuf>) -> anyhow::Result<()> {
    let mut topology = load_profile(profile)?;
    let report = topology.delete_definition(tag)?;
    print_success(&format!(
        "已删除 {}：移除 {} 个放置节点，{} 条连线",
        tag, report.placements_removed, report.links_removed
    ));
    store_profile(&topology, profile, output)
}

fn handle_groups(path: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config = RuntimeConfig::from_json(&content)?;
    let groups = config.balancer_groups();

    if groups.is_empty() {
        print_info("没有轮询组");
        return Ok(());
    }

    let rows: Vec<Vec<String>> = groups
        .iter()
        .map(|group| {
            vec![
                group.id.clone(),
                group.listen_port.to_string(),
                group
                    .backend_ports
                    .iter()
                    .map(u16::to_string)
                    .collect::<Vec<_>>()
                    .join(","),
            ]
        })
        .collect();
    print_table(&["ID", "LISTEN", "BACKENDS"], &rows);
    Ok(())
}

async fn handle_deploy(
    mut manager: SettingsManager,
    profile: &Path,
    url: Option<String>,
    force: bool,
    watch: Option<u64>,
) -> anyhow::Result<()> {
    if let Some(url) = url {
        manager.settings_mut().deploy.base_url = url;
        manager.validate()?;
    }
    let settings = manager.settings();
    let compiler = Compiler::new(settings.compiler.clone());
    let mut client = DeployClient::new(&settings.deploy)?;

    let topology = load_profile(profile)?;
    client.compile_and_deploy(&compiler, &topology, force).await?;
    print_success(&format!("配置已部署到: {}", client.base_url()));

    let Some(interval) = watch else {
        return Ok(());
    };

    print_info(&format!("监听档案变化 (间隔: {}s)，按 Ctrl+C 退出", interval));
    let mut ticker = tokio::time::interval(Duration::from_secs(interval.max(1)));
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                print_info("已停止监听");
                return Ok(());
            }
        }

        let result = match load_profile(profile) {
            Ok(topology) => client
                .compile_and_deploy(&compiler, &topology, false)
                .await
                .map_err(anyhow::Error::from),
            Err(e) => Err(e),
        };
        match result {
            Ok(true) => print_success("检测到变化，已重新部署"),
            Ok(false) => {}
            Err(e) => print_error(&format!("{:#}", e)),
        }
    }
}
