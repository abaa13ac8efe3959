mod ai;
mod analyzer;
mod api;
mod cli;
mod collector;
mod config;
mod db;
mod scheduler;

use crate::analyzer::categorizer::categorize;
use crate::analyzer::report::{build_stats, format_hours_minutes, render_logbook};
use crate::cli::{AiCommands, Cli, Commands, ConfigCommands, ExportFormat};
use crate::collector::x11::X11Sampler;
use crate::config::{Config, SummaryProvider};
use crate::db::EventStore;
use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, Utc};
use clap::Parser;
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Service => {
            let config = load_or_default_config()?;
            run_service(config).await
        }
        Commands::Summary { date, provider } => handle_summary(date, provider),
        Commands::Export { date, format } => handle_export(date, format),
        Commands::Stats { date } => handle_stats(date),
        Commands::Status => handle_status(),
        Commands::Config { command } => handle_config_command(command),
        Commands::Ai { command } => handle_ai_command(command),
    }
}

fn handle_config_command(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Set { key, value } => {
            let mut config = load_or_default_config()?;
            config.set_value(&key, &value)?;
            config.ensure_bootstrap_files()?;
            config.save()?;

            let masked = if key.contains("api_key") {
                "***hidden***".to_string()
            } else {
                value
            };
            println!("Config saved: {key} = {masked}");
            Ok(())
        }
        ConfigCommands::Get { key } => {
            let config = load_or_default_config()?;
            let value = config
                .get_value(&key)
                .with_context(|| format!("Unsupported config key: {key}"))?;

            println!("{value}");
            Ok(())
        }
    }
}

fn handle_status() -> Result<()> {
    let config = load_or_default_config()?;
    let store = open_store(&config)?;

    println!("Activity tracker status");
    println!("- db_path: {}", config.db_path.display());
    println!("- service_running: {}", is_port_open(config.api_port));
    println!("- api: http://127.0.0.1:{}", config.api_port);
    println!(
        "- last_collected_at: {}",
        store
            .latest_timestamp()?
            .map(|timestamp| timestamp.to_string())
            .unwrap_or_else(|| "none".to_string())
    );
    match config.parse_summary_time() {
        Ok(_) => println!("- summary_time: {}", config.summary_time),
        Err(error) => println!("- summary_time: {} (invalid: {error})", config.summary_time),
    }
    println!("- summary_provider: {}", config.summary_provider.as_str());

    Ok(())
}

fn handle_summary(date: Option<String>, provider: Option<String>) -> Result<()> {
    let config = load_or_default_config()?;
    let target_date = parse_optional_date(date)?;
    let provider = parse_optional_provider(provider, &config)?;
    let store = open_store(&config)?;

    let (summary, path) =
        analyzer::generate_and_store_summary(&config, &store, target_date, provider)?;

    println!("{summary}");
    println!("Summary saved: {}", path.display());

    Ok(())
}

fn handle_export(date: Option<String>, format: ExportFormat) -> Result<()> {
    let config = load_or_default_config()?;
    let target_date = parse_optional_date(date)?;
    let store = open_store(&config)?;
    let records = store.intervals_for_date(target_date)?;

    match format {
        ExportFormat::Markdown => println!("{}", render_logbook(target_date, &records)),
        ExportFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&records).context("Failed to serialize intervals")?
        ),
    }

    Ok(())
}

fn handle_stats(date: Option<String>) -> Result<()> {
    let config = load_or_default_config()?;
    let target_date = parse_optional_date(date)?;
    let store = open_store(&config)?;
    let records = store.intervals_for_date(target_date)?;

    let stats = build_stats(&records);
    let breakdown = categorize(&records);

    println!("Stats for {}", target_date.format("%Y-%m-%d"));
    println!("- intervals: {}", breakdown.interval_count);
    println!("- tracked: {}", format_hours_minutes(stats.total_seconds));
    println!("- active: {}", format_hours_minutes(breakdown.active_seconds()));
    println!("- productivity_score: {}/10", breakdown.productivity_score());

    println!("By category:");
    for summary in breakdown.categories.iter().filter(|summary| summary.seconds > 0) {
        println!("  {}: {}", summary.name, format_hours_minutes(summary.seconds));
    }

    println!("Top activities:");
    for activity in &stats.top_activities {
        println!("  {}: {}", activity.title, format_hours_minutes(activity.seconds));
    }

    Ok(())
}

fn handle_ai_command(command: AiCommands) -> Result<()> {
    match command {
        AiCommands::Test { provider } => {
            let config = load_or_default_config()?;
            let provider = parse_optional_provider(provider, &config)?;

            let response = ai::test_connection(&config, provider)?;
            println!("{} connection successful", provider.as_str());
            println!("{response}");

            Ok(())
        }
    }
}

async fn run_service(config: Config) -> Result<()> {
    config.ensure_bootstrap_files()?;
    let store = Arc::new(open_store(&config)?);

    let shared_config = Arc::new(config);
    let cancel = CancellationToken::new();

    let sampler = X11Sampler::new(
        shared_config.idle_threshold_seconds,
        Duration::from_millis(shared_config.sampler_timeout_ms),
    );
    let collector_task = tokio::spawn(collector::run_activity_collector(
        Arc::clone(&shared_config),
        Arc::clone(&store),
        sampler,
        || Utc::now().timestamp(),
        cancel.clone(),
    ));

    let scheduler_config = Arc::clone(&shared_config);
    let scheduler_schedule_fallback = Arc::clone(&shared_config);
    let scheduler_store = Arc::clone(&store);

    info!("activity tracker service started");

    let outcome = tokio::select! {
        scheduler_result = scheduler::run_daily(move || {
            Config::load()
                .unwrap_or_else(|_| (*scheduler_schedule_fallback).clone())
                .parse_summary_time()
        }, move |date| {
            let config = Arc::clone(&scheduler_config);
            let store = Arc::clone(&scheduler_store);
            async move {
                let runtime_config = Config::load().unwrap_or_else(|_| (*config).clone());
                tokio::task::spawn_blocking(move || {
                    let provider = runtime_config.summary_provider;
                    analyzer::generate_and_store_summary(&runtime_config, &store, date, provider)
                        .map(|_| ())
                })
                .await
                .context("Scheduled summary task panicked")?
            }
        }) => scheduler_result,
        api_result = api::run_server(Arc::clone(&shared_config), Arc::clone(&store)) => api_result,
        _ = shutdown_signal() => {
            info!("shutdown signal received");
            Ok(())
        }
    };

    cancel.cancel();
    collector_task
        .await
        .context("Collector task panicked")??;

    outcome
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            warn!(error = %error, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(error) => {
                warn!(error = %error, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn open_store(config: &Config) -> Result<EventStore> {
    EventStore::open(&config.db_path)
        .with_context(|| format!("Failed to open event store: {}", config.db_path.display()))
}

fn parse_optional_date(input: Option<String>) -> Result<NaiveDate> {
    input
        .as_deref()
        .map(|date| {
            NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .with_context(|| format!("Invalid date format: {date}. Example: 2026-02-18"))
        })
        .transpose()?
        .map_or_else(|| Ok(Local::now().date_naive()), Ok)
}

fn parse_optional_provider(input: Option<String>, config: &Config) -> Result<SummaryProvider> {
    input
        .as_deref()
        .map(str::parse::<SummaryProvider>)
        .transpose()
        .map(|provider| provider.unwrap_or(config.summary_provider))
}

fn load_or_default_config() -> Result<Config> {
    if Config::config_path().exists() {
        return Config::load();
    }

    let config = Config::default();
    config.ensure_bootstrap_files()?;
    config.save()?;
    Ok(config)
}

fn is_port_open(port: u16) -> bool {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    TcpStream::connect_timeout(&addr, Duration::from_millis(250)).is_ok()
}
