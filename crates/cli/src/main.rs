use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use regnav::chat::{ChatSession, ChatTurn};
use regnav::client::ApiClient;
use regnav::formats;
use regnav::upload::{FileHandle, TaskId, UploadManager, UploadStatus, UploadTask};

#[derive(Parser)]
#[command(name = "regnav")]
#[command(about = "RegNav CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// List the document formats accepted for upload.
    Formats,

    /// Run the gateway (HTTP forwarding layer in front of the backend service).
    Gateway {
        /// Config file path (default: REGNAV_CONFIG_PATH or ~/.regnav/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// HTTP port (default from config or 3000)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Upload documents through the gateway and wait for every transfer to settle.
    Upload {
        /// Files to upload; unsupported types are skipped.
        #[arg(required = true, value_name = "FILE")]
        files: Vec<PathBuf>,

        /// Config file path (default: REGNAV_CONFIG_PATH or ~/.regnav/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// How many times to retry failed uploads.
        #[arg(long, default_value_t = 0)]
        retries: u32,
    },

    /// Ask questions about uploaded documents via the gateway (interactive).
    Chat {
        /// Config file path (default: REGNAV_CONFIG_PATH or ~/.regnav/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("regnav {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Formats) => {
            println!("accept: {}", formats::accept_filter());
            for info in formats::SUPPORTED_FORMATS {
                println!("{:<6} {:<20} {}", info.label, info.mime_type, info.extension);
            }
        }
        Some(Commands::Gateway { config, port }) => {
            if let Err(e) = run_gateway(config, port).await {
                log::error!("gateway failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Upload {
            files,
            config,
            retries,
        }) => match run_upload(config, files, retries).await {
            Ok(true) => {}
            Ok(false) => std::process::exit(1),
            Err(e) => {
                log::error!("upload failed: {}", e);
                std::process::exit(1);
            }
        },
        Some(Commands::Chat { config }) => {
            if let Err(e) = run_chat(config).await {
                log::error!("chat failed: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

async fn run_gateway(config_path: Option<PathBuf>, port: Option<u16>) -> anyhow::Result<()> {
    let (mut config, path) = regnav::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!("loaded config from {}", path.display());
    log::info!("starting gateway on {}:{}", config.gateway.bind, config.gateway.port);
    regnav::gateway::run_gateway(config).await
}

/// Returns Ok(false) when at least one upload ended in error.
async fn run_upload(
    config_path: Option<PathBuf>,
    paths: Vec<PathBuf>,
    retries: u32,
) -> anyhow::Result<bool> {
    let (config, _) = regnav::config::load_config(config_path)?;
    let client = ApiClient::new(Some(config.client.base_url.clone()));
    let manager = UploadManager::from_config(Arc::new(client), &config.client);

    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        let file = FileHandle::from_path(path)
            .await
            .map_err(|e| anyhow::anyhow!("reading {}: {}", path.display(), e))?;
        if !formats::is_supported(&file.mime_type) {
            eprintln!(
                "skipping {}: only {} files are accepted",
                path.display(),
                formats::labels().join(", ")
            );
        }
        files.push(file);
    }

    let ids = manager.submit(files);
    if ids.is_empty() {
        anyhow::bail!("no supported files to upload");
    }

    let reporter = tokio::spawn(report_progress(manager.clone()));
    manager.settled().await;
    for attempt in 1..=retries {
        let failed: Vec<TaskId> = manager
            .tasks()
            .iter()
            .filter(|t| t.status == UploadStatus::Error)
            .map(|t| t.id)
            .collect();
        if failed.is_empty() {
            break;
        }
        println!("retrying {} failed upload(s) (attempt {}/{})", failed.len(), attempt, retries);
        for id in failed {
            manager.retry(id);
        }
        manager.settled().await;
    }
    reporter.abort();

    let tasks = manager.tasks();
    for task in &tasks {
        println!(
            "{:<8} {:>4}%  {} ({})",
            task.status,
            task.progress,
            task.name,
            formats::format_file_size(task.size)
        );
    }
    Ok(tasks.iter().all(|t| t.status == UploadStatus::Success))
}

/// Print a line whenever a task changes status or crosses another quarter of its progress.
async fn report_progress(manager: UploadManager) {
    let mut rx = manager.subscribe();
    let mut last: HashMap<TaskId, (UploadStatus, u8)> = HashMap::new();
    loop {
        let tasks: Vec<UploadTask> = rx.borrow_and_update().clone();
        for task in &tasks {
            let step = task.progress / 25;
            let changed = match last.get(&task.id) {
                Some((status, prev)) => *status != task.status || *prev / 25 != step,
                None => true,
            };
            if changed {
                eprintln!("{}: {} {}%", task.name, task.status, task.progress);
                last.insert(task.id, (task.status, task.progress));
            }
        }
        if rx.changed().await.is_err() {
            break;
        }
    }
}

async fn run_chat(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    use std::io::{self, Write};

    let (config, _) = regnav::config::load_config(config_path)?;
    let client = ApiClient::new(Some(config.client.base_url.clone()));
    let session = ChatSession::new(Arc::new(client), &config.client);

    for turn in session.transcript() {
        print_turn(&turn);
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("/exit") || input.eq_ignore_ascii_case("/quit") {
            break;
        }

        session.set_input(input);
        if let Some(turn) = session.send_input().await {
            print_turn(&turn);
        }
    }

    Ok(())
}

fn print_turn(turn: &ChatTurn) {
    println!("< {}", turn.content.trim());
    if let Some(sources) = turn.sources.as_ref().filter(|s| !s.is_empty()) {
        println!("  sources: {}", sources.join(", "));
    }
}
