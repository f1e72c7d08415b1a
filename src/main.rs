use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "pageshot", version, about = "Screenshots of live pages through headless Chrome")]
struct Cli {
    /// Directory captures are written to
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Browser window width
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Browser window height
    #[arg(long, default_value_t = 800)]
    height: u32,

    /// Wait a fixed 500ms for layout instead of polling until it is stable
    #[arg(long)]
    fixed_settle: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Capture the whole scrollable page
    Full { url: String },
    /// Capture the visible viewport
    Visible { url: String },
    /// Capture a rectangle (CSS px) of the visible viewport
    Area {
        url: String,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
    /// Check (or with --uncheck, uncheck) every checkbox on the page
    Checkboxes {
        url: String,
        #[arg(long)]
        uncheck: bool,
    },
    /// Answer JSON action requests, one per line, on stdin/stdout
    Serve {
        /// Page to open and use when a request names no tab
        #[arg(long)]
        url: Option<String>,
    },
}

#[cfg(feature = "cdp")]
mod run {
    use std::sync::Arc;

    use log::info;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    use pageshot::artifact::DirectoryStore;
    use pageshot::cdp::CdpInspector;
    use pageshot::dispatch::Dispatcher;
    use pageshot::{CaptureConfig, CaptureResult, Orchestrator, SelectionArea, SettleStrategy};

    use super::{Cli, Cmd};

    pub async fn run(cli: Cli) -> anyhow::Result<bool> {
        let config = CaptureConfig {
            settle: if cli.fixed_settle {
                SettleStrategy::fixed()
            } else {
                SettleStrategy::default()
            },
            ..Default::default()
        };
        config.validate()?;

        let inspector = Arc::new(CdpInspector::launch(cli.width, cli.height)?);
        let store = Arc::new(DirectoryStore::new(&cli.out_dir));
        let orchestrator = Orchestrator::new(inspector.clone(), store, config);

        match cli.command {
            Cmd::Full { url } => {
                let target = inspector.open(&url).await?;
                Ok(report(orchestrator.capture_full_page(&target).await))
            }
            Cmd::Visible { url } => {
                let target = inspector.open(&url).await?;
                Ok(report(orchestrator.capture_visible(&target).await))
            }
            Cmd::Area {
                url,
                x,
                y,
                width,
                height,
            } => {
                let target = inspector.open(&url).await?;
                let selection = SelectionArea::new(x, y, width, height);
                Ok(report(orchestrator.capture_area(&target, &selection).await))
            }
            Cmd::Checkboxes { url, uncheck } => {
                let target = inspector.open(&url).await?;
                let changed = orchestrator.set_all_checkboxes(&target, !uncheck).await?;
                println!("changed {} checkboxes", changed);
                Ok(true)
            }
            Cmd::Serve { url } => {
                let dispatcher = Dispatcher::new(orchestrator);
                if let Some(url) = url {
                    let target = inspector.open(&url).await?;
                    info!("serving requests for {} ({})", url, target);
                    dispatcher.set_active_target(Some(target));
                }
                serve(&dispatcher).await?;
                Ok(true)
            }
        }
    }

    fn report(result: CaptureResult) -> bool {
        match result {
            CaptureResult::Success { artifact } => {
                println!("saved artifact {}", artifact.0);
                true
            }
            CaptureResult::Failure { error, kind } => {
                eprintln!("capture failed ({}): {}", kind, error);
                false
            }
        }
    }

    async fn serve(dispatcher: &Dispatcher) -> anyhow::Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut out = tokio::io::stdout();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let reply = dispatcher.handle_json(&line).await;
            out.write_all(reply.as_bytes()).await?;
            out.write_all(b"\n").await?;
            out.flush().await?;
        }
        Ok(())
    }
}

#[cfg(feature = "cdp")]
#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    match run::run(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("pageshot failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(not(feature = "cdp"))]
fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    log::debug!("parsed {:?}", cli);
    eprintln!("pageshot: no browser backend compiled in; rebuild with --features cdp");
    std::process::exit(2);
}
