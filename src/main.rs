use anyhow::{bail, Context, Result};
use clap::Parser;
use selection_bubble::{
    app::ServiceEvent,
    cli::{Cli, Command, EnhanceArgs, LoginArgs, RunArgs},
    enhance::{
        offline_transform, EnhancementOrchestrator, EnhancementSource, EnhancementStatus,
        HttpEnhancementClient,
    },
    input::{Clipboard, MemoryClipboard, SystemClipboard},
    logging::BubbleLogFormatter,
    machine::{MachineSettings, Notice, SelectionSessionStateMachine},
    overlay::{BubbleState, HeadlessWindowSystem},
    paths,
    replay::{self, ReplayDriver, ReplayOutput},
    session::{FileSessionStore, SessionStore},
    status::StatusSummary,
    Config, ConfigManager, SelectionBubbleApp,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so replay output on stdout stays machine-readable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "selection_bubble=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .event_format(BubbleLogFormatter::new()),
        )
        .init();

    let config_manager = match cli.config.as_deref() {
        Some(path) => ConfigManager::load_from(paths::expand_tilde(path))?,
        None => ConfigManager::load()?,
    };

    match cli.command {
        Command::Run(args) => run_service(config_manager, args).await,
        Command::Enhance(args) => run_enhance(&config_manager.get(), args).await,
        Command::Login(args) => run_login(args).await,
        Command::Logout => {
            FileSessionStore::open(paths::session_file())?.clear().await?;
            Ok(())
        }
        Command::Monitoring { state } => config_manager.set_monitoring_enabled(state.enabled()),
        Command::Status => {
            let sessions = FileSessionStore::open(paths::session_file())?;
            let summary = StatusSummary {
                config_path: config_manager.path().to_path_buf(),
                config: config_manager.get(),
                session: sessions.snapshot(),
            };
            println!("{summary}");
            Ok(())
        }
    }
}

fn enhancement_orchestrator(config: &Config) -> Result<EnhancementOrchestrator> {
    let sessions = Arc::new(FileSessionStore::open(paths::session_file())?);
    let api = Arc::new(
        HttpEnhancementClient::new(
            &config.enhancement.api_base_url,
            config.enhancement.request_timeout(),
        )
        .context("Failed to configure enhancement client")?,
    );
    Ok(EnhancementOrchestrator::new(api, sessions))
}

async fn run_service(config_manager: ConfigManager, args: RunArgs) -> Result<()> {
    info!("🚀 selection-bubble starting up!");
    info!("{}", "=".repeat(50));

    let config = config_manager.get();
    let settings = MachineSettings::from_config(&config);
    info!("✅ Configuration loaded from {}", config_manager.path().display());
    info!("   Monitoring: {}", config.monitoring_enabled);
    info!("   Debounce: {} ms", config.selection.debounce_ms);
    info!("   API: {}", config.enhancement.api_base_url);

    let clipboard: Arc<dyn Clipboard> = Arc::new(MemoryClipboard::new());
    let orchestrator = Arc::new(enhancement_orchestrator(&config)?);
    let machine = SelectionSessionStateMachine::new(
        settings,
        Box::new(HeadlessWindowSystem::new()),
        Arc::clone(&clipboard),
        orchestrator,
    );

    let (events_tx, events_rx) = mpsc::channel(64);
    let (notices_tx, notices_rx) = mpsc::unbounded_channel();
    let app = SelectionBubbleApp::new(machine, events_rx).with_notices(notices_tx);
    let printer = tokio::spawn(print_outputs(app.subscribe(), notices_rx));
    let service = tokio::spawn(app.run());

    let steps = match &args.script {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open script {}", path.display()))?;
            replay::read_script(BufReader::new(file)).await?
        }
        None => replay::read_script(BufReader::new(tokio::io::stdin())).await?,
    };
    info!("▶️  Replaying {} steps", steps.len());

    let mut driver = ReplayDriver::new(events_tx.clone(), clipboard);
    let outcome = tokio::select! {
        result = driver.play(steps) => result,
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
            Ok(())
        }
    };

    if events_tx.send(ServiceEvent::Shutdown).await.is_err() {
        warn!("Service already stopped");
    }
    service.await.context("Service task panicked")??;
    printer.await.context("Output task panicked")?;

    for (id, text) in driver.field_texts() {
        print_json(&ReplayOutput::Field { id, text });
    }

    info!("✅ Shutdown complete");
    outcome
}

async fn run_enhance(config: &Config, args: EnhanceArgs) -> Result<()> {
    let style = args.style.unwrap_or(config.enhancement.default_style);

    let text = if args.offline {
        offline_transform(&args.text, style)
    } else {
        let orchestrator = enhancement_orchestrator(config)?;
        match orchestrator.enhance(&args.text, style).await {
            Some(EnhancementStatus::Success {
                text,
                usage,
                source,
            }) => {
                if source == EnhancementSource::Offline {
                    warn!("Enhancement API unavailable; used the offline transform");
                }
                if let Some(usage) = usage {
                    info!(
                        "🪙 {} tokens used, {} remaining today",
                        usage.tokens_used_this_request, usage.tokens_remaining_today
                    );
                }
                text
            }
            Some(EnhancementStatus::Error(message)) => bail!(
                "Enhancement failed: {message} (run `selection-bubble login --token <TOKEN>`)"
            ),
            _ => bail!("Enhancement did not complete"),
        }
    };

    println!("{text}");

    if args.copy {
        SystemClipboard::new()?.set_text(&text)?;
        info!("📋 Copied to clipboard");
    }
    Ok(())
}

async fn run_login(args: LoginArgs) -> Result<()> {
    let token = args.token.trim().to_string();
    if token.is_empty() {
        bail!("Access token must not be empty");
    }
    let sessions = FileSessionStore::open(paths::session_file())?;
    sessions.save_tokens(token, args.refresh, args.email).await?;
    info!("✅ Signed in; session stored at {}", sessions.path().display());
    Ok(())
}

async fn print_outputs(
    mut bubbles: watch::Receiver<BubbleState>,
    mut notices: mpsc::UnboundedReceiver<Notice>,
) {
    loop {
        tokio::select! {
            changed = bubbles.changed() => match changed {
                Ok(()) => {
                    let state = bubbles.borrow_and_update().clone();
                    print_json(&ReplayOutput::bubble(state));
                }
                Err(_) => break,
            },
            notice = notices.recv() => match notice {
                Some(notice) => print_json(&ReplayOutput::notice(notice)),
                None => break,
            },
        }
    }

    while let Ok(notice) = notices.try_recv() {
        print_json(&ReplayOutput::notice(notice));
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{line}"),
        Err(err) => warn!("Failed to serialize output: {err}"),
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => {
                        info!("Received SIGINT (Ctrl+C)");
                    }
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM");
                    }
                }
            }
            Err(err) => {
                warn!("Failed to set up SIGTERM handler: {err}");
                if signal::ctrl_c().await.is_ok() {
                    info!("Received SIGINT (Ctrl+C)");
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if signal::ctrl_c().await.is_ok() {
            info!("Received SIGINT (Ctrl+C)");
        }
    }
}
