//! ptycast: WebSocket relay for one PTY-attached process.
//!
//! Starts the configured program on a pseudo-terminal, broadcasts its
//! output to every connected client, and feeds client commands back into
//! it in arrival order.

use std::process::ExitCode;

use ptycast_server::{cli, Relay, SessionLog};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_LOG_DIRECTIVE: &str = "ptycast=info";

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = cli::parse();

    let mut config = match ptycast_config::load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ptycast: {e}");
            return ExitCode::FAILURE;
        }
    };
    args.apply(&mut config);

    if args.print_config {
        println!("{}", ptycast_config::config_to_json(&config));
        return ExitCode::SUCCESS;
    }

    // Session log first so the subscriber can write into it.
    let session_log = if config.session_log.enabled {
        match SessionLog::open(
            &config.session_log.path,
            config.session_log.max_bytes,
            config.session_log.keep,
        ) {
            Ok(log) => Some(log),
            Err(e) => {
                eprintln!(
                    "ptycast: cannot open session log {}: {e}",
                    config.session_log.path
                );
                None
            }
        }
    } else {
        None
    };
    let log_path = session_log.as_ref().map(SessionLog::path);
    init_tracing(args.log_level.as_deref(), session_log);
    if let Some(path) = log_path {
        tracing::info!(path = %path.display(), "Session log enabled");
    }

    if let Err(e) = ptycast_config::validation::validate(&config) {
        tracing::error!("{e}");
        return ExitCode::FAILURE;
    }

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(cancel.clone()));

    tracing::info!(
        addr = %config.server.bind_addr(),
        program = %config.launch.program,
        "Starting ptycast"
    );
    let relay = match Relay::start(&config, cancel).await {
        Ok(relay) => relay,
        Err(e) => {
            tracing::error!("Failed to start relay: {e}");
            return ExitCode::FAILURE;
        }
    };

    match relay.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Relay error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(log_level: Option<&str>, session_log: Option<SessionLog>) {
    let mut filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVE));
    if let Some(level) = log_level {
        match level.parse::<Directive>() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => eprintln!("ptycast: ignoring log level {level:?}: {e}"),
        }
    }

    let file_layer = session_log.map(|log| fmt::layer().with_ansi(false).with_writer(log));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();
}

/// Fire `cancel` on SIGINT or SIGTERM.
async fn shutdown_on_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot listen for SIGTERM");
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::info!("Received SIGINT, shutting down..."),
            _ = term.recv() => tracing::info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::info!("Received Ctrl-C, shutting down...");
    }
    cancel.cancel();
}
