use std::process::ExitCode;
use std::sync::Arc;

use servix_config::ServixConfig;
use servix_core::{DrainOutcome, Master, ShutdownController};
use tracing::{error, info, warn};
use utils::init_tracing;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let conf_path = std::env::args().nth(1).unwrap_or_else(|| "servix.conf".into());

    let cfg = match ServixConfig::from_file(&conf_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error reading '{conf_path}': {e}");
            return ExitCode::from(1);
        }
    };

    let report = cfg.validate();
    if report.has_errors() {
        eprintln!("Invalid config in '{conf_path}':");
        eprint!("{}", report.format());
        return ExitCode::from(1);
    }
    if !report.warnings().is_empty() {
        eprintln!("Config warnings in '{conf_path}':");
        eprint!("{}", report.format());
    }

    let acceptor = match servix_tls::load_acceptor(cfg.server.cert_path(), cfg.server.key_path()) {
        Ok(acceptor) => acceptor,
        Err(e) => {
            error!(target: "servix", error = %e, "Failed to load TLS identity");
            return ExitCode::from(1);
        }
    };

    let cfg = Arc::new(cfg);
    let bound = match Master::new(cfg.clone(), acceptor).bind().await {
        Ok(bound) => bound,
        Err(e) => {
            error!(target: "servix", error = %e, "Startup failed");
            return ExitCode::from(1);
        }
    };

    info!(
        target: "servix",
        listen = %cfg.server.listen_addr(),
        root = %cfg.server.root(),
        max_connections = cfg.global.max_connections(),
        "Servix started (Ctrl+C to stop)"
    );

    let controller = ShutdownController::new();
    let signal = controller.signal();

    let drain_ctl = controller.clone();
    tokio::spawn(async move {
        termination_signal().await;
        info!(target: "servix", "Termination signal received");
        drain_ctl.begin_drain();
    });

    let outcome = bound.run(signal).await;
    controller.mark_stopped();

    match outcome {
        DrainOutcome::Clean => {
            info!(target: "servix", "Shutdown complete");
            ExitCode::SUCCESS
        }
        DrainOutcome::GraceExpired => {
            warn!(target: "servix", "Forced shutdown: grace period expired");
            ExitCode::from(2)
        }
    }
}

/// Resolve on SIGINT (Ctrl+C) or, on Unix, SIGTERM.
async fn termination_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
