//! Plex OAuth - obtain a Plex access token through PIN-based authorization

use std::process::ExitCode;

use clap::Parser;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use plex_oauth::{
    AccessToken, Config, PendingAuthorization, PinFlow,
    cli::{Cli, OutputFormat},
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            cli.apply_overrides(&mut config);
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            eprintln!("❌ {e}");
            return ExitCode::FAILURE;
        }
    };

    let flow = match PinFlow::new(config) {
        Ok(flow) => flow,
        Err(e) => {
            eprintln!("❌ {e}");
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling authorization");
            on_interrupt.cancel();
        }
    });

    let pending = match flow.start(&cancel).await {
        Ok(pending) => pending,
        Err(e) => return report_failure(&e),
    };
    print_pending(cli.format, &pending);

    match pending.wait_for_token(&cancel).await {
        Ok(token) => {
            info!("Authorization complete");
            print_token(cli.format, &token);
            ExitCode::SUCCESS
        }
        Err(e) => report_failure(&e),
    }
}

fn print_pending(format: OutputFormat, pending: &PendingAuthorization) {
    match format {
        OutputFormat::Text => {
            println!("{}", pending.authorization_url());
        }
        OutputFormat::Json => {
            println!(
                "{}",
                json!({
                    "authorization_url": pending.authorization_url(),
                    "client_id": pending.client_id().as_str(),
                    "pin_id": pending.pin().id(),
                    "code": pending.pin().code(),
                })
            );
        }
    }
}

fn print_token(format: OutputFormat, token: &AccessToken) {
    match format {
        OutputFormat::Text => {
            println!("Token:");
            println!("{}", token.as_str());
        }
        OutputFormat::Json => {
            println!("{}", json!({ "token": token.as_str() }));
        }
    }
}

fn report_failure(e: &plex_oauth::Error) -> ExitCode {
    error!(kind = e.kind(), "Authorization failed: {e}");
    eprintln!("❌ Authorization failed ({}): {e}", e.kind());
    ExitCode::FAILURE
}
