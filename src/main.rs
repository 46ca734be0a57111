//! `yami` binary: read configuration, run the bot, restart on request.

use std::process::{Command, ExitCode};

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use yami::{BotConfig, BotError, Shutdown};

fn init_logging(filter: &str) {
    let filter = EnvFilter::try_new(filter)
        .unwrap_or_else(|_| EnvFilter::new(yami::config::DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Run a fresh copy of this binary and pass on its exit status.
fn restart(token: &str) -> std::io::Result<ExitCode> {
    let exe = std::env::current_exe()?;
    let args: Vec<String> = std::env::args().skip(1).collect();
    info!(exe = %exe.display(), "restarting");
    let status = Command::new(exe)
        .args(args)
        .env("YAMI_TOKEN", token)
        .status()?;
    Ok(status
        .code()
        .and_then(|c| u8::try_from(c).ok())
        .map_or(ExitCode::FAILURE, ExitCode::from))
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    let config = match BotConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config.log_filter);
    info!(?config, "starting");

    let token = config.token.clone();
    match yami::bot::run(config).await {
        Ok(Shutdown::Close) => ExitCode::SUCCESS,
        Ok(Shutdown::Restart) => match restart(&token) {
            Ok(code) => code,
            Err(e) => {
                error!(error = %e, "restart failed");
                ExitCode::FAILURE
            }
        },
        Err(e @ BotError::InvalidToken) => {
            error!("{e}");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "bot stopped");
            ExitCode::FAILURE
        }
    }
}
