use anyhow::{Context, Result};
use clap::Parser;

use crate::daemon;
use crate::models::Settings;
use crate::telemetry;

/// Job Polling API - long-poll HTTP front for background job status
#[derive(Parser, Debug)]
#[command(
    name = "job-polling",
    version,
    about = "Job Polling API - long-poll HTTP front for background job status"
)]
pub struct Cli {
    /// Address to bind
    #[arg(long, default_value = "0.0.0.0", env = "HOST")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 8001, env = "PORT")]
    pub port: u16,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

/// Load settings, install logging and run the server.
pub async fn run(cli: &Cli) -> Result<()> {
    let settings = Settings::from_env().context("Invalid configuration")?;
    telemetry::init_tracing(&settings, cli.verbose);
    daemon::start_daemon(settings, &cli.host, cli.port).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["job-polling"]).unwrap();
        if std::env::var_os("PORT").is_none() {
            assert_eq!(cli.port, 8001);
        }
        assert!(!cli.verbose);
    }

    #[test]
    fn test_cli_overrides() {
        let cli =
            Cli::try_parse_from(["job-polling", "--host", "127.0.0.1", "-p", "9000", "-v"])
                .unwrap();
        assert_eq!(cli.host, "127.0.0.1");
        assert_eq!(cli.port, 9000);
        assert!(cli.verbose);
    }

    #[test]
    fn test_cli_rejects_subcommands() {
        assert!(Cli::try_parse_from(["job-polling", "start"]).is_err());
    }
}
