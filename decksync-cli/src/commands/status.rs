use clap::Args;

use decksync_core::sync::{build_http_url, server_health};

use super::session::runtime;
use super::CommandError;
use crate::config::{mask_token, Config};

/// Show sync configuration and server status
#[derive(Args)]
pub struct StatusCommand;

impl StatusCommand {
    pub fn run(&self, config: &Config) -> Result<(), CommandError> {
        runtime()?.block_on(self.status(config))
    }

    async fn status(&self, config: &Config) -> Result<(), CommandError> {
        println!("Sync Configuration");
        println!("==================");
        println!();

        let server_url = &config.server_url.value;
        println!("Server:      {}", server_url);
        match &config.token.value {
            Some(token) => println!("Token:       {}", mask_token(token)),
            None => println!("Token:       (not set)"),
        }
        println!("Ack timeout: {}s", config.ack_timeout_secs.value);
        println!();

        print!("Server status: ");
        match server_health(server_url).await {
            Ok(health) if health.status == "ok" => match health.version {
                Some(version) => println!("✓ ok (version {})", version),
                None => println!("✓ ok"),
            },
            Ok(health) => println!("✗ {}", health.status),
            Err(e) => {
                println!("✗ unreachable");
                tracing::debug!("{}: {}", build_http_url(server_url, "/health"), e);
            }
        }

        if config.token.value.is_none() {
            println!();
            println!("To connect, add to your config file:");
            println!();
            println!("  token: \"your-token\"");
            println!();
            println!("Or set environment variable:");
            println!("  DECK_TOKEN");
        }

        Ok(())
    }
}
