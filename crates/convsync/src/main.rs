// SPDX-FileCopyrightText: 2026 Convsync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! convsync - live conversation sync for a multi-channel support dashboard.
//!
//! This is the binary entry point.

mod history;
mod shutdown;
mod watch;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use convsync_config::ConvsyncConfig;
use convsync_core::{ConversationKey, ConvsyncError, Platform};

/// convsync - live conversation sync for a multi-channel support dashboard.
#[derive(Parser, Debug)]
#[command(name = "convsync", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the XDG hierarchy.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Identifies one conversation.
#[derive(Args, Debug)]
struct ConversationArgs {
    /// Messaging platform (whatsapp, instagram, messenger, facebook).
    #[arg(long)]
    platform: Platform,

    /// Contact identifier on that platform, e.g. a phone number.
    #[arg(long)]
    contact: String,
}

impl ConversationArgs {
    fn key(&self) -> ConversationKey {
        ConversationKey::new(self.platform, &self.contact)
    }
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Follow a conversation live until Ctrl+C.
    Watch(ConversationArgs),
    /// Print a conversation's merged timeline as JSON.
    History {
        #[command(flatten)]
        conversation: ConversationArgs,

        /// Older pages to load after the initial fetch.
        #[arg(long, default_value_t = 0)]
        pages: usize,
    },
    /// Print the effective configuration.
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => convsync_config::load_and_validate_path(path),
        None => convsync_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            convsync_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.logging.level);

    let result = match cli.command {
        Commands::Watch(conversation) => watch::run_watch(&config, conversation.key()).await,
        Commands::History {
            conversation,
            pages,
        } => history::run_history(&config, conversation.key(), pages).await,
        Commands::Config => render_config(&config).map(|text| print!("{text}")),
    };

    if let Err(e) = result {
        eprintln!("convsync: {e}");
        std::process::exit(1);
    }
}

/// Effective configuration as TOML, with API keys masked.
fn render_config(config: &ConvsyncConfig) -> Result<String, ConvsyncError> {
    let mut shown = config.clone();
    for key in [&mut shown.backend.api_key, &mut shown.realtime.api_key] {
        if key.is_some() {
            *key = Some("********".to_string());
        }
    }
    toml::to_string_pretty(&shown)
        .map_err(|e| ConvsyncError::Internal(format!("failed to render configuration: {e}")))
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("convsync={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_loads_config_defaults() {
        let config =
            convsync_config::load_and_validate_str("").expect("default config should be valid");
        assert_eq!(config.sync.page_size, 20);
    }

    #[test]
    fn rendered_config_masks_keys() {
        let mut config = ConvsyncConfig::default();
        config.backend.api_key = Some("secret-anon-key".into());

        let text = render_config(&config).unwrap();
        assert!(text.contains("base_url = \"http://localhost:3000\""));
        assert!(text.contains("********"));
        assert!(!text.contains("secret-anon-key"));
    }

    #[test]
    fn cli_parses_history() {
        let cli = Cli::try_parse_from([
            "convsync",
            "history",
            "--platform",
            "whatsapp",
            "--contact",
            "+34600111222",
            "--pages",
            "3",
        ])
        .unwrap();
        match cli.command {
            Commands::History {
                conversation,
                pages,
            } => {
                assert_eq!(pages, 3);
                assert_eq!(conversation.key().match_key(), "+34600111222");
            }
            other => panic!("expected history, got {other:?}"),
        }
    }

    #[test]
    fn cli_rejects_unknown_platform() {
        assert!(
            Cli::try_parse_from(["convsync", "watch", "--platform", "telegram", "--contact", "x"])
                .is_err()
        );
    }
}
