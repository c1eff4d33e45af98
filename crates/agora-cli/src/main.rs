use std::time::Duration;

use agora_channels::{ConnectionState, Subscription};
use agora_core::{AgoraConfig, GroupId, UserId};
use agora_protocol::{event_types, Envelope};
use agora_sessions::Session;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{info, warn};

/// Event types printed by `listen` when `--types` is not given.
const DEFAULT_LISTEN_TYPES: &[&str] = &[
    event_types::CHAT,
    event_types::TYPING,
    event_types::USER_STATUS,
    event_types::ONLINE_STATUS,
    event_types::NOTIFICATION,
    event_types::LIKE,
    event_types::GROUP_CHAT,
];

#[derive(Parser)]
#[command(name = "agora", about = "Realtime client for the Agora social network", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file (default: ~/.agora/agora.toml)
    #[arg(long, global = true, env = "AGORA_CONFIG")]
    config: Option<String>,

    /// WebSocket endpoint, overrides realtime.url
    #[arg(long, global = true)]
    url: Option<String>,

    /// Signed-in user id, overrides session.user_id
    #[arg(long, global = true)]
    user: Option<u64>,

    /// Session cookie for the upgrade request, e.g. "session_id=..."
    #[arg(long, global = true)]
    cookie: Option<String>,

    #[arg(long, global = true, default_value_t = 10)]
    open_timeout_secs: u64,
}

#[derive(Subcommand)]
enum Command {
    /// Print every received event as one JSON line until Ctrl-C
    Listen {
        /// Comma-separated event types (default: all known types)
        #[arg(long, value_delimiter = ',')]
        types: Vec<String>,
    },
    /// Send a direct message
    Chat {
        #[arg(long)]
        to: u64,
        message: String,
    },
    /// Send a message to a group chat
    Group {
        #[arg(long)]
        group: u64,
        message: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agora_cli=info,agora_channels=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = build_config(&cli);

    let session = Session::from_config(&config).context("cannot start session")?;
    let timeout = Duration::from_secs(cli.open_timeout_secs);
    session
        .channel()
        .wait_until_open(timeout)
        .await
        .with_context(|| {
            format!(
                "realtime channel {} did not open within {}s",
                config.realtime.url, cli.open_timeout_secs
            )
        })?;

    match cli.command {
        Command::Listen { types } => listen(&session, &types).await?,
        Command::Chat { to, message } => {
            session.conversation(UserId(to)).send(&message)?;
            info!(to, "message sent");
        }
        Command::Group { group, message } => {
            session.group_room(GroupId(group)).send(&message)?;
            info!(group, "group message sent");
        }
    }

    shutdown(session).await;
    Ok(())
}

/// Load config (explicit path > AGORA_CONFIG > ~/.agora/agora.toml), then
/// apply command-line overrides.
fn build_config(cli: &Cli) -> AgoraConfig {
    let mut config = AgoraConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        AgoraConfig::default()
    });

    if let Some(url) = &cli.url {
        config.realtime.url = url.clone();
    }
    if let Some(cookie) = &cli.cookie {
        config.realtime.cookie = Some(cookie.clone());
    }
    if let Some(user) = cli.user {
        config.session.user_id = Some(user);
    }
    config
}

async fn listen(session: &Session, types: &[String]) -> Result<()> {
    let types: Vec<String> = if types.is_empty() {
        DEFAULT_LISTEN_TYPES.iter().map(|t| t.to_string()).collect()
    } else {
        types.to_vec()
    };

    let _subscriptions: Vec<Subscription> = types
        .iter()
        .map(|event_type| {
            let name = event_type.clone();
            session
                .channel()
                .subscribe(event_type, move |payload| print_event(&name, payload))
        })
        .collect();
    info!(types = ?types, "listening, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    Ok(())
}

fn print_event(event_type: &str, payload: &Value) {
    let Value::Object(body) = payload else {
        return;
    };
    let envelope = Envelope {
        event_type: event_type.to_string(),
        body: body.clone(),
    };
    if let Ok(line) = envelope.to_json() {
        println!("{line}");
    }
}

/// Close the session and give the writer a moment to flush queued frames.
async fn shutdown(session: Session) {
    let mut state = session.channel().watch_state();
    session.end();
    let flushed = tokio::time::timeout(
        Duration::from_secs(2),
        state.wait_for(|s| *s == ConnectionState::Closed),
    )
    .await;
    if flushed.is_err() {
        warn!("channel did not close cleanly");
    }
}
