use anyhow::{bail, Context, Result};
use chatterbox_core::config::Config;
use chatterbox_core::core_chat::{
    ChannelId, ChatSession, ChatView, Credential, HttpSnapshotLoader, SessionHandle, SessionUpdate,
    WebSocketConnector,
};
use chatterbox_core::logging::{init_logging_with_config, LogConfig};
use chatterbox_core::metrics::init_metrics;
use clap::Parser;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

mod input;

use input::{Input, HELP};

#[derive(Parser, Debug)]
#[command(name = "chatterbox")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base URL of the HTTP API
    #[arg(long)]
    http_url: Option<String>,

    /// WebSocket endpoint of the event stream
    #[arg(long)]
    ws_url: Option<String>,

    /// Bearer token for the snapshot request
    #[arg(long, env = "CHATTERBOX_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Name shown on your messages and channels
    #[arg(short, long, default_value = "anonymous")]
    username: String,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    config.apply_env()?;

    if let Some(url) = &args.http_url {
        config.server.http_url = url.clone();
    }
    if let Some(url) = &args.ws_url {
        config.server.ws_url = url.clone();
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    init_logging_with_config(LogConfig::try_from(&config.logging)?)?;
    init_metrics();
    info!("Chatterbox CLI started");

    let credential = args
        .token
        .clone()
        .map(|token| Credential::new(args.username.clone(), token));
    let loader = HttpSnapshotLoader::from_config(&config.server)?;
    let connector = WebSocketConnector::new(config.sync.reconnect_delay);

    let (session, task) = ChatSession::start(&config, credential, &loader, &connector).await?;

    let view = session.view().await?;
    if let Some(kind) = view.error {
        session.shutdown().await;
        bail!("Cannot start chat: {}", kind);
    }
    print_channels(&view);
    print_history(&view);

    let printer = tokio::spawn(print_updates(session.clone()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let Some(input) = Input::parse(&line) else {
            continue;
        };
        if input == Input::Quit {
            break;
        }
        if let Err(e) = run_input(&session, input).await {
            eprintln!("! {}", e);
        }
    }

    session.shutdown().await;
    if let Err(e) = task.await {
        warn!(error = %e, "Session task ended abnormally");
    }
    let _ = printer.await;

    info!("Chatterbox CLI finished");
    Ok(())
}

async fn run_input(session: &SessionHandle, input: Input) -> Result<()> {
    match input {
        Input::Say(text) => {
            session.send_message(text).await?;
        }
        Input::Channels => print_channels(&session.view().await?),
        Input::Join(name) => {
            let id = channel_named(&session.view().await?, &name)?;
            session.select_channel(id).await?;
        }
        Input::Add(name) => {
            session.add_channel(name).await?;
        }
        Input::Rename(name) => {
            let id = current_channel(&session.view().await?)?;
            session.rename_channel(id, name).await?;
        }
        Input::Remove => {
            let id = current_channel(&session.view().await?)?;
            session.remove_channel(id).await?;
        }
        Input::Help => println!("{}", HELP),
        Input::Unknown(verb) => bail!("unknown command /{} (try /help)", verb),
        Input::Quit => {}
    }
    Ok(())
}

fn channel_named(view: &ChatView, name: &str) -> Result<ChannelId> {
    view.channels
        .iter()
        .find(|row| row.channel.name == name)
        .map(|row| row.channel.id)
        .with_context(|| format!("no channel named {}", name))
}

fn current_channel(view: &ChatView) -> Result<ChannelId> {
    view.current_channel
        .as_ref()
        .map(|c| c.id)
        .context("no channel selected")
}

async fn print_updates(session: SessionHandle) {
    let mut updates = session.subscribe();
    loop {
        let update = match updates.recv().await {
            Ok(update) => update,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Display fell behind");
                continue;
            }
            Err(RecvError::Closed) => return,
        };

        match update {
            SessionUpdate::MessageAppended(msg) => {
                let Ok(view) = session.view().await else {
                    return;
                };
                if view.current_channel.map(|c| c.id) == Some(msg.channel_id) {
                    println!("{}: {}", msg.username, msg.body);
                }
            }
            SessionUpdate::ChannelsChanged | SessionUpdate::Ready => {
                if let Ok(view) = session.view().await {
                    print_channels(&view);
                }
            }
            SessionUpdate::SelectionChanged(_) => {
                if let Ok(view) = session.view().await {
                    print_history(&view);
                }
            }
            SessionUpdate::Failed(kind) => eprintln!("! session failed: {}", kind),
            SessionUpdate::Closed => return,
        }
    }
}

fn print_channels(view: &ChatView) {
    let current = view.current_channel.as_ref().map(|c| c.id);
    let names: Vec<String> = view
        .channels
        .iter()
        .map(|row| {
            let marker = if Some(row.channel.id) == current { "*" } else { "" };
            format!("{}#{} ({})", marker, row.channel.name, row.message_count)
        })
        .collect();
    println!("channels: {}", names.join("  "));
}

fn print_history(view: &ChatView) {
    match &view.current_channel {
        Some(channel) => {
            println!("-- #{} --", channel.name);
            for msg in &view.messages {
                println!("{}: {}", msg.username, msg.body);
            }
        }
        None => println!("-- no channel selected --"),
    }
}
