mod logging;
mod render;

use std::future::Future;
use std::sync::Arc;

use chat_backend::{build_http_client, HttpChatBackend};
use chat_core::{ChatId, Config, Mode};
use chat_stream::StreamClient;
use clap::{Parser, Subcommand};
use colored::Colorize;
use session_manager::{
    ControllerError, ControllerSettings, FileSessionStorage, IdentityProvider, SendOutcome,
    SessionController, TranscriptEvent,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::broadcast;

use render::{print_transcript, Renderer};

type Controller = SessionController<HttpChatBackend, FileSessionStorage>;

#[derive(Parser)]
#[command(name = "calm-cli")]
#[command(about = "Terminal client for the CalmBuddy chatbot")]
#[command(version)]
struct Cli {
    /// Chatbot server base URL
    #[arg(long, env = "CALMBUDDY_API_BASE")]
    server_url: Option<String>,

    /// Bearer token for persistent conversations
    #[arg(long, env = "CALMBUDDY_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Ignore any configured token and chat as a guest
    #[arg(long)]
    guest: bool,

    /// Enable debug logging
    #[arg(long, short, default_value = "false")]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start interactive chat (default)
    Chat,
    /// Send a single message and stream the reply
    Send {
        /// Message content
        message: String,
    },
    /// Send a single message and wait for the whole reply (guest only)
    Ask {
        /// Message content
        message: String,
    },
    /// Clear the current conversation
    Reset,
    /// Start a new conversation
    New,
    /// List persistent conversations
    List,
    /// Open a persistent conversation and print its history
    Switch { chat_id: String },
    /// Delete a persistent conversation
    Delete { chat_id: String },
    /// Show the current session and conversation
    Whoami,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if std::env::var("RUST_LOG").is_ok() {
        env_logger::init();
    } else {
        logging::init_logging(cli.debug);
    }

    let mut config = Config::new();
    if let Some(url) = cli.server_url {
        config.api_base = Some(url);
    }
    if let Some(token) = cli.token {
        config.token = Some(token);
    }
    if cli.guest {
        config.token = None;
    }
    log::debug!("Using chatbot server {}", config.api_base());

    let controller = connect(&config).await?;
    if config.credential().is_some() && !controller.is_persistent().await {
        eprintln!(
            "{}",
            "Could not open your saved conversations, continuing as guest".yellow()
        );
    }

    let result = match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => run_interactive_chat(&controller).await,
        Commands::Send { message } => send_once(&controller, &message, false).await,
        Commands::Ask { message } => send_once(&controller, &message, true).await,
        Commands::Reset => {
            controller.reset().await?;
            println!("{}", "Conversation cleared".cyan());
            Ok(())
        }
        Commands::New => {
            controller.new_conversation().await?;
            print_mode(&controller).await;
            Ok(())
        }
        Commands::List => list_conversations(&controller).await,
        Commands::Switch { chat_id } => {
            controller
                .switch_conversation(&ChatId::from(chat_id))
                .await?;
            print_transcript(&controller.messages().await);
            Ok(())
        }
        Commands::Delete { chat_id } => {
            controller
                .delete_conversation(&ChatId::from(chat_id.as_str()))
                .await?;
            println!("{}", format!("Deleted conversation {}", chat_id).cyan());
            Ok(())
        }
        Commands::Whoami => {
            print_mode(&controller).await;
            Ok(())
        }
    };

    controller.shutdown().await;
    result
}

async fn connect(config: &Config) -> anyhow::Result<Controller> {
    let http = build_http_client(config)?;
    let backend = Arc::new(HttpChatBackend::new(http.clone(), config.api_base()));
    let storage = Arc::new(FileSessionStorage::new(config.storage_dir()));
    let identity = Arc::new(IdentityProvider::new(storage));

    Ok(SessionController::connect(
        identity,
        backend,
        StreamClient::new(http),
        ControllerSettings::from_config(config),
        config.credential(),
    )
    .await)
}

/// Run `op` while rendering transcript events; Ctrl-C abandons it.
///
/// Returns `None` when interrupted.
async fn drive<F: Future>(
    events: &mut broadcast::Receiver<TranscriptEvent>,
    renderer: &mut Renderer,
    op: F,
) -> Option<F::Output> {
    tokio::pin!(op);
    let output = loop {
        tokio::select! {
            output = &mut op => break Some(output),
            event = events.recv() => match event {
                Ok(event) => renderer.render(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::debug!("Renderer lagged, {} events skipped", skipped);
                    renderer.lagged();
                }
                Err(broadcast::error::RecvError::Closed) => {}
            },
            _ = tokio::signal::ctrl_c() => break None,
        }
    };
    drain(events, renderer);
    output
}

fn drain(events: &mut broadcast::Receiver<TranscriptEvent>, renderer: &mut Renderer) {
    loop {
        match events.try_recv() {
            Ok(event) => renderer.render(&event),
            Err(broadcast::error::TryRecvError::Lagged(_)) => renderer.lagged(),
            Err(_) => break,
        }
    }
}

async fn exchange(
    controller: &Controller,
    events: &mut broadcast::Receiver<TranscriptEvent>,
    renderer: &mut Renderer,
    text: &str,
    whole_reply: bool,
) -> anyhow::Result<()> {
    let result = if whole_reply {
        drive(events, renderer, controller.ask(text)).await
    } else {
        drive(events, renderer, controller.send_message(text)).await
    };
    if result.is_some() {
        renderer.finish_pending(&controller.messages().await);
    }

    match result {
        Some(Ok(SendOutcome::Completed)) => {}
        Some(Ok(SendOutcome::Skipped)) => {
            println!("{}", "Still waiting for the previous reply".yellow());
        }
        Some(Ok(SendOutcome::Cancelled)) => println!("{}", "(cancelled)".dimmed()),
        // Already shown inline as an error marker
        Some(Err(ControllerError::Stream(_))) => {}
        Some(Err(e)) => return Err(e.into()),
        None => {
            controller.cancel().await;
            drain(events, renderer);
            renderer.finish_pending(&controller.messages().await);
            println!("{}", "(cancelled)".dimmed());
        }
    }
    Ok(())
}

async fn send_once(controller: &Controller, text: &str, whole_reply: bool) -> anyhow::Result<()> {
    let mut events = controller.subscribe();
    let mut renderer = Renderer::default();
    exchange(controller, &mut events, &mut renderer, text, whole_reply).await
}

async fn run_interactive_chat(controller: &Controller) -> anyhow::Result<()> {
    println!("{}", "🌿 CalmBuddy".green().bold());
    print_mode(controller).await;
    println!(
        "{}",
        "Commands: /new, /reset, /list, /switch <id>, /delete <id>, /exit".dimmed()
    );
    print_transcript(&controller.messages().await);

    let mut events = controller.subscribe();
    let mut renderer = Renderer::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout
            .write_all(format!("{} ", "You:".cyan().bold()).as_bytes())
            .await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        let result = match input.split_once(' ').unwrap_or((input, "")) {
            ("/exit" | "/quit", _) => break,
            ("/new", _) => lifecycle(controller.new_conversation(), &mut events, &mut renderer).await,
            ("/reset", _) => lifecycle(controller.reset(), &mut events, &mut renderer).await,
            ("/list", _) => list_conversations(controller).await,
            ("/switch", id) if !id.trim().is_empty() => {
                lifecycle(
                    controller.switch_conversation(&ChatId::from(id.trim())),
                    &mut events,
                    &mut renderer,
                )
                .await
            }
            ("/delete", id) if !id.trim().is_empty() => {
                lifecycle(
                    controller.delete_conversation(&ChatId::from(id.trim())),
                    &mut events,
                    &mut renderer,
                )
                .await
            }
            (command, _) if command.starts_with('/') => {
                println!("{}", format!("Unknown command: {}", command).yellow());
                Ok(())
            }
            _ => exchange(controller, &mut events, &mut renderer, input, false).await,
        };

        if let Err(e) = result {
            log::debug!("Command failed: {:?}", e);
            println!("{}", format!("❌ Error: {}", e).red());
        }
    }

    println!("{}", "👋 Take care.".cyan());
    Ok(())
}

async fn lifecycle<F>(
    op: F,
    events: &mut broadcast::Receiver<TranscriptEvent>,
    renderer: &mut Renderer,
) -> anyhow::Result<()>
where
    F: Future<Output = Result<(), ControllerError>>,
{
    match drive(events, renderer, op).await {
        Some(result) => Ok(result?),
        None => Ok(()),
    }
}

async fn list_conversations(controller: &Controller) -> anyhow::Result<()> {
    let chats = controller.list_conversations().await?;
    let active = controller.active_chat().await;
    if chats.is_empty() {
        println!("{}", "No conversations yet".dimmed());
    }
    for chat in chats {
        if Some(&chat.chat_id) == active.as_ref() {
            println!("{} {}", "*".green().bold(), chat.chat_id.to_string().green());
        } else {
            println!("  {}", chat.chat_id);
        }
    }
    Ok(())
}

async fn print_mode(controller: &Controller) {
    match controller.mode().await {
        Some(Mode::Guest { session_id }) => {
            println!("{}", format!("Guest session {}", session_id).dimmed())
        }
        Some(Mode::Persistent { chat_id, .. }) => {
            println!("{}", format!("Conversation {}", chat_id).dimmed())
        }
        None => println!(
            "{}",
            "No conversation open; your next message starts one".dimmed()
        ),
    }
}
