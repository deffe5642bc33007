//! Terminal client for the NeuralChat relay.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use neuralchat_client::export::{self, ExportFormat};
use neuralchat_client::render::{self, shorten_model};
use neuralchat_client::templates;
use neuralchat_client::{
    ChatSession, ClientError, ConversationStore, FileStorage, Notice, RelayClient, TurnObserver,
    TurnOutcome, TurnState,
};
use neuralchat_types::ProviderKind;
use reedline::{DefaultPrompt, DefaultPromptSegment, Reedline, Signal};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "neuralchat-client")]
#[command(about = "Chat with hosted LLMs through a NeuralChat relay")]
#[command(version)]
struct Cli {
    /// Base URL of the relay server
    #[arg(long, default_value = "http://localhost:3000")]
    server: String,

    /// Directory holding the persisted conversations and settings
    #[arg(long, default_value = ".neuralchat")]
    state_dir: PathBuf,
}

const HELP: &str = "\
Type a message to send it. Commands:
  /new                      start a new conversation
  /list                     list conversations
  /switch <n|id>            switch conversation
  /delete [n|id]            delete a conversation (default: current)
  /pin [n|id]               pin or unpin a conversation
  /clear                    remove every message of the current conversation
  /search [text]            filter /list (no text clears the filter)
  /system [text]            show or set the system prompt (/system - clears it)
  /template [name]          apply a prompt template or list them
  /key <service> <key> [model]
  /clearkey <service>
  /service <auto|service>   choose the provider for new turns
  /services                 services available with the current keys
  /models <service>         models offered by a service
  /attach <path>            upload a file for the next message
  /files                    list pending attachments
  /unattach <n>             drop a pending attachment
  /edit <n> <text>          rewrite message n and answer again
  /regen [n]                regenerate from assistant message n (default: last)
  /export <md|json|txt> [path]
  /import <path>
  /theme                    toggle the theme
  /history                  show the current conversation
  /help
  /quit";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let transport = RelayClient::new(&cli.server)
        .with_context(|| format!("Invalid server URL '{}'", cli.server))?;
    let storage = Arc::new(FileStorage::new(&cli.state_dir));
    let store = ConversationStore::load(storage).await;
    let mut session = ChatSession::new(store, transport);

    println!("NeuralChat · relay {} · /help for commands", cli.server);
    if !session.store().has_api_key() {
        println!("No API key configured yet. Use /key <service> <key>.");
    }

    let mut editor = Reedline::create();
    let prompt = DefaultPrompt::new(
        DefaultPromptSegment::Basic("neuralchat".to_string()),
        DefaultPromptSegment::Empty,
    );

    loop {
        let signal = tokio::task::block_in_place(|| editor.read_line(&prompt))
            .context("Failed to read input")?;
        let line = match signal {
            Signal::Success(line) => line,
            Signal::CtrlD => break,
            _ => continue,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let result = if let Some(command) = line.strip_prefix('/') {
            match run_command(&mut session, command).await {
                Ok(Flow::Quit) => break,
                other => other.map(|_| ()),
            }
        } else {
            send(&mut session, line).await
        };
        if let Err(e) = result {
            eprintln!("Error: {e:#}");
        }
    }
    Ok(())
}

enum Flow {
    Continue,
    Quit,
}

type Session = ChatSession<RelayClient>;

async fn run_command(session: &mut Session, command: &str) -> Result<Flow> {
    let (name, rest) = command
        .split_once(char::is_whitespace)
        .map(|(n, r)| (n, r.trim()))
        .unwrap_or((command, ""));

    match name {
        "quit" | "exit" => return Ok(Flow::Quit),
        "help" => println!("{HELP}"),
        "new" => {
            session.store_mut().new_conversation().await;
            println!("Started a new conversation.");
        }
        "list" => print_list(session.store()),
        "switch" => {
            let id = resolve_conversation(session.store(), rest)?;
            session.store_mut().switch_conversation(&id).await?;
            print_history(session.store());
        }
        "delete" => {
            let id = resolve_or_current(session.store(), rest)?;
            session.store_mut().delete_conversation(&id).await?;
            println!("Deleted.");
        }
        "pin" => {
            let id = resolve_or_current(session.store(), rest)?;
            let pinned = session.store_mut().toggle_pin(&id).await?;
            println!("{}", if pinned { "Pinned." } else { "Unpinned." });
        }
        "clear" => {
            session.store_mut().clear_current().await;
            println!("Conversation cleared.");
        }
        "search" => {
            if rest.is_empty() {
                session.store_mut().clear_search();
            } else {
                session.store_mut().set_search(rest);
            }
            print_list(session.store());
        }
        "system" => match rest {
            "" => {
                let prompt = session
                    .store()
                    .current()
                    .map(|c| c.system_prompt.as_str())
                    .unwrap_or_default();
                println!("{}", if prompt.is_empty() { "(no system prompt)" } else { prompt });
            }
            "-" => {
                session.store_mut().clear_system_prompt().await;
                println!("System prompt cleared.");
            }
            prompt => {
                session.store_mut().set_system_prompt(prompt).await;
                println!("System prompt set.");
            }
        },
        "template" => {
            if rest.is_empty() {
                println!("Templates: {}", templates::template_keys().collect::<Vec<_>>().join(", "));
            } else {
                session.store_mut().apply_template(rest).await?;
                println!("Template '{rest}' applied as system prompt.");
            }
        }
        "key" => {
            let mut args = rest.split_whitespace();
            let (Some(service), Some(key)) = (args.next(), args.next()) else {
                anyhow::bail!("usage: /key <service> <key> [model]");
            };
            let kind = parse_service(service)?;
            let model = args.next().unwrap_or_default();
            session.store_mut().save_service(kind, key, model).await;
            println!("Saved credentials for {}.", kind.display_name());
        }
        "clearkey" => {
            let kind = parse_service(rest)?;
            session.store_mut().clear_key(kind).await;
            println!("Removed the {} key.", kind.display_name());
        }
        "service" => {
            session.store_mut().select_service(rest).await?;
            println!("Using {}.", session.store().selected_service());
        }
        "services" => {
            let services = session.refresh_services().await?;
            if services.is_empty() {
                println!("No services available. Configure an API key first.");
            } else {
                println!("{}", services.join(", "));
            }
        }
        "models" => {
            let kind = parse_service(rest)?;
            for model in session.load_models(kind).await? {
                println!("  {model}");
            }
        }
        "attach" => {
            let path = Path::new(rest);
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| rest.to_string());
            let upload = session.upload_file(&filename, bytes).await?;
            println!(
                "Attached {} ({}, {}).",
                upload.filename,
                render::file_label(&upload.mime_type, &upload.filename),
                render::format_file_size(upload.size)
            );
        }
        "files" => {
            let pending = session.store().pending_files();
            if pending.is_empty() {
                println!("No pending attachments.");
            }
            for (i, file) in pending.iter().enumerate() {
                println!(
                    "  {}. {} {} {}",
                    i + 1,
                    render::file_icon(&file.mime_type),
                    file.filename,
                    render::format_file_size(file.size)
                );
            }
        }
        "unattach" => {
            let index = parse_position(rest)?;
            match session.store_mut().remove_pending_file(index) {
                Some(file) => println!("Removed {}.", file.filename),
                None => anyhow::bail!("no attachment {rest}"),
            }
        }
        "edit" => {
            let (position, text) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            let index = parse_position(position)?;
            let cancel = CancellationToken::new();
            let outcome = with_interrupt(&cancel, async {
                session
                    .edit_message(index, text, &cancel, &mut Printer::default())
                    .await
            })
            .await?;
            report(outcome);
        }
        "regen" => {
            let index = if rest.is_empty() {
                last_assistant(session.store()).ok_or(ClientError::InvalidMessage(0))?
            } else {
                parse_position(rest)?
            };
            let cancel = CancellationToken::new();
            let outcome = with_interrupt(&cancel, async {
                session
                    .regenerate_from(index, &cancel, &mut Printer::default())
                    .await
            })
            .await?;
            report(outcome);
        }
        "export" => {
            let (format, path) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            let format: ExportFormat = format.parse()?;
            let Some(conversation) = session.store().current() else {
                anyhow::bail!("no current conversation");
            };
            let contents = export::export(conversation, format, Utc::now())?;
            let path = match path.trim() {
                "" => PathBuf::from(export::export_file_name(conversation, format)),
                path => PathBuf::from(path),
            };
            tokio::fs::write(&path, contents)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Exported to {}.", path.display());
        }
        "import" => {
            let json = tokio::fs::read_to_string(rest)
                .await
                .with_context(|| format!("Failed to read {rest}"))?;
            session.store_mut().import_conversation(&json).await?;
            print_history(session.store());
        }
        "theme" => {
            let theme = session.store_mut().toggle_theme().await;
            println!("Theme: {theme:?}");
        }
        "history" => print_history(session.store()),
        other => anyhow::bail!("unknown command '/{other}', try /help"),
    }
    Ok(Flow::Continue)
}

async fn send(session: &mut Session, text: &str) -> Result<()> {
    let cancel = CancellationToken::new();
    let outcome = with_interrupt(&cancel, async {
        session
            .send_message(text, &cancel, &mut Printer::default())
            .await
    })
    .await?;
    report(outcome);
    Ok(())
}

/// Run a turn while Ctrl-C cancels it.
async fn with_interrupt<F, T>(cancel: &CancellationToken, turn: F) -> T
where
    F: std::future::Future<Output = T>,
{
    let watcher = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });
    let result = turn.await;
    watcher.abort();
    result
}

fn report(outcome: TurnOutcome) {
    if outcome == TurnOutcome::Ignored {
        println!("Nothing to send.");
    }
}

#[derive(Default)]
struct Printer {
    streamed: bool,
}

impl TurnObserver for Printer {
    fn on_state(&mut self, state: TurnState) {
        if matches!(state, TurnState::Completed | TurnState::Cancelled) && self.streamed {
            println!();
        }
    }

    fn on_service(&mut self, service: &str, model: &str) {
        println!("── {service} · {}", shorten_model(model));
    }

    fn on_fragment(&mut self, fragment: &str) {
        self.streamed = true;
        print!("{fragment}");
        io::stdout().flush().ok();
    }

    fn on_notice(&mut self, notice: &Notice) {
        match notice {
            Notice::Retrying => eprintln!("\nConnection failed, retrying..."),
            Notice::Cancelled => eprintln!("\nCancelled."),
            Notice::Error(message) => eprintln!("\nError: {message}"),
        }
    }
}

fn parse_service(name: &str) -> Result<ProviderKind> {
    name.parse::<ProviderKind>()
        .map_err(|_| ClientError::UnknownService(name.to_string()).into())
}

/// 1-based position as typed by the user, converted to an index.
fn parse_position(arg: &str) -> Result<usize> {
    match arg.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n - 1),
        _ => anyhow::bail!("expected a position starting at 1, got '{arg}'"),
    }
}

fn resolve_conversation(store: &ConversationStore, arg: &str) -> Result<String> {
    if let Ok(index) = parse_position(arg) {
        let items = render::conversation_list(store, Utc::now());
        if let Some(item) = items.get(index) {
            return Ok(item.id.clone());
        }
    }
    match store.conversation(arg) {
        Some(conversation) => Ok(conversation.id.clone()),
        None => Err(ClientError::UnknownConversation(arg.to_string()).into()),
    }
}

fn resolve_or_current(store: &ConversationStore, arg: &str) -> Result<String> {
    if arg.is_empty() {
        return store
            .current_id()
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("no current conversation"));
    }
    resolve_conversation(store, arg)
}

fn last_assistant(store: &ConversationStore) -> Option<usize> {
    store
        .current()?
        .messages
        .iter()
        .rposition(|m| m.role == neuralchat_types::Role::Assistant)
}

fn print_list(store: &ConversationStore) {
    let items = render::conversation_list(store, Utc::now());
    if items.is_empty() {
        if store.search_query().is_empty() {
            println!("No conversations yet.");
        } else {
            println!("No results for \"{}\".", store.search_query());
        }
        return;
    }
    for (i, item) in items.iter().enumerate() {
        let marker = if item.active { '>' } else { ' ' };
        println!("{marker} {:>2}. {} {}  {}", i + 1, item.icon, item.title, item.time);
        println!("       {}", item.preview);
    }
}

fn print_history(store: &ConversationStore) {
    let Some(conversation) = store.current() else {
        return;
    };
    println!("# {}", conversation.title);
    if !conversation.system_prompt.is_empty() {
        println!("(system) {}", conversation.system_prompt);
    }
    for (view, message) in render::message_views(conversation)
        .iter()
        .zip(&conversation.messages)
    {
        let tag = view
            .service_tag
            .as_deref()
            .map(|t| format!(" [{t}]"))
            .unwrap_or_default();
        println!("\n{}. {}{tag} {}", view.index + 1, view.author, view.time);
        for chip in &view.files {
            println!("   {} {} · {} {}", chip.icon, chip.name, chip.label, chip.size);
        }
        println!("{}", message.typed_text());
    }
}
