//! Showroom Chat - dealership assistant chat client
//!
//! Terminal front end over the chat session core: messages are sent to a
//! remote conversational agent (or canned mock data), delivery status is
//! simulated, and the conversation survives restarts.

mod agent;
mod chat;
mod config;
mod quick_actions;
mod storage;
mod voice;

use agent::{
    AzureSpeechRecognizer, DirectLineClient, LiveAgent, LoggingAgent, MockAgent, RemoteAgent,
    SpeechToText, UnconfiguredSpeech,
};
use chat::{ChatState, MediaAction, Message, MessageStatus, ProductionSession, RichMedia, Sender};
use config::AppConfig;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use storage::{ChatStorage, KeyValueStore, MemoryStore, MessageStore, SqliteStore};
use tokio::io::{AsyncBufReadExt, BufReader};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voice::{format_elapsed, record_clip, AudioHandle, FileRecorder};

const HELP: &str = "\
Commands:
  <text>              send a message
  /quick [n|id]       list quick actions, or send one
  /hide               show or hide quick actions on startup
  /retry <id>         resend a failed message (id prefix is enough)
  /voice <file.wav>   send a recorded clip
  /record <file.wav>  start recording from a clip, /stop to finish
  /clear              clear the conversation
  /forget             clear and remove stored history
  /status             show typing and error state
  /quit               exit";

/// How long `/quit` waits for pending sends and replies before saving
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
#[allow(clippy::too_many_lines)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr; stdout belongs to the conversation
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "showroom_chat=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = AppConfig::from_env();
    tracing::info!(
        mock = config.use_mock_data,
        db = %config.db_path.display(),
        speech = config.speech.is_some(),
        "Configuration loaded"
    );

    let storage = ChatStorage::new(open_store(&config.db_path));
    match storage.last_session_time().await {
        Some(ms) => tracing::info!(last_session_ms = ms, "Resuming previous session"),
        None => tracing::info!("First session"),
    }
    storage.store_last_session_time().await;

    let agent = build_agent(&config)?;
    tracing::info!(agent = %agent.name(), "Agent ready");

    let session = ProductionSession::start(agent, storage.clone(), config.timing).await;
    let initial = session.snapshot();
    let printer = tokio::spawn(print_updates(
        session.subscribe(),
        initial.clone(),
        config.bot_name.clone(),
    ));

    println!("{} - type /help for commands", config.bot_name);
    for message in &initial.messages {
        println!("{}", render_message(message, &config.bot_name));
    }
    if let Some(error) = &initial.error {
        println!("! {error}");
    }
    let hidden = storage
        .preference::<bool>(quick_actions::HIDDEN_PREFERENCE)
        .await
        .unwrap_or(false);
    if !hidden {
        print_quick_actions();
    }

    let mut recording: Option<CancellationToken> = None;
    let mut tasks: JoinSet<()> = JoinSet::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        while tasks.try_join_next().is_some() {}
        match Command::parse(&line) {
            Command::Empty => {}
            Command::Quit => break,
            Command::Help => println!("{HELP}"),
            Command::Unknown(cmd) => println!("Unknown command {cmd}, try /help"),
            Command::Send(text) => spawn_send(&mut tasks, &session, text),
            Command::Quick(None) => print_quick_actions(),
            Command::Quick(Some(key)) => {
                let action = key
                    .parse()
                    .ok()
                    .and_then(quick_actions::by_position)
                    .or_else(|| quick_actions::by_id(&key));
                match action {
                    Some(action) => spawn_send(&mut tasks, &session, action.message.to_string()),
                    None => println!("No quick action {key}"),
                }
            }
            Command::ToggleQuickActions => {
                let hidden = !storage
                    .preference::<bool>(quick_actions::HIDDEN_PREFERENCE)
                    .await
                    .unwrap_or(false);
                storage
                    .store_preference(quick_actions::HIDDEN_PREFERENCE, &hidden)
                    .await;
                println!(
                    "Quick actions will be {} on startup",
                    if hidden { "hidden" } else { "shown" }
                );
            }
            Command::Retry(prefix) => retry(&mut tasks, &session, &prefix),
            Command::Voice(path) => {
                let session = session.clone();
                tasks.spawn(async move {
                    session.send_voice_message(&AudioHandle::new(path)).await;
                });
            }
            Command::Record(path) => {
                if recording.as_ref().is_some_and(|t| !t.is_cancelled()) {
                    println!("Already recording, /stop first");
                } else {
                    recording = Some(start_recording(
                        &mut tasks,
                        &session,
                        path,
                        config.max_recording,
                    ));
                }
            }
            Command::Stop => match recording.take() {
                Some(token) if !token.is_cancelled() => token.cancel(),
                _ => println!("Not recording"),
            },
            Command::Clear => session.clear_messages().await,
            Command::Forget => {
                session.clear_messages().await;
                storage.clear().await;
            }
            Command::Status => println!(
                "{} messages, typing: {}, error: {}",
                session.messages().len(),
                session.is_typing(),
                session.error().as_deref().unwrap_or("none")
            ),
        }
    }

    if let Some(token) = recording {
        token.cancel();
    }
    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while tasks.join_next().await.is_some() {}
        session.wait_idle().await;
    })
    .await;
    if drained.is_err() {
        tracing::warn!(pending = tasks.len(), "Exiting with requests still pending");
    }
    session.flush().await;
    printer.abort();
    tracing::info!("Goodbye");
    Ok(())
}

fn open_store(path: &Path) -> Arc<dyn KeyValueStore> {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!(path = %parent.display(), error = %e, "Failed to create storage directory");
        }
    }
    match SqliteStore::open(path) {
        Ok(store) => {
            tracing::info!(path = %path.display(), "Opened chat store");
            Arc::new(store)
        }
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Chat store unavailable, history will not persist");
            Arc::new(MemoryStore::new())
        }
    }
}

fn build_agent(config: &AppConfig) -> Result<Arc<dyn RemoteAgent>, agent::AgentError> {
    let inner: Arc<dyn RemoteAgent> = match &config.direct_line {
        Some(direct_line) if !config.use_mock_data => {
            let speech: Arc<dyn SpeechToText> = match &config.speech {
                Some(speech) => Arc::new(AzureSpeechRecognizer::new(speech.clone())?),
                None => {
                    tracing::warn!("SPEECH_KEY or SPEECH_REGION not set, voice messages will not be recognized");
                    Arc::new(UnconfiguredSpeech)
                }
            };
            let channel = DirectLineClient::new(direct_line.clone())?;
            Arc::new(LiveAgent::new(channel, speech))
        }
        _ => Arc::new(MockAgent),
    };
    Ok(Arc::new(LoggingAgent::new(inner)))
}

fn spawn_send(tasks: &mut JoinSet<()>, session: &ProductionSession, text: String) {
    let session = session.clone();
    tasks.spawn(async move {
        session.send_message(&text).await;
    });
}

fn retry(tasks: &mut JoinSet<()>, session: &ProductionSession, prefix: &str) {
    let state = session.snapshot();
    let matches: Vec<&Message> = state
        .messages
        .iter()
        .filter(|m| m.id.starts_with(prefix))
        .collect();
    let id = match matches.as_slice() {
        [message] => message.id.clone(),
        [] => {
            println!("No message {prefix}");
            return;
        }
        _ => {
            println!("Ambiguous id {prefix}");
            return;
        }
    };

    let session = session.clone();
    tasks.spawn(async move {
        if !session.retry_message(&id).await {
            println!("Message {} cannot be retried", short_id(&id));
        }
    });
}

fn start_recording(
    tasks: &mut JoinSet<()>,
    session: &ProductionSession,
    path: String,
    max: Duration,
) -> CancellationToken {
    let token = CancellationToken::new();
    let stop = token.clone();
    let session = session.clone();
    println!("Recording... /stop to send (limit {})", format_elapsed(max.as_secs()));

    tasks.spawn(async move {
        let recorder = FileRecorder::new(path);
        let started = tokio::time::Instant::now();
        let result = record_clip(&recorder, stop.clone(), max).await;
        stop.cancel();
        match result {
            Ok((clip, reason)) => {
                println!(
                    "Recorded {} ({reason:?})",
                    format_elapsed(started.elapsed().as_secs())
                );
                session.send_voice_message(&clip).await;
            }
            Err(e) => println!("Recording failed: {e}"),
        }
    });
    token
}

// ============================================================================
// Rendering
// ============================================================================

/// Print every new message and every status change
async fn print_updates(
    mut updates: broadcast::Receiver<ChatState>,
    initial: ChatState,
    bot_name: String,
) {
    let mut seen: HashMap<String, MessageStatus> = initial
        .messages
        .iter()
        .map(|m| (m.id.clone(), m.status))
        .collect();
    let mut typing = initial.is_typing;
    let mut error = initial.error;

    loop {
        let state = match updates.recv().await {
            Ok(state) => state,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Renderer lagged behind session updates");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        if state.messages.is_empty() && !seen.is_empty() {
            seen.clear();
            println!("-- conversation cleared --");
        }
        for message in &state.messages {
            match seen.insert(message.id.clone(), message.status) {
                None => println!("{}", render_message(message, &bot_name)),
                Some(previous) if previous != message.status => {
                    println!("   [{}] {}", short_id(&message.id), message.status.label());
                }
                Some(_) => {}
            }
        }
        if state.is_typing && !typing {
            println!("{bot_name} is typing...");
        }
        typing = state.is_typing;
        if state.error != error {
            if let Some(e) = &state.error {
                println!("! {e}");
            }
            error = state.error;
        }
    }
}

fn render_message(message: &Message, bot_name: &str) -> String {
    let mut out = match message.sender {
        Sender::User => format!(
            "you [{}] {} ({})",
            short_id(&message.id),
            message.text,
            message.status.label()
        ),
        Sender::Assistant => format!("{bot_name}: {}", message.text),
    };
    for media in &message.rich_media {
        out.push_str("\n    ");
        out.push_str(&render_media(media));
    }
    out
}

fn render_media(media: &RichMedia) -> String {
    let (kind, label) = match media {
        RichMedia::Image { title, .. } => ("image", title),
        RichMedia::Link { title, .. } => ("link", title),
        RichMedia::Button { button_text, .. } => ("button", button_text),
        RichMedia::Card { title, .. } => ("card", title),
    };
    let label = label.as_deref();
    match (media.action(), label) {
        (Some(MediaAction::ShowImage(url)), Some(label)) => format!("[image] {label} <{url}>"),
        (Some(MediaAction::ShowImage(url)), None) => format!("[image] <{url}>"),
        (Some(MediaAction::OpenUrl(url)), Some(label)) => format!("[{label}] <{url}>"),
        (Some(MediaAction::OpenUrl(url)), None) => format!("<{url}>"),
        (None, label) => format!("[{}]", label.unwrap_or(kind)),
    }
}

fn print_quick_actions() {
    println!("Quick actions:");
    for (i, action) in quick_actions::QUICK_ACTIONS.iter().enumerate() {
        println!("  /quick {}  {}", i + 1, action.label);
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

// ============================================================================
// Commands
// ============================================================================

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Empty,
    Send(String),
    Quick(Option<String>),
    ToggleQuickActions,
    Retry(String),
    Voice(String),
    Record(String),
    Stop,
    Clear,
    Forget,
    Status,
    Help,
    Quit,
    Unknown(String),
}

impl Command {
    fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Command::Empty;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Command::Send(line.to_string());
        };

        match split_argument(rest) {
            ("quick", arg) => Command::Quick(arg),
            ("hide", _) => Command::ToggleQuickActions,
            ("retry", Some(id)) => Command::Retry(id),
            ("voice", Some(path)) => Command::Voice(path),
            ("record", Some(path)) => Command::Record(path),
            ("stop", _) => Command::Stop,
            ("clear", _) => Command::Clear,
            ("forget", _) => Command::Forget,
            ("status", _) => Command::Status,
            ("help", _) => Command::Help,
            ("quit" | "exit", _) => Command::Quit,
            _ => Command::Unknown(line.to_string()),
        }
    }
}

/// Split `name arg` at the first whitespace; a blank argument counts as none
fn split_argument(rest: &str) -> (&str, Option<String>) {
    match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => {
            let arg = arg.trim();
            (name, (!arg.is_empty()).then(|| arg.to_string()))
        }
        None => (rest, None),
    }
}
