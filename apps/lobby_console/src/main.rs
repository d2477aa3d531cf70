use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use clap::{Parser, ValueEnum};
use conference_core::{load_settings, ConferenceClient, CoreEvent, Settings};
use conference_integration::{
    ConferenceEvent, ConferenceSession, HttpWebhookReporter, LobbyMemberUpdate, SoundPlayer,
    WebhookReporter,
};
use shared::{
    domain::{ParticipantId, ParticipantInfo, ReactionKind, Role},
    protocol::{LobbyChatParty, LobbyMessage},
};
use tokio::sync::broadcast::error::RecvError;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod simulated;

use simulated::{LoggingSoundPlayer, SimulatedConference};

const ROUTING_PAUSE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Scenario {
    Moderator,
    Attendee,
}

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, value_enum, default_value = "moderator")]
    scenario: Scenario,
    /// TOML settings file; `conference.toml` is used when present.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    name: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = load_settings(args.config.as_deref())?;
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(&settings.log_filter, rust_log.as_deref()))
        .init();

    let local = match args.scenario {
        Scenario::Moderator => ParticipantInfo {
            id: ParticipantId::new("local-moderator"),
            name: args.name.unwrap_or_else(|| "Mia".into()),
            email: None,
            role: Role::Moderator,
        },
        Scenario::Attendee => ParticipantInfo {
            id: ParticipantId::new("local-attendee"),
            name: args.name.unwrap_or_else(|| "Gus".into()),
            email: Some("gus@example.com".into()),
            role: Role::Guest,
        },
    };

    let conference = Arc::new(SimulatedConference::new(local));
    conference.add_remote(ParticipantInfo {
        id: ParticipantId::new("m1"),
        name: "Max".into(),
        email: None,
        role: Role::Moderator,
    })?;

    let webhook = match settings.webhook_url.as_deref() {
        Some(url) => Some(Arc::new(HttpWebhookReporter::new(url)?) as Arc<dyn WebhookReporter>),
        None => None,
    };
    let session: Arc<dyn ConferenceSession> = conference.clone();
    let sounds: Arc<dyn SoundPlayer> = Arc::new(LoggingSoundPlayer);
    let client = ConferenceClient::new(session, sounds, webhook, &settings);

    let mut events = client.subscribe_events();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(skipped)) => println!("event: ... {skipped} skipped"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    client.start().await;
    match args.scenario {
        Scenario::Moderator => run_moderator(&client, &conference, &settings).await,
        Scenario::Attendee => run_attendee(&client, &conference, &settings).await,
    }
    client.shutdown().await;

    tokio::time::sleep(ROUTING_PAUSE).await;
    printer.abort();
    Ok(())
}

/// `RUST_LOG` wins over the configured filter unless it fails to parse.
fn log_filter(configured: &str, rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(configured))
}

fn print_event(event: &CoreEvent) {
    match event {
        CoreEvent::Notification(notification) => println!("notice: {notification:?}"),
        CoreEvent::ChatMessageAdded(message) => println!(
            "chat[{:?}] {}{}: {}",
            message.kind,
            message.sender.name,
            message
                .recipient
                .as_ref()
                .map(|recipient| format!(" -> {}", recipient.name))
                .unwrap_or_default(),
            message.text
        ),
        other => println!("event: {other:?}"),
    }
}

async fn pause_for_flush(settings: &Settings) {
    tokio::time::sleep(settings.reaction_flush_delay + ROUTING_PAUSE).await;
}

async fn run_moderator(
    client: &Arc<ConferenceClient>,
    conference: &SimulatedConference,
    settings: &Settings,
) {
    let lobby = client.lobby();
    let xan = ParticipantId::new("x1");
    let yui = ParticipantId::new("y1");

    lobby.set_lobby_enabled(true).await;
    conference.emit(ConferenceEvent::LobbyMemberJoined(
        LobbyMemberUpdate::new(xan.clone())
            .with_name("Xan")
            .with_email("xan@example.com"),
    ));
    conference.emit(ConferenceEvent::LobbyMemberJoined(
        LobbyMemberUpdate::new(yui.clone()).with_name("Yui"),
    ));
    tokio::time::sleep(ROUTING_PAUSE).await;

    lobby.start_lobby_chat(&xan).await;
    lobby
        .send_lobby_chat_message("Hi Xan, which meeting are you here for?")
        .await;
    conference.deliver_lobby_message(
        LobbyMessage::ChatMessage {
            message: "The weekly sync".into(),
        },
        xan.clone(),
    );
    conference.deliver_lobby_message(
        LobbyMessage::ChatInitialized {
            moderator: LobbyChatParty {
                id: ParticipantId::new("m1"),
                name: "Max".into(),
            },
            attendee: LobbyChatParty {
                id: yui.clone(),
                name: "Yui".into(),
            },
        },
        ParticipantId::new("m1"),
    );
    tokio::time::sleep(ROUTING_PAUSE).await;

    lobby.close_lobby_chat().await;
    lobby.admit_multiple(&[xan, yui]).await;
    tokio::time::sleep(ROUTING_PAUSE).await;
    info!(
        knocking = lobby.knocking_participants().await.len(),
        "console: admissions settled"
    );

    let reactions = client.reactions();
    for kind in [ReactionKind::Clap; 6] {
        reactions.add_reaction(kind).await;
    }
    reactions.add_reaction(ReactionKind::Tada).await;
    pause_for_flush(settings).await;

    reactions.mute_reactions_for_everyone(true).await;
}

async fn run_attendee(
    client: &Arc<ConferenceClient>,
    conference: &SimulatedConference,
    settings: &Settings,
) {
    let lobby = client.lobby();
    let local = conference.local_participant();
    let moderator = LobbyChatParty {
        id: ParticipantId::new("m1"),
        name: "Max".into(),
    };

    lobby.start_knocking().await;
    conference.deliver_lobby_message(
        LobbyMessage::ChatInitialized {
            moderator: moderator.clone(),
            attendee: LobbyChatParty::from(&local),
        },
        moderator.id.clone(),
    );
    conference.deliver_lobby_message(
        LobbyMessage::ChatMessage {
            message: "Hello, who are you meeting today?".into(),
        },
        moderator.id.clone(),
    );
    tokio::time::sleep(ROUTING_PAUSE).await;

    lobby.send_lobby_chat_message("The weekly sync").await;
    conference.deliver_lobby_message(
        LobbyMessage::ModeratorInChatWithLeft {
            moderator_id: moderator.id.clone(),
        },
        moderator.id.clone(),
    );
    tokio::time::sleep(ROUTING_PAUSE).await;

    conference.emit(ConferenceEvent::ConferenceJoined);
    tokio::time::sleep(ROUTING_PAUSE).await;
    info!(phase = ?lobby.phase().await, "console: lobby settled");

    client.reactions().add_reaction(ReactionKind::Like).await;
    pause_for_flush(settings).await;
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
