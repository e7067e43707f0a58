use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};

use mh_coach::booking::BookingEmailAgent;
use mh_coach::coach::CoachResponder;
use mh_coach::config::{CoachConfig, SmtpConfig};
use mh_coach::email::{DisabledEmailSender, EmailOrchestrator, EmailSender, SmtpEmailSender};
use mh_coach::engine::{ChatEngine, ChatEngineDeps};
use mh_coach::gate::SafetyGate;
use mh_coach::llm::{NoRetrieval, UnconfiguredGenerator};
use mh_coach::ratelimit::RateLimiter;
use mh_coach::router::ChatRouter;
use mh_coach::search::{HttpSearchBackend, SearchBackend, UnconfiguredSearchBackend};
use mh_coach::session::{ActorIdentity, InMemorySessionStore, SessionStore};
use mh_coach::store::{LibSqlStore, PendingStore};
use mh_coach::therapist::TherapistSearchAgent;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = CoachConfig::from_env();

    eprintln!("mh-coach v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", config.db_path);
    eprintln!(
        "   Search: {}",
        config.search_base_url.as_deref().unwrap_or("(not configured)")
    );
    eprintln!("   Dev mode: {}", config.dev_mode);
    eprintln!("   Type a message and press Enter. /quit to exit.\n");

    let store: Arc<dyn PendingStore> = Arc::new(
        LibSqlStore::new_local(Path::new(&config.db_path))
            .await
            .unwrap_or_else(|e| {
                eprintln!("Error: failed to open database at {}: {e}", config.db_path);
                std::process::exit(1);
            }),
    );

    let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());

    let search_backend: Arc<dyn SearchBackend> = match &config.search_base_url {
        Some(base_url) => Arc::new(
            HttpSearchBackend::new(base_url.clone(), config.search_timeout)
                .context("failed to build search backend")?,
        ),
        None => Arc::new(UnconfiguredSearchBackend),
    };

    let email_sender: Arc<dyn EmailSender> = match SmtpConfig::from_env() {
        Some(smtp) => Arc::new(SmtpEmailSender::new(smtp)),
        None => {
            eprintln!("   SMTP not configured; booking emails will be refused.");
            Arc::new(DisabledEmailSender)
        }
    };

    let therapist = Arc::new(TherapistSearchAgent::new(
        search_backend,
        sessions.clone(),
        config.dev_mode,
    ));
    let orchestrator = Arc::new(EmailOrchestrator::new(email_sender, store.clone()));

    let engine = ChatEngine::new(ChatEngineDeps {
        router: ChatRouter::new(),
        gate: SafetyGate::new(therapist.clone()),
        booking: BookingEmailAgent::new(store.clone(), orchestrator),
        therapist,
        coach: CoachResponder::new(
            Arc::new(UnconfiguredGenerator),
            Arc::new(NoRetrieval),
            config.generation_timeout,
        ),
        store,
        sessions,
        limiter: RateLimiter::new(config.rate_limit_chat_requests, config.rate_limit_window),
        history_max_turns: config.conversation_history_max_turns,
    });

    // One identity for the whole REPL session, so pending booking state and
    // remembered locations survive across lines.
    let mut identity = ActorIdentity::anonymous("local", "cli");
    identity.ensure_booking_actor_key();

    let stdin = tokio::io::stdin();
    let reader = BufReader::new(stdin);
    let mut lines = reader.lines();

    eprint!("> ");
    while let Some(line) = lines.next_line().await? {
        let message = line.trim();
        if message.is_empty() {
            eprint!("> ");
            continue;
        }
        if message == "/quit" {
            break;
        }

        match engine.handle_message(&mut identity, message).await {
            Ok(response) => match serde_json::to_string_pretty(&response) {
                Ok(json) => println!("\n{json}\n"),
                Err(e) => eprintln!("Failed to serialize response: {e}"),
            },
            Err(e) => eprintln!("\nError: {e}\n"),
        }
        eprint!("> ");
    }

    Ok(())
}
