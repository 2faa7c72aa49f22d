//! Varlens command-line client - composition root.
//!
//! 1. Parse arguments and load configuration from TOML
//! 2. Initialize tracing on stderr (stdout carries results and replies)
//! 3. `results`: wait out the redirect grace window, then load every store
//! 4. `chat`: stream one assistant reply for a session

mod cli;
mod output;

use std::error::Error;
use std::future::Future;
use std::io;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use varlens_chat::{ChatSession, ConversationId, HttpChatTransport, StreamOutcome};
use varlens_core::config::VarlensConfig;
use varlens_core::types::SessionId;
use varlens_store::{
    schedule_redirect, AnalysisWorkspace, HttpResultsBackend, LoadOutcome, RedirectOutcome,
    SessionSource,
};

use cli::{CliArgs, Command};
use output::{render_message, results_summary, ConsoleObserver};

/// Run the redirect grace window while `resolve` publishes the session.
///
/// The resolver runs as its own task, the way a host's router would, so the
/// timer races a real publication instead of reading a value already set.
async fn await_session<F>(grace: Duration, resolve: F) -> Option<RedirectOutcome>
where
    F: Future<Output = Option<SessionId>> + Send + 'static,
{
    let source = SessionSource::default();
    let handle = schedule_redirect(source.subscribe(), grace, || {
        tracing::debug!("Redirect callback fired");
    });
    let resolver = {
        let source = source.clone();
        tokio::spawn(async move { source.publish(resolve.await) })
    };

    let outcome = handle.outcome().await;
    resolver.abort();
    outcome
}

/// Load every result store for `session`, honoring the redirect grace window.
async fn run_results(
    config: &VarlensConfig,
    session: Option<SessionId>,
) -> Result<ExitCode, Box<dyn Error>> {
    let backend = HttpResultsBackend::new(&config.backend)?;
    let workspace = AnalysisWorkspace::new(Arc::new(backend));

    let grace = Duration::from_millis(config.session.redirect_grace_ms);
    let outcome = await_session(grace, async move { session }).await;
    match outcome {
        Some(RedirectOutcome::SessionResolved(session_id)) => {
            let Some(report) = workspace.set_session(Some(session_id)).await else {
                return Ok(ExitCode::FAILURE);
            };
            println!("session {}", report.session_id);
            println!("{}", results_summary(&workspace));

            let failed = report
                .outcomes
                .iter()
                .any(|(_, outcome)| matches!(outcome, LoadOutcome::Failed(_)));
            Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
        }
        Some(RedirectOutcome::Redirected) => {
            println!("redirect to {}", config.session.default_view);
            Ok(ExitCode::SUCCESS)
        }
        None => Ok(ExitCode::FAILURE),
    }
}

/// Ask one question and print the reply.
async fn run_chat(
    config: &VarlensConfig,
    session: Option<SessionId>,
    conversation: Option<String>,
    buffered: bool,
    message: &str,
) -> Result<ExitCode, Box<dyn Error>> {
    let transport = HttpChatTransport::new(&config.backend, &config.chat)?;
    let mut chat = ChatSession::new(transport, session, config.chat.max_message_length);
    if let Some(id) = conversation {
        chat = chat.resume(ConversationId::new(id));
    }

    let outcome = if buffered {
        let reply = chat.send_buffered(message, None).await?;
        for entry in &reply.messages {
            println!("{}", render_message(entry));
        }
        reply.outcome
    } else {
        let mut observer = ConsoleObserver::new(io::stdout());
        chat.send(message, None, &mut observer).await?
    };

    if let Some(id) = &chat.conversation().id {
        tracing::info!(conversation_id = %id, "Conversation id");
    }
    match outcome {
        StreamOutcome::Completed { rounds, messages_added } => {
            tracing::info!(rounds, messages_added, "Reply complete");
            Ok(ExitCode::SUCCESS)
        }
        StreamOutcome::Failed { error, partial_preserved } => {
            tracing::error!(error = %error, partial_preserved, "Reply failed");
            eprintln!("error: {}", error);
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run(args: CliArgs, config: VarlensConfig) -> Result<ExitCode, Box<dyn Error>> {
    let session = match args.resolve_session() {
        Some(raw) => Some(SessionId::parse(&raw)?),
        None => None,
    };

    match args.command {
        Command::Results { .. } => run_results(&config, session).await,
        Command::Chat {
            conversation,
            buffered,
            message,
            ..
        } => run_chat(&config, session, conversation, buffered, &message.join(" ")).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = VarlensConfig::load_or_default(&config_file);
    config.backend.base_url = args.resolve_base_url(&config.backend.base_url);

    // Tracing.
    let log_level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .init();

    tracing::info!("Starting Varlens v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        path = %config_file.display(),
        base_url = %config.backend.base_url,
        "Configuration loaded"
    );

    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "Invalid configuration");
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }

    match run(args, config).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
