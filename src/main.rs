use agrivoice::audio::default_output_factory;
use agrivoice::{
    create_router, AdvisorClient, AppState, CaptureBridge, Config, ConversationSession, Error,
    Language, PlaybackScheduler, Role, SpeechOutcome, TurnOutcome, UnavailableCapture,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Voice-enabled farm advisory assistant
#[derive(Parser)]
#[command(name = "agrivoice", version, about)]
struct Cli {
    /// Configuration file (extension optional)
    #[arg(short, long, default_value = "config/agrivoice")]
    config: String,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API
    Serve,
    /// Talk to the advisor from the terminal
    Chat {
        /// Starting language (en-US, hi-IN, mr-IN)
        #[arg(short, long)]
        language: Option<Language>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug,hyper=info,reqwest=info")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut cfg = Config::load(&cli.config)?;
    info!("AgriVoice v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    match cli.command {
        Command::Serve => serve(cfg).await,
        Command::Chat { language } => {
            if let Some(language) = language {
                cfg.session.language = language;
            }
            chat(cfg).await
        }
    }
}

fn build_session(cfg: &Config) -> Result<(Arc<ConversationSession>, Arc<AdvisorClient>)> {
    let advisor = Arc::new(
        AdvisorClient::new(cfg.advisor.clone()).context("Failed to create advisor client")?,
    );
    let scheduler = PlaybackScheduler::new(cfg.scheduler_config(), default_output_factory());
    info!("Playback policy: {:?}", scheduler.policy());

    let session = Arc::new(ConversationSession::new(
        cfg.session_config(),
        advisor.clone(),
        advisor.clone(),
        scheduler,
    ));
    Ok((session, advisor))
}

async fn serve(cfg: Config) -> Result<()> {
    let (session, advisor) = build_session(&cfg)?;
    let state = AppState::new(Arc::clone(&session)).with_diagnoser(advisor);
    let app = create_router(state);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("HTTP server failed")?;

    session.close();
    Ok(())
}

async fn chat(cfg: Config) -> Result<()> {
    let (session, _advisor) = build_session(&cfg)?;
    let capture = Arc::new(CaptureBridge::new(
        Arc::new(UnavailableCapture::default()),
        cfg.capture_timeout(),
    ));

    for message in session.history() {
        print_message(message.role, &message.text);
    }
    println!("(commands: /replay N, /lang CODE, /stop, /listen, /history, /status, /quit)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read input")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        let line = line.trim();

        match line.split_once(' ').unwrap_or((line, "")) {
            ("/quit", _) => break,
            ("/history", _) => {
                for (index, message) in session.history().iter().enumerate() {
                    println!("[{index}] {:?}: {}", message.role, message.text);
                }
            }
            ("/status", _) => println!("{}", serde_json::to_string_pretty(&session.stats())?),
            ("/stop", _) => {
                let stopped = session.scheduler().cancel_all();
                println!("(stopped {stopped} playback(s))");
            }
            ("/lang", code) => match code.parse::<Language>() {
                Ok(language) => {
                    session.set_language(language);
                    println!("(language: {} {})", language.name(), language);
                }
                Err(e) => println!("! {e}"),
            },
            ("/replay", index) => match index.trim().parse::<usize>() {
                Ok(index) => {
                    let session = Arc::clone(&session);
                    tokio::spawn(async move {
                        if let Err(e) = session.replay(index).await {
                            println!("! replay failed: {e}");
                        }
                    });
                }
                Err(_) => println!("! usage: /replay N"),
            },
            ("/listen", _) => {
                let session = Arc::clone(&session);
                let capture = Arc::clone(&capture);
                tokio::spawn(async move {
                    report_turn(capture.listen(&session).await);
                });
            }
            _ if line.starts_with('/') => println!("! unknown command: {line}"),
            _ => {
                let session = Arc::clone(&session);
                let question = line.to_string();
                tokio::spawn(async move {
                    report_turn(session.submit_user_text(&question).await);
                });
            }
        }
    }

    capture.cancel();
    if session.scheduler().active_count() > 0 {
        info!("Waiting for playback to finish");
        session.scheduler().wait_idle().await;
    }
    session.close();
    Ok(())
}

fn report_turn(result: agrivoice::Result<TurnOutcome>) {
    match result {
        Ok(TurnOutcome::Completed { reply, speech }) => {
            print_message(Role::Model, &reply);
            if let SpeechOutcome::Skipped { reason } = speech {
                println!("(audio unavailable: {reason})");
            }
        }
        Ok(TurnOutcome::Ignored) | Ok(TurnOutcome::Discarded) => {}
        Err(Error::SessionBusy) => println!("! still waiting for the previous answer"),
        Err(e) if e.is_recoverable() => println!("! {e}"),
        Err(e) => warn!("Turn failed: {}", e),
    }
}

fn print_message(role: Role, text: &str) {
    match role {
        Role::User => println!("you> {text}"),
        Role::Model => println!("advisor> {text}"),
    }
}
