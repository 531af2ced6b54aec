use std::error::Error;

use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use p2p_room_chat::common::SessionEvent;
use p2p_room_chat::network::{BootstrapNode, Session};
use p2p_room_chat::ui::ChatApp;
use p2p_room_chat::{config, headless};

#[derive(Parser)]
#[command(
    name = "p2p_room_chat",
    version,
    about = "Serverless chat rooms over a peer-to-peer swarm"
)]
struct Cli {
    /// Room to join; peers in the same room find each other by its name
    #[arg(default_value = config::DEFAULT_ROOM)]
    room: String,
    /// Display name attached to outgoing messages
    #[arg(long, short)]
    username: Option<String>,
    /// Path to JSON config file
    #[arg(
        long,
        env = "ROOM_CHAT_CONFIG",
        default_value = config::DEFAULT_CONFIG_PATH,
        value_name = "FILE"
    )]
    config: String,
    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Subcommand, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Chat on stdin/stdout instead of opening a window
    Headless,
    /// Run a rendezvous node that joins no room
    Bootstrap {
        #[arg(long, default_value_t = 4001)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let app_config = config::load_config(&cli.config);

    if let Some(Mode::Bootstrap { port }) = cli.mode {
        run_bootstrap_node(&app_config, &cli.config, port).await;
        return Ok(());
    }

    let username = cli.username.clone().unwrap_or_else(generate_username);
    log::info!("Joining room `{}` as {}", cli.room, username);

    let (event_tx, events) = tokio::sync::mpsc::unbounded_channel();
    let session = Session::join_with(&cli.room, &app_config, vec![Box::new(event_tx)]).await?;
    tokio::time::sleep(app_config.settle_delay()).await;

    let signal_session = session.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        log::info!("Received shutdown signal, leaving room...");
        signal_session.destroy().await;
        std::process::exit(0);
    });

    if cli.mode == Some(Mode::Headless) {
        headless::run(session.clone(), events, username).await;
    } else {
        run_desktop(session.clone(), events, username)?;
    }

    session.destroy().await;
    Ok(())
}

async fn run_bootstrap_node(app_config: &config::AppConfig, config_path: &str, port: u16) {
    log::info!("Starting bootstrap node...");
    let mut node = BootstrapNode::new(config_path);

    tokio::select! {
        result = node.run(app_config, port) => {
            if let Err(err) = result {
                log::error!("Bootstrap node error: {}", err);
            }
        }
        _ = shutdown_signal() => {
            log::info!("Received shutdown signal, stopping bootstrap node...");
        }
    }

    log::info!("Final statistics: {} known peers", node.known_peers_count());
}

fn run_desktop(
    session: Session,
    events: tokio::sync::mpsc::UnboundedReceiver<SessionEvent>,
    username: String,
) -> Result<(), eframe::Error> {
    let options = eframe::NativeOptions::default();
    let title = format!("P2P Room Chat - {}", session.room_name());
    let mut events = Some(events);

    eframe::run_native(
        &title,
        options,
        Box::new(move |cc| {
            let Some(event_receiver) = events.take() else {
                return Err("chat window initialized twice".into());
            };
            Ok(Box::new(ChatApp::new(
                cc,
                session.clone(),
                event_receiver,
                username.clone(),
            )))
        }),
    )
}

fn generate_username() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("user-{}", &id[..4])
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(err) => {
                log::warn!("Failed to install SIGTERM handler: {err}");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
