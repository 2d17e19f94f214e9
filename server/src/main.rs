use clap::Parser;
use log::{error, info};
use tokio::sync::mpsc;

use server::auth::load_verifier;
use server::config::{normalize_host, Config};
use server::handlers::register_handlers;
use server::network::{RunnerSpawner, Server, ServerState};
use server::{runner, transport};
use shared::codes::DisconnectCode;
use shared::protocol::register_packets;
use shared::registry::PacketRegistry;

/// Command-line overrides for the environment-provided configuration.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Port to listen on (overrides PORT)
    #[clap(short, long)]
    port: Option<u16>,
    /// Server host domain for token audience checks (overrides HOST)
    #[clap(short = 'H', long)]
    host: Option<String>,
    /// Path to the API server's public key (overrides PUBLIC_KEY_FILE)
    #[clap(short = 'k', long)]
    key_file: Option<std::path::PathBuf>,
    /// Path to the runner executable (overrides RUNNER_BIN)
    #[clap(long)]
    runner_bin: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let mut config = Config::from_env();
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(host) = args.host {
        config.host = Some(normalize_host(&host));
    }
    if let Some(key_file) = args.key_file {
        config.public_key_file = key_file;
    }
    if let Some(runner_bin) = args.runner_bin {
        config.runner_bin = Some(runner_bin);
    }

    let verifier = load_verifier(&config);

    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let mut registry = PacketRegistry::new(|_, sender, state: &mut ServerState| {
        if let Some(conn) = sender {
            state.disconnect(conn, DisconnectCode::BadPacket);
        }
        Ok(())
    });
    register_packets(&mut registry);
    register_handlers(&mut registry);

    let spawner: RunnerSpawner = {
        let config = config.clone();
        let events = events_tx.clone();
        Box::new(move |game_id| runner::spawn(game_id, &config, events.clone()))
    };

    let state = ServerState::new(config.clone(), verifier, spawner, events_tx.clone());

    let listen_addr = format!("0.0.0.0:{}", config.port);
    let transport_handle = tokio::spawn(async move {
        if let Err(e) = transport::listen(listen_addr, events_tx).await {
            error!("Transport failed: {}", e);
        }
    });

    let mut server = Server::new(registry, state, events_rx);

    tokio::select! {
        _ = server.run() => {}
        result = transport_handle => {
            if let Err(e) = result {
                error!("Transport task panicked: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
