use log::{error, info, warn};
use tokio::time::timeout;

use runner::handlers;
use runner::sim::SimState;
use shared::frame::{read_frame, write_frame};
use shared::protocol::register_packets;
use shared::registry::PacketRegistry;
use shared::RUNNER_IDLE_TIMEOUT;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("SERVICE_TOKEN").is_ok() {
        // Backend calls made by mode strategies authenticate with this token.
        info!("Service token present, backend calls will be authenticated");
    }

    let mut registry = PacketRegistry::new(handlers::unhandled);
    register_packets(&mut registry);
    handlers::register_handlers(&mut registry);

    let mut state = SimState::new();
    let mut stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();

    loop {
        let frame = match timeout(RUNNER_IDLE_TIMEOUT, read_frame(&mut stdin)).await {
            Err(_) => {
                warn!("Idle for the full timeout window, giving up");
                break;
            }
            Ok(Err(e)) => {
                error!("Runner pipe failed: {}", e);
                std::process::exit(1);
            }
            Ok(Ok(None)) => break,
            Ok(Ok(Some(frame))) => frame,
        };

        // Zero-length frame is the exit sentinel.
        if frame.is_empty() {
            info!("Received exit sentinel");
            break;
        }

        if let Err(e) = registry.dispatch(&frame, None, &mut state) {
            error!("Failed to handle frame from server: {}", e);
            std::process::exit(1);
        }

        if let Some(report) = state.take_report() {
            info!("Simulation finished, winner {:?} after {} ticks", report.winner, report.ticks);
            let raw = bincode::serialize(&report)?;
            write_frame(&mut stdout, &raw).await?;
            break;
        }
    }

    Ok(())
}
