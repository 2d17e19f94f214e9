//! Thin TCP transport glue.
//!
//! The core never touches sockets: this module accepts connections, frames
//! the byte stream, and translates everything into [`ServerEvent`]s. Each
//! connection gets a reader task (inbound frames) and a writer task (outbound
//! frames and the close command).

use std::io;

use log::{debug, info, warn};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use shared::frame::{read_frame, write_frame};
use shared::registry::ConnectionId;

use crate::connection::TransportCmd;
use crate::network::ServerEvent;

/// Accept loop. Runs until the listener fails or the event channel closes.
pub async fn listen(addr: String, events: mpsc::UnboundedSender<ServerEvent>) -> io::Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    let mut next_conn_id: ConnectionId = 1;
    loop {
        let (socket, peer) = listener.accept().await?;
        let conn = next_conn_id;
        next_conn_id += 1;
        debug!("Accepted connection {} from {}", conn, peer);

        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<TransportCmd>();
        if events.send(ServerEvent::Connected { conn, sender: cmd_tx }).is_err() {
            return Ok(());
        }

        let (mut read_half, mut write_half) = socket.into_split();

        let reader_events = events.clone();
        tokio::spawn(async move {
            loop {
                match read_frame(&mut read_half).await {
                    Ok(Some(bytes)) => {
                        if reader_events.send(ServerEvent::Message { conn, bytes }).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Read error on connection {}: {}", conn, e);
                        break;
                    }
                }
            }
            let _ = reader_events.send(ServerEvent::Closed { conn });
        });

        tokio::spawn(async move {
            while let Some(cmd) = cmd_rx.recv().await {
                match cmd {
                    TransportCmd::Frame(raw) => {
                        if let Err(e) = write_frame(&mut write_half, &raw).await {
                            debug!("Write error on connection {}: {}", conn, e);
                            break;
                        }
                    }
                    TransportCmd::Close(code) => {
                        debug!("Closing connection {} with code {}", conn, code);
                        break;
                    }
                }
            }
            // Dropping the write half shuts the stream down.
        });
    }
}
