use std::net::SocketAddr;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tracing::debug;

use crate::error::Result;

/// One connected log consumer.
///
/// Owns the socket's write half; the read half lives in the watcher task
/// that detects the peer closing. Dropping the connection closes the write
/// side and releases the socket.
pub struct ClientConnection {
    id: u64,
    peer: SocketAddr,
    writer: OwnedWriteHalf,
}

impl ClientConnection {
    pub fn new(id: u64, peer: SocketAddr, writer: OwnedWriteHalf) -> Self {
        Self { id, peer, writer }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Write one already-formatted line, raw.
    pub async fn send_line(&mut self, line: &str) -> Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        Ok(())
    }
}

/// The set of live connections.
///
/// Only the network task ever touches the registry, so a plain `Vec` with
/// no lock is sufficient. Cross-thread observers read the broadcaster's
/// atomic counters instead. Do not hand this to a second task without
/// adding synchronization.
pub struct ClientRegistry {
    clients: Vec<ClientConnection>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            clients: Vec::new(),
        }
    }

    pub fn add(&mut self, client: ClientConnection) {
        self.clients.push(client);
    }

    /// Remove and drop the connection with `id`. Returns whether it was
    /// still registered; a write-failure sweep may have beaten the
    /// disconnect notification to it.
    pub fn remove(&mut self, id: u64) -> bool {
        let before = self.clients.len();
        self.clients.retain(|client| client.id != id);
        self.clients.len() != before
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Write every line to every client, line-major, so simultaneous
    /// clients see identical byte streams. A failed writer is skipped for
    /// the rest of the batch and swept afterwards. Returns the number of
    /// clients removed.
    pub async fn broadcast(&mut self, lines: &[String]) -> usize {
        let mut dead: Vec<u64> = Vec::new();

        for line in lines {
            for client in self.clients.iter_mut() {
                if dead.contains(&client.id) {
                    continue;
                }
                if let Err(e) = client.send_line(line).await {
                    debug!("dropping client {} ({}): {}", client.id, client.peer, e);
                    dead.push(client.id);
                }
            }
        }

        for id in &dead {
            self.remove(*id);
        }
        dead.len()
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}
