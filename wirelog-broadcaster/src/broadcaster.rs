use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpListener;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use crate::client::{ClientConnection, ClientRegistry};
use crate::error::{BroadcasterError, Result};
use crate::layer::BroadcastLayer;
use crate::queue::MessageQueue;
use crate::record::LogRecord;

/// Port the reference stream protocol uses.
pub const DEFAULT_PORT: u16 = 6001;

const DEFAULT_QUEUE_CAP: usize = 1024;

/// Tuning for one broadcaster instance.
#[derive(Debug, Clone)]
pub struct BroadcasterConfig {
    /// Listener address. Defaults to all interfaces on [`DEFAULT_PORT`];
    /// tests bind port 0 and read the ephemeral port back.
    pub bind_addr: SocketAddr,
    /// Most lines held between drains; the oldest is dropped beyond this.
    pub queue_cap: usize,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            queue_cap: DEFAULT_QUEUE_CAP,
        }
    }
}

/// State shared between emitter threads, the handle, and the network task.
struct Shared {
    queue: MessageQueue,
    hook_active: AtomicBool,
    clients: AtomicUsize,
    wake_tx: UnboundedSender<()>,
}

/// Streams intercepted log lines to every connected TCP client.
///
/// A cheaply cloneable handle around shared state; the listener and every
/// client socket live inside a single spawned network task, which is the
/// only executor that ever touches them. Emitters interact with the
/// broadcaster exclusively through [`enqueue`](Broadcaster::enqueue) and
/// [`handle_record`](Broadcaster::handle_record), neither of which can
/// block on network I/O.
///
/// The hook toggles itself: the first client connecting activates log
/// interception, the last one leaving deactivates it. While inactive,
/// records are not even formatted.
#[derive(Clone)]
pub struct Broadcaster {
    shared: Arc<Shared>,
    local_addr: Option<SocketAddr>,
}

impl Broadcaster {
    /// Bind and start the network task, reporting a bind failure to the
    /// caller. Tests and dedicated hosts use this with an ephemeral port.
    pub async fn try_start(config: BroadcasterConfig) -> Result<Broadcaster> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|source| BroadcasterError::Bind {
                addr: config.bind_addr,
                source,
            })?;
        Ok(Self::spawn(&config, Some(listener)))
    }

    /// Start, absorbing a bind failure: diagnostic plumbing must never take
    /// the hosting process down. The degraded handle accepts no clients,
    /// never activates the hook, and keeps draining its queue.
    pub async fn start(config: BroadcasterConfig) -> Broadcaster {
        match Self::try_start(config.clone()).await {
            Ok(broadcaster) => broadcaster,
            Err(e) => {
                warn!("{}; log broadcasting disabled", e);
                Self::spawn(&config, None)
            }
        }
    }

    fn spawn(config: &BroadcasterConfig, listener: Option<TcpListener>) -> Broadcaster {
        let (wake_tx, wake_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            queue: MessageQueue::new(config.queue_cap),
            hook_active: AtomicBool::new(false),
            clients: AtomicUsize::new(0),
            wake_tx,
        });
        let local_addr = listener.as_ref().and_then(|l| l.local_addr().ok());

        let task_shared = Arc::clone(&shared);
        match listener {
            Some(listener) => {
                tokio::spawn(event_loop(listener, task_shared, wake_rx));
            }
            None => {
                tokio::spawn(degraded_loop(task_shared, wake_rx));
            }
        }

        Broadcaster { shared, local_addr }
    }

    /// Address the listener is bound to; `None` when the bind failed.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Append an already-formatted line and wake the network task.
    ///
    /// Callable from any thread; holds the queue lock only for the append
    /// and never touches a socket.
    pub fn enqueue(&self, line: String) {
        self.shared.queue.push(line);
        // Receiver lives as long as the network task; a failed send only
        // means process teardown is underway.
        let _ = self.shared.wake_tx.send(());
    }

    /// Hook entry point: format and enqueue one record.
    ///
    /// A no-op while the hook is inactive, so with no clients connected a
    /// log record costs one atomic load.
    pub fn handle_record(&self, record: &LogRecord) {
        if !self.hook_active() {
            return;
        }
        self.enqueue(record.to_wire_line());
    }

    /// A `tracing` layer feeding this broadcaster. Register it once on the
    /// host's subscriber.
    pub fn layer(&self) -> BroadcastLayer {
        BroadcastLayer::new(self.clone())
    }

    pub fn hook_active(&self) -> bool {
        self.shared.hook_active.load(Ordering::SeqCst)
    }

    pub fn client_count(&self) -> usize {
        self.shared.clients.load(Ordering::SeqCst)
    }

    /// Lines currently queued and not yet picked up by the network task.
    pub fn pending_lines(&self) -> usize {
        self.shared.queue.len()
    }

    /// Lines evicted by the queue bound since startup.
    pub fn dropped_lines(&self) -> u64 {
        self.shared.queue.dropped()
    }
}

/// The network task. Sole owner of the listener, the registry, and every
/// client write half; everything else reaches it through the wake and
/// disconnect channels.
async fn event_loop(
    listener: TcpListener,
    shared: Arc<Shared>,
    mut wake_rx: UnboundedReceiver<()>,
) {
    let mut registry = ClientRegistry::new();
    let (gone_tx, mut gone_rx) = mpsc::unbounded_channel::<u64>();
    let mut next_id: u64 = 0;

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    next_id += 1;
                    let (read_half, write_half) = stream.into_split();
                    tokio::spawn(watch_disconnect(next_id, read_half, gone_tx.clone()));
                    registry.add(ClientConnection::new(next_id, peer, write_half));
                    shared.clients.store(registry.len(), Ordering::SeqCst);
                    info!("client {} connected from {}", next_id, peer);
                    if !shared.hook_active.swap(true, Ordering::SeqCst) {
                        debug!("log hook activated");
                    }
                }
                Err(e) => {
                    warn!("failed to accept log client: {}", e);
                }
            },
            Some(()) = wake_rx.recv() => {
                // Queue emptied under its lock; writes happen after it is
                // released. Wakes for an already-drained batch fall through.
                let lines = shared.queue.drain();
                if !lines.is_empty() && registry.broadcast(&lines).await > 0 {
                    note_departures(&shared, &registry);
                }
            },
            Some(id) = gone_rx.recv() => {
                if registry.remove(id) {
                    info!("client {} disconnected", id);
                    note_departures(&shared, &registry);
                }
            },
        }
    }
}

fn note_departures(shared: &Shared, registry: &ClientRegistry) {
    shared.clients.store(registry.len(), Ordering::SeqCst);
    if registry.is_empty() && shared.hook_active.swap(false, Ordering::SeqCst) {
        debug!("log hook deactivated");
    }
}

/// Owns the read half of one client socket. Clients have no protocol;
/// whatever they send is discarded. EOF or a read error means the peer is
/// gone and the network task should forget it.
async fn watch_disconnect(id: u64, mut reader: OwnedReadHalf, gone_tx: UnboundedSender<u64>) {
    let mut scratch = [0u8; 256];
    loop {
        match reader.read(&mut scratch).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
    }
    let _ = gone_tx.send(id);
}

/// Stand-in network task when the bind failed: no clients will ever exist,
/// but wake signals still clear the queue so direct `enqueue` callers
/// cannot grow it.
async fn degraded_loop(shared: Arc<Shared>, mut wake_rx: UnboundedReceiver<()>) {
    while wake_rx.recv().await.is_some() {
        let _ = shared.queue.drain();
    }
}
