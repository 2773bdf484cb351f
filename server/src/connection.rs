//! Per-client connection state and best-effort delivery.
//!
//! A [`Connection`] does not own its socket. The reader and writer tasks
//! spawned by the network layer own the two halves; the connection holds the
//! sending side of the bounded outbound queue that feeds the writer, and a
//! closed flag both tasks watch.
//!
//! Delivery never blocks on a full queue. It retries on a fixed delay and
//! gives up after [`RetryPolicy::attempts`], reporting the drop to a
//! [`DeliveryObserver`].

use crate::config::RetryPolicy;
use log::{debug, warn};
use shared::Response;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};

pub type ConnectionId = u64;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("connection {0} is closed")]
    Closed(ConnectionId),
    #[error("outbound queue still full after {attempts} attempts")]
    Dropped { attempts: u32 },
    #[error("failed to encode response: {0}")]
    Encode(#[from] bincode::Error),
}

/// Notified whenever a response is given up on.
pub trait DeliveryObserver: Send + Sync {
    fn on_dropped(&self, connection: ConnectionId, response: &Response);
}

/// Default observer: a warning in the server log.
#[derive(Debug, Default)]
pub struct LogObserver;

impl DeliveryObserver for LogObserver {
    fn on_dropped(&self, connection: ConnectionId, response: &Response) {
        warn!(
            "Dropped {:?} for room {} to connection {}: queue full",
            response.kind, response.room_id, connection
        );
    }
}

/// A response addressed to one connection.
#[derive(Debug, Clone)]
pub struct Outgoing {
    pub to: Arc<Connection>,
    pub response: Response,
}

impl Outgoing {
    pub fn new(to: &Arc<Connection>, response: Response) -> Self {
        Self {
            to: Arc::clone(to),
            response,
        }
    }
}

#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    addr: SocketAddr,
    /// `None` once closed.
    outbound: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    /// Flips to true on close. The reader and writer tasks watch it and drop
    /// their socket halves, even mid-write.
    closed_tx: watch::Sender<bool>,
}

impl Connection {
    /// Creates a connection and the receiving end of its outbound queue.
    pub fn new(
        id: ConnectionId,
        addr: SocketAddr,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (closed_tx, _) = watch::channel(false);

        let connection = Arc::new(Self {
            id,
            addr,
            outbound: Mutex::new(Some(tx)),
            closed_tx,
        });

        (connection, rx)
    }

    /// Server-assigned id, unique for the life of the process.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Peer address, for logs.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// True once [`Connection::close`] has run; deliveries are then no-ops.
    pub fn is_closed(&self) -> bool {
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Resolves once the connection has been closed by anyone.
    pub fn closed_signal(&self) -> watch::Receiver<bool> {
        self.closed_tx.subscribe()
    }

    /// Marks the connection closed, closes its outbound queue, and signals
    /// the socket tasks to shut the transport down.
    ///
    /// Returns true for the first caller only; later calls are no-ops.
    pub fn close(&self) -> bool {
        let mut outbound = self.outbound.lock().unwrap_or_else(PoisonError::into_inner);
        if outbound.take().is_none() {
            return false;
        }
        self.closed_tx.send_replace(true);
        debug!("Connection {} closed", self.id);
        true
    }

    fn try_enqueue(&self, payload: Vec<u8>) -> Result<(), TrySendError<Vec<u8>>> {
        let outbound = self.outbound.lock().unwrap_or_else(PoisonError::into_inner);
        match outbound.as_ref() {
            Some(tx) => tx.try_send(payload),
            None => Err(TrySendError::Closed(payload)),
        }
    }

    /// Queues `response` for the writer task, retrying while the queue is
    /// full. Delivery to a closed connection is a no-op reported as
    /// [`DeliveryError::Closed`].
    pub async fn deliver(
        &self,
        response: &Response,
        retry: RetryPolicy,
    ) -> Result<(), DeliveryError> {
        let attempts = retry.attempts.max(1);
        let mut payload = shared::encode(response)?;

        for attempt in 1..=attempts {
            if attempt > 1 {
                debug!(
                    "Retrying delivery to connection {} (attempt {})",
                    self.id, attempt
                );
            }

            match self.try_enqueue(payload) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Closed(_)) => return Err(DeliveryError::Closed(self.id)),
                Err(TrySendError::Full(returned)) => {
                    payload = returned;
                    if attempt < attempts {
                        tokio::time::sleep(retry.delay).await;
                    }
                }
            }
        }

        Err(DeliveryError::Dropped { attempts })
    }
}

/// Delivers each response in order. Failures never reach the requester.
pub async fn deliver_all(
    outgoing: Vec<Outgoing>,
    retry: RetryPolicy,
    observer: &dyn DeliveryObserver,
) {
    for Outgoing { to, response } in outgoing {
        match to.deliver(&response, retry).await {
            Ok(()) => {}
            Err(DeliveryError::Closed(id)) => {
                debug!("Skipping delivery to closed connection {}", id);
            }
            Err(DeliveryError::Dropped { .. }) => observer.on_dropped(to.id(), &response),
            Err(e) => warn!("Delivery to connection {} failed: {}", to.id(), e),
        }
    }
}
