//! Live-connection bookkeeping.
//!
//! Membership changes are funnelled through a single task that owns the
//! connection table, so registering and unregistering never race and a
//! connection's queue is closed exactly once when it leaves. The manager
//! knows nothing about rooms.

use crate::connection::{Connection, ConnectionId};
use log::{error, info};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Events handled by the manager task.
#[derive(Debug)]
pub enum ConnectionEvent {
    Register(Arc<Connection>),
    Unregister(Arc<Connection>),
    /// Close everything still registered, then acknowledge and stop.
    Shutdown(oneshot::Sender<usize>),
}

/// Table of live connections, owned by the manager task.
#[derive(Debug, Default)]
pub struct ConnectionManager {
    connections: HashMap<ConnectionId, Arc<Connection>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, connection: Arc<Connection>) {
        info!(
            "Connection {} registered from {}",
            connection.id(),
            connection.addr()
        );
        self.connections.insert(connection.id(), connection);
    }

    /// Removes a connection and closes its outbound queue. Returns false if
    /// it had already left.
    pub fn unregister(&mut self, connection: &Connection) -> bool {
        match self.connections.remove(&connection.id()) {
            Some(removed) => {
                removed.close();
                info!("Connection {} has left", removed.id());
                true
            }
            None => false,
        }
    }

    /// Closes and forgets every connection. Returns how many were live.
    pub fn close_all(&mut self) -> usize {
        let count = self.connections.len();
        for (_, connection) in self.connections.drain() {
            connection.close();
        }
        count
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    fn handle(&mut self, event: ConnectionEvent) -> bool {
        match event {
            ConnectionEvent::Register(connection) => self.register(connection),
            ConnectionEvent::Unregister(connection) => {
                self.unregister(&connection);
            }
            ConnectionEvent::Shutdown(ack) => {
                let closed = self.close_all();
                info!("Connection manager closed {} connections", closed);
                let _ = ack.send(closed);
                return false;
            }
        }
        true
    }

    /// Runs the manager until a shutdown event arrives or every handle is
    /// dropped.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<ConnectionEvent>) {
        info!("Connection manager listening for connections joining/leaving...");
        while let Some(event) = events.recv().await {
            if !self.handle(event) {
                return;
            }
        }
        self.close_all();
    }

    /// Spawns the manager task and returns a handle for sending it events.
    pub fn spawn(self) -> (ManagerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(rx));
        (ManagerHandle { tx }, task)
    }
}

/// Cloneable sender side of the manager task.
#[derive(Debug, Clone)]
pub struct ManagerHandle {
    tx: mpsc::UnboundedSender<ConnectionEvent>,
}

impl ManagerHandle {
    fn send(&self, event: ConnectionEvent) {
        if let Err(e) = self.tx.send(event) {
            error!("Connection manager is gone: {:?}", e.0);
        }
    }

    pub fn register(&self, connection: &Arc<Connection>) {
        self.send(ConnectionEvent::Register(Arc::clone(connection)));
    }

    /// Unregisters and closes `connection`. Closing happens here as well so
    /// the connection is dead even if the manager has already stopped.
    pub fn unregister(&self, connection: &Arc<Connection>) {
        connection.close();
        self.send(ConnectionEvent::Unregister(Arc::clone(connection)));
    }

    /// Asks the manager to close every live connection and stop. Resolves
    /// with the number of connections that were closed.
    pub async fn shutdown(&self) -> usize {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send(ConnectionEvent::Shutdown(ack_tx));
        ack_rx.await.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn connection(id: ConnectionId) -> Arc<Connection> {
        Connection::new(id, test_addr(), 1).0
    }

    #[test]
    fn test_manager_creation() {
        let manager = ConnectionManager::new();
        assert!(manager.is_empty());
        assert_eq!(manager.len(), 0);
    }

    #[test]
    fn test_register_and_unregister() {
        let mut manager = ConnectionManager::new();
        let conn = connection(1);

        manager.register(Arc::clone(&conn));
        assert!(manager.contains(1));
        assert_eq!(manager.len(), 1);

        assert!(manager.unregister(&conn));
        assert!(conn.is_closed());
        assert!(manager.is_empty());
    }

    #[test]
    fn test_unregister_unknown_connection() {
        let mut manager = ConnectionManager::new();
        let conn = connection(9);

        assert!(!manager.unregister(&conn));
        assert!(!conn.is_closed());
    }

    #[test]
    fn test_double_unregister_closes_once() {
        let mut manager = ConnectionManager::new();
        let conn = connection(2);
        manager.register(Arc::clone(&conn));

        assert!(manager.unregister(&conn));
        assert!(!manager.unregister(&conn));
        assert!(!conn.close());
    }

    #[test]
    fn test_close_all() {
        let mut manager = ConnectionManager::new();
        let conns: Vec<_> = (1..=3).map(connection).collect();
        for conn in &conns {
            manager.register(Arc::clone(conn));
        }

        assert_eq!(manager.close_all(), 3);
        assert!(manager.is_empty());
        assert!(conns.iter().all(|c| c.is_closed()));
    }

    #[tokio::test]
    async fn test_manager_task_serializes_events() {
        let (handle, task) = ConnectionManager::new().spawn();
        let stays = connection(1);
        let leaves = connection(2);

        handle.register(&stays);
        handle.register(&leaves);
        handle.unregister(&leaves);
        handle.unregister(&leaves);

        assert_eq!(handle.shutdown().await, 1);
        task.await.unwrap();

        assert!(stays.is_closed());
        assert!(leaves.is_closed());
    }

    #[tokio::test]
    async fn test_shutdown_after_manager_stopped() {
        let (handle, task) = ConnectionManager::new().spawn();
        assert_eq!(handle.shutdown().await, 0);
        task.await.unwrap();

        let conn = connection(5);
        handle.unregister(&conn);
        assert!(conn.is_closed());
        assert_eq!(handle.shutdown().await, 0);
    }
}
