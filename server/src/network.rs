//! TCP front end: accepts connections, runs one reader and one writer task
//! per connection, and routes decoded requests to rooms.

use crate::config::ServerConfig;
use crate::connection::{deliver_all, Connection, DeliveryObserver, LogObserver, Outgoing};
use crate::connection_manager::{ConnectionManager, ManagerHandle};
use crate::framing::{read_frame, write_frame};
use crate::registry::RoomRegistry;
use crate::room::{FirstMoverPicker, RandomPicker, Room};
use log::{debug, error, info, warn};
use shared::{Action, Request, Response, ResponseKind, RoomId, NO_ROOM};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};

/// Resolves once the watched flag turns true or its sender goes away.
async fn wait_until_set(mut flag: watch::Receiver<bool>) {
    while !*flag.borrow_and_update() {
        if flag.changed().await.is_err() {
            return;
        }
    }
}

/// Game server state shared by every connection task.
pub struct Server {
    config: ServerConfig,
    rooms: RoomRegistry,
    picker: Arc<dyn FirstMoverPicker>,
    observer: Arc<dyn DeliveryObserver>,
    next_connection_id: AtomicU64,
}

impl Server {
    /// A server with a random first-mover picker (seeded from
    /// `config.seed`) and drops reported to the log.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            rooms: RoomRegistry::new(config.win_rule),
            picker: Arc::new(RandomPicker::new(config.seed)),
            observer: Arc::new(LogObserver),
            next_connection_id: AtomicU64::new(1),
            config,
        }
    }

    /// Replaces the first-mover coin.
    pub fn with_picker(mut self, picker: Arc<dyn FirstMoverPicker>) -> Self {
        self.picker = picker;
        self
    }

    /// Replaces the hook told about dropped deliveries.
    pub fn with_observer(mut self, observer: Arc<dyn DeliveryObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    async fn deliver(&self, outgoing: Vec<Outgoing>) {
        deliver_all(outgoing, self.config.retry, self.observer.as_ref()).await;
    }

    async fn open_rooms_for(&self, connection: &Arc<Connection>) -> Outgoing {
        let mut response = Response::new(ResponseKind::OpenRooms, NO_ROOM, "");
        response.open_rooms = Some(self.rooms.open_rooms().await);
        Outgoing::new(connection, response)
    }

    /// Runs `handler` on the addressed room and delivers its responses while
    /// the room stays locked, so updates from one room reach each
    /// connection in the order they were produced.
    async fn with_room<F>(
        &self,
        room_id: RoomId,
        kind: ResponseKind,
        user_id: &str,
        connection: &Arc<Connection>,
        handler: F,
    ) where
        F: FnOnce(&mut Room) -> Vec<Outgoing>,
    {
        let room = match self.rooms.get(room_id).await {
            Ok(room) => room,
            Err(e) => {
                debug!("{} addressed a missing room: {}", user_id, e);
                let response = Response::error(kind, room_id, user_id, e);
                self.deliver(vec![Outgoing::new(connection, response)]).await;
                return;
            }
        };

        let mut room = room.lock().await;
        let outgoing = handler(&mut room);
        self.deliver(outgoing).await;
    }

    /// Handles one decoded request from `connection`.
    pub async fn handle_request(&self, request: Request, connection: &Arc<Connection>) {
        debug!("Request from connection {}: {:?}", connection.id(), request);

        let Request { user_id, action } = request;
        match action {
            Action::Create => {
                let room_id = self.rooms.create(&user_id, connection).await;
                let response = Response::new(ResponseKind::CreateAck, room_id, user_id);
                self.deliver(vec![Outgoing::new(connection, response)]).await;
            }
            Action::ListOpen => {
                let outgoing = self.open_rooms_for(connection).await;
                self.deliver(vec![outgoing]).await;
            }
            Action::Join { room_id } => {
                let picker = Arc::clone(&self.picker);
                self.with_room(room_id, ResponseKind::JoinAck, &user_id, connection, |room| {
                    room.handle_join(&user_id, connection, picker.as_ref())
                })
                .await;
            }
            Action::Move { room_id, data } => {
                self.with_room(room_id, ResponseKind::MoveAck, &user_id, connection, |room| {
                    room.handle_move(&user_id, &data, connection)
                })
                .await;
            }
            Action::Message { room_id, text } => {
                self.with_room(room_id, ResponseKind::Message, &user_id, connection, |room| {
                    room.handle_message(&user_id, &text, connection)
                })
                .await;
            }
        }
    }

    /// Binds the listener and starts accepting in the background.
    pub async fn start(self: Arc<Self>) -> io::Result<ServerHandle> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on {}", local_addr);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(listener, shutdown_rx));

        Ok(ServerHandle {
            local_addr,
            shutdown_tx,
            task,
        })
    }

    async fn run(self: Arc<Self>, listener: TcpListener, shutdown: watch::Receiver<bool>) {
        let (manager, manager_task) = ConnectionManager::new().spawn();
        let reaper = self.spawn_reaper();
        let mut tasks = JoinSet::new();

        let stop = wait_until_set(shutdown);
        tokio::pin!(stop);

        loop {
            tokio::select! {
                _ = &mut stop => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => self.accept(stream, addr, &manager, &mut tasks),
                    Err(e) => {
                        error!("Accept error: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                },
                Some(finished) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = finished {
                        error!("Connection task failed: {}", e);
                    }
                }
            }
        }

        info!("Server shutting down");
        drop(listener);
        reaper.abort();

        let closed = manager.shutdown().await;
        debug!("Closed {} live connections", closed);
        while let Some(finished) = tasks.join_next().await {
            if let Err(e) = finished {
                error!("Connection task failed: {}", e);
            }
        }
        if let Err(e) = manager_task.await {
            error!("Connection manager failed: {}", e);
        }
        info!("Server stopped");
    }

    /// Wires up a freshly accepted stream: registers it and spawns its writer
    /// and reader tasks.
    fn accept(
        self: &Arc<Self>,
        stream: TcpStream,
        addr: SocketAddr,
        manager: &ManagerHandle,
        tasks: &mut JoinSet<()>,
    ) {
        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let (connection, outbound) =
            Connection::new(id, addr, self.config.effective_queue_capacity());
        manager.register(&connection);

        let (reader, writer) = stream.into_split();
        tasks.spawn(write_loop(
            Arc::clone(&connection),
            writer,
            outbound,
            manager.clone(),
        ));
        tasks.spawn(Arc::clone(self).read_loop(connection, reader, manager.clone()));
    }

    /// Greets the connection with the open rooms, then handles its requests
    /// one at a time until the peer goes away or the connection is closed.
    async fn read_loop(
        self: Arc<Self>,
        connection: Arc<Connection>,
        mut reader: OwnedReadHalf,
        manager: ManagerHandle,
    ) {
        // Queued before the first request is read, so it is always the
        // first frame the client sees.
        let greeting = self.open_rooms_for(&connection).await;
        self.deliver(vec![greeting]).await;

        let closed = wait_until_set(connection.closed_signal());
        tokio::pin!(closed);

        loop {
            let frame = tokio::select! {
                biased;
                _ = &mut closed => break,
                frame = read_frame(&mut reader) => frame,
            };

            match frame {
                Ok(bytes) => match shared::decode::<Request>(&bytes) {
                    Ok(request) => self.handle_request(request, &connection).await,
                    Err(e) => warn!(
                        "Failed to decode request from connection {}: {}",
                        connection.id(),
                        e
                    ),
                },
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    debug!("Connection {} closed by peer", connection.id());
                    break;
                }
                Err(e) => {
                    warn!("Read error on connection {}: {}", connection.id(), e);
                    break;
                }
            }
        }

        manager.unregister(&connection);
    }

    /// Periodically drops finished and abandoned rooms.
    fn spawn_reaper(self: &Arc<Self>) -> JoinHandle<()> {
        let server = Arc::clone(self);
        let period = server.config.reap_interval.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick fires immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                server.rooms.reap().await;
            }
        })
    }
}

/// Drains the outbound queue onto the socket until the queue closes, a
/// write fails, or the connection is closed. Closing abandons a write that
/// is stuck on a peer that stopped reading.
async fn write_loop<W>(
    connection: Arc<Connection>,
    mut writer: W,
    mut outbound: mpsc::Receiver<Vec<u8>>,
    manager: ManagerHandle,
) where
    W: AsyncWrite + Unpin,
{
    let closed = wait_until_set(connection.closed_signal());
    tokio::pin!(closed);

    loop {
        let payload = tokio::select! {
            biased;
            _ = &mut closed => break,
            payload = outbound.recv() => match payload {
                Some(payload) => payload,
                None => break,
            },
        };

        let written = tokio::select! {
            biased;
            _ = &mut closed => break,
            written = write_frame(&mut writer, &payload) => written,
        };
        if let Err(e) = written {
            error!("Failed to write to connection {}: {}", connection.id(), e);
            break;
        }
    }

    manager.unregister(&connection);
    if let Err(e) = writer.shutdown().await {
        debug!("Shutdown of connection {} failed: {}", connection.id(), e);
    }
}

/// Handle to a running server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// The address actually bound, useful when the port was 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting, closes every connection and waits for all
    /// connection tasks to finish.
    pub async fn stop(self) {
        self.shutdown_tx.send_replace(true);
        if let Err(e) = self.task.await {
            error!("Server task failed: {}", e);
        }
    }
}
