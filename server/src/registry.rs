//! Room id allocation and the id -> room table.
//!
//! The table lock is only held long enough to allocate, insert, look up or
//! remove; the per-room lock serializes everything that happens inside a
//! room. Requests to different rooms never contend on either.

use crate::connection::Connection;
use crate::room::Room;
use log::info;
use shared::{OpenRoom, RoomId, WinRule};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

pub type SharedRoom = Arc<Mutex<Room>>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("There is no game with id {0}")]
    UnknownRoom(RoomId),
}

#[derive(Debug)]
struct RoomTable {
    /// Next id to hand out; only ever grows.
    next_id: RoomId,
    rooms: HashMap<RoomId, SharedRoom>,
}

/// All live rooms, keyed by id.
#[derive(Debug)]
pub struct RoomRegistry {
    table: RwLock<RoomTable>,
    win_rule: WinRule,
}

impl RoomRegistry {
    /// An empty registry; every room it creates plays by `win_rule`.
    pub fn new(win_rule: WinRule) -> Self {
        Self {
            table: RwLock::new(RoomTable {
                next_id: 1,
                rooms: HashMap::new(),
            }),
            win_rule,
        }
    }

    /// Opens a room owned by `user_id` and returns its id. Ids are never
    /// reused, even after the room is reaped.
    pub async fn create(&self, user_id: &str, connection: &Arc<Connection>) -> RoomId {
        let mut table = self.table.write().await;
        let id = table.next_id;
        table.next_id += 1;

        let room = Room::new(id, user_id, connection, self.win_rule);
        table.rooms.insert(id, Arc::new(Mutex::new(room)));

        info!("{} created room {}", user_id, id);
        id
    }

    /// Looks up a room. The returned handle stays valid even if the room is
    /// reaped meanwhile.
    pub async fn get(&self, id: RoomId) -> Result<SharedRoom, RegistryError> {
        self.table
            .read()
            .await
            .rooms
            .get(&id)
            .cloned()
            .ok_or(RegistryError::UnknownRoom(id))
    }

    async fn snapshot(&self) -> Vec<SharedRoom> {
        self.table.read().await.rooms.values().cloned().collect()
    }

    /// Rooms waiting for a second player, ordered by id.
    ///
    /// Rooms locked by an in-flight request are skipped rather than waited
    /// for; a room that is busy delivering a move is not open anyway.
    pub async fn open_rooms(&self) -> Vec<OpenRoom> {
        let mut open = Vec::new();
        for room in self.snapshot().await {
            if let Some(entry) = room.try_lock().ok().and_then(|room| room.open_entry()) {
                open.push(entry);
            }
        }
        open.sort_by_key(|entry| entry.id);
        open
    }

    /// Removes finished rooms and rooms nobody is connected to any more.
    /// Rooms busy handling a request are left for the next sweep.
    pub async fn reap(&self) -> Vec<RoomId> {
        let mut doomed = Vec::new();
        for room in self.snapshot().await {
            if let Ok(room) = room.try_lock() {
                if room.is_over() || room.is_abandoned() {
                    doomed.push(room.id());
                }
            }
        }

        if !doomed.is_empty() {
            let mut table = self.table.write().await;
            for id in &doomed {
                table.rooms.remove(id);
            }
            info!("Reaped {} rooms: {:?}", doomed.len(), doomed);
        }

        doomed.sort_unstable();
        doomed
    }

    /// Number of rooms currently in the table, reaped ones excluded.
    pub async fn len(&self) -> usize {
        self.table.read().await.rooms.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
