pub mod board;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub use board::{Board, WinRule};

/// Intersections per side of the board.
pub const BOARD_SIZE: u8 = 15;

/// Room ids start at 1; 0 marks responses that concern no room.
pub type RoomId = u32;

pub const NO_ROOM: RoomId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Color {
    Black,
    White,
}

impl Color {
    pub fn opposite(self) -> Color {
        match self {
            Color::Black => Color::White,
            Color::White => Color::Black,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::Black => f.write_str("black"),
            Color::White => f.write_str("white"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordError {
    #[error("The syntax for a move is <x> <y>")]
    Syntax,
    #[error("Both x and y must be whole numbers")]
    NotANumber,
    #[error("Both x and y must be from 1 to 15")]
    OutOfRange,
}

/// A board intersection, 1-based on both axes.
///
/// The canonical text form is `"x y"`, used both for parsing move payloads
/// and for describing moves back to players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coord {
    pub x: u8,
    pub y: u8,
}

impl Coord {
    pub fn new(x: u8, y: u8) -> Result<Self, CoordError> {
        Self::checked(i32::from(x), i32::from(y)).ok_or(CoordError::OutOfRange)
    }

    /// Builds a coordinate if `(x, y)` lies on the board.
    pub fn checked(x: i32, y: i32) -> Option<Self> {
        let range = 1..=i32::from(BOARD_SIZE);
        if range.contains(&x) && range.contains(&y) {
            Some(Coord {
                x: x as u8,
                y: y as u8,
            })
        } else {
            None
        }
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.x, self.y)
    }
}

impl FromStr for Coord {
    type Err = CoordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split(' ').collect();
        let [x, y] = fields.as_slice() else {
            return Err(CoordError::Syntax);
        };

        let x: i32 = x.parse().map_err(|_| CoordError::NotANumber)?;
        let y: i32 = y.parse().map_err(|_| CoordError::NotANumber)?;

        Coord::checked(x, y).ok_or(CoordError::OutOfRange)
    }
}

/// Client to server envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Opaque, client-generated identity.
    pub user_id: String,
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Create,
    Join { room_id: RoomId },
    /// `data` is `"x y"`, `"x y, x y, x y"` for the opening, or `"pass"`.
    Move { room_id: RoomId, data: String },
    Message { room_id: RoomId, text: String },
    ListOpen,
}

impl Request {
    pub fn new(user_id: impl Into<String>, action: Action) -> Self {
        Self {
            user_id: user_id.into(),
            action,
        }
    }

    /// The room this request addresses, if any.
    pub fn room_id(&self) -> Option<RoomId> {
        match self.action {
            Action::Join { room_id }
            | Action::Move { room_id, .. }
            | Action::Message { room_id, .. } => Some(room_id),
            Action::Create | Action::ListOpen => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseKind {
    CreateAck,
    JoinAck,
    OtherJoined,
    MoveAck,
    Message,
    OpenRooms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenRoom {
    pub id: RoomId,
    /// The player waiting in the room.
    pub user_id: String,
}

/// Server to client envelope. Optional fields are only set by the
/// responses that carry them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub room_id: RoomId,
    pub user_id: String,
    pub kind: ResponseKind,
    pub success: bool,
    pub data: String,
    pub colors: Option<BTreeMap<String, Color>>,
    pub turn: Option<u32>,
    pub your_turn: Option<bool>,
    pub game_over: Option<bool>,
    pub board: Option<Board>,
    pub open_rooms: Option<Vec<OpenRoom>>,
}

impl Response {
    pub fn new(kind: ResponseKind, room_id: RoomId, user_id: impl Into<String>) -> Self {
        Self {
            room_id,
            user_id: user_id.into(),
            kind,
            success: true,
            data: String::new(),
            colors: None,
            turn: None,
            your_turn: None,
            game_over: None,
            board: None,
            open_rooms: None,
        }
    }

    /// A failed response carrying a human-readable reason.
    pub fn error(
        kind: ResponseKind,
        room_id: RoomId,
        user_id: impl Into<String>,
        reason: impl fmt::Display,
    ) -> Self {
        Self {
            success: false,
            data: reason.to_string(),
            ..Self::new(kind, room_id, user_id)
        }
    }
}

pub fn encode<T: Serialize>(value: &T) -> bincode::Result<Vec<u8>> {
    bincode::serialize(value)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> bincode::Result<T> {
    bincode::deserialize(bytes)
}
