//! A single game between two players.
//!
//! Rooms move from waiting (one player, turn 0) to active (two players,
//! turn >= 1) to over. Turn 1 is the opening triple, turn 2 the balancing
//! response that fixes colors, and every later turn places one stone.
//!
//! Every handler validates fully before touching the room, so a rejected
//! request leaves it exactly as it was. Rejections go back to the requester
//! only.

use crate::connection::{Connection, Outgoing};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{
    Board, Color, Coord, CoordError, OpenRoom, Response, ResponseKind, RoomId, WinRule,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

/// Decides who moves first once the second player arrives.
pub trait FirstMoverPicker: Send + Sync {
    /// True if the joining player takes the odd turns.
    fn joiner_moves_first(&self) -> bool;
}

/// Fair coin backed by a seedable RNG.
#[derive(Debug)]
pub struct RandomPicker {
    rng: Mutex<StdRng>,
}

impl RandomPicker {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng: Mutex::new(rng),
        }
    }
}

impl FirstMoverPicker for RandomPicker {
    fn joiner_moves_first(&self) -> bool {
        self.rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gen_bool(0.5)
    }
}

/// Always gives the first move to the same side.
#[derive(Debug, Clone, Copy)]
pub struct FixedPicker(pub bool);

impl FirstMoverPicker for FixedPicker {
    fn joiner_moves_first(&self) -> bool {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomState {
    Waiting,
    Active,
    Over,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error("You are already in this game and can't join it twice")]
    OwnRoom,
    #[error("Game is full already")]
    Full,
    #[error("Other player already left that game")]
    OpponentLeft,
    #[error("That game is already over")]
    Over,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveError {
    #[error("The game is already over")]
    GameOver,
    #[error("Waiting for a second player to join")]
    WaitingForOpponent,
    #[error("You are not playing in this game")]
    NotAPlayer,
    #[error("It's not your turn!")]
    NotYourTurn,
    #[error("Please choose exactly three sets of two values, like \"1 1, 1 2, 1 3\"")]
    OpeningCount,
    #[error(transparent)]
    Coord(#[from] CoordError),
    #[error("That spot is already taken!")]
    Taken,
    #[error("Colors have not been decided yet")]
    ColorsUndecided,
}

/// One seat in a room.
#[derive(Debug, Clone)]
pub struct Player {
    /// Client-chosen identity, unique within the room.
    pub user_id: String,
    /// Where this player's updates are delivered.
    pub connection: Arc<Connection>,
    /// Unset until turn 2 is played.
    pub color: Option<Color>,
}

/// Result of an accepted move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    /// Human-readable account of the move, sent to both players.
    pub description: String,
    /// Set only by the move that settles colors.
    pub colors: Option<BTreeMap<String, Color>>,
    pub game_over: bool,
}

/// A single game between two players.
#[derive(Debug)]
pub struct Room {
    id: RoomId,
    /// At most two; the creator is always first.
    players: Vec<Player>,
    turn: u32,
    board: Board,
    /// Plays the opening triple and every odd turn.
    first_player: Option<String>,
    over: bool,
    win_rule: WinRule,
}

impl Room {
    /// Opens a room with its creator as the only player.
    pub fn new(id: RoomId, user_id: &str, connection: &Arc<Connection>, win_rule: WinRule) -> Self {
        Self {
            id,
            players: vec![Player {
                user_id: user_id.to_string(),
                connection: Arc::clone(connection),
                color: None,
            }],
            turn: 0,
            board: Board::new(),
            first_player: None,
            over: false,
            win_rule,
        }
    }

    /// Id allocated by the registry.
    pub fn id(&self) -> RoomId {
        self.id
    }

    /// 0 while waiting, 1 for the opening triple, 2 for the balancing
    /// response, then one per stone.
    pub fn turn(&self) -> u32 {
        self.turn
    }

    /// Current stones.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Creator first, then the joiner once there is one.
    pub fn players(&self) -> &[Player] {
        &self.players
    }

    /// The player who plays the opening triple, picked on join.
    pub fn first_player(&self) -> Option<&str> {
        self.first_player.as_deref()
    }

    /// True once a move has won the game.
    pub fn is_over(&self) -> bool {
        self.over
    }

    /// Where the room is in its lifecycle, derived from players and outcome.
    pub fn state(&self) -> RoomState {
        if self.over {
            RoomState::Over
        } else if self.players.len() < 2 {
            RoomState::Waiting
        } else {
            RoomState::Active
        }
    }

    /// The color `user_id` plays, once turn 2 has settled colors.
    pub fn color_of(&self, user_id: &str) -> Option<Color> {
        self.player(user_id).and_then(|p| p.color)
    }

    fn player(&self, user_id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.user_id == user_id)
    }

    fn player_index(&self, user_id: &str) -> Option<usize> {
        self.players.iter().position(|p| p.user_id == user_id)
    }

    fn opponent(&self, user_id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.user_id != user_id)
    }

    /// The first player moves on odd turns, the other on even turns.
    pub fn is_turn(&self, user_id: &str) -> bool {
        if self.first_player.as_deref() == Some(user_id) {
            self.turn % 2 == 1
        } else {
            self.turn % 2 == 0
        }
    }

    /// Listing entry while the room waits for a second player.
    pub fn open_entry(&self) -> Option<OpenRoom> {
        match (self.state(), self.players.as_slice()) {
            (RoomState::Waiting, [creator]) => Some(OpenRoom {
                id: self.id,
                user_id: creator.user_id.clone(),
            }),
            _ => None,
        }
    }

    /// True when no player is still connected.
    pub fn is_abandoned(&self) -> bool {
        self.players.iter().all(|p| p.connection.is_closed())
    }

    /// Seats `user_id` as the second player and picks who opens.
    ///
    /// Fails without touching the room if it is over, full, already owned by
    /// `user_id`, or its creator has disconnected.
    pub fn join(
        &mut self,
        user_id: &str,
        connection: &Arc<Connection>,
        picker: &dyn FirstMoverPicker,
    ) -> Result<(), JoinError> {
        if self.over {
            return Err(JoinError::Over);
        }
        if self.players.len() == 1 && self.player(user_id).is_some() {
            return Err(JoinError::OwnRoom);
        }
        if self.players.len() >= 2 {
            return Err(JoinError::Full);
        }
        if self.players.iter().any(|p| p.connection.is_closed()) {
            return Err(JoinError::OpponentLeft);
        }

        let creator = self.players[0].user_id.clone();
        self.players.push(Player {
            user_id: user_id.to_string(),
            connection: Arc::clone(connection),
            color: None,
        });
        self.turn = 1;
        self.first_player = Some(if picker.joiner_moves_first() {
            user_id.to_string()
        } else {
            creator
        });

        info!(
            "{} joined room {}; {} moves first",
            user_id,
            self.id,
            self.first_player.as_deref().unwrap_or_default()
        );
        Ok(())
    }

    /// Join request handler: the joiner gets a `JoinAck` naming the creator,
    /// the creator gets `OtherJoined` naming the joiner, each with their own
    /// turn flag. A rejected join answers the requester only.
    pub fn handle_join(
        &mut self,
        user_id: &str,
        connection: &Arc<Connection>,
        picker: &dyn FirstMoverPicker,
    ) -> Vec<Outgoing> {
        if let Err(e) = self.join(user_id, connection, picker) {
            debug!("Join of room {} by {} rejected: {}", self.id, user_id, e);
            let response = Response::error(ResponseKind::JoinAck, self.id, user_id, e);
            return vec![Outgoing::new(connection, response)];
        }

        let Some(creator) = self.opponent(user_id) else {
            return Vec::new();
        };
        let joiner_first = self.first_player.as_deref() == Some(user_id);

        let mut ack = Response::new(ResponseKind::JoinAck, self.id, creator.user_id.as_str());
        ack.turn = Some(self.turn);
        ack.your_turn = Some(joiner_first);

        let mut notice = Response::new(ResponseKind::OtherJoined, self.id, user_id);
        notice.turn = Some(self.turn);
        notice.your_turn = Some(!joiner_first);

        vec![
            Outgoing::new(connection, ack),
            Outgoing::new(&creator.connection, notice),
        ]
    }

    /// Relays chat text to the other player unchanged.
    pub fn handle_message(
        &self,
        user_id: &str,
        text: &str,
        connection: &Arc<Connection>,
    ) -> Vec<Outgoing> {
        if self.player(user_id).is_none() {
            let response =
                Response::error(ResponseKind::Message, self.id, user_id, MoveError::NotAPlayer);
            return vec![Outgoing::new(connection, response)];
        }

        match self.opponent(user_id) {
            Some(opponent) => {
                let mut relay = Response::new(ResponseKind::Message, self.id, user_id);
                relay.data = text.to_string();
                vec![Outgoing::new(&opponent.connection, relay)]
            }
            None => Vec::new(),
        }
    }

    /// Parses one coordinate and checks it is free.
    fn parse_free(&self, text: &str) -> Result<Coord, MoveError> {
        let coord: Coord = text.parse()?;
        if self.board.is_taken(coord) {
            return Err(MoveError::Taken);
        }
        Ok(coord)
    }

    /// Validates and applies a move for `user_id`.
    pub fn apply_move(&mut self, user_id: &str, data: &str) -> Result<MoveOutcome, MoveError> {
        if self.over {
            return Err(MoveError::GameOver);
        }
        if self.players.len() < 2 {
            return Err(MoveError::WaitingForOpponent);
        }
        let mover = self.player_index(user_id).ok_or(MoveError::NotAPlayer)?;
        if !self.is_turn(user_id) {
            return Err(MoveError::NotYourTurn);
        }

        let outcome = match self.turn {
            1 => self.play_opening(data)?,
            2 => self.play_balancing(mover, data)?,
            _ => self.play_stone(mover, data)?,
        };

        if !outcome.game_over {
            self.turn += 1;
        }
        Ok(outcome)
    }

    /// Turn 1: two black stones and one white, in one request.
    fn play_opening(&mut self, data: &str) -> Result<MoveOutcome, MoveError> {
        let fields: Vec<&str> = data.split(", ").collect();
        let [first, second, third] = fields.as_slice() else {
            return Err(MoveError::OpeningCount);
        };

        let mut stones: Vec<Coord> = Vec::with_capacity(3);
        for field in [first, second, third] {
            let coord = self.parse_free(field)?;
            if stones.contains(&coord) {
                return Err(MoveError::Taken);
            }
            stones.push(coord);
        }

        self.board.place(stones[0], Color::Black);
        self.board.place(stones[1], Color::Black);
        self.board.place(stones[2], Color::White);

        Ok(MoveOutcome {
            description: format!(
                "played black on {}, black on {}, and white on {}",
                stones[0], stones[1], stones[2]
            ),
            colors: None,
            game_over: false,
        })
    }

    /// Turn 2: the responder passes or plays a white stone. Either way the
    /// opener ends up black and the responder white.
    fn play_balancing(&mut self, mover: usize, data: &str) -> Result<MoveOutcome, MoveError> {
        let stone = if data == "pass" {
            None
        } else {
            Some(self.parse_free(data)?)
        };

        if let Some(coord) = stone {
            self.board.place(coord, Color::White);
        }

        let opener = 1 - mover;
        self.players[mover].color = Some(Color::White);
        self.players[opener].color = Some(Color::Black);

        let colors = self
            .players
            .iter()
            .filter_map(|p| p.color.map(|c| (p.user_id.clone(), c)))
            .collect();

        let description = match stone {
            None => "passed and plays white; back to the opener, who plays black".to_string(),
            Some(coord) => format!("played white on {} and plays white", coord),
        };

        Ok(MoveOutcome {
            description,
            colors: Some(colors),
            game_over: false,
        })
    }

    /// Turn 3 onward: one stone in the mover's color, then the win scan.
    fn play_stone(&mut self, mover: usize, data: &str) -> Result<MoveOutcome, MoveError> {
        let color = self.players[mover].color.ok_or(MoveError::ColorsUndecided)?;
        let coord = self.parse_free(data)?;

        self.board.place(coord, color);

        if self.board.check_win(coord, color, self.win_rule) {
            self.over = true;
            info!(
                "{} won room {} on turn {}",
                self.players[mover].user_id, self.id, self.turn
            );
            return Ok(MoveOutcome {
                description: format!("won with {}!", coord),
                colors: None,
                game_over: true,
            });
        }

        Ok(MoveOutcome {
            description: format!("played {} on {}", color, coord),
            colors: None,
            game_over: false,
        })
    }

    /// Applies a move and builds the mover's and opponent's updates, or an
    /// error for the mover alone.
    pub fn handle_move(
        &mut self,
        user_id: &str,
        data: &str,
        connection: &Arc<Connection>,
    ) -> Vec<Outgoing> {
        let outcome = match self.apply_move(user_id, data) {
            Ok(outcome) => outcome,
            Err(e) => {
                debug!("Move {:?} in room {} by {} rejected: {}", data, self.id, user_id, e);
                let response = Response::error(ResponseKind::MoveAck, self.id, user_id, e);
                return vec![Outgoing::new(connection, response)];
            }
        };

        let mut update = Response::new(ResponseKind::MoveAck, self.id, user_id);
        update.data = outcome.description;
        update.colors = outcome.colors;
        update.turn = Some(self.turn);
        update.game_over = Some(outcome.game_over);
        update.board = Some(self.board.clone());
        update.your_turn = Some(false);

        // The opponent is always told it is their turn; `game_over` is what
        // ends the game for them.
        let mirrored = self.opponent(user_id).map(|opponent| {
            let mut mirrored = update.clone();
            mirrored.your_turn = Some(true);
            Outgoing::new(&opponent.connection, mirrored)
        });

        let mut outgoing = vec![Outgoing::new(connection, update)];
        outgoing.extend(mirrored);
        outgoing
    }
}
