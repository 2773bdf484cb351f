//! Headless client for poking a running server by hand.
//!
//! Connects, waits a bounded time for the server's greeting, then either
//! creates a room or joins one and prints every response it receives.

use clap::Parser;
use server::framing::{read_frame, write_frame};
use shared::{Action, Request, Response, ResponseKind, RoomId};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short, long, default_value = "127.0.0.1:5000")]
    server: String,

    /// User id to play as
    #[arg(short, long, default_value = "test-client")]
    user: String,

    /// Join this room instead of creating one
    #[arg(short, long)]
    join: Option<u32>,

    /// Seconds to wait for the server's first message
    #[arg(long, default_value = "5")]
    handshake_timeout: u64,
}

fn print_response(response: &Response) {
    println!(
        "{:?} room={} from={} ok={} {}",
        response.kind, response.room_id, response.user_id, response.success, response.data
    );
    if let Some(rooms) = &response.open_rooms {
        for room in rooms {
            println!("  open room {} waiting: {}", room.id, room.user_id);
        }
    }
    if let (Some(turn), Some(your_turn)) = (response.turn, response.your_turn) {
        println!("  turn {} (your turn: {})", turn, your_turn);
    }
}

/// The room a successful create or join puts us in.
fn room_to_follow(response: &Response) -> Option<RoomId> {
    match response.kind {
        ResponseKind::CreateAck | ResponseKind::JoinAck if response.success => {
            Some(response.room_id)
        }
        _ => None,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let stream = TcpStream::connect(&args.server).await?;
    println!("Connected to {}", args.server);
    let (mut reader, mut writer) = stream.into_split();

    let greeting = timeout(
        Duration::from_secs(args.handshake_timeout),
        read_frame(&mut reader),
    )
    .await
    .map_err(|_| "server did not greet us in time")??;
    print_response(&shared::decode::<Response>(&greeting)?);

    let first = match args.join {
        Some(room_id) => Action::Join { room_id },
        None => Action::Create,
    };
    // Follows the room we created or joined; "room <id>" overrides it.
    let room_id = Arc::new(AtomicU32::new(args.join.unwrap_or_default()));
    write_frame(&mut writer, &shared::encode(&Request::new(&args.user, first))?).await?;

    let user = args.user.clone();
    let current_room = Arc::clone(&room_id);
    let printer = tokio::spawn(async move {
        while let Ok(bytes) = read_frame(&mut reader).await {
            match shared::decode::<Response>(&bytes) {
                Ok(response) => {
                    if let Some(room_id) = room_to_follow(&response) {
                        current_room.store(room_id, Ordering::Relaxed);
                    }
                    print_response(&response);
                }
                Err(e) => eprintln!("Undecodable response: {}", e),
            }
        }
        println!("Server closed the connection");
    });

    println!("Type a move (\"x y\", \"x y, x y, x y\" or \"pass\"), \"say <text>\", \"room <id>\" or \"list\".");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let room = room_id.load(Ordering::Relaxed);
        let action = if line == "list" {
            Action::ListOpen
        } else if let Some(id) = line.strip_prefix("room ") {
            room_id.store(id.trim().parse()?, Ordering::Relaxed);
            continue;
        } else if let Some(text) = line.strip_prefix("say ") {
            Action::Message {
                room_id: room,
                text: text.to_string(),
            }
        } else {
            Action::Move {
                room_id: room,
                data: line.to_string(),
            }
        };
        write_frame(&mut writer, &shared::encode(&Request::new(&user, action))?).await?;
    }

    printer.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_follows_created_and_joined_rooms() {
        let created = Response::new(ResponseKind::CreateAck, 3, "alice");
        assert_eq!(room_to_follow(&created), Some(3));

        let joined = Response::new(ResponseKind::JoinAck, 7, "alice");
        assert_eq!(room_to_follow(&joined), Some(7));
    }

    #[test]
    fn test_ignores_failures_and_other_responses() {
        let rejected = Response::error(ResponseKind::JoinAck, 7, "bob", "Game is full already");
        assert_eq!(room_to_follow(&rejected), None);

        let moved = Response::new(ResponseKind::MoveAck, 3, "bob");
        assert_eq!(room_to_follow(&moved), None);
    }
}
