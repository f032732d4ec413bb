//! Headless bot: connects, queues (or joins a tournament room), follows the ball
//! with its paddle and prints the result.

use arena_shared::physics::{Direction, PADDLE_HEIGHT};
use arena_shared::protocol::MatchResult;
use arena_shared::{ClientEnvelope, ClientMessage, GameState, ServerMessage, Slot, UserId};
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Headless Pong bot for the arena server")]
struct Args {
    /// WebSocket address of the server
    #[clap(short, long, default_value = "ws://127.0.0.1:8080")]
    url: String,
    /// User id announced in session.hello
    #[clap(long, default_value = "1")]
    user_id: u64,
    #[clap(long, default_value = "bot")]
    username: String,
    /// Tournament room code to join instead of queueing
    room: Option<String>,
}

/// Direction that moves the paddle centre toward the ball.
fn chase(state: &GameState, slot: Slot) -> Direction {
    let paddle_centre = state.paddles[slot.index()].y + PADDLE_HEIGHT / 2.0;
    let gap = state.ball.y - paddle_centre;
    if gap.abs() < PADDLE_HEIGHT / 4.0 {
        Direction::Idle
    } else if gap < 0.0 {
        Direction::Up
    } else {
        Direction::Down
    }
}

fn frame(envelope: &ClientEnvelope) -> Result<Message, serde_json::Error> {
    Ok(Message::Text(serde_json::to_string(envelope)?.into()))
}

fn print_result(result: &MatchResult, slot: Option<Slot>) {
    let outcome = match (slot, result.winner_slot) {
        (Some(mine), Some(winner)) if mine == winner => "won",
        (Some(_), Some(_)) => "lost",
        _ => "finished",
    };
    println!(
        "Match {} {}: {} {} - {} {} ({:?})",
        result.room_code,
        outcome,
        result.usernames[0],
        result.scores[0],
        result.scores[1],
        result.usernames[1],
        result.reason
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let (ws, _) = connect_async(args.url.as_str()).await?;
    println!("Connected to {}", args.url);
    let (mut sink, mut source) = ws.split();

    let hello = ClientEnvelope::with_ack(
        1,
        ClientMessage::Hello {
            user_id: UserId(args.user_id),
            username: args.username.clone(),
        },
    );
    sink.send(frame(&hello)?).await?;

    let mut slot: Option<Slot> = None;
    let mut room_code: Option<String> = args.room.clone();
    let mut last_direction = Direction::Idle;

    while let Some(message) = source.next().await {
        let text = match message? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let message: ServerMessage = match serde_json::from_str(&text) {
            Ok(message) => message,
            Err(e) => {
                println!("Unreadable frame: {}", e);
                continue;
            }
        };

        match message {
            ServerMessage::Welcome { connection_id, .. } => {
                println!("Session established as connection {}", connection_id);
                let request = match &args.room {
                    Some(code) => ClientMessage::JoinMatch {
                        room_code: code.clone(),
                    },
                    None => ClientMessage::EnterQueue,
                };
                sink.send(frame(&ClientEnvelope::with_ack(2, request))?)
                    .await?;
            }
            ServerMessage::QueueWaiting => println!("Waiting for an opponent..."),
            ServerMessage::Paired {
                room_code: code,
                usernames,
                slot: seat,
                ..
            } => {
                println!("Paired in room {}: {} vs {}", code, usernames[0], usernames[1]);
                slot = Some(seat);
                room_code = Some(code);
            }
            ServerMessage::Ack(reply) => {
                if let Some(joined) = reply.joined {
                    println!("Joined room {} in slot {:?}", joined.room_code, joined.slot);
                    slot = Some(joined.slot);
                    room_code = Some(joined.room_code);
                } else if !reply.success {
                    println!(
                        "Request {} failed: {}",
                        reply.ack,
                        reply.message.unwrap_or_default()
                    );
                }
            }
            ServerMessage::Countdown {
                seconds_remaining, ..
            } => println!("{}...", seconds_remaining),
            ServerMessage::Begin { .. } => println!("Go!"),
            ServerMessage::Tick { state, .. } => {
                let (Some(seat), Some(code)) = (slot, room_code.as_ref()) else {
                    continue;
                };
                let direction = chase(&state, seat);
                if direction != last_direction {
                    last_direction = direction;
                    let input = ClientMessage::Input {
                        room_code: code.clone(),
                        slot: seat,
                        direction,
                    };
                    sink.send(frame(&ClientEnvelope::new(input))?).await?;
                }
            }
            ServerMessage::PlayerLeft { slot: gone, .. } => {
                println!("Player in slot {:?} left", gone)
            }
            ServerMessage::Finished(result) => {
                print_result(&result, slot);
                break;
            }
            ServerMessage::Error { code, message } => println!("Server error {}: {}", code, message),
            _ => {}
        }
    }

    let _ = sink.close().await;
    println!("Test client finished");
    Ok(())
}
