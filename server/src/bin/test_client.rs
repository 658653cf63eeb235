use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use server::utils::get_timestamp;
use shared::{ClientMessage, InputIntent, PlayerId, ServerMessage};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message};

#[derive(Parser, Debug)]
#[command(author, version, about = "Scripted test client for the position server")]
struct Args {
    /// WebSocket URL of the server
    #[arg(short, long, default_value = "ws://127.0.0.1:9090")]
    url: String,

    /// Number of inputs to send
    #[arg(short, long, default_value = "10")]
    count: u64,

    /// Delay between inputs in milliseconds
    #[arg(short, long, default_value = "250")]
    interval_ms: u64,
}

fn decode(frame: Message) -> Option<ServerMessage> {
    let text = frame.to_text().ok()?;
    ServerMessage::from_json(text).ok()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    println!("Connecting to {}", args.url);
    let (ws, _) = connect_async(args.url.as_str()).await?;
    let (mut sink, mut stream) = ws.split();

    // Identity always arrives first
    let my_id: PlayerId = loop {
        let frame = timeout(Duration::from_secs(5), stream.next())
            .await?
            .ok_or("server closed before assigning an id")??;
        if let Some(ServerMessage::JoinedServer { uuid }) = decode(frame) {
            break uuid;
        }
    };
    println!("Joined as {}", my_id);

    for seq in 1..=args.count {
        // Walk in a slow circle
        let angle = seq as f32 / 5.0;
        let message = ClientMessage::PlayerInput {
            uuid: my_id,
            inputs: vec![InputIntent::new(seq, angle.sin(), angle.cos(), get_timestamp())],
        };
        sink.send(Message::text(message.to_json()?)).await?;
        println!("Sent input {}: dx={:.2} dy={:.2}", seq, angle.sin(), angle.cos());

        let deadline = tokio::time::Instant::now() + Duration::from_millis(args.interval_ms);
        while let Ok(Some(frame)) = tokio::time::timeout_at(deadline, stream.next()).await {
            match decode(frame?) {
                Some(ServerMessage::UpdateState { players, t }) => {
                    if let Some(me) = players.iter().find(|p| p.uuid == my_id) {
                        println!(
                            "  t={} pos=({:.1}, {:.1}) vel=({:.1}, {:.1}) ack={}",
                            t, me.x, me.y, me.vx, me.vy, me.seq_ack
                        );
                    }
                }
                Some(ServerMessage::UpdatePosition(me)) if me.uuid == my_id => {
                    println!(
                        "  t={} pos=({:.1}, {:.1}) vel=({:.1}, {:.1}) ack={}",
                        me.t, me.x, me.y, me.vx, me.vy, me.seq_ack
                    );
                }
                Some(ServerMessage::SpawnNewPlayer { player }) => {
                    println!("  Player {} joined at ({:.1}, {:.1})", player.uuid, player.x, player.y);
                }
                Some(ServerMessage::PlayerDisconnected { uuid }) => {
                    println!("  Player {} left", uuid);
                }
                _ => {}
            }
        }
    }

    sink.send(Message::Close(None)).await?;
    sleep(Duration::from_millis(100)).await;
    println!("Test client finished");

    Ok(())
}
