use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::common::{InboundRecord, SessionEvent};
use crate::network::Session;

#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Message(&'a str),
    Peers,
    Quit,
    Empty,
}

fn parse_input(line: &str) -> Input<'_> {
    match line.trim() {
        "" => Input::Empty,
        "/peers" => Input::Peers,
        "/quit" | "/exit" => Input::Quit,
        text => Input::Message(text),
    }
}

fn format_record(record: &InboundRecord) -> String {
    format!(
        "[{}] {}: {}",
        record.clock_time(),
        record.username,
        record.text
    )
}

/// Line-oriented front-end: stdin lines are sent, records are printed.
/// Returns when stdin closes or `/quit` is entered.
pub async fn run(
    session: Session,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    username: String,
) {
    println!(
        "Room: {} | You: {} | type /peers or /quit",
        session.room_name(),
        username
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => match parse_input(&line) {
                        Input::Message(text) => session.send(text, &username),
                        Input::Peers => println!("Peers: {}", session.peer_count()),
                        Input::Quit => break,
                        Input::Empty => {}
                    },
                    Ok(None) => break,
                    Err(err) => {
                        log::error!("Failed to read stdin: {err}");
                        break;
                    }
                }
            }
            Some(event) = events.recv() => match event {
                SessionEvent::MessageReceived(record) => println!("{}", format_record(&record)),
                SessionEvent::PeerCountChanged(0) => println!("Waiting for peers to connect..."),
                SessionEvent::PeerCountChanged(count) => println!("Peers: {count}"),
            },
        }
    }
}
