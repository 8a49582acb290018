//! Input commands and the line syntax the headless client reads them in

use std::io::BufRead;
use std::thread;

use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Discrete command from the input collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Forward(usize),
    Backward(usize),
    TurnLeft(usize),
    TurnRight(usize),
    AboutFace,
    PeekLeft,
    PeekRight,
    UnpeekLeft,
    UnpeekRight,
    Fire,
    /// Characters typed at the chat prompt
    Chat(String),
    Quit,
}

/// Line parsing errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("unknown command: {0}")]
    Unknown(String),

    #[error("invalid repeat count: {0}")]
    InvalidCount(String),
}

/// Parse one line, e.g. `f 3`, `left`, `peek r`, `fire`, `say hello`, `quit`.
/// `say` ends the chat line with a carriage return.
pub fn parse_line(line: &str) -> Result<Command, CommandError> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let count = || -> Result<usize, CommandError> {
        if rest.is_empty() {
            return Ok(1);
        }
        rest.parse()
            .map_err(|_| CommandError::InvalidCount(rest.to_string()))
    };

    let command = match word.to_ascii_lowercase().as_str() {
        "" => return Err(CommandError::Empty),
        "f" | "forward" => Command::Forward(count()?),
        "b" | "back" | "backward" => Command::Backward(count()?),
        "l" | "left" => Command::TurnLeft(count()?),
        "r" | "right" => Command::TurnRight(count()?),
        "a" | "about" => Command::AboutFace,
        "peek" | "unpeek" => return parse_peek(word, rest),
        "x" | "fire" => Command::Fire,
        "say" => Command::Chat(format!("{rest}\r")),
        "type" => Command::Chat(rest.to_string()),
        "q" | "quit" => Command::Quit,
        _ => return Err(CommandError::Unknown(line.to_string())),
    };
    Ok(command)
}

fn parse_peek(word: &str, side: &str) -> Result<Command, CommandError> {
    let peek = word.eq_ignore_ascii_case("peek");
    match (peek, side.to_ascii_lowercase().as_str()) {
        (true, "l" | "left") => Ok(Command::PeekLeft),
        (true, "r" | "right") => Ok(Command::PeekRight),
        (false, "l" | "left") => Ok(Command::UnpeekLeft),
        (false, "r" | "right") => Ok(Command::UnpeekRight),
        _ => Err(CommandError::Unknown(format!("{word} {side}"))),
    }
}

/// Read commands from stdin on a plain thread; EOF quits
pub fn spawn_stdin_reader(commands: mpsc::Sender<Command>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!(error = %e, "Failed to read stdin");
                    break;
                }
            };
            match parse_line(&line) {
                Ok(command) => {
                    if commands.blocking_send(command).is_err() {
                        debug!("Command channel closed");
                        return;
                    }
                }
                Err(CommandError::Empty) => {}
                Err(e) => warn!(error = %e, "Ignoring input line"),
            }
        }
        let _ = commands.blocking_send(Command::Quit);
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movement_with_counts() {
        assert_eq!(parse_line("f"), Ok(Command::Forward(1)));
        assert_eq!(parse_line("  forward 3 "), Ok(Command::Forward(3)));
        assert_eq!(parse_line("B 2"), Ok(Command::Backward(2)));
        assert_eq!(parse_line("left 5"), Ok(Command::TurnLeft(5)));
        assert_eq!(parse_line("a"), Ok(Command::AboutFace));
        assert_eq!(
            parse_line("r lots"),
            Err(CommandError::InvalidCount("lots".to_string()))
        );
    }

    #[test]
    fn peeks_need_a_side() {
        assert_eq!(parse_line("peek l"), Ok(Command::PeekLeft));
        assert_eq!(parse_line("unpeek right"), Ok(Command::UnpeekRight));
        assert!(matches!(parse_line("peek"), Err(CommandError::Unknown(_))));
    }

    #[test]
    fn chat_and_lifecycle() {
        assert_eq!(parse_line("say hi there"), Ok(Command::Chat("hi there\r".to_string())));
        assert_eq!(parse_line("type abc"), Ok(Command::Chat("abc".to_string())));
        assert_eq!(parse_line("fire"), Ok(Command::Fire));
        assert_eq!(parse_line("q"), Ok(Command::Quit));
        assert_eq!(parse_line("   "), Err(CommandError::Empty));
        assert_eq!(
            parse_line("dance"),
            Err(CommandError::Unknown("dance".to_string()))
        );
    }
}
