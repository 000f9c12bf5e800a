//! Wire format spoken with the game.
//!
//! The agent sends a 4-byte little-endian `i32` command; the game answers
//! with a 4-byte little-endian length followed by that many bytes of UTF-8
//! JSON describing the new state.

use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::env::base::EnvError;

/// Largest state frame accepted from the game.
pub const MAX_FRAME_LEN: usize = 1 << 20;

const RESET_CODE: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StarshipAction {
    Up = 0,
    Down = 1,
    Left = 2,
    Right = 3,
    Noop = 4,
}

impl StarshipAction {
    pub const COUNT: usize = 5;
}

impl TryFrom<usize> for StarshipAction {
    type Error = EnvError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(StarshipAction::Up),
            1 => Ok(StarshipAction::Down),
            2 => Ok(StarshipAction::Left),
            3 => Ok(StarshipAction::Right),
            4 => Ok(StarshipAction::Noop),
            _ => Err(EnvError::InvalidAction(value)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Act(StarshipAction),
    Reset,
}

impl Command {
    pub fn code(&self) -> i32 {
        match self {
            Command::Act(a) => *a as i32,
            Command::Reset => RESET_CODE,
        }
    }

    pub fn encode(&self) -> [u8; 4] {
        self.code().to_le_bytes()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShipState {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AsteroidState {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub radius: f32,
}

/// One state message from the game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub starship: ShipState,
    #[serde(default)]
    pub asteroids: Vec<AsteroidState>,
    #[serde(default)]
    pub reward: f32,
    #[serde(default)]
    pub game_over: bool,
}

impl GameState {
    pub fn from_json(bytes: &[u8]) -> Result<Self, EnvError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| EnvError::Protocol(format!("state is not valid UTF-8: {e}")))?;

        Ok(serde_json::from_str(text)?)
    }
}

/// How hard to try reaching a freshly started game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff: Duration::from_millis(1000),
        }
    }
}

/// Errors that mean the game went away rather than misbehaved.
fn is_peer_closed(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
    )
}

/// A live TCP connection to one game instance.
#[derive(Debug)]
pub struct GameConnection {
    stream: TcpStream,
}

impl GameConnection {
    pub fn connect(port: u16, retry: &RetryPolicy) -> Result<Self, EnvError> {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let attempts = retry.max_attempts.max(1);

        for attempt in 1..=attempts {
            match TcpStream::connect(addr) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    tracing::info!(port, "connected to game");
                    return Ok(Self { stream });
                }
                Err(err) if attempt < attempts => {
                    tracing::info!(
                        port,
                        "waiting for game to start (attempt {attempt}/{attempts}): {err}"
                    );
                    thread::sleep(retry.backoff);
                }
                Err(err) => {
                    tracing::debug!(port, "last connection attempt failed: {err}");
                }
            }
        }

        Err(EnvError::Connection { port, attempts })
    }

    pub fn from_stream(stream: TcpStream) -> Self {
        Self { stream }
    }

    pub fn send(&mut self, command: Command) -> Result<(), EnvError> {
        self.stream.write_all(&command.encode())?;
        Ok(())
    }

    /// Reads one state frame. `Ok(None)` means the game closed the stream.
    pub fn receive(&mut self) -> Result<Option<GameState>, EnvError> {
        let mut len_buf = [0u8; 4];
        match self.stream.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if is_peer_closed(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let len = i32::from_le_bytes(len_buf);
        let len = usize::try_from(len)
            .map_err(|_| EnvError::Protocol(format!("negative frame length {len}")))?;

        if len > MAX_FRAME_LEN {
            return Err(EnvError::Protocol(format!(
                "frame of {len} bytes exceeds the {MAX_FRAME_LEN} byte limit"
            )));
        }

        let mut payload = vec![0u8; len];
        match self.stream.read_exact(&mut payload) {
            Ok(()) => {}
            Err(e) if is_peer_closed(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        GameState::from_json(&payload).map(Some)
    }

    /// Sends `command` and waits for the resulting state.
    pub fn exchange(&mut self, command: Command) -> Result<Option<GameState>, EnvError> {
        match self.send(command) {
            Ok(()) => {}
            Err(EnvError::Io(e)) if is_peer_closed(&e) => return Ok(None),
            Err(e) => return Err(e),
        }

        self.receive()
    }
}
