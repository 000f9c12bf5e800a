#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::thread;

use starship_rl::env::starship::StarshipConfig;

/// Decides the reply to a command. Gets the command and its index on the
/// current connection; `None` closes the connection instead of answering.
pub type Responder = dyn Fn(i32, usize) -> Option<String> + Send + Sync;

/// A stand-in for the game: a TCP server that answers the wire protocol.
///
/// The launched "game" is `/bin/sh`, which rejects the game flags and
/// exits at once; the environment only needs a process to spawn.
pub struct FakeGame {
    pub port: u16,
    pub connections: Arc<AtomicUsize>,
    pub commands: Arc<Mutex<Vec<i32>>>,
    executable: PathBuf,
}

impl FakeGame {
    pub fn start(responder: impl Fn(i32, usize) -> Option<String> + Send + Sync + 'static) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let connections = Arc::new(AtomicUsize::new(0));
        let commands = Arc::new(Mutex::new(Vec::new()));
        let responder: Arc<Responder> = Arc::new(responder);

        {
            let connections = connections.clone();
            let commands = commands.clone();
            thread::spawn(move || {
                for stream in listener.incoming() {
                    let Ok(stream) = stream else { break };
                    connections.fetch_add(1, Ordering::SeqCst);
                    serve(stream, &*responder, &commands);
                }
            });
        }

        Self {
            port,
            connections,
            commands,
            executable: PathBuf::from("/bin/sh"),
        }
    }

    /// Answers every command with `state(..)` and never ends the game.
    pub fn endless() -> Self {
        Self::start(|_, _| Some(state(100.0, 0, 0.1, false)))
    }

    pub fn config(&self) -> StarshipConfig {
        StarshipConfig::new(self.executable.to_string_lossy().into_owned())
            .with_port(self.port)
            .with_startup_delay_ms(0)
            .with_connect_attempts(3)
            .with_connect_backoff_ms(10)
            .with_shutdown_grace_ms(50)
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<i32> {
        self.commands.lock().unwrap().clone()
    }
}

fn serve(mut stream: TcpStream, responder: &Responder, commands: &Mutex<Vec<i32>>) {
    let mut idx = 0;
    loop {
        let mut cmd = [0u8; 4];
        if stream.read_exact(&mut cmd).is_err() {
            return;
        }
        let cmd = i32::from_le_bytes(cmd);
        commands.lock().unwrap().push(cmd);

        let Some(reply) = responder(cmd, idx) else {
            return;
        };
        idx += 1;

        let mut frame = (reply.len() as u32).to_le_bytes().to_vec();
        frame.extend_from_slice(reply.as_bytes());
        if stream.write_all(&frame).is_err() {
            return;
        }
    }
}

/// A state message with the ship at `(ship_x, 384)` and `n_asteroids`
/// identical asteroids.
pub fn state(ship_x: f32, n_asteroids: usize, reward: f32, game_over: bool) -> String {
    let asteroids: Vec<String> = (0..n_asteroids)
        .map(|_| r#"{"x":512.0,"y":384.0,"vx":30.0,"vy":-30.0,"radius":25.0}"#.to_string())
        .collect();

    format!(
        r#"{{"starship":{{"x":{ship_x},"y":384.0,"vx":0.0,"vy":0.0}},"asteroids":[{}],"reward":{reward},"game_over":{game_over}}}"#,
        asteroids.join(",")
    )
}
