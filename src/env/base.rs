use std::{collections::HashMap, io, path::PathBuf};

use crate::common::{logger::LogData, spaces::Space};

#[derive(Debug, Clone)]
pub enum InfoData<O> {
    String(String),
    Float(f32),
    Int(i32),
    Obs(O),
    InfoDict(Info<O>),
}

pub type ResetOptions = HashMap<String, LogData>;
pub type Info<O> = HashMap<String, InfoData<O>>;

#[derive(Clone, Debug)]
pub struct EnvObservation<O> {
    pub obs: O,
    pub reward: f32,
    pub terminated: bool,
    pub truncated: bool,
    pub info: Info<O>,
}

impl<O> EnvObservation<O> {
    pub fn done(&self) -> bool {
        self.terminated | self.truncated
    }
}

#[derive(Clone, Debug, Copy)]
pub struct RewardRange {
    pub low: f32,
    pub high: f32,
}

/// Failures an environment can surface to the caller.
///
/// A peer closing the socket mid-episode is not one of them: the
/// environment reports that as a terminated step instead.
#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    #[error("could not connect to game on port {port} after {attempts} attempts")]
    Connection { port: u16, attempts: usize },

    #[error("game executable not found at {0:?}, did you build the game?")]
    ExecutableNotFound(PathBuf),

    #[error("failed to spawn game process: {0}")]
    Spawn(#[source] io::Error),

    #[error("socket error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed message from game: {0}")]
    Protocol(String),

    #[error("invalid action {0}, expected a value in 0..5")]
    InvalidAction(usize),

    #[error("environment must be reset before stepping")]
    ResetNeeded,

    #[error("game closed the connection during reset")]
    Disconnected,

    #[error("{count} games starting at port {base} run past port 65535")]
    PortRange { base: u16, count: usize },
}

impl From<serde_json::Error> for EnvError {
    fn from(value: serde_json::Error) -> Self {
        EnvError::Protocol(value.to_string())
    }
}

pub trait Env<O, A> {
    fn step(&mut self, action: &A) -> Result<EnvObservation<O>, EnvError>;
    fn reset(&mut self, seed: Option<u64>, options: Option<ResetOptions>) -> Result<O, EnvError>;
    fn action_space(&self) -> Box<dyn Space<A>>;
    fn observation_space(&self) -> Box<dyn Space<O>>;
    fn reward_range(&self) -> RewardRange;
    fn render(&self);
    fn renderable(&self) -> bool;

    /// Releases every resource held by the environment. Must be safe to
    /// call more than once and before the first reset.
    fn close(&mut self);
}

