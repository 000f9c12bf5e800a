use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use burn::config::Config;

use crate::common::spaces::{Discrete, Space};

use super::base::{Env, EnvError, EnvObservation, InfoData, ResetOptions, RewardRange};

pub mod observation;
pub mod process;
pub mod protocol;

use observation::{encode, zeroed};
use process::{GameLaunch, GameProcess};
use protocol::{Command, GameConnection, RetryPolicy, StarshipAction};

pub const DEFAULT_GAME_PATH: &str = "build/starship_game";
pub const GAME_PATH_ENV_VAR: &str = "STARSHIP_GAME";

/// Picks the game executable: an explicit path wins, then the
/// `STARSHIP_GAME` environment variable, then `build/starship_game`.
pub fn resolve_game_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| std::env::var_os(GAME_PATH_ENV_VAR).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_GAME_PATH))
}

#[derive(Config, Debug)]
pub struct StarshipConfig {
    /// path of the game binary
    pub executable: String,
    #[config(default = 5555)]
    pub port: u16,
    #[config(default = 2.0)]
    pub speed_multiplier: f32,
    /// show the game window; otherwise the game runs with `--headless`
    #[config(default = false)]
    pub render: bool,
    #[config(default = 10000)]
    pub max_steps: usize,
    #[config(default = 500)]
    pub startup_delay_ms: u64,
    #[config(default = 10)]
    pub connect_attempts: usize,
    #[config(default = 1000)]
    pub connect_backoff_ms: u64,
    #[config(default = 2000)]
    pub shutdown_grace_ms: u64,
    /// start a fresh game process on every reset
    #[config(default = true)]
    pub restart_on_reset: bool,
}

impl StarshipConfig {
    /// One config per parallel instance, on consecutive ports.
    pub fn for_instances(&self, n: usize) -> Result<Vec<StarshipConfig>, EnvError> {
        (0..n)
            .map(|i| {
                u16::try_from(i)
                    .ok()
                    .and_then(|i| self.port.checked_add(i))
                    .map(|port| self.clone().with_port(port))
                    .ok_or(EnvError::PortRange {
                        base: self.port,
                        count: n,
                    })
            })
            .collect()
    }

    fn launch(&self) -> GameLaunch {
        GameLaunch {
            executable: PathBuf::from(&self.executable),
            port: self.port,
            speed: self.speed_multiplier,
            headless: !self.render,
        }
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.connect_attempts,
            backoff: Duration::from_millis(self.connect_backoff_ms),
        }
    }
}

/// The starship game as an environment.
///
/// Each reset (by default) launches a fresh game process and connects to
/// it over TCP; steps exchange one action for one state.
pub struct StarshipEnv {
    config: StarshipConfig,
    process: Option<GameProcess>,
    connection: Option<GameConnection>,
    step_counter: usize,
}

impl StarshipEnv {
    pub fn new(config: StarshipConfig) -> Self {
        Self {
            config,
            process: None,
            connection: None,
            step_counter: 0,
        }
    }

    pub fn config(&self) -> &StarshipConfig {
        &self.config
    }

    pub fn step_counter(&self) -> usize {
        self.step_counter
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    fn teardown(&mut self) {
        // the socket goes first so the game notices and can exit cleanly
        self.connection = None;

        if let Some(mut process) = self.process.take() {
            process.shutdown(Duration::from_millis(self.config.shutdown_grace_ms));
        }
    }

    fn start_game(&mut self) -> Result<(), EnvError> {
        self.teardown();

        let process = GameProcess::spawn(&self.config.launch())?;
        thread::sleep(Duration::from_millis(self.config.startup_delay_ms));

        // on failure `process` is dropped, which shuts the game down
        let connection = GameConnection::connect(self.config.port, &self.config.retry_policy())?;

        self.process = Some(process);
        self.connection = Some(connection);

        Ok(())
    }
}

impl Env<Vec<f32>, usize> for StarshipEnv {
    fn step(&mut self, action: &usize) -> Result<EnvObservation<Vec<f32>>, EnvError> {
        let Some(connection) = self.connection.as_mut() else {
            return Err(EnvError::ResetNeeded);
        };
        let action = StarshipAction::try_from(*action)?;

        self.step_counter += 1;
        let truncated = self.step_counter >= self.config.max_steps;

        let mut info = std::collections::HashMap::new();
        info.insert(
            "step".to_string(),
            InfoData::Int(self.step_counter as i32),
        );

        match connection.exchange(Command::Act(action))? {
            Some(state) => Ok(EnvObservation {
                obs: encode(&state),
                reward: state.reward,
                terminated: state.game_over,
                truncated,
                info,
            }),
            None => {
                tracing::warn!(
                    port = self.config.port,
                    step = self.step_counter,
                    "game closed the connection mid-episode"
                );
                self.connection = None;

                Ok(EnvObservation {
                    obs: zeroed(),
                    reward: 0.0,
                    terminated: true,
                    truncated,
                    info,
                })
            }
        }
    }

    fn reset(&mut self, seed: Option<u64>, _options: Option<ResetOptions>) -> Result<Vec<f32>, EnvError> {
        if let Some(seed) = seed {
            tracing::trace!(seed, "the game does not take a seed, ignoring");
        }

        if self.config.restart_on_reset || self.connection.is_none() {
            self.start_game()?;
        }

        let connection = self.connection.as_mut().ok_or(EnvError::Disconnected)?;

        match connection.exchange(Command::Reset)? {
            Some(state) => {
                self.step_counter = 0;
                Ok(encode(&state))
            }
            None => {
                self.connection = None;
                Err(EnvError::Disconnected)
            }
        }
    }

    fn action_space(&self) -> Box<dyn Space<usize>> {
        Box::new(Discrete::from(StarshipAction::COUNT))
    }

    fn observation_space(&self) -> Box<dyn Space<Vec<f32>>> {
        Box::new(observation::observation_space())
    }

    fn reward_range(&self) -> RewardRange {
        RewardRange {
            low: f32::NEG_INFINITY,
            high: f32::INFINITY,
        }
    }

    // the game draws its own window when not headless
    fn render(&self) {}

    fn renderable(&self) -> bool {
        self.config.render
    }

    fn close(&mut self) {
        self.teardown();
    }
}

impl Drop for StarshipEnv {
    fn drop(&mut self) {
        self.teardown();
    }
}
