use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};

use burn::{config::Config, tensor::backend::AutodiffBackend};

use crate::{
    common::utils::{max, mean, min, std},
    env::base::{Env, EnvError},
};

use super::agent::Agent;

#[derive(Debug, Clone)]
pub struct EvalResult {
    pub mean_len: f32,
    pub std_len: f32,
    pub mean_reward: f32,
    pub std_reward: f32,
    pub min_reward: f32,
    pub max_reward: f32,
    pub episode_rewards: Vec<f32>,
    pub episode_lengths: Vec<usize>,
}

impl EvalResult {
    pub fn from_episodes(episode_rewards: Vec<f32>, episode_lengths: Vec<usize>) -> Self {
        let lens: Vec<f32> = episode_lengths.iter().map(|&l| l as f32).collect();

        Self {
            mean_len: mean(&lens),
            std_len: std(&lens),
            mean_reward: mean(&episode_rewards),
            std_reward: std(&episode_rewards),
            min_reward: min(&episode_rewards),
            max_reward: max(&episode_rewards),
            episode_rewards,
            episode_lengths,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeStats {
    pub reward: f32,
    pub length: usize,
}

#[derive(Config)]
pub struct EvalConfig {
    #[config(default = 10)]
    pub n_eval_episodes: usize,
    #[config(default = true)]
    pub deterministic: bool,
    #[config(default = false)]
    pub print_obs: bool,
    #[config(default = false)]
    pub print_action: bool,
    #[config(default = false)]
    pub print_reward: bool,
}

/// Plays one episode to completion.
///
/// Returns `None` if `interrupt` was raised before the episode finished.
pub fn run_episode<B, A, OS, AS>(
    agent: &A,
    env: &mut dyn Env<OS, AS>,
    cfg: &EvalConfig,
    device: &B::Device,
    interrupt: Option<&AtomicBool>,
) -> Result<Option<EpisodeStats>, EnvError>
where
    B: AutodiffBackend,
    A: Agent<B, OS, AS>,
    OS: Clone + Debug,
    AS: Clone + Debug,
{
    let mut state = env.reset(None, None)?;
    let mut stats = EpisodeStats {
        reward: 0.0,
        length: 0,
    };

    loop {
        if interrupt.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
            return Ok(None);
        }

        if cfg.print_obs {
            tracing::debug!("state: {:?}", state);
        }

        let (action, _) = agent.act(1.0, &state, cfg.deterministic, device);

        if cfg.print_action {
            tracing::debug!("action: {:?}", action);
        }

        let step_sample = env.step(&action)?;

        if cfg.print_reward {
            tracing::debug!("reward: {:?}", step_sample.reward);
        }

        stats.reward += step_sample.reward;
        stats.length += 1;

        if env.renderable() {
            env.render();
        }

        if step_sample.done() {
            return Ok(Some(stats));
        }

        state = step_sample.obs;
    }
}

pub fn evaluate_policy<B, A, OS, AS>(
    agent: &A,
    env: &mut dyn Env<OS, AS>,
    cfg: &EvalConfig,
    device: &B::Device,
) -> Result<EvalResult, EnvError>
where
    B: AutodiffBackend,
    A: Agent<B, OS, AS>,
    OS: Clone + Debug,
    AS: Clone + Debug,
{
    let mut episode_rewards = Vec::with_capacity(cfg.n_eval_episodes);
    let mut episode_lengths = Vec::with_capacity(cfg.n_eval_episodes);

    tracing::info!(episodes = cfg.n_eval_episodes, "starting evaluation");

    for ep in 0..cfg.n_eval_episodes {
        let Some(stats) = run_episode::<B, A, OS, AS>(agent, env, cfg, device, None)? else {
            break;
        };

        tracing::info!(
            "Episode {}/{}: Reward = {:.2}, Length = {}",
            ep + 1,
            cfg.n_eval_episodes,
            stats.reward,
            stats.length
        );

        episode_rewards.push(stats.reward);
        episode_lengths.push(stats.length);
    }

    Ok(EvalResult::from_episodes(episode_rewards, episode_lengths))
}
