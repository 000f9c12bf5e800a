use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time;

use burn::{config::Config, record::RecorderError, tensor::backend::AutodiffBackend};
use indicatif::{ProgressBar, ProgressStyle};

use crate::env::base::{Env, EnvError};

use super::{
    agent::Agent,
    buffer::{BufferError, ReplayBuffer},
    callback::Callback,
    eval::{evaluate_policy, EvalConfig},
    logger::{LogData, LogItem, Logger},
    utils::mean,
    vec_env::base_env::VecEnv,
};

#[derive(Config)]
pub struct OfflineAlgParams {
    #[config(default = 100)]
    pub n_steps: usize,
    #[config(default = 50)]
    pub memory_size: usize,
    #[config(default = 4)]
    pub batch_size: usize,
    #[config(default = 10)]
    pub warmup_steps: usize,
    #[config(default = 0.99)]
    pub gamma: f32,
    #[config(default = 1e-4)]
    pub lr: f64,
    #[config(default = false)]
    pub render: bool,
    #[config(default = false)]
    pub evaluate_during_training: bool,
    #[config(default = 1)]
    pub evaluate_every_steps: usize,
    #[config(default = true)]
    pub eval_at_start_of_training: bool,
    #[config(default = true)]
    pub eval_at_end_of_training: bool,
    #[config(default = 1)]
    pub train_every: usize,
    #[config(default = 1)]
    pub grad_steps: usize,
    /// seeds the first reset of the training environments
    pub seed: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum TrainError {
    #[error(transparent)]
    Env(#[from] EnvError),

    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error("failed to record model: {0}")]
    Record(String),

    #[error("failed to write training log: {0}")]
    Log(String),
}

impl From<RecorderError> for TrainError {
    fn from(value: RecorderError) -> Self {
        TrainError::Record(format!("{value:?}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainOutcome {
    Completed,
    Interrupted,
}

pub struct OfflineTrainer<A, B, OS, AS>
where
    A: Agent<B, OS, AS>,
    B: AutodiffBackend,
    OS: Clone + Debug,
    AS: Clone + Debug,
{
    pub offline_params: OfflineAlgParams,
    pub env: Box<dyn VecEnv<OS, AS>>,
    pub eval_env: Option<Box<dyn Env<OS, AS>>>,
    pub agent: A,
    pub buffer: ReplayBuffer<OS, AS>,
    pub logger: Box<dyn Logger>,
    pub callbacks: Vec<Box<dyn Callback<A, B, OS, AS>>>,
    pub eval_cfg: EvalConfig,
    pub train_device: B::Device,
    /// environment steps taken so far, summed over all environments
    pub num_timesteps: usize,
    interrupt: Option<Arc<AtomicBool>>,
    best_model_path: Option<PathBuf>,
    best_mean_reward: f32,
}

impl<A, B, OS, AS> OfflineTrainer<A, B, OS, AS>
where
    A: Agent<B, OS, AS>,
    B: AutodiffBackend,
    OS: Clone + Debug,
    AS: Clone + Debug,
{
    pub fn new(
        offline_params: OfflineAlgParams,
        env: Box<dyn VecEnv<OS, AS>>,
        agent: A,
        buffer: ReplayBuffer<OS, AS>,
        logger: Box<dyn Logger>,
        eval_cfg: EvalConfig,
        train_device: B::Device,
    ) -> Self {
        Self {
            offline_params,
            env,
            eval_env: None,
            agent,
            buffer,
            logger,
            callbacks: Vec::new(),
            eval_cfg,
            train_device,
            num_timesteps: 0,
            interrupt: None,
            best_model_path: None,
            best_mean_reward: f32::NEG_INFINITY,
        }
    }

    pub fn with_eval_env(mut self, eval_env: Box<dyn Env<OS, AS>>) -> Self {
        self.eval_env = Some(eval_env);
        self
    }

    pub fn with_callback(mut self, callback: Box<dyn Callback<A, B, OS, AS>>) -> Self {
        self.callbacks.push(callback);
        self
    }

    /// Training stops at the next step boundary once `flag` is raised.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    /// Where to save the agent whenever evaluation finds a new best mean reward.
    pub fn with_best_model_path(mut self, path: PathBuf) -> Self {
        self.best_model_path = Some(path);
        self
    }

    pub fn best_mean_reward(&self) -> Option<f32> {
        self.best_mean_reward
            .is_finite()
            .then_some(self.best_mean_reward)
    }

    fn interrupted(&self) -> bool {
        self.interrupt
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    fn evaluate(&mut self) -> Result<(), TrainError> {
        let Some(eval_env) = self.eval_env.as_mut() else {
            return Ok(());
        };

        let res = evaluate_policy::<B, A, OS, AS>(
            &self.agent,
            eval_env.as_mut(),
            &self.eval_cfg,
            &self.train_device,
        )?;

        tracing::info!(
            step = self.num_timesteps,
            mean_reward = res.mean_reward,
            std_reward = res.std_reward,
            "evaluation finished"
        );

        if res.mean_reward > self.best_mean_reward {
            self.best_mean_reward = res.mean_reward;

            if let Some(path) = &self.best_model_path {
                tracing::info!("new best mean reward, saving model to {}", path.display());
                self.agent.save(path)?;
            }
        }

        let log = LogItem::from(res).push(
            "global_step".to_string(),
            LogData::Int(self.num_timesteps as i32),
        );
        self.logger.log(log);

        Ok(())
    }

    pub fn train(&mut self) -> Result<TrainOutcome, TrainError> {
        tracing::info!("Starting training...");

        for cb in &self.callbacks {
            cb.on_training_start(self)?;
        }

        let evaluating = self.offline_params.evaluate_during_training && self.eval_env.is_some();

        if evaluating && self.offline_params.eval_at_start_of_training {
            self.evaluate()?;
        }

        let n_envs = self.env.num_envs();
        let n_steps = self.offline_params.n_steps;
        let mut action_space = self.env.action_space();

        let mut states = self.env.reset(self.offline_params.seed)?;
        let mut ep_rewards = vec![0.0; n_envs];
        let mut ep_lens = vec![0usize; n_envs];
        let mut ep_starts = vec![time::Instant::now(); n_envs];
        let mut running_loss = Vec::new();
        let mut episodes = 0;
        let mut last_act_log = LogItem::default();
        let mut next_eval = self.offline_params.evaluate_every_steps;

        let progress = ProgressBar::new(n_steps as u64).with_style(
            ProgressStyle::default_bar()
                .template("{pos:>7}/{len:7} {bar} [{elapsed_precise}], eta: [{eta}]")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        let mut outcome = TrainOutcome::Completed;

        while self.num_timesteps < n_steps {
            if self.interrupted() {
                tracing::warn!(step = self.num_timesteps, "training interrupted");
                outcome = TrainOutcome::Interrupted;
                break;
            }

            let global_frac = self.num_timesteps as f32 / n_steps as f32;
            let warming_up = self.num_timesteps < self.offline_params.warmup_steps;

            let actions: Vec<AS> = states
                .iter()
                .map(|s| {
                    if warming_up {
                        action_space.sample()
                    } else {
                        let (a, log) = self.agent.act(global_frac, s, false, &self.train_device);
                        last_act_log = log;
                        a
                    }
                })
                .collect();

            let step_res = self.env.step(actions.clone())?;

            if self.offline_params.render && self.env.renderable() {
                self.env.render();
            }

            for i in 0..n_envs {
                // after an autoreset the transition must end on the
                // episode's own last observation
                let next_state = step_res.final_obs[i]
                    .clone()
                    .unwrap_or_else(|| step_res.obs[i].clone());

                self.buffer.add(
                    states[i].clone(),
                    actions[i].clone(),
                    next_state,
                    step_res.reward[i],
                    step_res.terminated[i],
                    step_res.truncated[i],
                );

                ep_rewards[i] += step_res.reward[i];
                ep_lens[i] += 1;

                if step_res.done(i) {
                    let ep_secs = ep_starts[i].elapsed().as_secs_f32();
                    let mut log = LogItem::default()
                        .push(
                            "global_step".to_string(),
                            LogData::Int((self.num_timesteps + i) as i32),
                        )
                        .push("ep_num".to_string(), LogData::Int(episodes))
                        .push("mean_loss".to_string(), LogData::Float(mean(&running_loss)))
                        .push("ep_reward".to_string(), LogData::Float(ep_rewards[i]))
                        .push("ep_len".to_string(), LogData::Int(ep_lens[i] as i32))
                        .push(
                            "ep_fps".to_string(),
                            LogData::Float(ep_lens[i] as f32 / ep_secs.max(f32::EPSILON)),
                        )
                        .push("env_idx".to_string(), LogData::Int(i as i32));

                    if let Some(eps) = last_act_log.get("eps") {
                        log = log.push("eps".to_string(), eps.clone());
                    }

                    tracing::debug!(env = i, "episode finished: {log}");
                    self.logger.log(log);

                    episodes += 1;
                    ep_rewards[i] = 0.0;
                    ep_lens[i] = 0;
                    ep_starts[i] = time::Instant::now();
                    running_loss.clear();
                }
            }

            states = step_res.obs;

            let prev_timesteps = self.num_timesteps;
            self.num_timesteps += n_envs;
            progress.inc(n_envs as u64);

            let crossed = |every: usize| every > 0 && prev_timesteps / every != self.num_timesteps / every;

            if !warming_up
                && self.buffer.curr_len() >= self.offline_params.batch_size
                && crossed(self.offline_params.train_every)
            {
                for _ in 0..self.offline_params.grad_steps {
                    let (loss, log) = self.agent.train_step(
                        self.num_timesteps,
                        &self.buffer,
                        &self.offline_params,
                        &self.train_device,
                    )?;

                    if let Some(l) = loss {
                        running_loss.push(l);
                    }

                    tracing::trace!("train step: {log}");
                }
            }

            if evaluating && self.num_timesteps >= next_eval {
                self.evaluate()?;
                next_eval = self.num_timesteps + self.offline_params.evaluate_every_steps;
            }

            for cb in &self.callbacks {
                cb.on_step(self, self.num_timesteps)?;
            }
        }

        progress.finish();

        if evaluating
            && self.offline_params.eval_at_end_of_training
            && outcome == TrainOutcome::Completed
        {
            self.evaluate()?;
        }

        tracing::info!(
            steps = self.num_timesteps,
            episodes,
            "Training complete. Handling end-of-training procedures..."
        );

        for cb in &self.callbacks {
            cb.on_training_end(self)?;
        }

        self.logger
            .dump()
            .map_err(|e| TrainError::Log(e.to_string()))?;

        Ok(outcome)
    }
}
