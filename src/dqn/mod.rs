use std::{marker::PhantomData, path::Path};

use burn::{
    config::Config,
    module::AutodiffModule,
    nn::loss::{MseLoss, Reduction},
    optim::{GradientsParams, Optimizer},
    record::{FullPrecisionSettings, NamedMpkFileRecorder, RecorderError},
    tensor::{backend::AutodiffBackend, ElementConversion, Int, Tensor},
};
use module::DQNNet;

use crate::common::{
    agent::Agent,
    algorithm::OfflineAlgParams,
    buffer::{BufferError, ReplayBuffer},
    logger::{LogData, LogItem},
    spaces::Space,
    to_tensor::{ToTensorF, ToTensorI},
    utils::linear_decay,
};

pub mod module;

pub type ModelRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

#[derive(Config)]
pub struct DQNConfig {
    #[config(default = 1.0)]
    pub eps_start: f32,
    #[config(default = 0.05)]
    pub eps_end: f32,
    /// fraction of training over which epsilon decays to `eps_end`
    #[config(default = 0.1)]
    pub eps_end_frac: f32,
    /// global steps between hard copies of the online net into the target net
    #[config(default = 1000)]
    pub target_update_every: usize,
    #[config(default = 256)]
    pub hidden_size: usize,
}

pub struct DQNAgent<B, Q, O>
where
    B: AutodiffBackend,
    Q: DQNNet<B> + AutodiffModule<B>,
    O: Optimizer<Q, B>,
{
    pub q1: Q,
    pub q2: Q,
    pub optim: O,
    pub config: DQNConfig,
    pub last_update: usize,
    observation_space: Box<dyn Space<Vec<f32>>>,
    action_space: Box<dyn Space<usize>>,
    _backend: PhantomData<B>,
}

impl<B, Q, O> DQNAgent<B, Q, O>
where
    B: AutodiffBackend,
    Q: DQNNet<B> + AutodiffModule<B>,
    O: Optimizer<Q, B>,
{
    pub fn new(
        q: Q,
        optim: O,
        config: DQNConfig,
        observation_space: Box<dyn Space<Vec<f32>>>,
        action_space: Box<dyn Space<usize>>,
    ) -> Self {
        Self {
            q2: q.clone().no_grad(),
            q1: q,
            optim,
            config,
            last_update: 0,
            observation_space,
            action_space,
            _backend: PhantomData,
        }
    }

    fn greedy_action(&self, obs: &[f32], device: &B::Device) -> usize {
        let q: Tensor<B, 2> = self.q1.forward(vec![obs.to_vec()].to_tensor(device));
        q.argmax(1).into_scalar().elem::<i64>() as usize
    }
}

/// Loads weights saved by [`Agent::save`] into `q`.
pub fn load_q_net<B, Q>(q: Q, path: &Path, device: &B::Device) -> Result<Q, RecorderError>
where
    B: AutodiffBackend,
    Q: DQNNet<B> + AutodiffModule<B>,
{
    q.load_file(path.to_path_buf(), &ModelRecorder::new(), device)
}

impl<B, Q, O> Agent<B, Vec<f32>, usize> for DQNAgent<B, Q, O>
where
    B: AutodiffBackend,
    Q: DQNNet<B> + AutodiffModule<B>,
    O: Optimizer<Q, B>,
{
    fn act(
        &self,
        global_frac: f32,
        obs: &Vec<f32>,
        greedy: bool,
        device: &B::Device,
    ) -> (usize, LogItem) {
        let eps = if greedy {
            0.0
        } else {
            linear_decay(
                global_frac,
                self.config.eps_start,
                self.config.eps_end,
                self.config.eps_end_frac,
            )
        };

        let a = if rand::random::<f32>() >= eps {
            self.greedy_action(obs, device)
        } else {
            self.action_space.clone().sample()
        };

        let log = LogItem::default()
            .push("eps".to_string(), LogData::Float(eps))
            .push("action".to_string(), LogData::Int(a as i32));

        (a, log)
    }

    fn train_step(
        &mut self,
        global_step: usize,
        replay_buffer: &ReplayBuffer<Vec<f32>, usize>,
        offline_params: &OfflineAlgParams,
        train_device: &B::Device,
    ) -> Result<(Option<f32>, LogItem), BufferError> {
        let sample = replay_buffer.batch_sample(offline_params.batch_size)?;

        let states: Tensor<B, 2> = sample.states.to_tensor(train_device);
        let actions: Tensor<B, 2, Int> = sample.actions.to_tensor(train_device).unsqueeze_dim(1);
        let next_states: Tensor<B, 2> = sample.next_states.to_tensor(train_device);
        let rewards: Tensor<B, 2> = sample.rewards.to_tensor(train_device).unsqueeze_dim(1);

        // only a true terminal state cuts the bootstrap; a truncated
        // episode could have continued
        let not_terminal: Vec<f32> = sample
            .terminated
            .iter()
            .map(|&t| if t { 0.0 } else { 1.0 })
            .collect();
        let not_terminal: Tensor<B, 2> = not_terminal.to_tensor(train_device).unsqueeze_dim(1);

        let q_vals = self.q1.forward(states).gather(1, actions);
        let next_q_vals = self.q2.forward(next_states).max_dim(1).detach();

        let targets = rewards.add(
            not_terminal
                .mul(next_q_vals)
                .mul_scalar(offline_params.gamma),
        );

        let loss = MseLoss::new().forward(q_vals, targets, Reduction::Mean);

        let grads = GradientsParams::from_grads(loss.backward(), &self.q1);
        self.q1 = self.optim.step(offline_params.lr, self.q1.clone(), grads);

        if global_step >= self.last_update + self.config.target_update_every {
            // hard update
            self.q2 = self.q1.clone().no_grad();
            self.last_update = global_step;
        }

        let loss: f32 = loss.into_scalar().elem();

        Ok((
            Some(loss),
            LogItem::default().push("loss".to_string(), LogData::Float(loss)),
        ))
    }

    fn save(&self, path: &Path) -> Result<(), RecorderError> {
        self.q1
            .clone()
            .save_file(path.to_path_buf(), &ModelRecorder::new())
    }

    fn observation_space(&self) -> Box<dyn Space<Vec<f32>>> {
        self.observation_space.clone()
    }

    fn action_space(&self) -> Box<dyn Space<usize>> {
        self.action_space.clone()
    }
}
