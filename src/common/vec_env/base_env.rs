use crate::{
    common::spaces::Space,
    env::base::{EnvError, EnvObservation, Info},
};

#[derive(Clone, Debug)]
pub struct VecEnvObservation<O> {
    pub obs: Vec<O>,
    pub reward: Vec<f32>,
    pub terminated: Vec<bool>,
    pub truncated: Vec<bool>,
    pub info: Vec<Info<O>>,
    /// Last observation of an episode that finished on this step. The
    /// matching entry of `obs` is already the first observation of the
    /// next episode.
    pub final_obs: Vec<Option<O>>,
}

impl<O> VecEnvObservation<O> {
    pub fn new(obs_vec: Vec<EnvObservation<O>>, final_obs: Vec<Option<O>>) -> Self {
        let n = obs_vec.len();
        let mut obs = Vec::with_capacity(n);
        let mut reward = Vec::with_capacity(n);
        let mut terminated = Vec::with_capacity(n);
        let mut truncated = Vec::with_capacity(n);
        let mut info = Vec::with_capacity(n);

        for o in obs_vec {
            obs.push(o.obs);
            reward.push(o.reward);
            terminated.push(o.terminated);
            truncated.push(o.truncated);
            info.push(o.info);
        }

        Self {
            obs,
            reward,
            terminated,
            truncated,
            info,
            final_obs,
        }
    }

    pub fn len(&self) -> usize {
        self.obs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.obs.is_empty()
    }

    pub fn done(&self, idx: usize) -> bool {
        self.terminated[idx] | self.truncated[idx]
    }
}

/// A batch of environments stepped together. Finished environments are
/// reset automatically.
pub trait VecEnv<O, A> {
    fn step(&mut self, actions: Vec<A>) -> Result<VecEnvObservation<O>, EnvError> {
        self.step_async(actions)?;
        self.step_wait()
    }
    fn step_async(&mut self, actions: Vec<A>) -> Result<(), EnvError>;
    fn step_wait(&mut self) -> Result<VecEnvObservation<O>, EnvError>;
    /// Resets every environment. With a seed, environment `i` receives `seed + i`.
    fn reset(&mut self, seed: Option<u64>) -> Result<Vec<O>, EnvError>;
    fn num_envs(&self) -> usize;
    fn action_space(&self) -> Box<dyn Space<A>>;
    fn observation_space(&self) -> Box<dyn Space<O>>;
    fn render(&self);
    fn renderable(&self) -> bool;
    fn close(&mut self);
}
