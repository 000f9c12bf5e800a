use std::path::Path;

use burn::{record::RecorderError, tensor::backend::AutodiffBackend};

use super::{algorithm::OfflineAlgParams, buffer::BufferError, buffer::ReplayBuffer, logger::LogItem, spaces::Space};

/// A learning agent: picks actions, learns from a replay buffer, and
/// persists its weights.
pub trait Agent<B: AutodiffBackend, O: Clone, A: Clone> {
    /// Chooses an action for `obs`. `global_frac` is the fraction of
    /// training completed, used by exploration schedules. When `greedy`
    /// the agent exploits only.
    fn act(&self, global_frac: f32, obs: &O, greedy: bool, device: &B::Device) -> (A, LogItem);

    fn train_step(
        &mut self,
        global_step: usize,
        replay_buffer: &ReplayBuffer<O, A>,
        offline_params: &OfflineAlgParams,
        train_device: &B::Device,
    ) -> Result<(Option<f32>, LogItem), BufferError>;

    /// Saves the agent's weights. The recorder picks the file extension.
    fn save(&self, path: &Path) -> Result<(), RecorderError>;

    fn observation_space(&self) -> Box<dyn Space<O>>;

    fn action_space(&self) -> Box<dyn Space<A>>;
}
