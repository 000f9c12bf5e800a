use std::fmt::Debug;
use std::path::PathBuf;

use burn::tensor::backend::AutodiffBackend;

use super::{
    agent::Agent,
    algorithm::{OfflineTrainer, TrainError},
};

/// Hooks called at fixed points of the training loop, so that extra
/// behaviour can be added without touching the loop itself.
pub trait Callback<A, B, OS, AS>
where
    A: Agent<B, OS, AS>,
    B: AutodiffBackend,
    OS: Clone + Debug,
    AS: Clone + Debug,
{
    fn on_training_start(&self, _trainer: &OfflineTrainer<A, B, OS, AS>) -> Result<(), TrainError> {
        Ok(())
    }

    /// Called after every vectorised step. `step` counts environment
    /// steps over all environments.
    fn on_step(&self, _trainer: &OfflineTrainer<A, B, OS, AS>, _step: usize) -> Result<(), TrainError> {
        Ok(())
    }

    fn on_training_end(&self, _trainer: &OfflineTrainer<A, B, OS, AS>) -> Result<(), TrainError> {
        Ok(())
    }
}

/// Saves the agent every `save_freq` environment steps to
/// `<save_dir>/<name_prefix>_<step>_steps`.
pub struct CheckpointCallback {
    pub save_freq: usize,
    pub save_dir: PathBuf,
    pub name_prefix: String,
}

impl CheckpointCallback {
    pub fn new(save_freq: usize, save_dir: PathBuf, name_prefix: impl Into<String>) -> Self {
        Self {
            save_freq,
            save_dir,
            name_prefix: name_prefix.into(),
        }
    }

    pub fn checkpoint_path(&self, step: usize) -> PathBuf {
        self.save_dir
            .join(format!("{}_{}_steps", self.name_prefix, step))
    }

    /// Whether a multiple of `save_freq` lies in `(step - stride, step]`.
    fn due(&self, step: usize, stride: usize) -> bool {
        if self.save_freq == 0 || step == 0 {
            return false;
        }

        let prev = step.saturating_sub(stride.max(1));
        prev / self.save_freq != step / self.save_freq
    }
}

impl<A, B, OS, AS> Callback<A, B, OS, AS> for CheckpointCallback
where
    A: Agent<B, OS, AS>,
    B: AutodiffBackend,
    OS: Clone + Debug,
    AS: Clone + Debug,
{
    fn on_training_start(&self, _trainer: &OfflineTrainer<A, B, OS, AS>) -> Result<(), TrainError> {
        std::fs::create_dir_all(&self.save_dir)
            .map_err(|e| TrainError::Record(format!("{}: {e}", self.save_dir.display())))
    }

    fn on_step(&self, trainer: &OfflineTrainer<A, B, OS, AS>, step: usize) -> Result<(), TrainError> {
        if !self.due(step, trainer.env.num_envs()) {
            return Ok(());
        }

        let path = self.checkpoint_path(step);
        tracing::info!("saving checkpoint to {}", path.display());
        trainer.agent.save(&path)?;

        Ok(())
    }
}
