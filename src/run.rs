//! Shared setup for the `train`, `evaluate` and `smoke` binaries.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail};
use burn::{
    backend::{ndarray::NdArrayDevice, Autodiff, NdArray},
    config::Config,
    optim::{adaptor::OptimizerAdaptor, Adam, AdamConfig},
};

use crate::{
    common::{
        algorithm::OfflineAlgParams,
        spaces::{BoxSpace, Discrete},
        vec_env::{
            base_env::VecEnv,
            dummy_vec_env::DummyVecEnv,
            subproc_vec_env::{SendEnv, SubProcVecEnv},
        },
    },
    dqn::{load_q_net, module::LinearDQNNet, DQNAgent, DQNConfig},
    env::{
        base::{Env, EnvError},
        starship::{observation::OBS_SIZE, protocol::StarshipAction, StarshipConfig, StarshipEnv},
    },
};

pub type TrainingBackend = Autodiff<NdArray>;
pub type StarshipQNet = LinearDQNNet<TrainingBackend>;
pub type StarshipOptim = OptimizerAdaptor<Adam<NdArray>, StarshipQNet, TrainingBackend>;
pub type StarshipAgent = DQNAgent<TrainingBackend, StarshipQNet, StarshipOptim>;

pub const MODEL_PREFIX: &str = "starship_dqn";
pub const RUN_CONFIG_FILE: &str = "config.json";

/// Everything that defines a training run, written next to the models.
#[derive(Config)]
pub struct RunConfig {
    pub env: StarshipConfig,
    pub dqn: DQNConfig,
    pub offline: OfflineAlgParams,
    #[config(default = 1)]
    pub n_envs: usize,
    #[config(default = 10000)]
    pub checkpoint_freq: usize,
    /// port of the evaluation game, when evaluating during training
    pub eval_port: Option<u16>,
}

impl RunConfig {
    /// Ports used by the training games. May run past the last valid port;
    /// `validate` rejects that.
    pub fn train_ports(&self) -> std::ops::Range<usize> {
        let base = self.env.port as usize;
        base..base.saturating_add(self.n_envs)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.n_envs == 0 {
            bail!("at least one environment is required");
        }

        if self.train_ports().end - 1 > u16::MAX as usize {
            bail!(
                "{} environments starting at port {} run past port {}",
                self.n_envs,
                self.env.port,
                u16::MAX
            );
        }

        if let Some(eval_port) = self.eval_port {
            if self.train_ports().contains(&(eval_port as usize)) {
                bail!(
                    "evaluation port {eval_port} collides with training ports {:?}",
                    self.train_ports()
                );
            }
        }

        if self.offline.batch_size > self.offline.memory_size {
            bail!(
                "batch size {} is larger than the replay buffer ({})",
                self.offline.batch_size,
                self.offline.memory_size
            );
        }

        Ok(())
    }
}

pub fn build_agent(dqn: &DQNConfig, device: &NdArrayDevice) -> StarshipAgent {
    let q = StarshipQNet::init(device, OBS_SIZE, StarshipAction::COUNT, dqn.hidden_size);
    agent_from_net(q, dqn.clone())
}

fn agent_from_net(q: StarshipQNet, dqn: DQNConfig) -> StarshipAgent {
    DQNAgent::new(
        q,
        AdamConfig::new().init(),
        dqn,
        Box::new(BoxSpace::unbounded(OBS_SIZE)),
        Box::new(Discrete::from(StarshipAction::COUNT)),
    )
}

/// Loads a saved agent. The recorder appends `.mpk`, so both `model` and
/// `model.mpk` are accepted.
pub fn load_agent(
    model_path: &Path,
    dqn: &DQNConfig,
    device: &NdArrayDevice,
) -> anyhow::Result<StarshipAgent> {
    let path = if model_path.extension().is_some_and(|e| e == "mpk") {
        model_path.with_extension("")
    } else {
        model_path.to_path_buf()
    };

    let q = StarshipQNet::init(device, OBS_SIZE, StarshipAction::COUNT, dqn.hidden_size);
    let q = load_q_net(q, &path, device)
        .map_err(|e| anyhow!("failed to load model from {}: {e:?}", path.display()))?;

    Ok(agent_from_net(q, dqn.clone()))
}

/// Looks for the run config saved next to a model, if any.
pub fn find_run_config(model_path: &Path) -> Option<(PathBuf, RunConfig)> {
    let path = model_path.parent()?.join(RUN_CONFIG_FILE);
    let cfg = RunConfig::load(&path).ok()?;

    Some((path, cfg))
}

/// One game per environment on consecutive ports; threaded when there is
/// more than one.
pub fn make_vec_env(
    env: &StarshipConfig,
    n_envs: usize,
) -> Result<Box<dyn VecEnv<Vec<f32>, usize>>, EnvError> {
    let configs = env.for_instances(n_envs)?;

    if n_envs == 1 {
        let envs: Vec<Box<dyn Env<Vec<f32>, usize>>> = configs
            .into_iter()
            .map(|c| -> Box<dyn Env<Vec<f32>, usize>> { Box::new(StarshipEnv::new(c)) })
            .collect();
        Ok(Box::new(DummyVecEnv::new(envs)))
    } else {
        let envs: Vec<SendEnv<Vec<f32>, usize>> = configs
            .into_iter()
            .map(|c| -> SendEnv<Vec<f32>, usize> { Box::new(StarshipEnv::new(c)) })
            .collect();
        Ok(Box::new(SubProcVecEnv::new(envs)))
    }
}

#[cfg(test)]
mod test {
    use burn::config::Config;

    use crate::{
        common::algorithm::OfflineAlgParams,
        dqn::DQNConfig,
        env::starship::{StarshipConfig, DEFAULT_GAME_PATH},
    };

    use super::RunConfig;

    fn run_config() -> RunConfig {
        RunConfig::new(
            StarshipConfig::new(DEFAULT_GAME_PATH.to_string()),
            DQNConfig::new(),
            OfflineAlgParams::new(),
        )
    }

    #[test]
    fn test_eval_port_must_not_collide() {
        let cfg = run_config().with_n_envs(2).with_eval_port(Some(5556));
        assert!(cfg.validate().is_err());

        let cfg = run_config().with_n_envs(1).with_eval_port(Some(5556));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_ports_must_fit_below_65536() {
        let mut cfg = run_config().with_eval_port(Some(5556));
        cfg.env.port = u16::MAX;
        assert!(cfg.validate().is_ok());

        let cfg = cfg.with_n_envs(2);
        assert!(cfg.validate().is_err());

        let mut cfg = run_config().with_n_envs(usize::MAX);
        cfg.env.port = 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_run_config_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let cfg = run_config().with_n_envs(3).with_checkpoint_freq(500);

        cfg.save(&path).unwrap();
        let loaded = RunConfig::load(&path).unwrap();

        assert_eq!(loaded.n_envs, 3);
        assert_eq!(loaded.checkpoint_freq, 500);
        assert_eq!(loaded.env.port, 5555);
        assert_eq!(loaded.dqn.hidden_size, cfg.dqn.hidden_size);
    }
}
