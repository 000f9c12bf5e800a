use std::fs;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::{Context, Result};
use burn::config::Config;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use starship_rl::{
    common::{
        agent::Agent,
        algorithm::{OfflineAlgParams, OfflineTrainer, TrainOutcome},
        buffer::ReplayBuffer,
        callback::CheckpointCallback,
        eval::EvalConfig,
        logger::{CsvLogger, Logger},
        spaces::seed_spaces_rng,
    },
    dqn::DQNConfig,
    env::starship::{resolve_game_path, StarshipConfig, StarshipEnv},
    run::{build_agent, make_vec_env, RunConfig, TrainingBackend, MODEL_PREFIX, RUN_CONFIG_FILE},
};

#[derive(Parser, Debug)]
#[command(name = "train", version, about = "Train a DQN agent on the starship game")]
struct Args {
    /// Total training timesteps, summed over all environments
    #[arg(long, default_value_t = 1_000_000)]
    timesteps: usize,

    /// Learning rate
    #[arg(long, default_value_t = 1e-4)]
    lr: f64,

    /// Number of game instances stepped in parallel
    #[arg(long, default_value_t = 1)]
    n_envs: usize,

    /// Game speed multiplier
    #[arg(long, default_value_t = 2.0)]
    speed: f32,

    /// Show the game window during training
    #[arg(long)]
    render: bool,

    /// Base port; instance i listens on port + i
    #[arg(long, default_value_t = 5555)]
    port: u16,

    #[arg(long, default_value = "models")]
    save_dir: PathBuf,

    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Evaluate on a separate game instance during training and keep the best model
    #[arg(long)]
    enable_eval: bool,

    #[arg(long, default_value_t = 5556)]
    eval_port: u16,

    /// Steps between evaluations
    #[arg(long, default_value_t = 5000)]
    eval_freq: usize,

    #[arg(long, default_value_t = 5)]
    eval_episodes: usize,

    #[arg(long, default_value_t = 64)]
    batch_size: usize,

    #[arg(long, default_value_t = 100_000)]
    buffer_size: usize,

    /// Random-action steps before learning starts
    #[arg(long, default_value_t = 1000)]
    warmup_steps: usize,

    #[arg(long, default_value_t = 0.99)]
    gamma: f32,

    #[arg(long, default_value_t = 4)]
    train_every: usize,

    #[arg(long, default_value_t = 1)]
    grad_steps: usize,

    #[arg(long, default_value_t = 1000)]
    target_update_every: usize,

    #[arg(long, default_value_t = 1.0)]
    eps_start: f32,

    #[arg(long, default_value_t = 0.05)]
    eps_end: f32,

    /// Fraction of training over which epsilon decays
    #[arg(long, default_value_t = 0.1)]
    eps_end_frac: f32,

    #[arg(long, default_value_t = 256)]
    hidden_size: usize,

    /// Steps between checkpoints; 0 disables them
    #[arg(long, default_value_t = 10_000)]
    checkpoint_freq: usize,

    /// Game executable (defaults to $STARSHIP_GAME, then build/starship_game)
    #[arg(long)]
    game_path: Option<PathBuf>,

    #[arg(long)]
    seed: Option<u64>,
}

impl Args {
    fn run_config(&self) -> RunConfig {
        let env = StarshipConfig::new(
            resolve_game_path(self.game_path.clone())
                .to_string_lossy()
                .into_owned(),
        )
        .with_port(self.port)
        .with_speed_multiplier(self.speed)
        .with_render(self.render);

        let dqn = DQNConfig::new()
            .with_eps_start(self.eps_start)
            .with_eps_end(self.eps_end)
            .with_eps_end_frac(self.eps_end_frac)
            .with_target_update_every(self.target_update_every)
            .with_hidden_size(self.hidden_size);

        let offline = OfflineAlgParams::new()
            .with_n_steps(self.timesteps)
            .with_memory_size(self.buffer_size)
            .with_batch_size(self.batch_size)
            .with_warmup_steps(self.warmup_steps)
            .with_gamma(self.gamma)
            .with_lr(self.lr)
            .with_render(self.render)
            .with_evaluate_during_training(self.enable_eval)
            .with_evaluate_every_steps(self.eval_freq)
            .with_eval_at_start_of_training(false)
            .with_eval_at_end_of_training(true)
            .with_train_every(self.train_every)
            .with_grad_steps(self.grad_steps)
            .with_seed(self.seed);

        RunConfig::new(env, dqn, offline)
            .with_n_envs(self.n_envs)
            .with_checkpoint_freq(self.checkpoint_freq)
            .with_eval_port(self.enable_eval.then_some(self.eval_port))
    }
}

fn banner(title: &str) {
    println!("{}", "=".repeat(60));
    println!("{title}");
    println!("{}", "=".repeat(60));
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let cfg = args.run_config();
    cfg.validate()?;

    fs::create_dir_all(&args.save_dir)
        .with_context(|| format!("creating {}", args.save_dir.display()))?;
    fs::create_dir_all(&args.log_dir)
        .with_context(|| format!("creating {}", args.log_dir.display()))?;

    let config_path = args.save_dir.join(RUN_CONFIG_FILE);
    cfg.save(&config_path)
        .with_context(|| format!("writing {}", config_path.display()))?;

    banner("Starship RL Training with DQN");
    println!("Total timesteps: {}", cfg.offline.n_steps);
    println!("Learning rate: {}", cfg.offline.lr);
    println!("Environments: {} (ports {:?})", cfg.n_envs, cfg.train_ports());
    println!("Game: {}", cfg.env.executable);
    println!("Device: cpu (ndarray)");
    println!("Run config: {}", config_path.display());
    println!("{}", "=".repeat(60));

    if let Some(seed) = cfg.offline.seed {
        seed_spaces_rng(seed);
    }

    let interrupt = Arc::new(AtomicBool::new(false));
    {
        let interrupt = interrupt.clone();
        ctrlc::set_handler(move || {
            interrupt.store(true, Ordering::SeqCst);
        })
        .context("installing Ctrl-C handler")?;
    }

    let device = Default::default();
    let agent = build_agent(&cfg.dqn, &device);

    let logger = CsvLogger::new(args.log_dir.join("progress.csv"), false, true);
    logger
        .check_can_log(true)
        .map_err(|e| anyhow::anyhow!("cannot write training log: {e}"))?;

    let mut trainer: OfflineTrainer<_, TrainingBackend, Vec<f32>, usize> = OfflineTrainer::new(
        cfg.offline.clone(),
        make_vec_env(&cfg.env, cfg.n_envs)?,
        agent,
        ReplayBuffer::new(cfg.offline.memory_size),
        Box::new(logger),
        EvalConfig::new().with_n_eval_episodes(args.eval_episodes),
        device,
    )
    .with_interrupt(interrupt);

    if cfg.checkpoint_freq > 0 {
        trainer = trainer.with_callback(Box::new(CheckpointCallback::new(
            cfg.checkpoint_freq,
            args.save_dir.clone(),
            MODEL_PREFIX,
        )));
    }

    if let Some(eval_port) = cfg.eval_port {
        tracing::warn!(eval_port, "evaluation enabled; make sure no other game uses this port");

        let eval_env = StarshipEnv::new(cfg.env.clone().with_port(eval_port).with_render(false));
        trainer = trainer
            .with_eval_env(Box::new(eval_env))
            .with_best_model_path(args.save_dir.join("best_model"));
    }

    println!("\nStarting training...\n");
    let result = trainer.train();

    trainer.env.close();
    if let Some(eval_env) = trainer.eval_env.as_mut() {
        eval_env.close();
    }

    let name = match result {
        Ok(TrainOutcome::Completed) => format!("{MODEL_PREFIX}_final"),
        Ok(TrainOutcome::Interrupted) => {
            println!("\nTraining interrupted by user");
            format!("{MODEL_PREFIX}_interrupted")
        }
        Err(e) => return Err(e).context("training failed"),
    };

    let model_path = args.save_dir.join(name);
    trainer
        .agent
        .save(&model_path)
        .map_err(|e| anyhow::anyhow!("saving model to {}: {e:?}", model_path.display()))?;

    println!("\nModel saved to: {}.mpk", model_path.display());

    Ok(())
}
