use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use starship_rl::{
    common::{
        agent::Agent,
        algorithm::{OfflineAlgParams, OfflineTrainer, TrainOutcome},
        buffer::ReplayBuffer,
        eval::EvalConfig,
        logger::{CsvLogger, Logger},
        spaces::Space,
    },
    dqn::DQNConfig,
    env::{
        base::Env,
        starship::{protocol::StarshipAction, resolve_game_path, StarshipConfig, StarshipEnv},
    },
    run::{build_agent, make_vec_env, TrainingBackend},
};

#[derive(Parser)]
#[command(name = "smoke", version, about = "Manual checks against a real game build")]
struct Cli {
    #[command(subcommand)]
    check: Check,

    #[arg(long, global = true, default_value_t = 5555)]
    port: u16,

    #[arg(long, global = true, default_value_t = 2.0)]
    speed: f32,

    /// Show the game window
    #[arg(long, global = true)]
    render: bool,

    /// Game executable (defaults to $STARSHIP_GAME, then build/starship_game)
    #[arg(long, global = true)]
    game_path: Option<PathBuf>,
}

#[derive(Subcommand, Clone, Copy)]
enum Check {
    /// Reset once and take 5 random steps
    Connection,
    /// Run 5 short episodes of up to 10 steps
    Reset,
    /// 100 no-op steps must neither terminate nor truncate
    GameOver,
    /// Train for 6000 steps without stalling
    Training,
}

impl Cli {
    fn env_config(&self) -> StarshipConfig {
        StarshipConfig::new(
            resolve_game_path(self.game_path.clone())
                .to_string_lossy()
                .into_owned(),
        )
        .with_port(self.port)
        .with_speed_multiplier(self.speed)
        .with_render(self.render)
    }
}

fn check_connection(env: &mut StarshipEnv) -> Result<()> {
    let obs = env.reset(None, None)?;
    println!("Reset OK, observation has {} values", obs.len());

    let mut action_space = env.action_space();
    for step in 0..5 {
        let action = action_space.sample();
        let res = env.step(&action)?;
        println!(
            "Step {step}: action={action}, reward={:.2}, terminated={}, truncated={}",
            res.reward, res.terminated, res.truncated
        );

        if res.done() {
            break;
        }
    }

    Ok(())
}

fn check_reset(env: &mut StarshipEnv) -> Result<()> {
    let mut action_space = env.action_space();

    for episode in 0..5 {
        env.reset(None, None)?;
        if env.step_counter() != 0 {
            bail!("step counter is {} after reset", env.step_counter());
        }

        let mut total = 0.0;
        let mut steps = 0;
        for _ in 0..10 {
            let res = env.step(&action_space.sample())?;
            total += res.reward;
            steps += 1;

            if res.done() {
                break;
            }
        }

        println!("Episode {}: {steps} steps, reward {total:.2}", episode + 1);
    }

    Ok(())
}

fn check_game_over(env: &mut StarshipEnv) -> Result<()> {
    env.reset(None, None)?;
    println!("Taking NOOP actions for 100 steps; the game should not end without a collision.");

    for step in 0..100 {
        let res = env.step(&(StarshipAction::Noop as usize))?;

        if step % 10 == 0 {
            println!(
                "Step {step}: terminated={}, truncated={}, reward={:.2}",
                res.terminated, res.truncated, res.reward
            );
        }

        if res.terminated {
            bail!("game ended at step {step} with terminated=true");
        }
        if res.truncated {
            bail!("episode truncated at step {step}, well before max_steps");
        }

        thread::sleep(Duration::from_millis(10));
    }

    Ok(())
}

fn check_training(env_cfg: &StarshipConfig) -> Result<()> {
    let save_dir = PathBuf::from("models/test");
    let log_path = PathBuf::from("logs/test/progress.csv");

    let params = OfflineAlgParams::new()
        .with_n_steps(6000)
        .with_memory_size(10_000)
        .with_batch_size(64)
        .with_warmup_steps(1000)
        .with_train_every(4)
        .with_eval_at_start_of_training(false)
        .with_eval_at_end_of_training(false);

    let logger = CsvLogger::new(log_path, false, true);
    logger
        .check_can_log(true)
        .map_err(|e| anyhow::anyhow!("cannot write training log: {e}"))?;

    let device = Default::default();
    let mut trainer: OfflineTrainer<_, TrainingBackend, Vec<f32>, usize> = OfflineTrainer::new(
        params.clone(),
        make_vec_env(env_cfg, 1)?,
        build_agent(&DQNConfig::new(), &device),
        ReplayBuffer::new(params.memory_size),
        Box::new(logger),
        EvalConfig::new(),
        device,
    );

    let result = trainer.train();
    trainer.env.close();

    match result? {
        TrainOutcome::Completed => {
            std::fs::create_dir_all(&save_dir)?;
            let path = save_dir.join("starship_dqn_smoke");
            trainer
                .agent
                .save(&path)
                .map_err(|e| anyhow::anyhow!("saving {}: {e:?}", path.display()))?;
            Ok(())
        }
        TrainOutcome::Interrupted => bail!("training was interrupted"),
    }
}

fn run(cli: &Cli) -> Result<()> {
    let env_cfg = cli.env_config();

    let check: fn(&mut StarshipEnv) -> Result<()> = match cli.check {
        Check::Connection => check_connection,
        Check::Reset => check_reset,
        Check::GameOver => check_game_over,
        Check::Training => return check_training(&env_cfg),
    };

    let mut env = StarshipEnv::new(env_cfg);
    let result = check(&mut env);
    env.close();

    result
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => {
            println!("\n✅ SUCCESS");
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("\n❌ FAILED: {e:#}");
            ExitCode::FAILURE
        }
    }
}
