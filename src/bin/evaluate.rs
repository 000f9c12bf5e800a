use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use starship_rl::{
    common::eval::{run_episode, EvalConfig, EvalResult},
    dqn::DQNConfig,
    env::{
        base::Env,
        starship::{resolve_game_path, StarshipConfig, StarshipEnv},
    },
    run::{find_run_config, load_agent, StarshipAgent, TrainingBackend},
};

#[derive(Parser, Debug)]
#[command(name = "evaluate", version, about = "Evaluate a trained starship agent")]
struct Args {
    /// Path to a saved model (with or without the .mpk extension)
    model_path: PathBuf,

    #[arg(long, default_value_t = 10)]
    episodes: usize,

    /// Run the game headless
    #[arg(long)]
    no_render: bool,

    /// Keep exploring with the final epsilon instead of acting greedily
    #[arg(long)]
    stochastic: bool,

    /// Play episodes until Ctrl-C
    #[arg(long)]
    interactive: bool,

    #[arg(long, default_value_t = 5555)]
    port: u16,

    #[arg(long, default_value_t = 2.0)]
    speed: f32,

    /// Hidden layer width, used when no config.json sits next to the model
    #[arg(long, default_value_t = 256)]
    hidden_size: usize,

    /// Game executable (defaults to $STARSHIP_GAME, then build/starship_game)
    #[arg(long)]
    game_path: Option<PathBuf>,
}

fn rule() {
    println!("{}", "=".repeat(60));
}

fn play_interactive(
    agent: &StarshipAgent,
    env: &mut StarshipEnv,
    interrupt: &AtomicBool,
) -> Result<()> {
    let cfg = EvalConfig::new();
    let device = Default::default();

    println!("\nStarting interactive play. Press Ctrl+C to stop.\n");

    while let Some(stats) = run_episode::<TrainingBackend, StarshipAgent, Vec<f32>, usize>(
        agent,
        env,
        &cfg,
        &device,
        Some(interrupt),
    )? {
        println!("Episode finished. Total reward: {:.2}", stats.reward);
    }

    println!("\nInteractive play stopped by user.");
    Ok(())
}

fn evaluate(
    agent: &StarshipAgent,
    env: &mut StarshipEnv,
    episodes: usize,
    deterministic: bool,
    interrupt: &AtomicBool,
) -> Result<Option<EvalResult>> {
    let cfg = EvalConfig::new()
        .with_n_eval_episodes(episodes)
        .with_deterministic(deterministic);
    let device = Default::default();

    let mut rewards = Vec::with_capacity(episodes);
    let mut lengths = Vec::with_capacity(episodes);

    println!("\nRunning {episodes} evaluation episodes...\n");

    for ep in 0..episodes {
        let Some(stats) = run_episode::<TrainingBackend, StarshipAgent, Vec<f32>, usize>(
            agent,
            env,
            &cfg,
            &device,
            Some(interrupt),
        )?
        else {
            println!("\nEvaluation interrupted by user.");
            break;
        };

        println!(
            "Episode {}/{}: Reward = {:.2}, Length = {}",
            ep + 1,
            episodes,
            stats.reward,
            stats.length
        );

        rewards.push(stats.reward);
        lengths.push(stats.length);
    }

    if rewards.is_empty() {
        return Ok(None);
    }

    Ok(Some(EvalResult::from_episodes(rewards, lengths)))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let dqn = match find_run_config(&args.model_path) {
        Some((path, run)) => {
            tracing::info!("using network shape from {}", path.display());
            run.dqn
        }
        None => DQNConfig::new().with_hidden_size(args.hidden_size),
    };

    let render = args.interactive || !args.no_render;
    let deterministic = args.interactive || !args.stochastic;

    rule();
    println!("Starship RL Agent Evaluation");
    rule();
    println!("Model: {}", args.model_path.display());
    if args.interactive {
        println!("Mode: interactive");
    } else {
        println!("Episodes: {}", args.episodes);
    }
    println!("Deterministic: {deterministic}");
    rule();

    println!("\nLoading model...");
    let agent = load_agent(&args.model_path, &dqn, &Default::default())?;
    println!("Model loaded successfully!");

    let interrupt = Arc::new(AtomicBool::new(false));
    {
        let interrupt = interrupt.clone();
        ctrlc::set_handler(move || {
            interrupt.store(true, Ordering::SeqCst);
        })
        .context("installing Ctrl-C handler")?;
    }

    let env_cfg = StarshipConfig::new(
        resolve_game_path(args.game_path.clone())
            .to_string_lossy()
            .into_owned(),
    )
    .with_port(args.port)
    .with_speed_multiplier(args.speed)
    .with_render(render);
    let mut env = StarshipEnv::new(env_cfg);

    let outcome = if args.interactive {
        play_interactive(&agent, &mut env, &interrupt).map(|_| None)
    } else {
        evaluate(&agent, &mut env, args.episodes, deterministic, &interrupt)
    };

    env.close();

    if let Some(res) = outcome? {
        println!();
        rule();
        println!("Evaluation Results");
        rule();
        println!("Mean Reward: {:.2} ± {:.2}", res.mean_reward, res.std_reward);
        println!("Mean Length: {:.2} ± {:.2}", res.mean_len, res.std_len);
        println!("Min Reward: {:.2}", res.min_reward);
        println!("Max Reward: {:.2}", res.max_reward);
        rule();
    }

    Ok(())
}
