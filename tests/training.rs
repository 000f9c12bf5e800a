#![cfg(unix)]

mod common;

use burn::config::Config;
use starship_rl::{
    common::{
        algorithm::{OfflineAlgParams, OfflineTrainer, TrainOutcome},
        buffer::ReplayBuffer,
        callback::CheckpointCallback,
        eval::EvalConfig,
        logger::CsvLogger,
        vec_env::{
            base_env::VecEnv,
            subproc_vec_env::{SendEnv, SubProcVecEnv},
        },
    },
    dqn::DQNConfig,
    env::starship::{observation::OBS_SIZE, StarshipEnv},
    run::{build_agent, load_agent, make_vec_env, RunConfig, TrainingBackend, RUN_CONFIG_FILE},
};

use common::{state, FakeGame};

/// Ends the game every `every` actions on a connection.
fn episodic_game(every: usize) -> FakeGame {
    FakeGame::start(move |cmd, idx| Some(state(200.0, 2, 1.0, cmd >= 0 && idx % every == 0)))
}

#[test]
fn subproc_vec_env_autoresets_starship_games() {
    let games = [episodic_game(3), episodic_game(100)];
    let envs: Vec<SendEnv<Vec<f32>, usize>> = games
        .iter()
        .map(|g| -> SendEnv<Vec<f32>, usize> { Box::new(StarshipEnv::new(g.config())) })
        .collect();
    let mut vec_env = SubProcVecEnv::new(envs);

    let obs = vec_env.reset(None).unwrap();
    assert_eq!(obs.len(), 2);
    assert!(obs.iter().all(|o| o.len() == OBS_SIZE));

    let mut finished = 0;
    for _ in 0..6 {
        let res = vec_env.step(vec![4, 4]).unwrap();
        assert!(!res.done(1));

        if res.done(0) {
            finished += 1;
            assert!(res.final_obs[0].is_some());
        }
    }

    assert_eq!(finished, 2);
    // each finished episode restarted the first game
    assert_eq!(games[0].connections(), 3);
    assert_eq!(games[1].connections(), 1);

    vec_env.close();
}

#[test]
fn trainer_learns_against_a_fake_game() {
    let game = episodic_game(20);
    let dir = tempfile::tempdir().unwrap();
    let device = Default::default();

    let params = OfflineAlgParams::new()
        .with_n_steps(60)
        .with_memory_size(64)
        .with_batch_size(8)
        .with_warmup_steps(10)
        .with_train_every(2);
    let dqn = DQNConfig::new().with_hidden_size(16);

    let cfg = RunConfig::new(game.config(), dqn.clone(), params.clone());
    cfg.save(dir.path().join(RUN_CONFIG_FILE)).unwrap();

    let mut trainer: OfflineTrainer<_, TrainingBackend, Vec<f32>, usize> = OfflineTrainer::new(
        params.clone(),
        make_vec_env(&cfg.env, 1).unwrap(),
        build_agent(&dqn, &device),
        ReplayBuffer::new(params.memory_size),
        Box::new(CsvLogger::new(dir.path().join("progress.csv"), false, true)),
        EvalConfig::new(),
        device,
    )
    .with_callback(Box::new(CheckpointCallback::new(
        25,
        dir.path().to_path_buf(),
        "starship_dqn",
    )));

    assert_eq!(trainer.train().unwrap(), TrainOutcome::Completed);
    trainer.env.close();

    assert!(dir.path().join("progress.csv").exists());
    assert!(dir.path().join("starship_dqn_25_steps.mpk").exists());
    assert!(dir.path().join("starship_dqn_50_steps.mpk").exists());

    // checkpoints load back with the saved network shape
    let loaded = load_agent(
        &dir.path().join("starship_dqn_50_steps.mpk"),
        &dqn,
        &Default::default(),
    );
    assert!(loaded.is_ok());
}
