use std::{
    io,
    sync::mpsc::{self, Receiver, Sender},
    thread::{self, JoinHandle},
};

use crate::{
    common::{
        spaces::Space,
        vec_env::base_env::{VecEnv, VecEnvObservation},
    },
    env::base::{Env, EnvError, EnvObservation},
};

pub type SendEnv<O, A> = Box<dyn Env<O, A> + Send>;

enum Command<A> {
    Reset(Option<u64>),
    Step(A),
    Render,
    Close,
}

enum EnvSignal<O> {
    StepResult(Result<(EnvObservation<O>, Option<O>), EnvError>),
    ResetResult(Result<O, EnvError>),
}

fn step_and_autoreset<O, A>(
    env: &mut SendEnv<O, A>,
    action: &A,
) -> Result<(EnvObservation<O>, Option<O>), EnvError> {
    let mut obs = env.step(action)?;

    if obs.done() {
        let next = env.reset(None, None)?;
        let last = std::mem::replace(&mut obs.obs, next);
        Ok((obs, Some(last)))
    } else {
        Ok((obs, None))
    }
}

fn worker<O, A>(mut env: SendEnv<O, A>, cmd_rx: Receiver<Command<A>>, signal_tx: Sender<EnvSignal<O>>) {
    // a closed command channel means the owner is gone
    while let Ok(cmd) = cmd_rx.recv() {
        let signal = match cmd {
            Command::Reset(seed) => EnvSignal::ResetResult(env.reset(seed, None)),
            Command::Step(a) => EnvSignal::StepResult(step_and_autoreset(&mut env, &a)),
            Command::Render => {
                env.render();
                continue;
            }
            Command::Close => break,
        };

        if signal_tx.send(signal).is_err() {
            break;
        }
    }

    env.close();
}

fn worker_gone() -> EnvError {
    EnvError::Io(io::Error::new(
        io::ErrorKind::BrokenPipe,
        "environment worker thread exited",
    ))
}

/// Runs every environment on its own worker thread so that blocking
/// environment I/O overlaps across instances.
pub struct SubProcVecEnv<O, A> {
    observation_space: Box<dyn Space<O>>,
    action_space: Box<dyn Space<A>>,
    renderable: bool,

    cmd_txs: Vec<Sender<Command<A>>>,
    signal_rxs: Vec<Receiver<EnvSignal<O>>>,
    handles: Vec<JoinHandle<()>>,
}

impl<O, A> SubProcVecEnv<O, A>
where
    O: Clone + Send + 'static,
    A: Clone + Send + 'static,
{
    pub fn new(envs: Vec<SendEnv<O, A>>) -> Self {
        assert!(!envs.is_empty(), "SubProcVecEnv needs at least one environment");

        let observation_space = envs[0].observation_space();
        let action_space = envs[0].action_space();
        let renderable = envs[0].renderable();

        let mut cmd_txs = Vec::with_capacity(envs.len());
        let mut signal_rxs = Vec::with_capacity(envs.len());
        let mut handles = Vec::with_capacity(envs.len());

        for env in envs {
            let (cmd_tx, cmd_rx) = mpsc::channel::<Command<A>>();
            let (signal_tx, signal_rx) = mpsc::channel::<EnvSignal<O>>();

            handles.push(thread::spawn(move || worker(env, cmd_rx, signal_tx)));
            cmd_txs.push(cmd_tx);
            signal_rxs.push(signal_rx);
        }

        Self {
            observation_space,
            action_space,
            renderable,
            cmd_txs,
            signal_rxs,
            handles,
        }
    }
}

impl<O, A> VecEnv<O, A> for SubProcVecEnv<O, A>
where
    O: Clone + Send + 'static,
    A: Clone + Send + 'static,
{
    fn step_async(&mut self, actions: Vec<A>) -> Result<(), EnvError> {
        assert_eq!(
            actions.len(),
            self.cmd_txs.len(),
            "Wrong amount of actions! Got {}, expecting {}",
            actions.len(),
            self.cmd_txs.len()
        );

        for (tx, a) in self.cmd_txs.iter().zip(actions) {
            tx.send(Command::Step(a)).map_err(|_| worker_gone())?;
        }

        Ok(())
    }

    fn step_wait(&mut self) -> Result<VecEnvObservation<O>, EnvError> {
        let mut new_obs = Vec::with_capacity(self.signal_rxs.len());
        let mut final_obs = Vec::with_capacity(self.signal_rxs.len());
        let mut first_err = None;

        // drain every worker even after a failure so the channels stay in step
        for rx in &self.signal_rxs {
            match rx.recv() {
                Ok(EnvSignal::StepResult(Ok((obs, last)))) => {
                    new_obs.push(obs);
                    final_obs.push(last);
                }
                Ok(EnvSignal::StepResult(Err(e))) => {
                    first_err.get_or_insert(e);
                }
                Ok(EnvSignal::ResetResult(_)) | Err(_) => {
                    first_err.get_or_insert_with(worker_gone);
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(VecEnvObservation::new(new_obs, final_obs)),
        }
    }

    fn reset(&mut self, seed: Option<u64>) -> Result<Vec<O>, EnvError> {
        for (i, tx) in self.cmd_txs.iter().enumerate() {
            tx.send(Command::Reset(seed.map(|s| s + i as u64)))
                .map_err(|_| worker_gone())?;
        }

        let mut obs = Vec::with_capacity(self.signal_rxs.len());
        let mut first_err = None;

        for rx in &self.signal_rxs {
            match rx.recv() {
                Ok(EnvSignal::ResetResult(Ok(o))) => obs.push(o),
                Ok(EnvSignal::ResetResult(Err(e))) => {
                    first_err.get_or_insert(e);
                }
                Ok(EnvSignal::StepResult(_)) | Err(_) => {
                    first_err.get_or_insert_with(worker_gone);
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(obs),
        }
    }

    fn num_envs(&self) -> usize {
        self.cmd_txs.len()
    }

    fn action_space(&self) -> Box<dyn Space<A>> {
        self.action_space.clone()
    }

    fn observation_space(&self) -> Box<dyn Space<O>> {
        self.observation_space.clone()
    }

    fn render(&self) {
        if let Some(tx) = self.cmd_txs.first() {
            let _ = tx.send(Command::Render);
        }
    }

    fn renderable(&self) -> bool {
        self.renderable
    }

    fn close(&mut self) {
        for tx in &self.cmd_txs {
            let _ = tx.send(Command::Close);
        }

        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                tracing::warn!("environment worker panicked during shutdown");
            }
        }
    }
}

impl<O, A> Drop for SubProcVecEnv<O, A> {
    fn drop(&mut self) {
        for tx in &self.cmd_txs {
            let _ = tx.send(Command::Close);
        }

        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use crate::common::vec_env::{
        base_env::VecEnv,
        subproc_vec_env::{SendEnv, SubProcVecEnv},
        test_utils::CountdownEnv,
    };
    use crate::env::base::EnvError;

    #[test]
    fn test_subproc_basic() {
        let env_a = CountdownEnv::new(2);
        let env_b = CountdownEnv::new(4);
        let closed_a = env_a.closed.clone();
        let closed_b = env_b.closed.clone();

        let envs: Vec<SendEnv<Vec<f32>, usize>> = vec![Box::new(env_a), Box::new(env_b)];
        let mut vec_env = SubProcVecEnv::new(envs);

        assert_eq!(vec_env.num_envs(), 2);
        assert_eq!(vec_env.reset(Some(7)).unwrap(), vec![vec![2.0], vec![4.0]]);

        let first = vec_env.step(vec![1, 1]).unwrap();
        assert_eq!(first.obs, vec![vec![1.0], vec![3.0]]);
        assert!(first.final_obs.iter().all(|o| o.is_none()));

        let second = vec_env.step(vec![0, 0]).unwrap();
        assert!(second.done(0));
        assert!(!second.done(1));
        assert_eq!(second.final_obs[0], Some(vec![0.0]));
        assert_eq!(second.obs[0], vec![2.0]);

        vec_env.close();
        vec_env.close();

        assert_eq!(closed_a.load(Ordering::SeqCst), 1);
        assert_eq!(closed_b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subproc_propagates_env_errors() {
        let envs: Vec<SendEnv<Vec<f32>, usize>> =
            vec![Box::new(CountdownEnv::new(3)), Box::new(CountdownEnv::new(3))];
        let mut vec_env = SubProcVecEnv::new(envs);

        vec_env.reset(None).unwrap();

        let res = vec_env.step(vec![0, 9]);
        assert!(matches!(res, Err(EnvError::InvalidAction(9))));

        // both workers answered, so the next step lines up again
        let res = vec_env.step(vec![0, 0]).unwrap();
        assert_eq!(res.obs, vec![vec![1.0], vec![2.0]]);
    }
}
