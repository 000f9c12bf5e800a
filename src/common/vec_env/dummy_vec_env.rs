use crate::{
    common::{
        spaces::Space,
        vec_env::base_env::{VecEnv, VecEnvObservation},
    },
    env::base::{Env, EnvError},
};

/// Steps each environment in turn on the calling thread.
pub struct DummyVecEnv<O, A> {
    envs: Vec<Box<dyn Env<O, A>>>,
    cached_obs: Option<VecEnvObservation<O>>,
}

impl<O, A> DummyVecEnv<O, A> {
    pub fn new(envs: Vec<Box<dyn Env<O, A>>>) -> Self {
        assert!(!envs.is_empty(), "DummyVecEnv needs at least one environment");

        Self {
            envs,
            cached_obs: None,
        }
    }
}

impl<O: Clone, A: Clone> VecEnv<O, A> for DummyVecEnv<O, A> {
    fn step_async(&mut self, actions: Vec<A>) -> Result<(), EnvError> {
        assert_eq!(
            actions.len(),
            self.envs.len(),
            "Wrong amount of actions! Got {}, expecting {}",
            actions.len(),
            self.envs.len()
        );

        let mut new_obs = Vec::with_capacity(self.envs.len());
        let mut final_obs = Vec::with_capacity(self.envs.len());

        for (env, a) in self.envs.iter_mut().zip(actions.iter()) {
            let mut obs = env.step(a)?;

            if obs.done() {
                let next = env.reset(None, None)?;
                final_obs.push(Some(std::mem::replace(&mut obs.obs, next)));
            } else {
                final_obs.push(None);
            }

            new_obs.push(obs);
        }

        self.cached_obs = Some(VecEnvObservation::new(new_obs, final_obs));

        Ok(())
    }

    fn step_wait(&mut self) -> Result<VecEnvObservation<O>, EnvError> {
        self.cached_obs.take().ok_or(EnvError::ResetNeeded)
    }

    fn reset(&mut self, seed: Option<u64>) -> Result<Vec<O>, EnvError> {
        self.envs
            .iter_mut()
            .enumerate()
            .map(|(i, e)| e.reset(seed.map(|s| s + i as u64), None))
            .collect()
    }

    fn num_envs(&self) -> usize {
        self.envs.len()
    }

    fn action_space(&self) -> Box<dyn Space<A>> {
        self.envs[0].action_space()
    }

    fn observation_space(&self) -> Box<dyn Space<O>> {
        self.envs[0].observation_space()
    }

    fn render(&self) {
        self.envs[0].render()
    }

    fn renderable(&self) -> bool {
        self.envs[0].renderable()
    }

    fn close(&mut self) {
        self.envs.iter_mut().for_each(|e| e.close());
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        common::vec_env::{
            base_env::VecEnv, dummy_vec_env::DummyVecEnv, test_utils::CountdownEnv,
        },
        env::base::Env,
    };

    #[test]
    fn test_dummy_basic() {
        let envs: Vec<Box<dyn Env<Vec<f32>, usize>>> = vec![
            Box::new(CountdownEnv::new(3)),
            Box::new(CountdownEnv::new(5)),
        ];

        let mut vec_env = DummyVecEnv::new(envs);

        let reset_obs = vec_env.reset(None).unwrap();
        assert_eq!(reset_obs, vec![vec![3.0], vec![5.0]]);

        for step in 1..=6 {
            let obs = vec_env.step(vec![0, 0]).unwrap();
            assert_eq!(obs.len(), 2);

            if step == 3 {
                assert!(obs.done(0));
                assert_eq!(obs.final_obs[0], Some(vec![0.0]));
                assert_eq!(obs.obs[0], vec![3.0]);
            } else {
                assert!(obs.final_obs[0].is_none() || step == 6);
            }
        }

        vec_env.close();
    }
}
