use rand::seq::index;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("not enough samples in the replay buffer: have {available}, need {requested}")]
pub struct BufferError {
    pub available: usize,
    pub requested: usize,
}

/// Stores a batch of `ReplayBuffer<O, A>` samples
pub struct BatchedReplayBufferSlice<O, A> {
    pub states: Vec<O>,
    pub actions: Vec<A>,
    pub next_states: Vec<O>,
    pub rewards: Vec<f32>,
    pub terminated: Vec<bool>,
    pub truncated: Vec<bool>,
}

/// ReplayBuffer stores samples of training data
///
/// ReplayBuffer stores samples of training data, specifically
/// state, action, next state, reward, terminated, and truncated.
/// Once `size` samples are stored, new samples overwrite the
/// oldest ones.
pub struct ReplayBuffer<O: Clone, A: Clone> {
    states: Vec<O>,
    actions: Vec<A>,
    next_states: Vec<O>,
    rewards: Vec<f32>,
    terminated: Vec<bool>,
    truncated: Vec<bool>,

    /// stores the maximum size of the buffer
    size: usize,

    /// stores the current replace position in the circular array
    ptr: usize,
}

impl<O: Clone, A: Clone> ReplayBuffer<O, A> {
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "replay buffer size must be non-zero");

        Self {
            states: Vec::with_capacity(size),
            actions: Vec::with_capacity(size),
            next_states: Vec::with_capacity(size),
            rewards: Vec::with_capacity(size),
            terminated: Vec::with_capacity(size),
            truncated: Vec::with_capacity(size),
            size,
            ptr: 0,
        }
    }

    /// Whether the replay buffer is currently full
    pub fn full(&self) -> bool {
        self.curr_len() == self.size
    }

    /// The number of samples currently stored in the buffer
    pub fn curr_len(&self) -> usize {
        self.states.len()
    }

    /// Adds a single transition to the replay buffer
    pub fn add(
        &mut self,
        state: O,
        action: A,
        next_state: O,
        reward: f32,
        terminated: bool,
        truncated: bool,
    ) {
        if self.full() {
            self.states[self.ptr] = state;
            self.actions[self.ptr] = action;
            self.next_states[self.ptr] = next_state;
            self.rewards[self.ptr] = reward;
            self.terminated[self.ptr] = terminated;
            self.truncated[self.ptr] = truncated;
        } else {
            self.states.push(state);
            self.actions.push(action);
            self.next_states.push(next_state);
            self.rewards.push(reward);
            self.terminated.push(terminated);
            self.truncated.push(truncated);
        }

        self.ptr = (self.ptr + 1) % self.size;
    }

    /// Randomly samples `batch_size` distinct transitions from the buffer.
    ///
    /// The data is cloned out of the buffer (not removed).
    pub fn batch_sample(
        &self,
        batch_size: usize,
    ) -> Result<BatchedReplayBufferSlice<O, A>, BufferError> {
        if batch_size > self.curr_len() {
            return Err(BufferError {
                available: self.curr_len(),
                requested: batch_size,
            });
        }

        let mut rng = rand::thread_rng();
        let indices = index::sample(&mut rng, self.curr_len(), batch_size).into_vec();

        Ok(BatchedReplayBufferSlice {
            states: indices.iter().map(|&i| self.states[i].clone()).collect(),
            actions: indices.iter().map(|&i| self.actions[i].clone()).collect(),
            next_states: indices
                .iter()
                .map(|&i| self.next_states[i].clone())
                .collect(),
            rewards: indices.iter().map(|&i| self.rewards[i]).collect(),
            terminated: indices.iter().map(|&i| self.terminated[i]).collect(),
            truncated: indices.iter().map(|&i| self.truncated[i]).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::common::spaces::{BoxSpace, Discrete, Space};

    use super::{BufferError, ReplayBuffer};

    #[test]
    fn test_batch_sample_before_ready() {
        let buffer = ReplayBuffer::<Vec<f32>, usize>::new(1000);

        assert_eq!(
            buffer.batch_sample(64).err(),
            Some(BufferError {
                available: 0,
                requested: 64
            })
        );
    }

    #[test]
    fn test_batch_sample() {
        let mut observation_space = BoxSpace::from((vec![0.0; 3], vec![1.0; 3]));
        let mut action_space = Discrete::from(5);

        let mut buffer = ReplayBuffer::new(1000);

        for _ in 0..32 {
            buffer.add(
                observation_space.sample(),
                action_space.sample(),
                observation_space.sample(),
                0.5,
                false,
                false,
            );
        }

        let batch = buffer.batch_sample(4).unwrap();
        assert_eq!(batch.states.len(), 4);
        assert_eq!(batch.actions.len(), 4);
        assert!(batch.rewards.iter().all(|&r| r == 0.5));
    }

    #[test]
    fn test_full() {
        let mut buffer: ReplayBuffer<usize, usize> = ReplayBuffer::new(5);

        for _ in 0..5 {
            assert!(!buffer.full());
            buffer.add(0, 0, 0, 0.0, false, false)
        }

        assert!(buffer.full());
    }

    #[test]
    fn test_overwrites_oldest() {
        let mut buffer: ReplayBuffer<usize, usize> = ReplayBuffer::new(3);

        for i in 0..5 {
            buffer.add(i, 0, i + 1, i as f32, false, false)
        }

        assert_eq!(buffer.curr_len(), 3);

        let mut states = buffer.batch_sample(3).unwrap().states;
        states.sort();
        assert_eq!(states, vec![2, 3, 4]);
    }
}
