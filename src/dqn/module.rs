use burn::{
    module::Module,
    nn,
    tensor::{activation::relu, backend::Backend, Tensor},
};

pub trait DQNNet<B: Backend>: Module<B> {
    /// Maps a `[batch, obs]` tensor to `[batch, actions]` Q-values.
    fn forward(&self, obs: Tensor<B, 2>) -> Tensor<B, 2>;
}

#[derive(Module, Debug)]
pub struct LinearDQNNet<B: Backend> {
    l1: nn::Linear<B>,
    l2: nn::Linear<B>,
    l3: nn::Linear<B>,
}

impl<B: Backend> LinearDQNNet<B> {
    pub fn init(device: &B::Device, obs_size: usize, act_size: usize, hidden_size: usize) -> Self {
        Self {
            l1: nn::LinearConfig::new(obs_size, hidden_size).init(device),
            l2: nn::LinearConfig::new(hidden_size, hidden_size).init(device),
            l3: nn::LinearConfig::new(hidden_size, act_size).init(device),
        }
    }
}

impl<B: Backend> DQNNet<B> for LinearDQNNet<B> {
    fn forward(&self, state: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = relu(self.l1.forward(state));
        let x = relu(self.l2.forward(x));
        self.l3.forward(x)
    }
}

#[cfg(test)]
mod test {
    use burn::{
        backend::NdArray,
        tensor::{Distribution, Tensor},
    };

    use super::{DQNNet, LinearDQNNet};

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let net = LinearDQNNet::<NdArray>::init(&device, 54, 5, 16);
        let batch: Tensor<NdArray, 2> = Tensor::random([3, 54], Distribution::Normal(0.0, 1.0), &device);

        assert_eq!(net.forward(batch).shape().dims, [3, 5]);
    }
}
