pub mod agent;
pub mod algorithm;
pub mod buffer;
pub mod callback;
pub mod eval;
pub mod logger;
pub mod spaces;
pub mod to_tensor;
pub mod utils;
pub mod vec_env;
