pub mod common;
pub mod dqn;
pub mod env;
pub mod run;
