pub mod base_env;
pub mod dummy_vec_env;
pub mod subproc_vec_env;
