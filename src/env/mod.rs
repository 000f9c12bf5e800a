pub mod base;
pub mod starship;
