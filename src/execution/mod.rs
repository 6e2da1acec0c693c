pub mod executor;
pub mod risk;
pub mod simulator;
pub mod types;
