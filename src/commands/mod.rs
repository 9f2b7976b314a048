pub mod config;
pub mod hosts;
pub mod operation;
