pub mod anomaly;
pub mod classify;
pub mod cli;
pub mod config;
pub mod escalate;
pub mod lab;
pub mod liveness;
pub mod source;
