pub mod analytics;
pub mod cli;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod expr;
pub mod models;
pub mod server;
pub mod services;

pub use config::Config;
pub use engine::{Engine, EvalOutput, RangeRequest};
pub use error::{AppError, Result};
