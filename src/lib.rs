pub mod config;
pub mod core;
pub mod health;
pub mod observability;
pub mod scheduler;
pub mod service;
pub mod state;

pub use anyhow::{Context, Result};
