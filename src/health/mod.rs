pub mod server;

pub use server::{make_app, run_health_server};
