pub mod config;
pub mod error;

pub use config::{load_dotenv, write_json, Config, SchedulerConfig};
pub use error::*;
