pub mod config;
pub mod error;
mod rowmap;
pub mod types;

pub use config::Config;
pub use error::EchowatchError;
pub use types::*;
