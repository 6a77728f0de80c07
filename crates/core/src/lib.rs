pub mod config;
pub mod error;
pub mod registry;
pub mod submission;

pub use config::Config;
pub use error::*;
pub use registry::*;
pub use submission::*;
