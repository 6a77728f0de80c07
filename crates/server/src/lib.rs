pub mod api;
pub mod cli;
pub mod db;
pub mod export_scheduler;
pub mod intake;
pub mod pg_store;
pub mod resume;
pub mod router;
pub mod serve;
pub mod startup;
pub mod state;

pub use router::build_router;
pub use state::AppState;
