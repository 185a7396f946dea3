pub mod config;
pub mod error;
pub mod models;
pub mod ratelimit;
pub mod router;
pub mod session;
pub mod store;
pub mod upstream;

pub use config::AppConfig;
pub use error::ChatError;
pub use router::{run_router, RouterState};
