pub mod config;
pub mod executor;
pub mod harvest;
pub mod model;
pub mod server;
pub mod service;
pub mod traits;

// Re-export common types for convenience
pub use executor::*;
pub use model::*;
pub use service::*;
pub use traits::*;
