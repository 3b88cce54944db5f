pub mod config;
pub mod kernel;
pub mod services;

// Re-export specific items if needed for convenient access
pub use kernel::controller::{ControllerConfig, SessionController, SessionSnapshot};
