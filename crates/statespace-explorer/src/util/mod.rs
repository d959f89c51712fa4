pub mod config;
pub mod debounce;
pub mod ids;

pub use config::EngineConfig;
pub use debounce::Debounce;
