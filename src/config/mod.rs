//! Configuration module

pub mod settings;

pub use settings::{
    ArenaConfig, AutogenConfig, LoggingConfig, ProviderConfig, RateLimitConfig, SelectionKind,
    ServerConfig, Settings, StorageConfig, StoreConfig,
};
