//! Configuration management for the traffic guard.
//! This module handles loading and managing configuration settings
//! from environment variables and configuration files.

mod settings;

pub use settings::{
    Settings, AdminConfig, JobsConfig, MetricsConfig, RedisConfig, ServerConfig, StoreBackend,
    StoreConfig,
};
