pub mod registry;

use async_trait::async_trait;
use registry::Registry;
use thiserror::Error;
use tsplot_error::CacheError;

/// Builds a component from a plain, deserializable config value plus the
/// shared [`Registry`], mirroring how the rest of the workspace wires up
/// components that need access to sibling state (a storage handle, a
/// shared clock, ...) without threading constructor arguments everywhere.
#[async_trait]
pub trait Configurable<T, E = Box<dyn CacheError>> {
    async fn try_from_config(config: &T, registry: &Registry) -> Result<Self, E>
    where
        Self: Sized;
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl CacheError for ConfigError {
    fn code(&self) -> tsplot_error::ErrorCode {
        tsplot_error::ErrorCode::InvalidArgument
    }
}
