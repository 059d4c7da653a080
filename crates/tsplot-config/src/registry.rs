use parking_lot::Mutex;
use std::{
    any::{type_name, Any, TypeId},
    collections::HashMap,
    sync::Arc,
};
use thiserror::Error;
use tsplot_error::{CacheError, ErrorCode};

/// Marker for types that may be stored in a [`Registry`].
///
/// Values are cloned on retrieval, so store cheaply-cloneable, internally
/// shared types (`Arc<Inner>`-style) rather than large owned state.
pub trait Injectable: Any + Send + Sync + Clone {}

#[derive(Default)]
pub struct Registry {
    storage: Arc<Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>>,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("type [{0}] not found in the registry")]
    TypeNotFound(String),
}

impl CacheError for RegistryError {
    fn code(&self) -> ErrorCode {
        ErrorCode::NotFound
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            storage: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn register<T: Injectable>(&self, value: T) {
        let mut storage = self.storage.lock();
        storage.insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn get<T: Injectable>(&self) -> Result<T, RegistryError> {
        let storage = self.storage.lock();
        storage
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref::<T>())
            .cloned()
            .ok_or_else(|| RegistryError::TypeNotFound(type_name::<T>().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct Widget(u32);
    impl Injectable for Widget {}

    #[test]
    fn round_trips_a_registered_value() {
        let registry = Registry::new();
        registry.register(Widget(7));
        assert_eq!(registry.get::<Widget>().unwrap().0, 7);
    }

    #[test]
    fn missing_type_is_not_found() {
        let registry = Registry::new();
        let err = registry.get::<Widget>().unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }
}
