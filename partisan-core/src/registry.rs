use std::collections::HashMap;
use std::sync::Arc;

use crate::error::RegistryError;
use crate::processor::Processor;

/// Process-wide mapping from processor name to its constructor. Populated at
/// process start via explicit `register` calls - there is no reflection-based
/// discovery here, unlike the subclass/module scanning this replaces.
#[derive(Default, Clone)]
pub struct Registry {
    processors: HashMap<String, Arc<dyn Processor>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a processor instance under its class name. Fails if that name
    /// is already taken - double registration is fatal to the process.
    pub fn register(&mut self, name: impl Into<String>, processor: Arc<dyn Processor>) -> Result<(), RegistryError> {
        let name = name.into();
        if self.processors.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered(name));
        }
        self.processors.insert(name, processor);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<dyn Processor>, RegistryError> {
        self.processors
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.processors.contains_key(name)
    }
}
