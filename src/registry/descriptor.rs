//! Handler deployment descriptors and the factories that resolve them.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::registry::error::HandlerError;
use crate::registry::handler::Handler;

/// Two-tier bring-up priority.
///
/// `First` handlers are initialized serially before any `Normal` handler
/// starts; the derived ordering sorts `First` ahead of `Normal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadOrder {
    First,
    #[default]
    Normal,
}

/// Where a handler reads its settings from.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ConfigSource {
    /// Settings declared inline in the proxy configuration.
    Inline(toml::Table),
    /// Settings kept in their own TOML file, re-read on every init.
    File(PathBuf),
    #[default]
    Empty,
}

impl ConfigSource {
    /// Read the settings table.
    pub fn load(&self) -> Result<toml::Table, HandlerError> {
        match self {
            ConfigSource::Inline(table) => Ok(table.clone()),
            ConfigSource::File(path) => {
                let content = std::fs::read_to_string(path)?;
                toml::from_str(&content).map_err(|e| {
                    HandlerError::Config(format!("{}: {}", path.display(), e))
                })
            }
            ConfigSource::Empty => Ok(toml::Table::new()),
        }
    }

    /// Read the settings and deserialize them into a typed settings struct.
    pub fn parse<T>(&self) -> Result<T, HandlerError>
    where
        T: for<'de> Deserialize<'de>,
    {
        toml::Value::Table(self.load()?)
            .try_into()
            .map_err(|e: toml::de::Error| HandlerError::Config(e.to_string()))
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::Inline(table) => write!(f, "inline ({} keys)", table.len()),
            ConfigSource::File(path) => write!(f, "file {}", path.display()),
            ConfigSource::Empty => f.write_str("none"),
        }
    }
}

/// Immutable deployment description of a handler.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerDescriptor {
    name: String,
    version: String,
    load_order: LoadOrder,
    config_source: ConfigSource,
}

impl HandlerDescriptor {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        load_order: LoadOrder,
        config_source: ConfigSource,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            load_order,
            config_source,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn load_order(&self) -> LoadOrder {
        self.load_order
    }

    pub fn config_source(&self) -> &ConfigSource {
        &self.config_source
    }
}

/// Resolves a descriptor to the concrete handler instances it deploys.
pub trait HandlerFactory: Send + Sync {
    fn create(&self, descriptor: &HandlerDescriptor) -> Result<Vec<Arc<dyn Handler>>, HandlerError>;
}

impl<F> HandlerFactory for F
where
    F: Fn(&HandlerDescriptor) -> Result<Vec<Arc<dyn Handler>>, HandlerError> + Send + Sync,
{
    fn create(&self, descriptor: &HandlerDescriptor) -> Result<Vec<Arc<dyn Handler>>, HandlerError> {
        self(descriptor)
    }
}

/// A descriptor paired with the factory that builds its handlers.
#[derive(Clone)]
pub struct HandlerRegistration {
    descriptor: Arc<HandlerDescriptor>,
    factory: Arc<dyn HandlerFactory>,
}

impl HandlerRegistration {
    pub fn new(descriptor: HandlerDescriptor, factory: impl HandlerFactory + 'static) -> Self {
        Self {
            descriptor: Arc::new(descriptor),
            factory: Arc::new(factory),
        }
    }

    /// Registration whose factory always hands out the same instance.
    pub fn single(descriptor: HandlerDescriptor, handler: Arc<dyn Handler>) -> Self {
        Self::new(descriptor, move |_: &HandlerDescriptor| {
            Ok::<_, HandlerError>(vec![handler.clone()])
        })
    }

    pub fn descriptor(&self) -> &Arc<HandlerDescriptor> {
        &self.descriptor
    }

    pub fn load_order(&self) -> LoadOrder {
        self.descriptor.load_order()
    }

    pub(crate) fn resolve(&self) -> Result<Vec<Arc<dyn Handler>>, HandlerError> {
        self.factory.create(&self.descriptor)
    }
}

impl fmt::Debug for HandlerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistration")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}
