//! Build a [`StoreRegistry`] from configuration and whatever vendor data exists on disk.

use std::path::PathBuf;
use std::sync::Arc;

use thinkt_core::{Result, Source};
use thinkt_runtime_config::ThinktConfig;

use crate::registry::StoreRegistry;
use crate::sources::create_store;
use crate::store::{Store, StoreOptions};

/// Knows where one vendor keeps its data and how to open a store over it.
pub trait StoreFactory: Send + Sync {
    fn source(&self) -> Source;

    fn base_dir(&self) -> Option<PathBuf>;

    /// True when the vendor's data directory exists.
    fn is_available(&self) -> bool {
        self.base_dir().is_some_and(|dir| dir.is_dir())
    }

    fn create(&self, options: &StoreOptions) -> Result<Arc<dyn Store>>;
}

/// Factory for the built-in stores, resolving base directories through
/// [`thinkt_parser_discovery::resolve_base_dir`].
#[derive(Debug, Clone)]
pub struct LocalStoreFactory {
    source: Source,
    base_dir: Option<PathBuf>,
}

impl LocalStoreFactory {
    pub fn new(source: Source, configured_home: Option<&str>) -> Self {
        Self {
            source,
            base_dir: thinkt_parser_discovery::resolve_base_dir(source, configured_home),
        }
    }

    /// Factory rooted at an explicit directory.
    pub fn at(source: Source, base_dir: PathBuf) -> Self {
        Self {
            source,
            base_dir: Some(base_dir),
        }
    }
}

impl StoreFactory for LocalStoreFactory {
    fn source(&self) -> Source {
        self.source
    }

    fn base_dir(&self) -> Option<PathBuf> {
        self.base_dir.clone()
    }

    fn create(&self, options: &StoreOptions) -> Result<Arc<dyn Store>> {
        let base_dir = self
            .base_dir
            .clone()
            .ok_or(thinkt_core::Error::SourceUnavailable(self.source))?;
        Ok(create_store(self.source, base_dir, options.clone()))
    }
}

/// Registry assembly: one factory per enabled source, stores created for those available.
pub struct Discovery {
    factories: Vec<Box<dyn StoreFactory>>,
    options: StoreOptions,
    initial_load_bytes: u64,
}

impl Discovery {
    pub fn new(config: &ThinktConfig) -> Self {
        let factories = Source::ALL
            .into_iter()
            .filter(|source| config.sources.is_enabled(source.as_str()))
            .map(|source| {
                Box::new(LocalStoreFactory::new(source, config.sources.home(source.as_str())))
                    as Box<dyn StoreFactory>
            })
            .collect();
        Self {
            factories,
            options: StoreOptions::from_config(config),
            initial_load_bytes: config.reader.initial_load_bytes,
        }
    }

    /// Discovery over an explicit factory list.
    pub fn with_factories(
        factories: Vec<Box<dyn StoreFactory>>,
        options: StoreOptions,
        initial_load_bytes: u64,
    ) -> Self {
        Self {
            factories,
            options,
            initial_load_bytes,
        }
    }

    pub fn factories(&self) -> &[Box<dyn StoreFactory>] {
        &self.factories
    }

    /// Register a store for every factory whose data directory exists.
    pub fn discover(&self) -> Result<StoreRegistry> {
        let mut builder = StoreRegistry::builder().initial_load_bytes(self.initial_load_bytes);
        for factory in &self.factories {
            if !factory.is_available() {
                tracing::debug!(source = %factory.source(), "source not available");
                continue;
            }
            let store = factory.create(&self.options)?;
            tracing::info!(
                source = %store.source(),
                base_dir = %store.base_dir().display(),
                workspace = %store.workspace().id,
                "discovered source"
            );
            builder = builder.register(store);
        }
        Ok(builder.build())
    }
}
