//! Application context shared by every component.
//!
//! Built once at startup and handed out by `Arc`; nothing in the crate reads
//! process-wide mutable state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::DevwpConfig;
use crate::errors::Result;
use crate::exec::{CommandRunner, ProcessRunner};
use crate::store::{Settings, StoreHandle};

/// Last known Xdebug state, consulted when the store cannot be read.
#[derive(Debug, Default)]
pub struct XdebugCache(AtomicBool);

impl XdebugCache {
    pub fn get(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::Relaxed);
    }
}

pub struct AppContext {
    pub config: DevwpConfig,
    pub verbose: bool,
    pub store: StoreHandle,
    pub settings: Settings,
    pub runner: Arc<dyn CommandRunner>,
    pub xdebug: XdebugCache,
}

impl AppContext {
    pub fn new(
        config: DevwpConfig,
        store: StoreHandle,
        runner: Arc<dyn CommandRunner>,
        verbose: bool,
    ) -> Arc<Self> {
        let settings = Settings::new(store.clone(), &config);
        Arc::new(Self {
            config,
            verbose,
            store,
            settings,
            runner,
            xdebug: XdebugCache::default(),
        })
    }

    /// Open the on-disk store and use real processes.
    pub fn open(config: DevwpConfig, verbose: bool) -> Result<Arc<Self>> {
        let store = StoreHandle::open(&config.database_path())?;
        Ok(Self::new(config, store, Arc::new(ProcessRunner), verbose))
    }
}
