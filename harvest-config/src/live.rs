use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::Config;

/// A shared handle to the current [`Config`] that can be replaced at runtime.
///
/// Readers obtain a snapshot with [`LiveConfig::load`] without taking a lock. Writers replace the
/// whole config with [`LiveConfig::store`] or [`LiveConfig::update`]. Clones share the same
/// underlying config.
#[derive(Clone, Debug, Default)]
pub struct LiveConfig {
    inner: Arc<ArcSwap<Config>>,
}

impl LiveConfig {
    /// Creates a new handle holding `config`.
    pub fn new(mut config: Config) -> Self {
        config.normalize();
        Self {
            inner: Arc::new(ArcSwap::from_pointee(config)),
        }
    }

    /// Returns a snapshot of the current config.
    pub fn load(&self) -> Arc<Config> {
        self.inner.load_full()
    }

    /// Replaces the current config.
    pub fn store(&self, mut config: Config) {
        config.normalize();
        self.inner.store(Arc::new(config));
    }

    /// Modifies a copy of the current config and stores it.
    ///
    /// `f` may be invoked more than once if another writer races this update.
    pub fn update(&self, mut f: impl FnMut(&mut Config)) {
        self.inner.rcu(|current| {
            let mut next = Config::clone(current);
            f(&mut next);
            next.normalize();
            next
        });
    }
}
