//! Shared renderer state
//!
//! The core registry and the object pool are shared by every display of a
//! renderer. They live here behind mutexes rather than in globals, so two
//! independent renderers never see each other's cores.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::core::config::DisplayConfig;
use crate::render::cores::CoreRegistry;
use crate::render::display::ObjectFactory;
use crate::render::{RenderError, RenderResult};

/// Registries shared by the displays of one renderer
#[derive(Debug)]
pub struct RendererContext {
    cores: Mutex<CoreRegistry>,
    objects: Mutex<ObjectFactory>,
}

impl RendererContext {
    /// Create a context; the pool follows the config's pooling policy
    pub fn new(config: &DisplayConfig) -> Arc<Self> {
        Arc::new(Self {
            cores: Mutex::new(CoreRegistry::new()),
            objects: Mutex::new(ObjectFactory::new(config.pooling, config.initial_object_capacity)),
        })
    }

    /// Lock the core registry
    pub fn cores(&self) -> RenderResult<MutexGuard<'_, CoreRegistry>> {
        self.cores
            .lock()
            .map_err(|_| RenderError::RegistryPoisoned("core registry"))
    }

    /// Lock the object pool
    pub fn objects(&self) -> RenderResult<MutexGuard<'_, ObjectFactory>> {
        self.objects
            .lock()
            .map_err(|_| RenderError::RegistryPoisoned("object pool"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::cores::{CoreData, FlagsCore};

    #[test]
    fn test_contexts_do_not_share_cores() {
        let config = DisplayConfig::default();
        let a = RendererContext::new(&config);
        let b = RendererContext::new(&config);
        a.cores()
            .unwrap()
            .get_or_insert_core(Some("flags"), CoreData::Flags(FlagsCore::default()));
        assert_eq!(a.cores().unwrap().len(), 1);
        assert!(b.cores().unwrap().is_empty());
    }

    #[test]
    fn test_shared_across_threads() {
        let context = RendererContext::new(&DisplayConfig::default());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let context = Arc::clone(&context);
                std::thread::spawn(move || {
                    context
                        .cores()
                        .unwrap()
                        .get_or_insert_core(Some("shared"), CoreData::Flags(FlagsCore::default()))
                })
            })
            .collect();
        let keys: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(keys.windows(2).all(|w| w[0] == w[1]));
        let cores = context.cores().unwrap();
        assert_eq!(cores.get(keys[0]).unwrap().use_count(), 4);
    }
}
