//! Core registry
//!
//! Owns every live core, indexed by type and id. Getting a named core that
//! already exists bumps its use count instead of creating a second copy, so
//! nodes that share an id share one core. Releasing the last holder evicts
//! the core, deletes its GPU resources and frees its state id.

use std::collections::HashMap;

use super::{Core, CoreData, CoreId, CoreKey, CoreType};
use crate::foundation::collections::{IdMap, SlotMap};
use crate::render::gl::GlContext;
use crate::render::{RenderError, RenderResult};

/// Registry of shared cores
#[derive(Debug)]
pub struct CoreRegistry {
    cores: SlotMap<CoreKey, Core>,
    by_id: HashMap<(CoreType, CoreId), CoreKey>,
    state_ids: IdMap<CoreKey>,
    revision: u64,
}

impl CoreRegistry {
    /// Create an empty registry
    ///
    /// State ids start at 1 so that 0 can stand for "no core" in sort keys.
    pub fn new() -> Self {
        Self {
            cores: SlotMap::with_key(),
            by_id: HashMap::new(),
            state_ids: IdMap::with_base(1),
            revision: 0,
        }
    }

    /// Get a core by type and id, creating it with `create` if absent
    ///
    /// With `core_id` set, an existing core is reused and its use count
    /// incremented; `create` is not called. Without an id a new private core
    /// is always created. If `create` fails, or returns a payload of the wrong
    /// type, nothing is registered.
    pub fn get_or_create_core<F>(
        &mut self,
        gl: &mut dyn GlContext,
        core_type: CoreType,
        core_id: Option<&str>,
        create: F,
    ) -> RenderResult<CoreKey>
    where
        F: FnOnce(&mut dyn GlContext) -> RenderResult<CoreData>,
    {
        if let Some(key) = self.reuse(core_type, core_id) {
            return Ok(key);
        }

        let mut data = create(gl)?;
        if data.core_type() != core_type {
            let produced = data.core_type();
            data.release_gpu(gl);
            return Err(RenderError::Configuration(format!(
                "factory for {core_type:?} core produced {produced:?} data"
            )));
        }
        Ok(self.register(core_id, data))
    }

    /// Get or create a core whose payload needs no GPU resources
    ///
    /// If a core with the same type and id exists, `data` is dropped and the
    /// existing core reused.
    pub fn get_or_insert_core(&mut self, core_id: Option<&str>, data: CoreData) -> CoreKey {
        match self.reuse(data.core_type(), core_id) {
            Some(key) => key,
            None => self.register(core_id, data),
        }
    }

    /// Whether a named core exists
    pub fn has_core(&self, core_type: CoreType, core_id: &str) -> bool {
        self.by_id
            .contains_key(&(core_type, CoreId::Named(core_id.to_string())))
    }

    /// Look up a core
    pub fn get(&self, key: CoreKey) -> Option<&Core> {
        self.cores.get(key)
    }

    /// Mutate a core's payload in place
    ///
    /// Every holder sees the change on the next frame. The payload variant
    /// must not change.
    pub fn update<R>(&mut self, key: CoreKey, update: impl FnOnce(&mut CoreData) -> R) -> RenderResult<R> {
        let core = self.cores.get_mut(key).ok_or(RenderError::UnknownCore)?;
        let result = update(&mut core.data);
        if core.data.core_type() != core.core_type {
            return Err(RenderError::Configuration(format!(
                "update changed {:?} core to {:?}",
                core.core_type,
                core.data.core_type()
            )));
        }
        self.revision += 1;
        Ok(result)
    }

    /// Release one hold on a core
    ///
    /// Returns whether the core was evicted.
    pub fn release_core(&mut self, gl: &mut dyn GlContext, key: CoreKey) -> RenderResult<bool> {
        let core = self.cores.get_mut(key).ok_or(RenderError::UnknownCore)?;
        core.use_count -= 1;
        if core.use_count > 0 {
            return Ok(false);
        }

        let Some(mut core) = self.cores.remove(key) else {
            return Ok(false);
        };
        self.by_id.remove(&(core.core_type, core.core_id.clone()));
        self.state_ids.remove(core.state_id);
        core.data.release_gpu(gl);
        self.revision += 1;
        log::trace!("Evicted {:?} core {:?} (state {})", core.core_type, core.core_id, core.state_id);
        Ok(true)
    }

    /// Recreate GPU resources of every core after a context restore
    pub fn webgl_restored(&mut self, gl: &mut dyn GlContext) -> RenderResult<()> {
        for core in self.cores.values_mut() {
            core.data.restore_gpu(gl)?;
        }
        self.revision += 1;
        log::info!("Restored GPU resources for {} cores", self.cores.len());
        Ok(())
    }

    /// Number of live cores
    pub fn len(&self) -> usize {
        self.cores.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.cores.is_empty()
    }

    /// Counter bumped on every creation, update and eviction
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn reuse(&mut self, core_type: CoreType, core_id: Option<&str>) -> Option<CoreKey> {
        let id = core_id?;
        let key = *self.by_id.get(&(core_type, CoreId::Named(id.to_string())))?;
        let core = self.cores.get_mut(key)?;
        core.use_count += 1;
        log::trace!("Reusing {core_type:?} core {id} (uses {})", core.use_count);
        Some(key)
    }

    fn register(&mut self, core_id: Option<&str>, data: CoreData) -> CoreKey {
        let core_type = data.core_type();
        let key = self.cores.insert(Core {
            core_type,
            core_id: CoreId::Anonymous(0),
            state_id: 0,
            use_count: 1,
            data,
        });
        let state_id = self.state_ids.insert(key);
        let core_id = core_id.map_or(CoreId::Anonymous(state_id), |id| CoreId::Named(id.to_string()));
        if let Some(core) = self.cores.get_mut(key) {
            core.state_id = state_id;
            core.core_id = core_id.clone();
        }
        self.by_id.insert((core_type, core_id), key);
        self.revision += 1;
        key
    }
}

impl Default for CoreRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::cores::{FlagsCore, GeometryArrays, GeometryCore, MaterialCore};
    use crate::render::gl::{Primitive, RecordingContext};

    fn quad() -> GeometryArrays {
        GeometryArrays {
            positions: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0],
            indices: vec![0, 1, 2, 0, 2, 3],
            ..GeometryArrays::default()
        }
    }

    #[test]
    fn test_named_cores_are_shared() {
        let mut gl = RecordingContext::new(8, 8);
        let mut registry = CoreRegistry::new();

        let first = registry
            .get_or_create_core(&mut gl, CoreType::Geometry, Some("quad"), |gl| {
                Ok(CoreData::Geometry(GeometryCore::upload(gl, Primitive::Triangles, quad())?))
            })
            .unwrap();
        let second = registry
            .get_or_create_core(&mut gl, CoreType::Geometry, Some("quad"), |_| {
                panic!("factory must not run for an existing core")
            })
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(registry.get(first).unwrap().use_count(), 2);
        assert_eq!(gl.live_buffers(), 2);
        assert!(registry.has_core(CoreType::Geometry, "quad"));
        assert!(!registry.has_core(CoreType::Material, "quad"));
    }

    #[test]
    fn test_anonymous_cores_are_distinct() {
        let mut registry = CoreRegistry::new();
        let a = registry.get_or_insert_core(None, CoreData::Flags(FlagsCore::default()));
        let b = registry.get_or_insert_core(None, CoreData::Flags(FlagsCore::default()));
        assert_ne!(a, b);
        assert_ne!(registry.get(a).unwrap().state_id(), registry.get(b).unwrap().state_id());
    }

    #[test]
    fn test_release_evicts_at_zero_and_recycles_state_id() {
        let mut gl = RecordingContext::new(8, 8);
        let mut registry = CoreRegistry::new();
        let key = registry
            .get_or_create_core(&mut gl, CoreType::Geometry, Some("quad"), |gl| {
                Ok(CoreData::Geometry(GeometryCore::upload(gl, Primitive::Triangles, quad())?))
            })
            .unwrap();
        registry.get_or_insert_core(Some("quad"), CoreData::Flags(FlagsCore::default()));
        let state_id = registry.get(key).unwrap().state_id();

        registry.get_or_create_core(&mut gl, CoreType::Geometry, Some("quad"), |_| unreachable!()).unwrap();
        assert!(!registry.release_core(&mut gl, key).unwrap());
        assert!(registry.release_core(&mut gl, key).unwrap());
        assert!(registry.get(key).is_none());
        assert!(!registry.has_core(CoreType::Geometry, "quad"));
        assert_eq!(gl.live_buffers(), 0);
        assert!(matches!(registry.release_core(&mut gl, key), Err(RenderError::UnknownCore)));

        let next = registry.get_or_insert_core(None, CoreData::Material(MaterialCore::default()));
        assert_eq!(registry.get(next).unwrap().state_id(), state_id);
    }

    #[test]
    fn test_failed_factory_registers_nothing() {
        let mut gl = RecordingContext::new(8, 8);
        let mut registry = CoreRegistry::new();
        let result = registry.get_or_create_core(&mut gl, CoreType::Geometry, Some("bad"), |gl| {
            let arrays = GeometryArrays {
                indices: vec![0],
                ..GeometryArrays::default()
            };
            Ok(CoreData::Geometry(GeometryCore::upload(gl, Primitive::Triangles, arrays)?))
        });
        assert!(result.is_err());
        assert!(registry.is_empty());
        assert!(!registry.has_core(CoreType::Geometry, "bad"));
    }

    #[test]
    fn test_wrong_payload_type_is_rejected() {
        let mut gl = RecordingContext::new(8, 8);
        let mut registry = CoreRegistry::new();
        let result = registry.get_or_create_core(&mut gl, CoreType::Material, None, |_| {
            Ok(CoreData::Flags(FlagsCore::default()))
        });
        assert!(matches!(result, Err(RenderError::Configuration(_))));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_update_bumps_revision() {
        let mut registry = CoreRegistry::new();
        let key = registry.get_or_insert_core(None, CoreData::Material(MaterialCore::default()));
        let before = registry.revision();
        registry
            .update(key, |data| {
                if let CoreData::Material(material) = data {
                    material.base_color = [1.0, 0.0, 0.0];
                }
            })
            .unwrap();
        assert!(registry.revision() > before);
        assert_eq!(registry.get(key).unwrap().data().as_material().unwrap().base_color, [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_restore_recreates_buffers() {
        let mut gl = RecordingContext::new(8, 8);
        let mut registry = CoreRegistry::new();
        let key = registry
            .get_or_create_core(&mut gl, CoreType::Geometry, None, |gl| {
                Ok(CoreData::Geometry(GeometryCore::upload(gl, Primitive::Triangles, quad())?))
            })
            .unwrap();
        let before = registry.get(key).unwrap().data().as_geometry().unwrap().buffers.clone();

        gl.lose_context();
        gl.restore_context();
        registry.webgl_restored(&mut gl).unwrap();

        let after = registry.get(key).unwrap().data().as_geometry().unwrap().buffers.clone();
        assert_ne!(before, after);
        assert_eq!(gl.live_buffers(), 2);
    }
}
