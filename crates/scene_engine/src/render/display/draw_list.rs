//! Sort keys and draw-list construction
//!
//! Drawables are sorted so that the most expensive state changes happen
//! least often: stage, then the transparency bin, then layer, program,
//! texture and geometry. The sort is stable, so drawables with equal keys
//! keep the order the scene added them in.
//!
//! The sorted drawables are then flattened into a list of chunks. A chunk is
//! left out when the previous drawable placed the same chunk in the same
//! slot, since the state it applies is already current. Unique chunks (the
//! draw call and the pick name) are never left out.

use super::frame::Pass;
use super::object::{DisplayObject, DrawState};
use crate::render::chunks::{ChunkFactory, ChunkKey, ChunkKind};
use crate::render::cores::{CoreData, CoreKey, CoreRegistry};
use crate::render::program::ProgramFactory;

/// Ordering of a drawable in the draw list
///
/// Fields compare in declaration order. State ids are 0 when the drawable
/// has no core of that type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SortKey {
    /// Stage priority
    pub stage: i32,
    /// Transparent drawables sort after opaque ones within a stage
    pub transparent: bool,
    /// Layer priority
    pub layer: i32,
    /// Program id
    pub program: u32,
    /// Texture core state id
    pub texture: u32,
    /// Geometry core state id
    pub geometry: u32,
}

impl SortKey {
    /// Key for a drawable's cores and program
    pub fn for_state(state: &DrawState, program: u32, cores: &CoreRegistry) -> Self {
        let data = |key: Option<CoreKey>| key.and_then(|key| cores.get(key)).map(|core| core.data());
        let state_id = |key: Option<CoreKey>| {
            key.and_then(|key| cores.get(key))
                .map_or(0, |core| core.state_id())
        };

        Self {
            stage: data(state.stage)
                .and_then(CoreData::as_stage)
                .map_or(0, |stage| stage.priority),
            transparent: data(state.flags)
                .and_then(CoreData::as_flags)
                .is_some_and(|flags| flags.transparent),
            layer: data(state.layer)
                .and_then(CoreData::as_layer)
                .map_or(0, |layer| layer.priority),
            program,
            texture: state_id(state.texture),
            geometry: state_id(state.geometry),
        }
    }
}

/// One chunk execution in a draw list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawEntry {
    /// Chunk to run
    pub chunk: ChunkKey,
    /// Index of the drawable in display order
    pub object: usize,
}

/// Flattened, deduplicated chunk list for one pass
#[derive(Debug, Default, Clone)]
pub struct DrawList {
    entries: Vec<DrawEntry>,
    transparent_index: Option<usize>,
    skipped: u32,
    objects: usize,
}

impl DrawList {
    /// Entries in execution order
    pub fn entries(&self) -> &[DrawEntry] {
        &self.entries
    }

    /// Entry index where the transparency bin starts
    pub fn transparent_index(&self) -> Option<usize> {
        self.transparent_index
    }

    /// Chunks left out because the previous drawable already applied them
    pub fn skipped(&self) -> u32 {
        self.skipped
    }

    /// Drawables in the list
    pub fn object_count(&self) -> usize {
        self.objects
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Whether a drawable takes part in a pass
///
/// Drawables are culled when disabled by their flags, layer or enable core,
/// or when their program failed to compile. The pick pass also drops
/// unpickable drawables and drawables rendering into a target.
pub fn is_visible(object: &DisplayObject, cores: &CoreRegistry, programs: &ProgramFactory, pass: Pass) -> bool {
    let state = object.state();
    let data = |key: Option<CoreKey>| key.and_then(|key| cores.get(key)).map(|core| core.data());

    let compiled = object
        .program()
        .and_then(|id| programs.get(id))
        .is_some_and(|program| program.is_compiled());
    if !compiled {
        return false;
    }

    let flags = data(state.flags).and_then(CoreData::as_flags);
    if flags.is_some_and(|flags| !flags.enabled) {
        return false;
    }
    if data(state.layer)
        .and_then(CoreData::as_layer)
        .is_some_and(|layer| !layer.enabled)
    {
        return false;
    }
    if data(state.enable)
        .and_then(CoreData::as_enable)
        .is_some_and(|enable| !enable.enabled)
    {
        return false;
    }

    match pass {
        Pass::Color => true,
        Pass::Pick => {
            let pickable_stage = data(state.stage)
                .and_then(CoreData::as_stage)
                .map_or(true, |stage| stage.pickable);
            state.render_target.is_none() && pickable_stage && flags.map_or(true, |flags| flags.picking)
        }
    }
}

/// Accumulates a [`DrawList`] for one pass
pub struct DrawListBuilder<'a> {
    chunks: &'a ChunkFactory,
    pass: Pass,
    list: DrawList,
    last: [Option<ChunkKey>; ChunkKind::OBJECT_SLOTS],
    transparent: bool,
}

impl<'a> DrawListBuilder<'a> {
    /// Start an empty list
    pub fn new(chunks: &'a ChunkFactory, pass: Pass) -> Self {
        Self {
            chunks,
            pass,
            list: DrawList::default(),
            last: [None; ChunkKind::OBJECT_SLOTS],
            transparent: false,
        }
    }

    /// Append a chunk that is not part of a drawable's slots
    ///
    /// Such chunks may change state behind the slots' backs, so every slot
    /// runs again for the next drawable.
    pub fn push_chunk(&mut self, chunk: ChunkKey, object: usize) {
        if self.chunks.get(chunk).is_some_and(|c| c.runs_in(self.pass)) {
            self.list.entries.push(DrawEntry { chunk, object });
            self.last = [None; ChunkKind::OBJECT_SLOTS];
        }
    }

    /// Append a drawable's chunks, leaving out those already current
    pub fn push_object(&mut self, index: usize, object: &DisplayObject) {
        // Crossing the transparency bin forces blend state, which the colour
        // buffer chunk has to put back
        if object.sort_key.transparent != self.transparent {
            self.transparent = object.sort_key.transparent;
            if let Some(slot) = ChunkKind::ColorBuffer.slot() {
                self.last[slot] = None;
            }
        }
        // Morph targets rebind the geometry's attributes, so the two slots
        // are only left out together
        if let (Some(geometry), Some(morph)) = (ChunkKind::Geometry.slot(), ChunkKind::MorphGeometry.slot()) {
            let morphing = object.chunks[morph].is_some();
            if object.chunks[morph] != self.last[morph] || (morphing && object.chunks[geometry] != self.last[geometry]) {
                self.last[geometry] = None;
                self.last[morph] = None;
            }
        }
        for (slot, key) in object.chunks.iter().enumerate() {
            let Some(key) = *key else {
                continue;
            };
            let Some(chunk) = self.chunks.get(key) else {
                continue;
            };
            if !chunk.runs_in(self.pass) {
                continue;
            }
            if !chunk.is_unique() && self.last[slot] == Some(key) {
                self.list.skipped += 1;
                continue;
            }
            self.last[slot] = Some(key);
            self.list.entries.push(DrawEntry { chunk: key, object: index });
        }
        self.list.objects += 1;
    }

    /// Drawables pushed so far
    pub fn object_count(&self) -> usize {
        self.list.objects
    }

    /// Record that the transparency bin starts with the next entry
    pub fn begin_transparent(&mut self) {
        if self.list.transparent_index.is_none() {
            self.list.transparent_index = Some(self.list.entries.len());
        }
    }

    /// Finish the list
    pub fn finish(self) -> DrawList {
        self.list
    }
}
