//! # Display
//!
//! The display turns the drawables handed to it by scene traversal into GL
//! calls. Work is split into stages that only run when something they
//! depend on changed:
//!
//! 1. **Collect**: gather live drawables.
//! 2. **Sort**: order them by [`SortKey`], stable over insertion order.
//! 3. **Compile**: compile pending programs and build pending chunks.
//! 4. **Render**: walk the draw list for the colour pass.
//!
//! A pick runs the same stages (rendering first if the image is stale)
//! followed by a pick pass into an off-screen buffer.
//!
//! Core updates made through the shared registry are noticed through the
//! registry's revision counter, which re-keys drawables and rebuilds the
//! draw lists on the next frame.

pub mod draw_list;
pub mod frame;
pub mod object;
pub mod pick;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::core::config::DisplayConfig;
use crate::render::chunks::{ChunkFactory, ChunkKey, ChunkKind, DrawContext};
use crate::render::context::RendererContext;
use crate::render::cores::{
    CameraCore, ColorBufferCore, Core, CoreData, CoreKey, CoreRegistry, DepthBufferCore, FlagsCore,
    LookAtCore, MaterialCore, MorphGeometryCore, RendererCore, ViewCore, XformCore,
};
use crate::render::gl::{Capability, ClearMask, GlContext};
use crate::render::program::{ProgramFactory, ProgramStates};
use crate::render::{RenderError, RenderResult};

pub use draw_list::{is_visible, DrawEntry, DrawList, DrawListBuilder, SortKey};
pub use frame::{set_cached, FrameContext, FrameStats, Pass};
pub use object::{DisplayObject, DrawState, ObjectFactory};
pub use pick::{decode_pick_color, encode_pick_color, PickBuffer, PickHit, MAX_PICK_INDEX};

/// Options for [`Display::render`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderParams {
    /// Clear colour, depth and stencil before drawing
    pub clear: bool,
    /// Draw even if nothing changed since the last frame
    pub force: bool,
    /// Stop before the transparency bin
    pub opaque_only: bool,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            clear: true,
            force: false,
            opaque_only: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct DirtyFlags {
    object_list: bool,
    state_order: bool,
    state_sort: bool,
    draw_list: bool,
    image: bool,
}

impl DirtyFlags {
    fn all() -> Self {
        Self {
            object_list: true,
            state_order: true,
            state_sort: true,
            draw_list: true,
            image: true,
        }
    }
}

/// Cores used for slots a drawable leaves empty
#[derive(Debug, Clone, Copy)]
struct DefaultCores {
    xform: CoreKey,
    look_at: CoreKey,
    camera: CoreKey,
    flags: CoreKey,
    depth_buffer: CoreKey,
    color_buffer: CoreKey,
    view: CoreKey,
    renderer: CoreKey,
    material: CoreKey,
}

impl DefaultCores {
    fn create(cores: &mut CoreRegistry) -> Self {
        let mut insert = |data: CoreData| cores.get_or_insert_core(None, data);
        Self {
            xform: insert(CoreData::Xform(XformCore::default())),
            look_at: insert(CoreData::LookAt(LookAtCore::default())),
            camera: insert(CoreData::Camera(CameraCore::default())),
            flags: insert(CoreData::Flags(FlagsCore::default())),
            depth_buffer: insert(CoreData::DepthBuffer(DepthBufferCore::default())),
            color_buffer: insert(CoreData::ColorBuffer(ColorBufferCore::default())),
            view: insert(CoreData::View(ViewCore::default())),
            renderer: insert(CoreData::Renderer(RendererCore::default())),
            material: insert(CoreData::Material(MaterialCore::default())),
        }
    }

    fn keys(&self) -> [CoreKey; 9] {
        [
            self.xform,
            self.look_at,
            self.camera,
            self.flags,
            self.depth_buffer,
            self.color_buffer,
            self.view,
            self.renderer,
            self.material,
        ]
    }

    fn fill(&self, state: &mut DrawState) {
        state.xform.get_or_insert(self.xform);
        state.look_at.get_or_insert(self.look_at);
        state.camera.get_or_insert(self.camera);
        state.flags.get_or_insert(self.flags);
        state.depth_buffer.get_or_insert(self.depth_buffer);
        state.color_buffer.get_or_insert(self.color_buffer);
        state.view.get_or_insert(self.view);
        state.renderer.get_or_insert(self.renderer);
        state.material.get_or_insert(self.material);
    }
}

type ErrorListener = Box<dyn FnMut(&RenderError) + Send>;

/// Draw-list builder and executor for one canvas
pub struct Display {
    context: Arc<RendererContext>,
    config: DisplayConfig,
    programs: ProgramFactory,
    chunks: ChunkFactory,
    objects: HashMap<String, DisplayObject>,
    next_seq: u64,
    order: Vec<String>,
    defaults: DefaultCores,
    frame: FrameContext,
    draw_list: DrawList,
    pick_list: DrawList,
    target_chunks: Vec<ChunkKey>,
    pick_buffer: Option<PickBuffer>,
    dirty: DirtyFlags,
    core_revision: u64,
    ambient: Option<[f32; 3]>,
    listeners: Vec<ErrorListener>,
    stats: FrameStats,
    needs_restore: bool,
}

impl fmt::Debug for Display {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Display")
            .field("objects", &self.objects.len())
            .field("programs", &self.programs.len())
            .field("chunks", &self.chunks.len())
            .field("dirty", &self.dirty)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Display {
    /// Create a display drawing from a renderer context's shared registries
    ///
    /// The object pool belongs to the context, so `config.pooling` is only
    /// checked against the policy the context was created with.
    pub fn new(context: Arc<RendererContext>, config: DisplayConfig) -> RenderResult<Self> {
        config.validate().map_err(RenderError::Configuration)?;
        let defaults = DefaultCores::create(&mut *context.cores()?);
        let pooling = context.objects()?.policy();
        if pooling != config.pooling {
            log::warn!(
                "Display asked for {:?} pooling but its context pools with {pooling:?}",
                config.pooling
            );
        }
        log::debug!("Created display (pooling {pooling:?})");

        Ok(Self {
            objects: HashMap::with_capacity(config.initial_object_capacity),
            context,
            config,
            programs: ProgramFactory::new(),
            chunks: ChunkFactory::with_builtin_types(),
            next_seq: 0,
            order: Vec::new(),
            defaults,
            frame: FrameContext::new(),
            draw_list: DrawList::default(),
            pick_list: DrawList::default(),
            target_chunks: Vec::new(),
            pick_buffer: None,
            dirty: DirtyFlags::all(),
            core_revision: 0,
            ambient: None,
            listeners: Vec::new(),
            stats: FrameStats::default(),
            needs_restore: false,
        })
    }

    /// Subscribe to fatal errors
    ///
    /// Listeners run before the failing call returns its error.
    pub fn on_error(&mut self, listener: impl FnMut(&RenderError) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Create or rebuild the drawable `id` from a set of cores
    ///
    /// A rebuilt drawable keeps its place in insertion order. Fails with a
    /// configuration error when the state has no geometry or a field holds
    /// a core of the wrong type.
    pub fn build_object(&mut self, gl: &mut dyn GlContext, id: &str, state: DrawState) -> RenderResult<()> {
        let result = self.try_build_object(gl, id, state);
        result.map_err(|err| self.report(err))
    }

    /// Remove the drawable `id`, returning its instance to the pool
    pub fn remove_object(&mut self, gl: &mut dyn GlContext, id: &str) -> RenderResult<()> {
        let result = self.try_remove_object(gl, id);
        result.map_err(|err| self.report(err))
    }

    /// Render a frame
    ///
    /// Without `force`, nothing is drawn if neither the drawables nor any
    /// core changed since the last frame; the previous stats are returned.
    pub fn render(&mut self, gl: &mut dyn GlContext, params: RenderParams) -> RenderResult<FrameStats> {
        let result = self.try_render(gl, params);
        result.map_err(|err| self.report(err))
    }

    /// Find the drawable under a canvas position (origin top-left)
    pub fn pick(&mut self, gl: &mut dyn GlContext, x: u32, y: u32) -> RenderResult<Option<PickHit>> {
        let result = self.try_pick(gl, x, y);
        result.map_err(|err| self.report(err))
    }

    /// Recreate GPU state after the context was restored
    ///
    /// Called automatically by the first render after a context loss.
    pub fn webgl_restored(&mut self, gl: &mut dyn GlContext) -> RenderResult<()> {
        let result = self.try_restore(gl);
        result.map_err(|err| self.report(err))
    }

    /// Release every drawable, chunk, program and default core
    pub fn destroy(mut self, gl: &mut dyn GlContext) -> RenderResult<()> {
        let ids: Vec<String> = self.objects.keys().cloned().collect();
        for id in ids {
            self.try_remove_object(gl, &id)?;
        }
        for key in self.target_chunks.drain(..) {
            self.chunks.put_chunk(key);
        }
        if let Some(buffer) = self.pick_buffer.take() {
            buffer.destroy(gl);
        }
        let mut cores = self.context.cores()?;
        for key in self.defaults.keys() {
            cores.release_core(gl, key)?;
        }
        log::debug!("Destroyed display");
        Ok(())
    }

    /// Stats of the last colour pass
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Number of drawables
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Look up a drawable
    pub fn object(&self, id: &str) -> Option<&DisplayObject> {
        self.objects.get(id)
    }

    /// Drawable ids in draw order, as of the last prepared frame
    pub fn draw_order(&self) -> &[String] {
        &self.order
    }

    /// Colour-pass draw list, as of the last prepared frame
    pub fn draw_list(&self) -> &DrawList {
        &self.draw_list
    }

    /// Pick-pass draw list, as of the last prepared frame
    pub fn pick_list(&self) -> &DrawList {
        &self.pick_list
    }

    /// Programs owned by the display
    pub fn programs(&self) -> &ProgramFactory {
        &self.programs
    }

    /// Chunks owned by the display
    pub fn chunks(&self) -> &ChunkFactory {
        &self.chunks
    }

    /// Shared registries
    pub fn context(&self) -> &Arc<RendererContext> {
        &self.context
    }

    fn report(&mut self, err: RenderError) -> RenderError {
        if err.is_fatal() {
            log::error!("Display error: {err}");
            for listener in &mut self.listeners {
                listener(&err);
            }
        } else {
            log::warn!("Graphics context lost; rebuilding on the next frame");
            self.needs_restore = true;
            self.dirty.image = true;
        }
        err
    }

    fn try_build_object(&mut self, gl: &mut dyn GlContext, id: &str, mut state: DrawState) -> RenderResult<()> {
        if state.geometry.is_none() {
            return Err(RenderError::Configuration(format!("object {id} has no geometry")));
        }
        self.defaults.fill(&mut state);

        let context = Arc::clone(&self.context);
        let cores = context.cores()?;
        for (core_type, key) in state.typed_cores() {
            let Some(key) = key else {
                continue;
            };
            let core = cores.get(key).ok_or(RenderError::UnknownCore)?;
            if core.core_type() != core_type {
                return Err(RenderError::Configuration(format!(
                    "object {id}: {core_type:?} slot holds a {:?} core",
                    core.core_type()
                )));
            }
        }

        if let Some(morph) = state.morph_geometry.and_then(|key| cores.get(key)) {
            let vertices = state
                .geometry
                .and_then(|key| cores.get(key))
                .and_then(|core| core.data().as_geometry())
                .map(|geometry| geometry.arrays.vertex_count());
            let targets = morph.data().as_morph_geometry().map(MorphGeometryCore::vertex_count);
            if vertices != targets {
                return Err(RenderError::Configuration(format!(
                    "object {id}: morph targets do not match the geometry's vertex count"
                )));
            }
        }

        let states = program_states(&state, &cores)?;
        let program = self.programs.get_program(&states);
        let chunks = self.acquire_chunks(gl, program, &state)?;

        let mut object = match self.objects.remove(id) {
            Some(mut existing) => {
                self.release_resources(gl, &mut existing);
                existing
            }
            None => {
                let mut object = context.objects()?.acquire(id);
                object.seq = self.next_seq;
                self.next_seq += 1;
                object
            }
        };
        object.sort_key = SortKey::for_state(&state, program, &cores);
        object.state = state;
        object.program = Some(program);
        object.chunks = chunks;
        log::trace!("Built object {id} with program {program}");

        self.objects.insert(id.to_string(), object);
        self.dirty.object_list = true;
        Ok(())
    }

    fn try_remove_object(&mut self, gl: &mut dyn GlContext, id: &str) -> RenderResult<()> {
        let mut object = self
            .objects
            .remove(id)
            .ok_or_else(|| RenderError::UnknownObject(id.to_string()))?;
        self.release_resources(gl, &mut object);
        self.context.objects()?.release(object);
        self.dirty.object_list = true;
        Ok(())
    }

    fn release_resources(&mut self, gl: &mut dyn GlContext, object: &mut DisplayObject) {
        for key in object.chunks.iter_mut().filter_map(Option::take) {
            self.chunks.put_chunk(key);
        }
        if let Some(program) = object.program.take() {
            self.programs.put_program(gl, program);
        }
    }

    /// Take a hold on every chunk a drawable needs under `program`
    ///
    /// On failure the holds taken so far and the hold on `program` are
    /// released.
    fn acquire_chunks(
        &mut self,
        gl: &mut dyn GlContext,
        program: u32,
        state: &DrawState,
    ) -> RenderResult<[Option<ChunkKey>; ChunkKind::OBJECT_SLOTS]> {
        let mut chunks = [None; ChunkKind::OBJECT_SLOTS];
        for (slot, kind) in ChunkKind::OBJECT_KINDS.into_iter().enumerate() {
            let core = state.core_for(kind);
            // Program and name chunks exist even without a core
            if core.is_none() && !matches!(kind, ChunkKind::Program | ChunkKind::Name) {
                continue;
            }
            match self.chunks.get_chunk(kind, Some(program), core) {
                Ok(key) => chunks[slot] = Some(key),
                Err(err) => {
                    for key in chunks.into_iter().flatten() {
                        self.chunks.put_chunk(key);
                    }
                    self.programs.put_program(gl, program);
                    return Err(err);
                }
            }
        }
        Ok(chunks)
    }

    /// Move a drawable onto a new program when core updates changed its
    /// program states
    ///
    /// Returns whether the program changed. The new chunks are acquired
    /// before the old ones are released so chunks shared by both survive.
    fn refresh_program(&mut self, gl: &mut dyn GlContext, id: &str, cores: &CoreRegistry) -> RenderResult<bool> {
        let Some(object) = self.objects.get(id) else {
            return Ok(false);
        };
        let state = object.state;
        let current = object.program;
        let Ok(states) = program_states(&state, cores) else {
            return Ok(false);
        };
        let hash = states.hash();
        if current
            .and_then(|program| self.programs.get(program))
            .is_some_and(|program| program.hash() == hash)
        {
            return Ok(false);
        }

        let program = self.programs.get_program(&states);
        let chunks = self.acquire_chunks(gl, program, &state)?;
        let Some(object) = self.objects.get_mut(id) else {
            return Ok(false);
        };
        let old_chunks = std::mem::replace(&mut object.chunks, chunks);
        let old_program = object.program.replace(program);
        for key in old_chunks.into_iter().flatten() {
            self.chunks.put_chunk(key);
        }
        if let Some(old) = old_program {
            self.programs.put_program(gl, old);
        }
        log::debug!("Object {id} moved from program {old_program:?} to {program}");
        Ok(true)
    }

    fn begin_frame(&mut self, gl: &mut dyn GlContext) -> RenderResult<()> {
        if gl.is_context_lost() {
            return Err(RenderError::ContextLost);
        }
        if self.needs_restore {
            self.try_restore(gl)?;
        }
        Ok(())
    }

    fn try_restore(&mut self, gl: &mut dyn GlContext) -> RenderResult<()> {
        self.context.cores()?.webgl_restored(gl)?;
        self.programs.webgl_restored();
        self.chunks.webgl_restored();
        // The old pick framebuffer died with the context
        self.pick_buffer = None;
        self.needs_restore = false;
        self.dirty.draw_list = true;
        self.dirty.image = true;
        log::info!("Display restored after context loss");
        Ok(())
    }

    fn try_render(&mut self, gl: &mut dyn GlContext, params: RenderParams) -> RenderResult<FrameStats> {
        self.begin_frame(gl)?;
        let context = Arc::clone(&self.context);
        let cores = context.cores()?;
        self.prepare(gl, &cores)?;
        if params.force || self.dirty.image {
            self.draw_image(gl, &cores, params)?;
        }
        Ok(self.stats)
    }

    fn try_pick(&mut self, gl: &mut dyn GlContext, x: u32, y: u32) -> RenderResult<Option<PickHit>> {
        self.begin_frame(gl)?;
        let context = Arc::clone(&self.context);
        let cores = context.cores()?;
        self.prepare(gl, &cores)?;
        if self.dirty.image {
            self.draw_image(gl, &cores, RenderParams::default())?;
        }

        let buffer = match self.pick_buffer.take() {
            Some(mut buffer) => {
                buffer.ensure_size(gl)?;
                buffer
            }
            None => PickBuffer::create(gl)?,
        };
        buffer.bind(gl);
        self.begin_pass(gl, Pass::Pick, true);
        let walked = execute(gl, &mut self.frame, &self.pick_list, &self.chunks, &self.programs, &cores, false);

        let scale = self.config.resolution_scaling;
        let (buffer_x, buffer_y) = ((x as f32 * scale) as u32, (y as f32 * scale) as u32);
        let pixel = walked.map(|()| {
            gl.finish();
            buffer.read(gl, buffer_x, buffer_y)
        });
        buffer.unbind(gl);
        self.pick_buffer = Some(buffer);
        let pixel = pixel?;

        let hit = decode_pick_color(pixel)
            .and_then(|index| self.frame.picked_object(index))
            .and_then(|index| self.order.get(index))
            .and_then(|id| self.objects.get(id))
            .map(|object| pick_hit(object, &cores, [x, y]));
        match &hit {
            Some(hit) => log::debug!("Picked {} at ({x}, {y})", hit.object_id),
            None => log::debug!("Pick at ({x}, {y}) hit nothing"),
        }
        Ok(hit)
    }

    /// Run every dirty stage up to (not including) rendering
    fn prepare(&mut self, gl: &mut dyn GlContext, cores: &CoreRegistry) -> RenderResult<()> {
        if cores.revision() != self.core_revision {
            self.core_revision = cores.revision();
            self.dirty.state_order = true;
            self.dirty.draw_list = true;
            self.dirty.image = true;
        }

        if self.dirty.object_list {
            self.order = self.objects.keys().cloned().collect();
            self.dirty.object_list = false;
            self.dirty.state_sort = true;
        }

        if self.dirty.state_order {
            let ids: Vec<String> = self.objects.keys().cloned().collect();
            for id in &ids {
                if self.refresh_program(gl, id, cores)? {
                    self.dirty.draw_list = true;
                }
            }
            for object in self.objects.values_mut() {
                let Some(program) = object.program else {
                    continue;
                };
                let key = SortKey::for_state(&object.state, program, cores);
                if key != object.sort_key {
                    object.sort_key = key;
                    self.dirty.state_sort = true;
                }
            }
            self.dirty.state_order = false;
        }

        if self.dirty.state_sort {
            let objects = &self.objects;
            self.order
                .sort_by_key(|id| objects.get(id).map(|object| (object.sort_key, object.seq)));
            self.dirty.state_sort = false;
            self.dirty.draw_list = true;
        }

        if self.dirty.draw_list {
            let compiled = self.programs.compile_pending(gl)?;
            let built = self.chunks.build_pending(gl, &self.programs, cores)?;
            if compiled + built > 0 {
                log::debug!("Compiled {compiled} programs, built {built} chunks");
            }
            self.build_draw_lists(cores)?;
            self.dirty.draw_list = false;
            self.dirty.image = true;
        }
        Ok(())
    }

    fn build_draw_lists(&mut self, cores: &CoreRegistry) -> RenderResult<()> {
        for key in self.target_chunks.drain(..) {
            self.chunks.put_chunk(key);
        }

        // Drawables rendering into targets are binned per target, in the
        // order their first member appears.
        let mut bins: Vec<(CoreKey, Vec<usize>)> = Vec::new();
        let mut main = Vec::with_capacity(self.order.len());
        for (index, id) in self.order.iter().enumerate() {
            let Some(object) = self.objects.get(id) else {
                continue;
            };
            match object.state.render_target {
                Some(target) => match bins.iter_mut().find(|(key, _)| *key == target) {
                    Some((_, members)) => members.push(index),
                    None => bins.push((target, vec![index])),
                },
                None => main.push(index),
            }
        }
        for (target, _) in &bins {
            let key = self.chunks.get_chunk(ChunkKind::RenderTarget, None, Some(*target))?;
            self.target_chunks.push(key);
        }
        if !bins.is_empty() {
            let unbind = self.chunks.get_chunk(ChunkKind::RenderTarget, None, None)?;
            self.target_chunks.push(unbind);
        }

        let objects = &self.objects;
        let order = &self.order;
        let object_at = |index: usize| order.get(index).and_then(|id| objects.get(id));

        let mut draw = DrawListBuilder::new(&self.chunks, Pass::Color);
        let mut pick = DrawListBuilder::new(&self.chunks, Pass::Pick);
        for ((_, members), &chunk) in bins.iter().zip(&self.target_chunks) {
            draw.push_chunk(chunk, members.first().copied().unwrap_or_default());
            for &index in members {
                if let Some(object) = object_at(index).filter(|o| is_visible(o, cores, &self.programs, Pass::Color)) {
                    draw.push_object(index, object);
                }
            }
        }
        if !bins.is_empty() {
            if let Some(&unbind) = self.target_chunks.last() {
                draw.push_chunk(unbind, main.first().copied().unwrap_or_default());
            }
        }

        let mut ambient = None;
        for &index in &main {
            let Some(object) = object_at(index) else {
                continue;
            };
            if is_visible(object, cores, &self.programs, Pass::Color) {
                if object.sort_key.transparent {
                    draw.begin_transparent();
                }
                draw.push_object(index, object);
                if ambient.is_none() {
                    ambient = object
                        .state
                        .lights
                        .and_then(|key| cores.get(key))
                        .and_then(|core| core.data().as_lights())
                        .and_then(|lights| lights.ambient_color());
                }
            }
            if is_visible(object, cores, &self.programs, Pass::Pick) {
                pick.push_object(index, object);
            }
        }

        let culled = self.objects.len().saturating_sub(draw.object_count());
        self.draw_list = draw.finish();
        self.pick_list = pick.finish();
        self.ambient = ambient;
        log::trace!(
            "Draw list: {} entries ({} skipped), {culled} drawables culled; pick list: {} entries",
            self.draw_list.len(),
            self.draw_list.skipped(),
            self.pick_list.len()
        );
        Ok(())
    }

    fn begin_pass(&mut self, gl: &mut dyn GlContext, pass: Pass, clear: bool) {
        let (width, height) = gl.drawing_buffer_size();
        let units = self
            .config
            .max_texture_units
            .unwrap_or_else(|| gl.max_texture_units());
        self.frame.reset(pass, units, (width, height));

        let viewport = [0, 0, width as i32, height as i32];
        gl.viewport(0, 0, viewport[2], viewport[3]);
        self.frame.viewport = Some(viewport);

        if clear {
            let color = match pass {
                Pass::Pick => [0.0; 4],
                Pass::Color if self.config.transparent_background => [0.0; 4],
                Pass::Color => {
                    let [r, g, b] = self.ambient.unwrap_or(self.config.ambient_default);
                    [r, g, b, 1.0]
                }
            };
            gl.clear_color(color);
            gl.clear(ClearMask::COLOR | ClearMask::DEPTH | ClearMask::STENCIL);
        }

        if pass == Pass::Pick {
            gl.disable(Capability::Blend);
            self.frame.blend_enabled = Some(false);
        }
    }

    fn draw_image(&mut self, gl: &mut dyn GlContext, cores: &CoreRegistry, params: RenderParams) -> RenderResult<()> {
        self.begin_pass(gl, Pass::Color, params.clear);
        let walked = execute(
            gl,
            &mut self.frame,
            &self.draw_list,
            &self.chunks,
            &self.programs,
            cores,
            params.opaque_only,
        );
        self.stats = FrameStats {
            chunks_skipped: self.draw_list.skipped(),
            ..self.frame.stats
        };
        walked?;
        gl.flush();

        // An opaque-only frame leaves the image incomplete
        self.dirty.image = params.opaque_only;
        log::trace!("Frame stats: {:?}", self.stats);
        Ok(())
    }
}

/// Program states implied by a drawable's cores
fn program_states(state: &DrawState, cores: &CoreRegistry) -> RenderResult<ProgramStates> {
    let data = |key: Option<CoreKey>| key.and_then(|key| cores.get(key)).map(Core::data);
    let geometry = data(state.geometry)
        .and_then(CoreData::as_geometry)
        .ok_or(RenderError::UnknownCore)?;
    Ok(ProgramStates::from_cores(
        geometry,
        data(state.flags).and_then(CoreData::as_flags),
        data(state.lights).and_then(CoreData::as_lights),
        data(state.texture).and_then(CoreData::as_texture),
        data(state.clips).and_then(CoreData::as_clips),
        data(state.shader).and_then(CoreData::as_shader),
    )
    .with_morph(data(state.morph_geometry).and_then(CoreData::as_morph_geometry)))
}

/// Walk a draw list, stopping at the transparency bin for opaque-only frames
///
/// Context loss is checked after every draw call; the rest of the pass is
/// abandoned when it is detected.
fn execute(
    gl: &mut dyn GlContext,
    frame: &mut FrameContext,
    list: &DrawList,
    chunks: &ChunkFactory,
    programs: &ProgramFactory,
    cores: &CoreRegistry,
    opaque_only: bool,
) -> RenderResult<()> {
    let end = match list.transparent_index() {
        Some(index) if opaque_only => index,
        _ => list.len(),
    };

    for entry in &list.entries()[..end] {
        let chunk = chunks
            .get(entry.chunk)
            .ok_or_else(|| RenderError::Configuration("draw list refers to a released chunk".to_string()))?;
        let id = chunk.id();
        let program = id.program.and_then(|program| programs.get(program));
        let core = match id.core {
            Some(key) => Some(cores.get(key).ok_or(RenderError::UnknownCore)?),
            None => None,
        };

        frame.current_object = entry.object;
        let mut cx = DrawContext {
            gl: &mut *gl,
            frame: &mut *frame,
            program,
            core,
        };
        if chunk.apply(&mut cx)? {
            frame.stats.chunks_applied += 1;
        }

        if chunk.kind() == ChunkKind::Draw {
            frame.stats.objects_drawn += 1;
            if gl.is_context_lost() {
                return Err(RenderError::ContextLost);
            }
        }
    }
    Ok(())
}

fn pick_hit(object: &DisplayObject, cores: &CoreRegistry, canvas_pos: [u32; 2]) -> PickHit {
    let name = object
        .state
        .name
        .and_then(|key| cores.get(key))
        .and_then(|core| core.data().as_name());
    PickHit {
        object_id: object.id.clone(),
        name: name.map(|name| name.name.clone()),
        node_id: name.and_then(|name| name.node_id.clone()),
        path: name.and_then(|name| name.path.clone()),
        canvas_pos,
    }
}
