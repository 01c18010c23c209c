//! Grid demo for the scene display
//!
//! Builds a grid of shaded quads on a headless recording context, renders a
//! few frames while moving one of them, and picks the quad under a canvas
//! position. Pass a `.toml` or `.ron` application config as the first
//! argument to override the defaults.

use std::sync::Arc;

use rand::prelude::*;
use scene_engine::foundation::logging;
use scene_engine::prelude::*;
use scene_engine::render::cores::LightSpace;

const GRID_SIZE: usize = 6;
const CANVAS_WIDTH: u32 = 320;
const CANVAS_HEIGHT: u32 = 240;

struct GridDemo {
    gl: RecordingContext,
    context: Arc<RendererContext>,
    display: Display,
    shared: Vec<CoreKey>,
    quads: Vec<Quad>,
}

/// Per-cell cores owned by the demo
struct Quad {
    xform: CoreKey,
    material: CoreKey,
    name: CoreKey,
}

impl Quad {
    fn keys(&self) -> [CoreKey; 3] {
        [self.xform, self.material, self.name]
    }
}

impl GridDemo {
    fn new(config: DisplayConfig) -> Result<Self, RenderError> {
        let context = RendererContext::new(&config);
        let mut display = Display::new(Arc::clone(&context), config)?;
        display.on_error(|err| log::error!("Display reported: {err}"));

        Ok(Self {
            gl: RecordingContext::new(CANVAS_WIDTH, CANVAS_HEIGHT),
            context,
            display,
            shared: Vec::new(),
            quads: Vec::new(),
        })
    }

    /// Create shared cores and one drawable per grid cell
    fn build_grid(&mut self) -> Result<(), RenderError> {
        let mut rng = thread_rng();

        let (quad, lights, camera, look_at) = {
            let mut cores = self.context.cores()?;
            let quad = cores.get_or_create_core(&mut self.gl, CoreType::Geometry, Some("quad"), |gl| {
                let arrays = GeometryArrays {
                    positions: vec![-0.5, -0.5, 0.0, 0.5, -0.5, 0.0, 0.5, 0.5, 0.0, -0.5, 0.5, 0.0],
                    normals: Some([0.0, 0.0, 1.0].repeat(4)),
                    indices: vec![0, 1, 2, 0, 2, 3],
                    ..GeometryArrays::default()
                };
                Ok(CoreData::Geometry(GeometryCore::upload(gl, Primitive::Triangles, arrays)?))
            })?;
            let lights = cores.get_or_insert_core(
                Some("sun"),
                CoreData::Lights(LightsCore {
                    lights: vec![
                        Light::ambient([0.1, 0.1, 0.15]),
                        Light::directional([1.0, 0.95, 0.9], [-0.3, -0.5, -1.0], LightSpace::World),
                    ],
                }),
            );
            let aspect = CANVAS_WIDTH as f32 / CANVAS_HEIGHT as f32;
            let camera = cores.get_or_insert_core(
                Some("main"),
                CoreData::Camera(CameraCore::perspective(45.0, aspect, 0.1, 100.0)),
            );
            let look_at = cores.get_or_insert_core(
                Some("main"),
                CoreData::LookAt(LookAtCore::new(
                    Vec3::new(0.0, 0.0, 12.0),
                    Vec3::zeros(),
                    Vec3::y(),
                )),
            );
            (quad, lights, camera, look_at)
        };
        self.shared = vec![quad, lights, camera, look_at];

        for row in 0..GRID_SIZE {
            for col in 0..GRID_SIZE {
                let id = format!("quad_{row}_{col}");
                let offset = (GRID_SIZE as f32 - 1.0) / 2.0;
                let position = Vec3::new(col as f32 - offset, row as f32 - offset, 0.0) * 1.2;

                let (xform, material, name) = {
                    let mut cores = self.context.cores()?;
                    let xform = cores.get_or_insert_core(
                        None,
                        CoreData::Xform(XformCore::new(Mat4::new_translation(&position))),
                    );
                    let material = cores.get_or_insert_core(
                        None,
                        CoreData::Material(MaterialCore {
                            base_color: [rng.gen(), rng.gen(), rng.gen()],
                            ..MaterialCore::default()
                        }),
                    );
                    let name = cores.get_or_insert_core(
                        None,
                        CoreData::Name(NameCore {
                            name: id.clone(),
                            ..NameCore::default()
                        }),
                    );
                    (xform, material, name)
                };

                let state = DrawState {
                    xform: Some(xform),
                    material: Some(material),
                    name: Some(name),
                    lights: Some(lights),
                    camera: Some(camera),
                    look_at: Some(look_at),
                    ..DrawState::with_geometry(quad)
                };
                self.display.build_object(&mut self.gl, &id, state)?;
                self.quads.push(Quad { xform, material, name });
            }
        }

        log::info!("Built {} drawables", self.display.object_count());
        Ok(())
    }

    fn run(&mut self) -> Result<(), RenderError> {
        self.build_grid()?;

        for frame in 0..3 {
            let stats = self.display.render(&mut self.gl, RenderParams::default())?;
            log::info!(
                "Frame {frame}: {} draws, {} program binds, {} chunks applied, {} skipped",
                stats.draw_calls,
                stats.program_binds,
                stats.chunks_applied,
                stats.chunks_skipped
            );

            // Nudge the first quad; every holder of its transform sees the change
            if let Some(quad) = self.quads.first() {
                let translation = Vec3::new(0.0, 0.0, frame as f32 * 0.25);
                self.context.cores()?.update(quad.xform, |data| {
                    if let CoreData::Xform(xform) = data {
                        *xform = XformCore::new(Mat4::new_translation(&translation) * xform.matrix);
                    }
                })?;
            }
        }

        // The recording context has no rasteriser, so tell it which pixel
        // the quad covers before picking.
        let Some(&quad) = self.shared.first() else {
            return Ok(());
        };
        let index_buffer = {
            let cores = self.context.cores()?;
            cores
                .get(quad)
                .and_then(|core| core.data().as_geometry())
                .and_then(|geometry| geometry.buffers.as_ref())
                .map(|buffers| buffers.indices)
        };
        if let Some(buffer) = index_buffer {
            self.gl.cover_canvas(buffer, CANVAS_WIDTH / 2, CANVAS_HEIGHT / 2);
        }
        match self.display.pick(&mut self.gl, CANVAS_WIDTH / 2, CANVAS_HEIGHT / 2)? {
            Some(hit) => log::info!("Picked {} ({:?})", hit.object_id, hit.name),
            None => log::info!("Nothing under the cursor"),
        }
        Ok(())
    }

    /// Tear down the display and release every core the demo created
    ///
    /// Returns the number of cores still registered afterwards.
    fn shutdown(self) -> Result<usize, RenderError> {
        let Self {
            mut gl,
            context,
            display,
            shared,
            quads,
        } = self;
        display.destroy(&mut gl)?;

        let mut cores = context.cores()?;
        for key in quads.iter().flat_map(Quad::keys).chain(shared) {
            cores.release_core(&mut gl, key)?;
        }
        Ok(cores.len())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => ApplicationConfig::load_validated(&path)?,
        None => ApplicationConfig::default(),
    };
    logging::init_with_level(config.engine.effective_log_level());

    log::info!("Starting grid demo ({}x{})", CANVAS_WIDTH, CANVAS_HEIGHT);
    let mut demo = GridDemo::new(config.display)?;
    let result = demo.run();
    if let Err(err) = &result {
        log::error!("Grid demo failed: {err}");
    }
    let remaining = demo.shutdown()?;
    log::info!("Shut down with {remaining} cores still registered");
    result.map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_releases_every_core() {
        let mut demo = GridDemo::new(DisplayConfig::default()).unwrap();
        demo.run().unwrap();
        assert_eq!(demo.context.cores().unwrap().len(), 4 + 3 * GRID_SIZE * GRID_SIZE + 9);
        assert_eq!(demo.shutdown().unwrap(), 0);
    }
}
