//! Frame driver
//!
//! Per frame: derive matrices, classify lights, order cameras, then for
//! each camera draw into an off-screen target and blit it into the
//! camera's rectangle of the output surface.

use bevy_ecs::prelude::*;
use glam::{Mat3, Mat4};

use super::{CameraSystem, ForwardRenderer, FrameStats, LightSystem};
use crate::backend::*;
use crate::error::RenderResult;
use crate::graphics::Graphics;
use crate::resources::{Cubemap, Material, Mesh, MeshData};
use crate::scene::{
    matrix_schedule, Camera, ClearMode, LayerMask, Layers, ProjectionMatrix, RenderLayers,
    Renderable, SurfaceSize, ViewMatrix, ViewportRect,
};
use crate::shader::{builtin, UniformRole};
use crate::RendererConfig;

const SKY_COLOR: [u8; 4] = [135, 170, 215, 255];

pub struct RenderSystem {
    graphics: Graphics,
    config: RendererConfig,
    lights: LightSystem,
    cameras: CameraSystem,
    forward: ForwardRenderer,
    schedule: Schedule,
    target: Option<RenderTargetHandle>,
    skybox: Mesh,
}

impl RenderSystem {
    pub fn new(device: Box<dyn RenderDevice>, config: RendererConfig) -> RenderResult<Self> {
        let mut graphics = Graphics::new(device);
        graphics.set_clear_color(config.clear_color);

        let mut material = Material::new(&mut graphics, builtin::SKYBOX)?;
        let sky = Cubemap::solid_color(&mut graphics, SKY_COLOR)?;
        material.set(&mut graphics, "skybox", sky);
        let skybox = Mesh::new(&mut graphics, &MeshData::cube(), Some(material))?;

        log::info!(
            "Render system ready on {} ({} fragment lights per mesh)",
            graphics.device().name(),
            config.frag_light_quota
        );

        Ok(Self {
            graphics,
            lights: LightSystem::new(config.ambient_color),
            cameras: CameraSystem::new(),
            forward: ForwardRenderer::new(config.frag_light_quota),
            schedule: matrix_schedule(),
            target: None,
            skybox,
            config,
        })
    }

    /// Create the configured backend and a render system on top of it
    pub fn from_config(config: RendererConfig) -> RenderResult<Self> {
        let device = create_device(&config)?;
        Self::new(device, config)
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn graphics(&self) -> &Graphics {
        &self.graphics
    }

    pub fn graphics_mut(&mut self) -> &mut Graphics {
        &mut self.graphics
    }

    pub fn lights(&self) -> &LightSystem {
        &self.lights
    }

    pub fn lights_mut(&mut self) -> &mut LightSystem {
        &mut self.lights
    }

    pub fn forward_mut(&mut self) -> &mut ForwardRenderer {
        &mut self.forward
    }

    /// Cameras of the last frame in draw order
    pub fn cameras(&self) -> &CameraSystem {
        &self.cameras
    }

    /// Replace the sky drawn behind `ClearMode::Skybox` cameras
    pub fn set_skybox(&mut self, cubemap: Cubemap) -> bool {
        match self.skybox.material.as_mut() {
            Some(material) => material.set(&mut self.graphics, "skybox", cubemap),
            None => false,
        }
    }

    /// Render one frame of `world` through `cameras`
    pub fn update(&mut self, world: &mut World, cameras: &[Entity]) -> RenderResult<FrameStats> {
        let (surface_width, surface_height) = self.graphics.device().surface_size();
        world.insert_resource(SurfaceSize {
            width: surface_width,
            height: surface_height,
        });
        world.init_resource::<Layers>();
        self.schedule.run(world);

        self.graphics.device_mut().begin_frame()?;
        self.lights.refresh(world);
        self.cameras.sort(world, cameras);

        let renderables: Vec<(Entity, LayerMask)> = world
            .query_filtered::<(Entity, Option<&RenderLayers>), With<Renderable>>()
            .iter(world)
            .map(|(entity, layers)| (entity, layers.map_or(LayerMask::DEFAULT, |l| l.0)))
            .collect();

        let clear_color = self.graphics.clear_color();
        let device = self.graphics.device_mut();
        device.bind_render_target(None);
        device.set_viewport(Viewport::from_size(surface_width, surface_height));
        device.clear(clear_color);

        let world: &World = world;
        let order: Vec<Entity> = self.cameras.sorted().collect();
        let mut stats = FrameStats::default();

        for camera_entity in order {
            let Some(camera) = world.get::<Camera>(camera_entity) else {
                continue;
            };
            let rect = world
                .get::<ViewportRect>(camera_entity)
                .copied()
                .unwrap_or_default();
            let dst = rect.to_pixels(surface_width, surface_height);

            let target = self.prepare_target(dst.width, dst.height)?;
            let device = self.graphics.device_mut();
            device.bind_render_target(Some(target));
            device.set_viewport(Viewport::from_size(dst.width, dst.height));
            device.clear(camera.clear_color.truncate().extend(1.0));

            self.forward.render(
                &mut self.graphics,
                world,
                &self.lights,
                camera_entity,
                &renderables,
                &mut stats,
            );

            if camera.clear_mode == ClearMode::Skybox {
                self.draw_skybox(world, camera_entity);
            }

            let device = self.graphics.device_mut();
            device.bind_render_target(None);
            device.blit_to_surface(target, dst);
            stats.cameras += 1;
        }

        self.graphics.device_mut().end_frame()?;
        log::trace!("Frame done: {:?}", stats);
        Ok(stats)
    }

    /// The shared camera target, resized only when the size changed
    fn prepare_target(&mut self, width: u32, height: u32) -> RenderResult<RenderTargetHandle> {
        let device = self.graphics.device_mut();
        match self.target {
            Some(target) => {
                if device.render_target_size(target) != Some((width, height)) {
                    log::debug!("Resizing camera target to {}x{}", width, height);
                    device.resize_render_target(target, width, height)?;
                }
                Ok(target)
            }
            None => {
                let target = device.create_render_target(width, height, self.config.camera_format)?;
                self.target = Some(target);
                Ok(target)
            }
        }
    }

    fn draw_skybox(&mut self, world: &World, camera: Entity) {
        let Some(material) = &self.skybox.material else {
            return;
        };
        let program = match self.graphics.shader(material.shader()) {
            Ok(program) => program,
            Err(err) => {
                log::warn!("Skybox skipped: {}", err);
                return;
            }
        };

        let view = world.get::<ViewMatrix>(camera).copied().unwrap_or_default().0;
        let projection = world
            .get::<ProjectionMatrix>(camera)
            .copied()
            .unwrap_or_default()
            .0;
        // rotation only, the sky stays centered on the eye
        let view_projection = projection * Mat4::from_mat3(Mat3::from_mat4(view));

        material.apply(&mut self.graphics, &program);
        for uniform in program.with_role(UniformRole::ViewProjection) {
            uniform.set(self.graphics.device_mut(), UniformValue::Mat4(view_projection));
        }

        let front_face = self.graphics.state().front_face.reversed();
        let mut scope = self.graphics.scoped();
        scope.set_depth_testing(true);
        scope.set_depth_func(CompareFunction::LessEqual);
        scope.set_front_face(front_face);
        scope.draw_mesh(self.skybox.handle());
    }

    /// Release the camera target, the sky and every cached program
    pub fn dispose(mut self) {
        if let Some(target) = self.target.take() {
            self.graphics.device_mut().destroy_render_target(target);
        }
        self.skybox.dispose(&mut self.graphics);
        self.graphics.dispose();
    }
}

impl std::fmt::Debug for RenderSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderSystem")
            .field("graphics", &self.graphics)
            .field("config", &self.config)
            .field("target", &self.target)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Transform;

    fn system() -> RenderSystem {
        RenderSystem::new(Box::new(DummyBackend::default()), RendererConfig::default()).unwrap()
    }

    fn backend(system: &RenderSystem) -> &DummyBackend {
        system.graphics().backend::<DummyBackend>().unwrap()
    }

    #[test]
    fn test_target_reused_until_size_changes() {
        let mut system = system();
        let mut world = World::new();
        let full = world.spawn((Camera::default(), Transform::default())).id();
        let half = world
            .spawn((
                Camera::default().with_depth(-1.0),
                Transform::default(),
                ViewportRect::new(0.0, 0.0, 0.5, 0.5),
            ))
            .id();

        system.update(&mut world, &[full]).unwrap();
        system.update(&mut world, &[full]).unwrap();
        assert_eq!(backend(&system).target_allocations(), 1);

        system.update(&mut world, &[full, half]).unwrap();
        // full -> half -> (next frame) full
        assert_eq!(backend(&system).target_allocations(), 2);
        system.update(&mut world, &[full, half]).unwrap();
        assert_eq!(backend(&system).target_allocations(), 4);
    }

    #[test]
    fn test_surface_cleared_then_camera_blitted() {
        let mut system = system();
        let mut world = World::new();
        let rect = ViewportRect::new(0.25, 0.0, 0.5, 1.0);
        let camera = world
            .spawn((
                Camera::default().with_clear_mode(ClearMode::SolidColor),
                Transform::default(),
                rect,
            ))
            .id();

        let stats = system.update(&mut world, &[camera]).unwrap();
        assert_eq!(stats.cameras, 1);

        let backend = backend(&system);
        assert_eq!(backend.clears()[0].target, None);
        assert_eq!(backend.clears()[0].color, system.config().clear_color);
        assert!(backend.clears()[1].target.is_some());
        assert_eq!(backend.blits().len(), 1);
        assert_eq!(backend.blits()[0].dst, rect.to_pixels(1280, 720));
        // solid color: no sky
        assert!(backend.draws().is_empty());
    }

    #[test]
    fn test_skybox_state_restored() {
        let mut system = system();
        let mut world = World::new();
        let camera = world.spawn((Camera::default(), Transform::default())).id();
        let before = *system.graphics().state();

        system.update(&mut world, &[camera]).unwrap();

        let backend = backend(&system);
        let sky = &backend.draws()[0];
        assert_eq!(sky.program_label, "skybox");
        assert_eq!(sky.state.depth_func, CompareFunction::LessEqual);
        assert_eq!(sky.state.front_face, before.front_face.reversed());
        assert_eq!(*system.graphics().state(), before);
    }
}
