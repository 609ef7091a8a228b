//! Linked shading programs and their slot tables

use std::collections::BTreeMap;

use super::{ShaderId, Uniform, UniformRole};
use crate::backend::*;
use crate::error::RenderResult;
use crate::scene::{CasterKind, LightSample};

/// Upper bound on lights a program shades per vertex
pub const MAX_VERT_LIGHTS: usize = 10;

/// A shading program with its immutable slot table.
///
/// Slots are fixed when the program is built; one instance is shared
/// by every material that references the program.
#[derive(Debug)]
pub struct ShaderProgram {
    id: ShaderId,
    handle: ProgramHandle,
    uniforms: BTreeMap<String, Uniform>,
    lights: Option<LightSlots>,
}

impl ShaderProgram {
    pub fn id(&self) -> ShaderId {
        self.id
    }

    pub fn handle(&self) -> ProgramHandle {
        self.handle
    }

    pub fn uniform(&self, name: &str) -> Option<&Uniform> {
        self.uniforms.get(name)
    }

    /// All declared slots, in name order
    pub fn uniforms(&self) -> impl Iterator<Item = &Uniform> {
        self.uniforms.values()
    }

    pub fn with_role(&self, role: UniformRole) -> impl Iterator<Item = &Uniform> {
        self.uniforms.values().filter(move |u| u.role() == role)
    }

    /// Light slots, present on light-aware programs only
    pub fn lights(&self) -> Option<&LightSlots> {
        self.lights.as_ref()
    }

    pub fn is_light_aware(&self) -> bool {
        self.lights.is_some()
    }
}

/// Collects a program's slot declarations
pub struct ProgramBuilder<'a> {
    device: &'a mut dyn RenderDevice,
    id: ShaderId,
    handle: ProgramHandle,
    uniforms: BTreeMap<String, Uniform>,
    lights: Option<LightSlots>,
}

impl<'a> ProgramBuilder<'a> {
    pub(crate) fn new(device: &'a mut dyn RenderDevice, id: ShaderId, handle: ProgramHandle) -> Self {
        Self {
            device,
            id,
            handle,
            uniforms: BTreeMap::new(),
            lights: None,
        }
    }

    /// Declare a slot
    pub fn uniform(
        &mut self,
        name: &str,
        kind: UniformKind,
        role: UniformRole,
    ) -> RenderResult<&mut Self> {
        let uniform = Uniform::new(&mut *self.device, self.handle, name, kind, role)?;
        self.uniforms.insert(name.to_string(), uniform);
        Ok(self)
    }

    /// Declare a slot exposed as a material property
    pub fn material(&mut self, name: &str, kind: UniformKind) -> RenderResult<&mut Self> {
        self.uniform(name, kind, UniformRole::Material)
    }

    /// Make the program light-aware: resolve the ambient slot and the
    /// per-vertex and per-fragment light arrays
    pub fn lighting(&mut self) -> RenderResult<&mut Self> {
        self.uniform("ambientColor", UniformKind::Vec3, UniformRole::AmbientColor)?;
        self.lights = Some(LightSlots::resolve(&mut *self.device, self.handle, MAX_VERT_LIGHTS)?);
        Ok(self)
    }

    pub(crate) fn build(self) -> ShaderProgram {
        ShaderProgram {
            id: self.id,
            handle: self.handle,
            uniforms: self.uniforms,
            lights: self.lights,
        }
    }
}

fn internal(
    device: &mut dyn RenderDevice,
    program: ProgramHandle,
    name: String,
    kind: UniformKind,
) -> RenderResult<Uniform> {
    Uniform::new(device, program, &name, kind, UniformRole::Internal)
}

#[derive(Debug)]
struct BaseSlots {
    color: Uniform,
    intensity: Uniform,
}

impl BaseSlots {
    fn resolve(device: &mut dyn RenderDevice, program: ProgramHandle, prefix: &str) -> RenderResult<Self> {
        Ok(Self {
            color: internal(device, program, format!("{prefix}.color"), UniformKind::Vec3)?,
            intensity: internal(device, program, format!("{prefix}.intensity"), UniformKind::Float)?,
        })
    }

    fn upload(&self, device: &mut dyn RenderDevice, light: &LightSample) {
        self.color.set(device, UniformValue::Vec3(light.color));
        self.intensity.set(device, UniformValue::Float(light.intensity));
    }
}

#[derive(Debug)]
struct DirectionalSlots {
    light: BaseSlots,
    direction: Uniform,
}

impl DirectionalSlots {
    fn resolve(device: &mut dyn RenderDevice, program: ProgramHandle, prefix: &str) -> RenderResult<Self> {
        Ok(Self {
            light: BaseSlots::resolve(device, program, &format!("{prefix}.light"))?,
            direction: internal(device, program, format!("{prefix}.direction"), UniformKind::Vec3)?,
        })
    }

    fn upload(&self, device: &mut dyn RenderDevice, light: &LightSample) {
        self.light.upload(device, light);
        self.direction.set(device, UniformValue::Vec3(light.direction));
    }
}

#[derive(Debug)]
struct PointSlots {
    light: BaseSlots,
    position: Uniform,
    radius: Uniform,
}

impl PointSlots {
    fn resolve(device: &mut dyn RenderDevice, program: ProgramHandle, prefix: &str) -> RenderResult<Self> {
        Ok(Self {
            light: BaseSlots::resolve(device, program, &format!("{prefix}.light"))?,
            position: internal(device, program, format!("{prefix}.position"), UniformKind::Vec3)?,
            radius: internal(device, program, format!("{prefix}.radius"), UniformKind::Float)?,
        })
    }

    fn upload(&self, device: &mut dyn RenderDevice, light: &LightSample) {
        self.light.upload(device, light);
        self.position.set(device, UniformValue::Vec3(light.position));
        self.radius.set(device, UniformValue::Float(light.radius));
    }
}

#[derive(Debug)]
struct SpotSlots {
    point: PointSlots,
    direction: Uniform,
    inner_cutoff: Uniform,
    outer_cutoff: Uniform,
}

impl SpotSlots {
    fn resolve(device: &mut dyn RenderDevice, program: ProgramHandle, prefix: &str) -> RenderResult<Self> {
        Ok(Self {
            point: PointSlots::resolve(device, program, &format!("{prefix}.pointLight"))?,
            direction: internal(device, program, format!("{prefix}.direction"), UniformKind::Vec3)?,
            inner_cutoff: internal(
                device,
                program,
                format!("{prefix}.innerCutoffAngle"),
                UniformKind::Float,
            )?,
            outer_cutoff: internal(
                device,
                program,
                format!("{prefix}.outerCutoffAngle"),
                UniformKind::Float,
            )?,
        })
    }

    fn upload(&self, device: &mut dyn RenderDevice, light: &LightSample) {
        self.point.upload(device, light);
        self.direction.set(device, UniformValue::Vec3(light.direction));
        self.inner_cutoff.set(device, UniformValue::Float(light.inner_cutoff));
        self.outer_cutoff.set(device, UniformValue::Float(light.outer_cutoff));
    }
}

#[derive(Debug)]
struct Counts {
    directional: Uniform,
    point: Uniform,
    spot: Uniform,
}

impl Counts {
    fn resolve(device: &mut dyn RenderDevice, program: ProgramHandle, prefix: &str) -> RenderResult<Self> {
        Ok(Self {
            directional: internal(device, program, format!("num{prefix}DirectionalLights"), UniformKind::Int)?,
            point: internal(device, program, format!("num{prefix}PointLights"), UniformKind::Int)?,
            spot: internal(device, program, format!("num{prefix}SpotLights"), UniformKind::Int)?,
        })
    }

    fn upload(&self, device: &mut dyn RenderDevice, directional: usize, point: usize, spot: usize) {
        self.directional.set(device, UniformValue::Int(directional as i32));
        self.point.set(device, UniformValue::Int(point as i32));
        self.spot.set(device, UniformValue::Int(spot as i32));
    }
}

/// Light slots of a light-aware program, resolved once at build time.
///
/// Vertex lights go into `vert{Directional,Point,Spot}Lights[i]`; the
/// single fragment light of a pass goes into `frag…Lights[0]`.
#[derive(Debug)]
pub struct LightSlots {
    max_vertex_lights: usize,
    vert_counts: Counts,
    frag_counts: Counts,
    vert_directional: Vec<DirectionalSlots>,
    vert_point: Vec<PointSlots>,
    vert_spot: Vec<SpotSlots>,
    frag_directional: DirectionalSlots,
    frag_point: PointSlots,
    frag_spot: SpotSlots,
}

impl LightSlots {
    fn resolve(
        device: &mut dyn RenderDevice,
        program: ProgramHandle,
        max_vertex_lights: usize,
    ) -> RenderResult<Self> {
        let mut vert_directional = Vec::with_capacity(max_vertex_lights);
        let mut vert_point = Vec::with_capacity(max_vertex_lights);
        let mut vert_spot = Vec::with_capacity(max_vertex_lights);
        for i in 0..max_vertex_lights {
            vert_directional.push(DirectionalSlots::resolve(
                device,
                program,
                &format!("vertDirectionalLights[{i}]"),
            )?);
            vert_point.push(PointSlots::resolve(device, program, &format!("vertPointLights[{i}]"))?);
            vert_spot.push(SpotSlots::resolve(device, program, &format!("vertSpotLights[{i}]"))?);
        }

        Ok(Self {
            max_vertex_lights,
            vert_counts: Counts::resolve(device, program, "Vert")?,
            frag_counts: Counts::resolve(device, program, "Frag")?,
            vert_directional,
            vert_point,
            vert_spot,
            frag_directional: DirectionalSlots::resolve(device, program, "fragDirectionalLights[0]")?,
            frag_point: PointSlots::resolve(device, program, "fragPointLights[0]")?,
            frag_spot: SpotSlots::resolve(device, program, "fragSpotLights[0]")?,
        })
    }

    pub fn max_vertex_lights(&self) -> usize {
        self.max_vertex_lights
    }

    /// Upload per-vertex lights.
    ///
    /// Lights past [`max_vertex_lights`](Self::max_vertex_lights) are
    /// dropped with a warning. Returns the number dropped.
    pub fn upload_vertex_lights(&self, device: &mut dyn RenderDevice, lights: &[LightSample]) -> usize {
        let dropped = lights.len().saturating_sub(self.max_vertex_lights);
        if dropped > 0 {
            log::warn!(
                "{} vertex lights exceed the limit of {}; dropping {}",
                lights.len(),
                self.max_vertex_lights,
                dropped
            );
        }

        let (mut directional, mut point, mut spot) = (0, 0, 0);
        for light in lights.iter().take(self.max_vertex_lights) {
            match light.kind {
                CasterKind::Directional => {
                    self.vert_directional[directional].upload(device, light);
                    directional += 1;
                }
                CasterKind::Point => {
                    self.vert_point[point].upload(device, light);
                    point += 1;
                }
                CasterKind::Spot => {
                    self.vert_spot[spot].upload(device, light);
                    spot += 1;
                }
            }
        }
        self.vert_counts.upload(device, directional, point, spot);
        dropped
    }

    /// Upload the fragment light of one pass, or none
    pub fn upload_fragment_light(&self, device: &mut dyn RenderDevice, light: Option<&LightSample>) {
        let kind = light.map(|l| l.kind);
        if let Some(light) = light {
            match light.kind {
                CasterKind::Directional => self.frag_directional.upload(device, light),
                CasterKind::Point => self.frag_point.upload(device, light),
                CasterKind::Spot => self.frag_spot.upload(device, light),
            }
        }
        self.frag_counts.upload(
            device,
            (kind == Some(CasterKind::Directional)) as usize,
            (kind == Some(CasterKind::Point)) as usize,
            (kind == Some(CasterKind::Spot)) as usize,
        );
    }

    /// Disable per-vertex lighting
    pub fn clear_vertex_lights(&self, device: &mut dyn RenderDevice) {
        self.vert_counts.upload(device, 0, 0, 0);
    }
}
