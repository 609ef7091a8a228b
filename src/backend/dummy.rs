//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't perform actual GPU operations. It keeps enough
//! bookkeeping to answer questions about what the renderer asked for:
//! every draw is recorded with the program, fixed-function state, bound
//! textures and the parameter values visible at draw time.

use std::any::Any;
use std::collections::{BTreeMap, HashMap, HashSet};

use glam::Vec4;

use crate::backend::traits::*;
use crate::backend::types::*;

/// A draw recorded by [`DummyBackend`]
#[derive(Debug, Clone)]
pub struct DrawCall {
    pub program: ProgramHandle,
    pub program_label: String,
    pub mesh: MeshHandle,
    pub target: Option<RenderTargetHandle>,
    pub state: PipelineState,
    pub viewport: Viewport,
    /// Parameter values of the program at draw time, by slot name
    pub uniforms: HashMap<String, UniformValue>,
    /// Texture bound to each unit at draw time
    pub textures: BTreeMap<u32, TextureHandle>,
}

impl DrawCall {
    pub fn uniform(&self, name: &str) -> Option<&UniformValue> {
        self.uniforms.get(name)
    }

    pub fn int(&self, name: &str) -> Option<i32> {
        match self.uniforms.get(name) {
            Some(UniformValue::Int(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn vec3(&self, name: &str) -> Option<glam::Vec3> {
        match self.uniforms.get(name) {
            Some(UniformValue::Vec3(value)) => Some(*value),
            _ => None,
        }
    }

    /// Whether this draw composites additively over an earlier one
    pub fn is_additive(&self) -> bool {
        self.state.blend == Some(BlendState::additive())
            && self.state.depth_func == CompareFunction::Equal
            && !self.state.depth_write
    }
}

/// A clear recorded by [`DummyBackend`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearCall {
    pub target: Option<RenderTargetHandle>,
    pub color: Vec4,
}

/// A blit recorded by [`DummyBackend`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlitCall {
    pub source: RenderTargetHandle,
    pub dst: Viewport,
}

#[derive(Debug, Default)]
struct DummyProgram {
    label: String,
    slots: HashMap<String, u32>,
    names: Vec<String>,
    values: HashMap<u32, UniformValue>,
}

#[derive(Debug, Clone)]
struct DummyTexture {
    desc: TextureDescriptor,
    data: Option<Vec<u8>>,
}

/// Dummy GPU backend.
#[derive(Debug)]
pub struct DummyBackend {
    surface_size: (u32, u32),
    programs: HashMap<u64, DummyProgram>,
    textures: HashMap<u64, DummyTexture>,
    meshes: HashMap<u64, usize>,
    targets: HashMap<u64, (u32, u32)>,
    stripped: HashSet<String>,

    current_program: Option<ProgramHandle>,
    current_target: Option<RenderTargetHandle>,
    state: PipelineState,
    viewport: Viewport,
    units: BTreeMap<u32, TextureHandle>,
    next_id: u64,

    draws: Vec<DrawCall>,
    clears: Vec<ClearCall>,
    blits: Vec<BlitCall>,
    target_allocations: usize,
    state_changes: usize,
    frames: usize,
}

impl DummyBackend {
    /// Create a new dummy backend with the given output surface size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            surface_size: (width, height),
            programs: HashMap::new(),
            textures: HashMap::new(),
            meshes: HashMap::new(),
            targets: HashMap::new(),
            stripped: HashSet::new(),
            current_program: None,
            current_target: None,
            state: PipelineState::default(),
            viewport: Viewport::from_size(width, height),
            units: BTreeMap::new(),
            next_id: 1,
            draws: Vec::new(),
            clears: Vec::new(),
            blits: Vec::new(),
            target_allocations: 0,
            state_changes: 0,
            frames: 0,
        }
    }

    /// Make `name` unresolvable in every program, as if the shader
    /// compiler had optimized the slot away.
    pub fn strip_uniform(&mut self, name: impl Into<String>) {
        self.stripped.insert(name.into());
    }

    /// Change the output surface size
    pub fn resize_surface(&mut self, width: u32, height: u32) {
        self.surface_size = (width, height);
    }

    pub fn draws(&self) -> &[DrawCall] {
        &self.draws
    }

    pub fn clears(&self) -> &[ClearCall] {
        &self.clears
    }

    pub fn blits(&self) -> &[BlitCall] {
        &self.blits
    }

    /// Number of times a render target's attachments were (re)allocated
    pub fn target_allocations(&self) -> usize {
        self.target_allocations
    }

    /// Number of `apply_state` calls that changed the state
    pub fn state_changes(&self) -> usize {
        self.state_changes
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    /// The fixed-function state most recently applied
    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn current_program(&self) -> Option<ProgramHandle> {
        self.current_program
    }

    pub fn program_label(&self, program: ProgramHandle) -> Option<&str> {
        self.programs.get(&program.0).map(|p| p.label.as_str())
    }

    /// Current value of a program's parameter slot
    pub fn uniform_value(&self, program: ProgramHandle, name: &str) -> Option<UniformValue> {
        let program = self.programs.get(&program.0)?;
        let slot = program.slots.get(name)?;
        program.values.get(slot).copied()
    }

    pub fn texture_alive(&self, texture: TextureHandle) -> bool {
        self.textures.contains_key(&texture.0)
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn texture_data(&self, texture: TextureHandle) -> Option<&[u8]> {
        self.textures.get(&texture.0)?.data.as_deref()
    }

    pub fn live_meshes(&self) -> usize {
        self.meshes.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    /// Forget everything recorded so far, keeping live resources
    pub fn clear_recording(&mut self) {
        self.draws.clear();
        self.clears.clear();
        self.blits.clear();
        self.state_changes = 0;
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

impl RenderDevice for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    fn surface_size(&self) -> (u32, u32) {
        self.surface_size
    }

    fn begin_frame(&mut self) -> BackendResult<()> {
        log::trace!("DummyBackend: begin frame {}", self.frames);
        Ok(())
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        log::trace!(
            "DummyBackend: end frame {} ({} draws so far)",
            self.frames,
            self.draws.len()
        );
        self.frames += 1;
        Ok(())
    }

    fn create_program(&mut self, source: &ProgramSource) -> BackendResult<ProgramHandle> {
        log::trace!("DummyBackend: creating program {:?}", source.label);
        let id = self.allocate_id();
        self.programs.insert(
            id,
            DummyProgram {
                label: source.label.clone(),
                ..Default::default()
            },
        );
        Ok(ProgramHandle(id))
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program.0);
        if self.current_program == Some(program) {
            self.current_program = None;
        }
    }

    fn uniform_location(
        &mut self,
        program: ProgramHandle,
        name: &str,
        _kind: UniformKind,
    ) -> BackendResult<Option<UniformLocation>> {
        if self.stripped.contains(name) {
            return Ok(None);
        }
        let entry = self
            .programs
            .get_mut(&program.0)
            .ok_or(BackendError::InvalidHandle("program"))?;

        let slot = match entry.slots.get(name) {
            Some(slot) => *slot,
            None => {
                let slot = entry.names.len() as u32;
                entry.names.push(name.to_string());
                entry.slots.insert(name.to_string(), slot);
                slot
            }
        };
        Ok(Some(UniformLocation { program, slot }))
    }

    fn use_program(&mut self, program: ProgramHandle) {
        self.current_program = Some(program);
    }

    fn set_uniform(&mut self, location: UniformLocation, value: &UniformValue) {
        if let Some(program) = self.programs.get_mut(&location.program.0) {
            program.values.insert(location.slot, *value);
        }
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureHandle) {
        self.units.insert(unit, texture);
    }

    fn apply_state(&mut self, state: &PipelineState) {
        if self.state != *state {
            self.state_changes += 1;
        }
        self.state = *state;
    }

    fn create_texture(
        &mut self,
        desc: &TextureDescriptor,
        data: Option<&[u8]>,
    ) -> BackendResult<TextureHandle> {
        log::trace!(
            "DummyBackend: creating texture {:?} ({}x{}, {:?})",
            desc.label,
            desc.width,
            desc.height,
            desc.kind
        );
        if let Some(data) = data {
            if data.len() != desc.data_size() {
                return Err(BackendError::TextureCreationFailed(format!(
                    "expected {} bytes of pixel data, got {}",
                    desc.data_size(),
                    data.len()
                )));
            }
        }
        let id = self.allocate_id();
        self.textures.insert(
            id,
            DummyTexture {
                desc: desc.clone(),
                data: data.map(<[u8]>::to_vec),
            },
        );
        Ok(TextureHandle(id))
    }

    fn copy_texture(&mut self, texture: TextureHandle) -> BackendResult<TextureHandle> {
        let copy = self
            .textures
            .get(&texture.0)
            .cloned()
            .ok_or(BackendError::InvalidHandle("texture"))?;
        log::trace!("DummyBackend: copying texture {:?}", copy.desc.label);
        let id = self.allocate_id();
        self.textures.insert(id, copy);
        Ok(TextureHandle(id))
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture.0);
    }

    fn create_mesh(&mut self, vertices: &[Vertex], indices: &[u32]) -> BackendResult<MeshHandle> {
        log::trace!(
            "DummyBackend: creating mesh ({} vertices, {} indices)",
            vertices.len(),
            indices.len()
        );
        let id = self.allocate_id();
        self.meshes.insert(id, indices.len());
        Ok(MeshHandle(id))
    }

    fn destroy_mesh(&mut self, mesh: MeshHandle) {
        self.meshes.remove(&mesh.0);
    }

    fn draw_mesh(&mut self, mesh: MeshHandle) {
        let Some(program) = self.current_program else {
            log::warn!("DummyBackend: draw without a program");
            return;
        };
        let Some(entry) = self.programs.get(&program.0) else {
            return;
        };
        let uniforms = entry
            .values
            .iter()
            .filter_map(|(slot, value)| {
                entry
                    .names
                    .get(*slot as usize)
                    .map(|name| (name.clone(), *value))
            })
            .collect();

        self.draws.push(DrawCall {
            program,
            program_label: entry.label.clone(),
            mesh,
            target: self.current_target,
            state: self.state,
            viewport: self.viewport,
            uniforms,
            textures: self.units.clone(),
        });
    }

    fn create_render_target(
        &mut self,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> BackendResult<RenderTargetHandle> {
        log::trace!(
            "DummyBackend: creating render target {}x{} ({:?})",
            width,
            height,
            format
        );
        let id = self.allocate_id();
        self.targets.insert(id, (width, height));
        self.target_allocations += 1;
        Ok(RenderTargetHandle(id))
    }

    fn resize_render_target(
        &mut self,
        target: RenderTargetHandle,
        width: u32,
        height: u32,
    ) -> BackendResult<()> {
        let size = self
            .targets
            .get_mut(&target.0)
            .ok_or(BackendError::InvalidHandle("render target"))?;
        *size = (width, height);
        self.target_allocations += 1;
        Ok(())
    }

    fn render_target_size(&self, target: RenderTargetHandle) -> Option<(u32, u32)> {
        self.targets.get(&target.0).copied()
    }

    fn destroy_render_target(&mut self, target: RenderTargetHandle) {
        self.targets.remove(&target.0);
    }

    fn bind_render_target(&mut self, target: Option<RenderTargetHandle>) {
        self.current_target = target;
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    fn clear(&mut self, color: Vec4) {
        self.clears.push(ClearCall {
            target: self.current_target,
            color,
        });
    }

    fn blit_to_surface(&mut self, target: RenderTargetHandle, dst: Viewport) {
        self.blits.push(BlitCall { source: target, dst });
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
