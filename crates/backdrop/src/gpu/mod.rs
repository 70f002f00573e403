//! The wgpu implementation of [`GpuBackend`].
//!
//! - `context` owns the instance, device and presentation surface.
//! - `pipeline` turns material descriptors into render pipelines over a
//!   shared three-group layout: frame, draw and material textures.
//! - `uniforms` mirrors the WGSL uniform blocks.
//!
//! Scenes render into an `Rgba16Float` target; a resolve pass copies it to
//! the swapchain, applying ACES tone mapping when the frame asks for it.
//! Trail veils keep the previous frame by loading that target instead of
//! clearing it.

mod context;
mod pipeline;
mod uniforms;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use wgpu::util::{DeviceExt, TextureDataOrder};
use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::backend::{
    physical_size, BackendError, ClearMode, FrameDescription, GeometryId, GpuBackend, GpuResource,
    MaterialDescriptor, MaterialId, MaterialKind, BackdropFill, SurfaceDescriptor, SurfaceId,
    TextureDescriptor, TextureId, TextureSlot, TextureWrap,
};
use crate::mesh::{MeshData, Topology};

use self::context::{GpuContext, DEPTH_FORMAT, SCENE_FORMAT};
use self::pipeline::{is_instanced_points, PipelineLayouts};
use self::uniforms::{DrawUniforms, FrameUniforms, MaterialConstants, PresentUniforms};

const INITIAL_DRAW_CAPACITY: usize = 32;

struct GpuTexture {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
}

enum GeometryBuffers {
    Triangles {
        positions: wgpu::Buffer,
        normals: wgpu::Buffer,
        uvs: wgpu::Buffer,
        indices: wgpu::Buffer,
        index_count: u32,
    },
    Points {
        positions: wgpu::Buffer,
        attributes: wgpu::Buffer,
    },
}

struct GpuGeometry {
    vertex_count: usize,
    buffers: GeometryBuffers,
}

impl GpuGeometry {
    fn positions(&self) -> &wgpu::Buffer {
        match &self.buffers {
            GeometryBuffers::Triangles { positions, .. } | GeometryBuffers::Points { positions, .. } => positions,
        }
    }
}

struct GpuMaterial {
    desc: MaterialDescriptor,
    constants: MaterialConstants,
    pipeline: wgpu::RenderPipeline,
    /// Primary, accent and environment textures.
    slots: [Option<TextureId>; 3],
    bind_group: wgpu::BindGroup,
}

struct SceneTargets {
    color: wgpu::TextureView,
    depth: wgpu::TextureView,
    resolve_group: wgpu::BindGroup,
}

struct SurfaceState {
    id: SurfaceId,
    width: u32,
    height: u32,
    pixel_ratio: f32,
    transparent: bool,
    targets: SceneTargets,
}

fn material_slots(desc: &MaterialDescriptor) -> [Option<TextureId>; 3] {
    match desc.kind {
        MaterialKind::Points { texture, accent, .. } => [Some(texture), accent, None],
        MaterialKind::Sprite { texture }
        | MaterialKind::Backdrop {
            fill: BackdropFill::Texture(texture),
        } => [Some(texture), None, None],
        MaterialKind::Unlit { texture } => [texture, None, None],
        MaterialKind::Standard { environment, .. } => [None, None, environment],
        MaterialKind::Water {
            normal_map,
            environment,
            ..
        } => [None, Some(normal_map), environment],
        MaterialKind::Backdrop { .. }
        | MaterialKind::Trail
        | MaterialKind::Phong { .. }
        | MaterialKind::Sky { .. } => [None; 3],
    }
}

fn slot_index(slot: TextureSlot) -> usize {
    match slot {
        TextureSlot::Primary => 0,
        TextureSlot::Accent => 1,
        TextureSlot::Environment => 2,
    }
}

fn aligned(size: usize, alignment: u32) -> usize {
    let alignment = alignment.max(1) as usize;
    size.div_ceil(alignment) * alignment
}

/// Renders backdrops into a winit window.
pub struct WgpuBackend {
    context: GpuContext,
    layouts: PipelineLayouts,
    resolve: wgpu::RenderPipeline,
    frame_buffer: wgpu::Buffer,
    frame_group: wgpu::BindGroup,
    draw_buffer: wgpu::Buffer,
    draw_group: wgpu::BindGroup,
    draw_capacity: usize,
    draw_stride: usize,
    present_buffer: wgpu::Buffer,
    fallback: GpuTexture,
    surface: Option<SurfaceState>,
    textures: HashMap<TextureId, GpuTexture>,
    geometries: HashMap<GeometryId, GpuGeometry>,
    materials: HashMap<MaterialId, GpuMaterial>,
    next_id: u32,
}

impl WgpuBackend {
    pub fn new(window: Arc<Window>, power: wgpu::PowerPreference) -> Result<Self> {
        let context = GpuContext::new(window, power)?;
        let device = &context.device;
        let layouts = PipelineLayouts::new(device);
        let resolve = layouts.blit_pipeline(device, context.surface_format);

        let frame_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("frame uniforms"),
            size: std::mem::size_of::<FrameUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let frame_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("frame bind group"),
            layout: &layouts.frame_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: frame_buffer.as_entire_binding(),
            }],
        });

        let draw_stride = aligned(std::mem::size_of::<DrawUniforms>(), context.uniform_alignment);
        let (draw_buffer, draw_group) = Self::draw_resources(device, &layouts, draw_stride, INITIAL_DRAW_CAPACITY);

        let present_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("present uniforms"),
            size: std::mem::size_of::<PresentUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let fallback = upload_texture(
            device,
            &context.queue,
            &TextureDescriptor {
                label: "fallback white",
                width: 1,
                height: 1,
                pixels: &[255, 255, 255, 255],
                wrap: TextureWrap::Clamp,
                srgb: true,
            },
        );

        Ok(Self {
            context,
            layouts,
            resolve,
            frame_buffer,
            frame_group,
            draw_buffer,
            draw_group,
            draw_capacity: INITIAL_DRAW_CAPACITY,
            draw_stride,
            present_buffer,
            fallback,
            surface: None,
            textures: HashMap::new(),
            geometries: HashMap::new(),
            materials: HashMap::new(),
            next_id: 0,
        })
    }

    /// Resources currently alive on the device, the surface included.
    pub fn live_resources(&self) -> usize {
        self.textures.len()
            + self.geometries.len()
            + self.materials.len()
            + usize::from(self.surface.is_some())
    }

    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn draw_resources(
        device: &wgpu::Device,
        layouts: &PipelineLayouts,
        stride: usize,
        capacity: usize,
    ) -> (wgpu::Buffer, wgpu::BindGroup) {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("draw uniforms"),
            size: (stride * capacity) as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("draw bind group"),
            layout: &layouts.draw_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(std::mem::size_of::<DrawUniforms>() as u64),
                }),
            }],
        });
        (buffer, group)
    }

    fn ensure_draw_capacity(&mut self, draws: usize) {
        if draws <= self.draw_capacity {
            return;
        }
        let capacity = draws.next_power_of_two();
        let (buffer, group) = Self::draw_resources(&self.context.device, &self.layouts, self.draw_stride, capacity);
        self.draw_buffer = buffer;
        self.draw_group = group;
        self.draw_capacity = capacity;
        tracing::debug!(capacity, "grew draw uniform buffer");
    }

    fn material_group(&self, label: &str, slots: &[Option<TextureId>; 3]) -> Result<wgpu::BindGroup, BackendError> {
        let mut bound = Vec::with_capacity(3);
        for slot in slots {
            let texture = match slot {
                Some(id) => self
                    .textures
                    .get(id)
                    .ok_or_else(|| BackendError::unknown(GpuResource::Texture(*id)))?,
                None => &self.fallback,
            };
            bound.push(texture);
        }
        let mut entries = Vec::with_capacity(6);
        for (index, texture) in bound.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: index as u32 * 2,
                resource: wgpu::BindingResource::TextureView(&texture.view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: index as u32 * 2 + 1,
                resource: wgpu::BindingResource::Sampler(&texture.sampler),
            });
        }
        Ok(self.context.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.layouts.material_layout,
            entries: &entries,
        }))
    }

    fn scene_targets(&self, width: u32, height: u32) -> SceneTargets {
        let device = &self.context.device;
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let target = |label, format, usage| {
            device
                .create_texture(&wgpu::TextureDescriptor {
                    label: Some(label),
                    size,
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format,
                    usage,
                    view_formats: &[],
                })
                .create_view(&wgpu::TextureViewDescriptor::default())
        };
        let color = target(
            "scene colour",
            SCENE_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        );
        let depth = target("scene depth", DEPTH_FORMAT, wgpu::TextureUsages::RENDER_ATTACHMENT);
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let resolve_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("resolve bind group"),
            layout: &self.layouts.blit_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&color),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.present_buffer.as_entire_binding(),
                },
            ],
        });
        SceneTargets {
            color,
            depth,
            resolve_group,
        }
    }

    fn physical(&self, width: u32, height: u32, pixel_ratio: f32) -> (u32, u32) {
        let max = self.context.device.limits().max_texture_dimension_2d;
        let (width, height) = physical_size(width, height, pixel_ratio);
        if width > max || height > max {
            tracing::warn!(width, height, max, "surface exceeds device limits; clamping");
        }
        (width.min(max), height.min(max))
    }

    fn surface_state(&self, surface: SurfaceId) -> Result<&SurfaceState, BackendError> {
        self.surface
            .as_ref()
            .filter(|state| state.id == surface)
            .ok_or_else(|| BackendError::unknown(GpuResource::Surface(surface)))
    }
}

fn upload_texture(device: &wgpu::Device, queue: &wgpu::Queue, desc: &TextureDescriptor<'_>) -> GpuTexture {
    let format = if desc.srgb {
        wgpu::TextureFormat::Rgba8UnormSrgb
    } else {
        wgpu::TextureFormat::Rgba8Unorm
    };
    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some(desc.label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        TextureDataOrder::LayerMajor,
        desc.pixels,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let address_mode = match desc.wrap {
        TextureWrap::Clamp => wgpu::AddressMode::ClampToEdge,
        TextureWrap::Repeat => wgpu::AddressMode::Repeat,
    };
    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        address_mode_u: address_mode,
        address_mode_v: address_mode,
        address_mode_w: address_mode,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    });
    GpuTexture {
        _texture: texture,
        view,
        sampler,
    }
}

fn vertex_buffer(device: &wgpu::Device, label: &str, contents: &[u8], usage: wgpu::BufferUsages) -> wgpu::Buffer {
    // Zero-length vertex buffers cannot be bound.
    let padding = [0u8; 16];
    let contents = if contents.is_empty() { &padding[..] } else { contents };
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents,
        usage,
    })
}

impl GpuBackend for WgpuBackend {
    fn create_surface(&mut self, desc: &SurfaceDescriptor) -> Result<SurfaceId, BackendError> {
        if self.surface.is_some() {
            return Err(BackendError::SurfaceBusy);
        }
        if desc.antialias {
            tracing::debug!("multisampling is not used; antialias request ignored");
        }
        let (width, height) = self.physical(desc.width, desc.height, desc.pixel_ratio);
        self.context.set_transparent(desc.transparent);
        self.context.resize(PhysicalSize::new(width, height));
        let targets = self.scene_targets(width, height);
        let id = SurfaceId(self.next_id());
        self.surface = Some(SurfaceState {
            id,
            width: desc.width,
            height: desc.height,
            pixel_ratio: desc.pixel_ratio,
            transparent: desc.transparent,
            targets,
        });
        tracing::debug!(surface = id.0, width, height, "render surface created");
        Ok(id)
    }

    fn resize_surface(
        &mut self,
        surface: SurfaceId,
        width: u32,
        height: u32,
        pixel_ratio: f32,
    ) -> Result<(), BackendError> {
        self.surface_state(surface)?;
        let (physical_width, physical_height) = self.physical(width, height, pixel_ratio);
        self.context.resize(PhysicalSize::new(physical_width, physical_height));
        let targets = self.scene_targets(physical_width, physical_height);
        if let Some(state) = self.surface.as_mut() {
            state.width = width;
            state.height = height;
            state.pixel_ratio = pixel_ratio;
            state.targets = targets;
        }
        Ok(())
    }

    fn create_texture(&mut self, desc: &TextureDescriptor<'_>) -> Result<TextureId, BackendError> {
        if desc.pixels.len() != desc.expected_len() || desc.width == 0 || desc.height == 0 {
            return Err(BackendError::TextureSize {
                label: desc.label.to_string(),
                expected: desc.expected_len(),
                actual: desc.pixels.len(),
            });
        }
        let texture = upload_texture(&self.context.device, &self.context.queue, desc);
        let id = TextureId(self.next_id());
        self.textures.insert(id, texture);
        Ok(id)
    }

    fn create_geometry(&mut self, label: &str, mesh: &MeshData) -> Result<GeometryId, BackendError> {
        let device = &self.context.device;
        let count = mesh.vertex_count();
        let vertex = wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST;
        let positions = vertex_buffer(device, label, bytemuck::cast_slice(&mesh.positions), vertex);
        let buffers = match mesh.topology {
            Topology::Points => {
                let mut attributes = mesh.attributes.clone();
                attributes.resize(count, [1.0, 0.0, 0.0, 0.0]);
                GeometryBuffers::Points {
                    positions,
                    attributes: vertex_buffer(device, label, bytemuck::cast_slice(&attributes), vertex),
                }
            }
            Topology::Triangles => {
                let mut normals = mesh.normals.clone();
                normals.resize(count, [0.0, 0.0, 1.0]);
                let mut uvs = mesh.uvs.clone();
                uvs.resize(count, [0.0, 0.0]);
                let indices: Vec<u32> = if mesh.indices.is_empty() {
                    (0..count as u32).collect()
                } else {
                    mesh.indices.clone()
                };
                GeometryBuffers::Triangles {
                    positions,
                    normals: vertex_buffer(device, label, bytemuck::cast_slice(&normals), vertex),
                    uvs: vertex_buffer(device, label, bytemuck::cast_slice(&uvs), vertex),
                    indices: vertex_buffer(device, label, bytemuck::cast_slice(&indices), wgpu::BufferUsages::INDEX),
                    index_count: indices.len() as u32,
                }
            }
        };
        let id = GeometryId(self.next_id());
        self.geometries.insert(
            id,
            GpuGeometry {
                vertex_count: count,
                buffers,
            },
        );
        Ok(id)
    }

    fn update_positions(&mut self, geometry: GeometryId, positions: &[[f32; 3]]) -> Result<(), BackendError> {
        let record = self
            .geometries
            .get(&geometry)
            .ok_or_else(|| BackendError::unknown(GpuResource::Geometry(geometry)))?;
        if record.vertex_count != positions.len() {
            return Err(BackendError::VertexCount {
                id: geometry.0,
                expected: record.vertex_count,
                actual: positions.len(),
            });
        }
        if !positions.is_empty() {
            self.context
                .queue
                .write_buffer(record.positions(), 0, bytemuck::cast_slice(positions));
        }
        Ok(())
    }

    fn create_material(&mut self, desc: &MaterialDescriptor) -> Result<MaterialId, BackendError> {
        let slots = material_slots(desc);
        let bind_group = self.material_group(&desc.label, &slots)?;
        let pipeline = self.layouts.material_pipeline(&self.context.device, desc);
        let id = MaterialId(self.next_id());
        self.materials.insert(
            id,
            GpuMaterial {
                desc: desc.clone(),
                constants: MaterialConstants::pack(desc),
                pipeline,
                slots,
                bind_group,
            },
        );
        Ok(id)
    }

    fn set_material_texture(
        &mut self,
        material: MaterialId,
        slot: TextureSlot,
        texture: TextureId,
    ) -> Result<(), BackendError> {
        let (label, mut slots) = match self.materials.get(&material) {
            Some(record) => (record.desc.label.clone(), record.slots),
            None => return Err(BackendError::unknown(GpuResource::Material(material))),
        };
        slots[slot_index(slot)] = Some(texture);
        let bind_group = self.material_group(&label, &slots)?;
        if let Some(record) = self.materials.get_mut(&material) {
            record.slots = slots;
            record.bind_group = bind_group;
        }
        Ok(())
    }

    fn render(&mut self, surface: SurfaceId, frame: &FrameDescription) -> Result<(), BackendError> {
        let (width, height, pixel_ratio, transparent) = {
            let state = self.surface_state(surface)?;
            (state.width, state.height, state.pixel_ratio, state.transparent)
        };
        let (physical_width, physical_height) = self.physical(width, height, pixel_ratio);

        self.ensure_draw_capacity(frame.draws.len());
        let mut draw_bytes = vec![0u8; self.draw_stride * frame.draws.len().max(1)];
        for (index, draw) in frame.draws.iter().enumerate() {
            let geometry = self
                .geometries
                .get(&draw.geometry)
                .ok_or_else(|| BackendError::unknown(GpuResource::Geometry(draw.geometry)))?;
            let material = self
                .materials
                .get(&draw.material)
                .ok_or_else(|| BackendError::unknown(GpuResource::Material(draw.material)))?;
            let points = matches!(geometry.buffers, GeometryBuffers::Points { .. });
            if points != is_instanced_points(&material.desc.kind) {
                return Err(BackendError::Device(format!(
                    "material '{}' cannot draw geometry #{}",
                    material.desc.label, draw.geometry.0
                )));
            }
            let uniforms = material
                .constants
                .with_draw(draw.model, material.desc.color, draw.tint, draw.params);
            let offset = index * self.draw_stride;
            draw_bytes[offset..offset + std::mem::size_of::<DrawUniforms>()]
                .copy_from_slice(bytemuck::bytes_of(&uniforms));
        }

        let queue = &self.context.queue;
        queue.write_buffer(
            &self.frame_buffer,
            0,
            bytemuck::bytes_of(&FrameUniforms::from_frame(frame, physical_width, physical_height, pixel_ratio)),
        );
        queue.write_buffer(&self.draw_buffer, 0, &draw_bytes);
        queue.write_buffer(
            &self.present_buffer,
            0,
            bytemuck::bytes_of(&PresentUniforms::new(frame.exposure, transparent)),
        );

        let output = match self.context.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.context.reconfigure();
                return Err(BackendError::SurfaceLost);
            }
            Err(error) => return Err(BackendError::Device(format!("surface error: {error}"))),
        };
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let Some(state) = self.surface.as_ref() else {
            return Err(BackendError::unknown(GpuResource::Surface(surface)));
        };

        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("backdrop frame"),
            });
        {
            let load = match frame.clear {
                ClearMode::Color([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                    r: r as f64,
                    g: g as f64,
                    b: b as f64,
                    a: a as f64,
                }),
                ClearMode::Preserve => wgpu::LoadOp::Load,
            };
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("scene pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &state.targets.color,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &state.targets.depth,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Discard,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            pass.set_bind_group(0, &self.frame_group, &[]);
            for (index, draw) in frame.draws.iter().enumerate() {
                let (Some(geometry), Some(material)) =
                    (self.geometries.get(&draw.geometry), self.materials.get(&draw.material))
                else {
                    continue;
                };
                if geometry.vertex_count == 0 {
                    continue;
                }
                pass.set_pipeline(&material.pipeline);
                pass.set_bind_group(1, &self.draw_group, &[(index * self.draw_stride) as u32]);
                pass.set_bind_group(2, &material.bind_group, &[]);
                match &geometry.buffers {
                    GeometryBuffers::Points {
                        positions,
                        attributes,
                    } => {
                        pass.set_vertex_buffer(0, positions.slice(..));
                        pass.set_vertex_buffer(1, attributes.slice(..));
                        pass.draw(0..6, 0..geometry.vertex_count as u32);
                    }
                    GeometryBuffers::Triangles {
                        positions,
                        normals,
                        uvs,
                        indices,
                        index_count,
                    } => {
                        pass.set_vertex_buffer(0, positions.slice(..));
                        pass.set_vertex_buffer(1, normals.slice(..));
                        pass.set_vertex_buffer(2, uvs.slice(..));
                        pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
                        pass.draw_indexed(0..*index_count, 0, 0..1);
                    }
                }
            }
        }
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("resolve pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.resolve);
            pass.set_bind_group(0, &state.targets.resolve_group, &[]);
            pass.draw(0..3, 0..1);
        }
        self.context.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }

    fn dispose(&mut self, resource: GpuResource) -> Result<(), BackendError> {
        let removed = match resource {
            GpuResource::Surface(id) => {
                let live = self.surface.as_ref().is_some_and(|state| state.id == id);
                if live {
                    self.surface = None;
                }
                live
            }
            GpuResource::Texture(id) => self.textures.remove(&id).is_some(),
            GpuResource::Geometry(id) => self.geometries.remove(&id).is_some(),
            GpuResource::Material(id) => self.materials.remove(&id).is_some(),
        };
        if removed {
            Ok(())
        } else {
            Err(BackendError::unknown(resource))
        }
    }
}
