use std::collections::HashMap;

use crate::backend::{BackdropFill, BlendMode, MaterialDescriptor, MaterialKind};

use super::context::{DEPTH_FORMAT, SCENE_FORMAT};

const COMMON: &str = include_str!("shaders/common.wgsl");
const POINTS: &str = include_str!("shaders/points.wgsl");
const MESH: &str = include_str!("shaders/mesh.wgsl");
const BACKDROP: &str = include_str!("shaders/backdrop.wgsl");
const SKY: &str = include_str!("shaders/sky.wgsl");
const WATER: &str = include_str!("shaders/water.wgsl");
const BLIT: &str = include_str!("shaders/blit.wgsl");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ShaderFile {
    Points,
    Mesh,
    Backdrop,
    Sky,
    Water,
}

impl ShaderFile {
    fn body(self) -> &'static str {
        match self {
            ShaderFile::Points => POINTS,
            ShaderFile::Mesh => MESH,
            ShaderFile::Backdrop => BACKDROP,
            ShaderFile::Sky => SKY,
            ShaderFile::Water => WATER,
        }
    }
}

/// Which module and entry points draw a material, and how its vertices are fed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ShaderProgram {
    source: ShaderFile,
    vertex: &'static str,
    fragment: &'static str,
    instanced_points: bool,
}

fn program_for(kind: &MaterialKind) -> ShaderProgram {
    let program = |source, vertex, fragment| ShaderProgram {
        source,
        vertex,
        fragment,
        instanced_points: false,
    };
    match kind {
        MaterialKind::Points { .. } => ShaderProgram {
            instanced_points: true,
            ..program(ShaderFile::Points, "vs_main", "fs_main")
        },
        MaterialKind::Backdrop {
            fill: BackdropFill::DuskFog,
        } => program(ShaderFile::Backdrop, "vs_main", "fs_dusk"),
        MaterialKind::Backdrop {
            fill: BackdropFill::Texture(_),
        } => program(ShaderFile::Backdrop, "vs_main", "fs_texture"),
        MaterialKind::Trail => program(ShaderFile::Backdrop, "vs_main", "fs_trail"),
        MaterialKind::Sprite { .. } => program(ShaderFile::Mesh, "vs_sprite", "fs_sprite"),
        MaterialKind::Unlit { .. } => program(ShaderFile::Mesh, "vs_main", "fs_unlit"),
        MaterialKind::Phong { .. } => program(ShaderFile::Mesh, "vs_main", "fs_phong"),
        MaterialKind::Standard { .. } => program(ShaderFile::Mesh, "vs_main", "fs_standard"),
        MaterialKind::Sky { .. } => program(ShaderFile::Sky, "vs_main", "fs_main"),
        MaterialKind::Water { .. } => program(ShaderFile::Water, "vs_main", "fs_main"),
    }
}

pub(crate) fn is_instanced_points(kind: &MaterialKind) -> bool {
    program_for(kind).instanced_points
}

fn blend_state(blend: BlendMode) -> Option<wgpu::BlendState> {
    match blend {
        BlendMode::Opaque => None,
        BlendMode::Alpha => Some(wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::SrcAlpha,
                dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                operation: wgpu::BlendOperation::Add,
            },
        }),
        BlendMode::Additive => Some(wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::SrcAlpha,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
        }),
    }
}

fn uniform_entry(binding: u32, dynamic: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: dynamic,
            min_binding_size: None,
        },
        count: None,
    }
}

fn texture_entries(first: u32) -> [wgpu::BindGroupLayoutEntry; 2] {
    [
        wgpu::BindGroupLayoutEntry {
            binding: first,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        },
        wgpu::BindGroupLayoutEntry {
            binding: first + 1,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        },
    ]
}

pub(crate) struct PipelineLayouts {
    pub frame_layout: wgpu::BindGroupLayout,
    pub draw_layout: wgpu::BindGroupLayout,
    /// Primary, accent and environment texture/sampler pairs.
    pub material_layout: wgpu::BindGroupLayout,
    pub blit_layout: wgpu::BindGroupLayout,
    scene_layout: wgpu::PipelineLayout,
    modules: HashMap<ShaderFile, wgpu::ShaderModule>,
}

impl PipelineLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let frame_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("frame layout"),
            entries: &[uniform_entry(0, false)],
        });
        let draw_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("draw layout"),
            entries: &[uniform_entry(0, true)],
        });
        let mut material_entries = Vec::with_capacity(6);
        for slot in 0..3 {
            material_entries.extend(texture_entries(slot * 2));
        }
        let material_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("material layout"),
            entries: &material_entries,
        });
        let mut blit_entries = texture_entries(0).to_vec();
        blit_entries.push(uniform_entry(2, false));
        let blit_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("resolve layout"),
            entries: &blit_entries,
        });
        let scene_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("scene pipeline layout"),
            bind_group_layouts: &[&frame_layout, &draw_layout, &material_layout],
            push_constant_ranges: &[],
        });

        Self {
            frame_layout,
            draw_layout,
            material_layout,
            blit_layout,
            scene_layout,
            modules: HashMap::new(),
        }
    }

    fn module(&mut self, device: &wgpu::Device, source: ShaderFile) -> wgpu::ShaderModule {
        self.modules
            .entry(source)
            .or_insert_with(|| {
                tracing::debug!(?source, "compiling scene shader");
                device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some("scene shader"),
                    source: wgpu::ShaderSource::Wgsl(format!("{COMMON}\n{}", source.body()).into()),
                })
            })
            .clone()
    }

    /// Builds the render pipeline for one material.
    pub fn material_pipeline(&mut self, device: &wgpu::Device, desc: &MaterialDescriptor) -> wgpu::RenderPipeline {
        let program = program_for(&desc.kind);
        let module = self.module(device, program.source);

        let float3 = [wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Float32x3,
            offset: 0,
            shader_location: 0,
        }];
        let normal = [wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Float32x3,
            offset: 0,
            shader_location: 1,
        }];
        let uv = [wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Float32x2,
            offset: 0,
            shader_location: 2,
        }];
        let attributes = [wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Float32x4,
            offset: 0,
            shader_location: 1,
        }];
        let buffer = |stride: usize, step_mode, attributes| wgpu::VertexBufferLayout {
            array_stride: stride as wgpu::BufferAddress,
            step_mode,
            attributes,
        };
        let buffers = if program.instanced_points {
            vec![
                buffer(12, wgpu::VertexStepMode::Instance, &float3[..]),
                buffer(16, wgpu::VertexStepMode::Instance, &attributes[..]),
            ]
        } else {
            vec![
                buffer(12, wgpu::VertexStepMode::Vertex, &float3[..]),
                buffer(12, wgpu::VertexStepMode::Vertex, &normal[..]),
                buffer(8, wgpu::VertexStepMode::Vertex, &uv[..]),
            ]
        };

        let depth_stencil = Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: desc.depth_write,
            depth_compare: if desc.depth_test {
                wgpu::CompareFunction::LessEqual
            } else {
                wgpu::CompareFunction::Always
            },
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        });

        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(desc.label.as_str()),
            layout: Some(&self.scene_layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some(program.vertex),
                buffers: &buffers,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: desc.back_side.then_some(wgpu::Face::Front),
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some(program.fragment),
                targets: &[Some(wgpu::ColorTargetState {
                    format: SCENE_FORMAT,
                    blend: blend_state(desc.blend),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
            cache: None,
        })
    }

    /// Pipeline resolving the scene target onto the swapchain.
    pub fn blit_pipeline(&self, device: &wgpu::Device, surface_format: wgpu::TextureFormat) -> wgpu::RenderPipeline {
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("resolve shader"),
            source: wgpu::ShaderSource::Wgsl(BLIT.into()),
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("resolve pipeline layout"),
            bind_group_layouts: &[&self.blit_layout],
            push_constant_ranges: &[],
        });
        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("resolve pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
            cache: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{PointSizing, TextureId};

    #[test]
    fn every_material_kind_maps_to_a_program() {
        let points = MaterialKind::Points {
            texture: TextureId(1),
            accent: None,
            sizing: PointSizing::World { size: 0.3 },
            animated: false,
            alpha_test: 0.0,
        };
        assert!(is_instanced_points(&points));
        assert!(!is_instanced_points(&MaterialKind::Trail));
        assert_eq!(
            program_for(&MaterialKind::Sprite {
                texture: TextureId(2)
            })
            .vertex,
            "vs_sprite"
        );
        assert_eq!(
            program_for(&MaterialKind::Backdrop {
                fill: BackdropFill::DuskFog
            })
            .fragment,
            "fs_dusk"
        );
    }

    #[test]
    fn opaque_materials_do_not_blend() {
        assert!(blend_state(BlendMode::Opaque).is_none());
        let additive = blend_state(BlendMode::Additive).unwrap();
        assert_eq!(additive.color.dst_factor, wgpu::BlendFactor::One);
    }
}
