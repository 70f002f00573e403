//! The seam between engines and whatever actually owns GPU objects.
//!
//! Engines describe resources and frames in plain data; a [`GpuBackend`]
//! turns them into device objects. [`crate::gpu::WgpuBackend`] renders for
//! real, [`crate::headless::HeadlessBackend`] only keeps books.

use glam::{Mat4, Vec3};

use crate::mesh::MeshData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeometryId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub u32);

/// Anything a backend allocates that must be disposed exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuResource {
    Surface(SurfaceId),
    Texture(TextureId),
    Geometry(GeometryId),
    Material(MaterialId),
}

impl GpuResource {
    pub fn kind(&self) -> &'static str {
        match self {
            GpuResource::Surface(_) => "surface",
            GpuResource::Texture(_) => "texture",
            GpuResource::Geometry(_) => "geometry",
            GpuResource::Material(_) => "material",
        }
    }

    pub fn raw(&self) -> u32 {
        match self {
            GpuResource::Surface(SurfaceId(id))
            | GpuResource::Texture(TextureId(id))
            | GpuResource::Geometry(GeometryId(id))
            | GpuResource::Material(MaterialId(id)) => *id,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("unknown {kind} handle #{id}")]
    UnknownHandle { kind: &'static str, id: u32 },
    #[error("a render surface is already live on this backend")]
    SurfaceBusy,
    #[error("texture '{label}' carries {actual} bytes, expected {expected}")]
    TextureSize {
        label: String,
        expected: usize,
        actual: usize,
    },
    #[error("geometry #{id} expects {expected} positions, got {actual}")]
    VertexCount {
        id: u32,
        expected: usize,
        actual: usize,
    },
    #[error("render surface was lost and has been reconfigured")]
    SurfaceLost,
    #[error("{0}")]
    Device(String),
}

impl BackendError {
    pub fn unknown(resource: GpuResource) -> Self {
        Self::UnknownHandle {
            kind: resource.kind(),
            id: resource.raw(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceDescriptor {
    /// Logical size of the container.
    pub width: u32,
    pub height: u32,
    /// Already clamped to the theme's bound.
    pub pixel_ratio: f32,
    pub antialias: bool,
    /// Clear with transparent alpha so the host shows through.
    pub transparent: bool,
}

impl SurfaceDescriptor {
    pub fn physical_size(&self) -> (u32, u32) {
        physical_size(self.width, self.height, self.pixel_ratio)
    }
}

pub fn physical_size(width: u32, height: u32, pixel_ratio: f32) -> (u32, u32) {
    let scale = |value: u32| ((value as f32 * pixel_ratio).round() as u32).max(1);
    (scale(width), scale(height))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureWrap {
    Clamp,
    Repeat,
}

/// Straight-alpha RGBA8 pixels, rows top to bottom. Never mipmapped.
#[derive(Debug, Clone, Copy)]
pub struct TextureDescriptor<'a> {
    pub label: &'a str,
    pub width: u32,
    pub height: u32,
    pub pixels: &'a [u8],
    pub wrap: TextureWrap,
    /// Colour data (sRGB) rather than encoded vectors such as normal maps.
    pub srgb: bool,
}

impl TextureDescriptor<'_> {
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    Opaque,
    Alpha,
    Additive,
}

/// How point sprites are sized on screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointSizing {
    /// `clamp(size * scale / (depth + offset), min, max)` device pixels.
    Attenuated {
        scale: f32,
        offset: f32,
        min: f32,
        max: f32,
    },
    /// Fixed world-space size, shrinking with distance.
    World { size: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackdropFill {
    /// Vertical dusk gradient with a warm central glow and drifting fog.
    DuskFog,
    /// Full-screen textured quad.
    Texture(TextureId),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaterialKind {
    Backdrop { fill: BackdropFill },
    /// Translucent black veil drawn over the previous frame.
    Trail,
    Points {
        texture: TextureId,
        /// Sampled instead of `texture` for particles whose tone is 1.
        accent: Option<TextureId>,
        sizing: PointSizing,
        /// GPU drift, distance fade and flicker.
        animated: bool,
        alpha_test: f32,
    },
    Sprite { texture: TextureId },
    Unlit { texture: Option<TextureId> },
    Phong { emissive: [f32; 3], shininess: f32 },
    Standard {
        roughness: f32,
        metalness: f32,
        environment: Option<TextureId>,
    },
    Sky {
        turbidity: f32,
        rayleigh: f32,
        mie_coefficient: f32,
        mie_directional_g: f32,
    },
    Water {
        normal_map: TextureId,
        environment: Option<TextureId>,
        distortion_scale: f32,
        water_color: [f32; 3],
        sun_color: [f32; 3],
        size: f32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureSlot {
    Primary,
    Accent,
    Environment,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaterialDescriptor {
    pub label: String,
    pub kind: MaterialKind,
    pub blend: BlendMode,
    pub depth_test: bool,
    pub depth_write: bool,
    /// Linear RGB plus opacity.
    pub color: [f32; 4],
    /// Render back faces only (sky dome).
    pub back_side: bool,
}

impl MaterialDescriptor {
    pub fn new(label: impl Into<String>, kind: MaterialKind) -> Self {
        Self {
            label: label.into(),
            kind,
            blend: BlendMode::Opaque,
            depth_test: true,
            depth_write: true,
            color: [1.0, 1.0, 1.0, 1.0],
            back_side: false,
        }
    }

    pub fn blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        if blend != BlendMode::Opaque {
            self.depth_write = false;
        }
        self
    }

    pub fn depth(mut self, test: bool, write: bool) -> Self {
        self.depth_test = test;
        self.depth_write = write;
        self
    }

    pub fn color(mut self, rgb: [f32; 3], opacity: f32) -> Self {
        self.color = [rgb[0], rgb[1], rgb[2], opacity];
        self
    }

    pub fn back_side(mut self) -> Self {
        self.back_side = true;
        self
    }

    /// Textures the material samples, for validation and bookkeeping.
    pub fn textures(&self) -> Vec<TextureId> {
        let mut textures = Vec::new();
        match self.kind {
            MaterialKind::Backdrop {
                fill: BackdropFill::Texture(texture),
            }
            | MaterialKind::Sprite { texture }
            | MaterialKind::Unlit {
                texture: Some(texture),
            } => textures.push(texture),
            MaterialKind::Points {
                texture, accent, ..
            } => {
                textures.push(texture);
                textures.extend(accent);
            }
            MaterialKind::Standard { environment, .. } => textures.extend(environment),
            MaterialKind::Water {
                normal_map,
                environment,
                ..
            } => {
                textures.push(normal_map);
                textures.extend(environment);
            }
            _ => {}
        }
        textures
    }
}

/// Converts a `0xRRGGBB` colour to linear RGB.
pub fn linear_rgb(hex: u32) -> [f32; 3] {
    let channel = |shift: u32| srgb_to_linear(((hex >> shift) & 0xff) as f32 / 255.0);
    [channel(16), channel(8), channel(0)]
}

pub fn srgb_to_linear(value: f32) -> f32 {
    if value <= 0.04045 {
        value / 12.92
    } else {
        ((value + 0.055) / 1.055).powf(2.4)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientLight {
    pub color: [f32; 3],
    pub intensity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HemisphereLight {
    pub sky: [f32; 3],
    pub ground: [f32; 3],
    pub intensity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub color: [f32; 3],
    pub intensity: f32,
    /// Light position; the light shines toward the origin.
    pub position: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LightRig {
    pub ambient: Option<AmbientLight>,
    pub hemisphere: Option<HemisphereLight>,
    pub directional: Option<DirectionalLight>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fog {
    pub color: [f32; 3],
    pub density: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearMode {
    /// Linear RGBA.
    Color([f32; 4]),
    /// Keep the previous frame; used under trail veils.
    Preserve,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraState {
    pub view: Mat4,
    pub projection: Mat4,
    pub position: Vec3,
    pub aspect: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawCall {
    pub geometry: GeometryId,
    pub material: MaterialId,
    pub model: Mat4,
    /// Per-draw multiplier on the material colour.
    pub tint: [f32; 4],
    /// Material-specific scalars (water time, ...).
    pub params: [f32; 4],
}

impl DrawCall {
    pub fn new(geometry: GeometryId, material: MaterialId, model: Mat4) -> Self {
        Self {
            geometry,
            material,
            model,
            tint: [1.0; 4],
            params: [0.0; 4],
        }
    }

    pub fn tint(mut self, tint: [f32; 4]) -> Self {
        self.tint = tint;
        self
    }

    pub fn params(mut self, params: [f32; 4]) -> Self {
        self.params = params;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameDescription {
    pub camera: CameraState,
    /// Seconds since mount.
    pub time: f32,
    pub clear: ClearMode,
    pub lights: LightRig,
    pub fog: Option<Fog>,
    pub sun_direction: Option<Vec3>,
    /// ACES filmic tone mapping with this exposure when set.
    pub exposure: Option<f32>,
    /// Drawn in order.
    pub draws: Vec<DrawCall>,
}

pub trait GpuBackend {
    fn create_surface(&mut self, desc: &SurfaceDescriptor) -> Result<SurfaceId, BackendError>;
    fn resize_surface(
        &mut self,
        surface: SurfaceId,
        width: u32,
        height: u32,
        pixel_ratio: f32,
    ) -> Result<(), BackendError>;
    fn create_texture(&mut self, desc: &TextureDescriptor<'_>) -> Result<TextureId, BackendError>;
    fn create_geometry(&mut self, label: &str, mesh: &MeshData) -> Result<GeometryId, BackendError>;
    /// Replaces the position column; the vertex count must not change.
    fn update_positions(
        &mut self,
        geometry: GeometryId,
        positions: &[[f32; 3]],
    ) -> Result<(), BackendError>;
    fn create_material(&mut self, desc: &MaterialDescriptor) -> Result<MaterialId, BackendError>;
    fn set_material_texture(
        &mut self,
        material: MaterialId,
        slot: TextureSlot,
        texture: TextureId,
    ) -> Result<(), BackendError>;
    fn render(&mut self, surface: SurfaceId, frame: &FrameDescription) -> Result<(), BackendError>;
    fn dispose(&mut self, resource: GpuResource) -> Result<(), BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn physical_size_rounds_and_clamps() {
        assert_eq!(physical_size(800, 600, 1.6), (1280, 960));
        assert_eq!(physical_size(0, 0, 2.0), (1, 1));
    }

    #[test]
    fn hex_colours_convert_to_linear() {
        assert_eq!(linear_rgb(0xffffff), [1.0, 1.0, 1.0]);
        assert_eq!(linear_rgb(0x000000), [0.0, 0.0, 0.0]);
        let [r, g, b] = linear_rgb(0x808080);
        assert!((r - 0.2158).abs() < 1.0e-3);
        assert_eq!(r, g);
        assert_eq!(g, b);
    }

    #[test]
    fn material_lists_sampled_textures() {
        let desc = MaterialDescriptor::new(
            "points",
            MaterialKind::Points {
                texture: TextureId(1),
                accent: Some(TextureId(2)),
                sizing: PointSizing::World { size: 0.3 },
                animated: false,
                alpha_test: 0.01,
            },
        );
        assert_eq!(desc.textures(), vec![TextureId(1), TextureId(2)]);
        assert!(MaterialDescriptor::new("trail", MaterialKind::Trail)
            .textures()
            .is_empty());
    }

    #[test]
    fn blended_materials_skip_depth_writes() {
        let desc = MaterialDescriptor::new("veil", MaterialKind::Trail).blend(BlendMode::Alpha);
        assert!(!desc.depth_write);
        assert!(desc.depth_test);
    }
}
