//! Open water under a scattering sky, with a bobbing cube for scale.

use std::f32::consts::{PI, TAU};
use std::path::Path;

use glam::{EulerRot, Mat4, Quat, Vec3};
use image::{Rgba, RgbaImage};

use crate::backend::{
    linear_rgb, BackendError, DrawCall, FrameDescription, GeometryId, GpuBackend, GpuResource,
    MaterialDescriptor, MaterialId, MaterialKind, TextureDescriptor, TextureId, TextureSlot,
    TextureWrap,
};
use crate::mesh::MeshData;
use crate::resources::{ResourceKey, ResourceRegistry};

use super::{Build, EngineError, FrameInput, MountError, SunParams};

const SKY_SCALE: f32 = 10_000.0;
const WATER_SIZE: f32 = 10_000.0;
const CUBE_SIZE: f32 = 30.0;
const DISTORTION_SCALE: f32 = 3.7;
const ENVIRONMENT_WIDTH: u32 = 128;
const ENVIRONMENT_HEIGHT: u32 = 64;

/// Equirectangular sky lit from `sun`, rows from zenith to nadir.
pub(crate) fn sky_environment(sun: Vec3, width: u32, height: u32) -> RgbaImage {
    let sun = sun.normalize_or_zero();
    let daylight = smoothstep(-0.1, 0.2, sun.y) * 0.85 + 0.15;
    let zenith = Vec3::new(0.22, 0.38, 0.70);
    let horizon = Vec3::new(0.86, 0.74, 0.60);
    let ground = Vec3::new(0.04, 0.06, 0.08);
    let sun_tint = Vec3::new(1.0, 0.86, 0.62);

    RgbaImage::from_fn(width.max(1), height.max(1), |x, y| {
        let azimuth = (x as f32 + 0.5) / width.max(1) as f32 * TAU;
        let polar = (y as f32 + 0.5) / height.max(1) as f32 * PI;
        let direction = Vec3::new(
            polar.sin() * azimuth.sin(),
            polar.cos(),
            polar.sin() * azimuth.cos(),
        );
        let elevation = direction.y;
        let base = if elevation >= 0.0 {
            horizon.lerp(zenith, elevation.sqrt())
        } else {
            (horizon * 0.4).lerp(ground, (-elevation).powf(0.35))
        };
        let facing = direction.dot(sun).max(0.0);
        let glow = facing.powf(8.0) * 0.35 + facing.powf(600.0) * 2.0;
        let color = (base * daylight + sun_tint * glow).min(Vec3::ONE);
        Rgba([
            (color.x * 255.0).round() as u8,
            (color.y * 255.0).round() as u8,
            (color.z * 255.0).round() as u8,
            255,
        ])
    })
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Reads the water normal map, falling back to a flat placeholder.
pub(crate) fn load_normal_map(path: Option<&Path>) -> RgbaImage {
    let Some(path) = path else {
        return flat_normal_map();
    };
    match image::open(path) {
        Ok(image) => {
            let image = image.to_rgba8();
            tracing::debug!(
                path = %path.display(),
                width = image.width(),
                height = image.height(),
                "loaded water normal map"
            );
            image
        }
        Err(error) => {
            tracing::warn!(
                path = %path.display(),
                %error,
                "failed to load water normal map; using flat placeholder"
            );
            flat_normal_map()
        }
    }
}

fn flat_normal_map() -> RgbaImage {
    RgbaImage::from_pixel(4, 4, Rgba([128, 128, 255, 255]))
}

fn upload_environment<B: GpuBackend>(
    backend: &mut B,
    registry: &mut ResourceRegistry,
    sun: Vec3,
) -> Result<(TextureId, ResourceKey), BackendError> {
    let raster = sky_environment(sun, ENVIRONMENT_WIDTH, ENVIRONMENT_HEIGHT);
    let texture = backend.create_texture(&TextureDescriptor {
        label: "ocean-environment",
        width: raster.width(),
        height: raster.height(),
        pixels: raster.as_raw(),
        wrap: TextureWrap::Repeat,
        srgb: true,
    })?;
    Ok((texture, registry.register(GpuResource::Texture(texture))))
}

pub(crate) struct OceanScene {
    sky_geometry: GeometryId,
    sky: MaterialId,
    water_geometry: GeometryId,
    water: MaterialId,
    cube_geometry: GeometryId,
    cube: MaterialId,
    environment: ResourceKey,
    sun: SunParams,
    sun_direction: Vec3,
    /// Seconds of rendered animation; hidden frames do not advance it.
    clock: f32,
}

impl OceanScene {
    pub fn build<B: GpuBackend>(build: &mut Build<'_, B>) -> Result<Self, MountError> {
        let sun = build.options.sun;
        let sun_direction = sun.direction();
        let (environment_texture, environment) =
            upload_environment(build.backend, build.registry, sun_direction)?;

        let normals = load_normal_map(build.options.normal_map.as_deref());
        let normal_map = build.backend.create_texture(&TextureDescriptor {
            label: "ocean-normals",
            width: normals.width(),
            height: normals.height(),
            pixels: normals.as_raw(),
            wrap: TextureWrap::Repeat,
            srgb: false,
        })?;
        build.registry.register(GpuResource::Texture(normal_map));

        let sky_geometry = build.geometry("ocean-sky", &MeshData::cuboid(1.0))?;
        let sky = build.material(
            &MaterialDescriptor::new(
                "ocean-sky",
                MaterialKind::Sky {
                    turbidity: 10.0,
                    rayleigh: 2.0,
                    mie_coefficient: 0.005,
                    mie_directional_g: 0.8,
                },
            )
            .depth(true, false)
            .back_side(),
        )?;

        let water_geometry = build.geometry("ocean-water", &MeshData::plane(WATER_SIZE, WATER_SIZE, 1, 1))?;
        let water = build.material(&MaterialDescriptor::new(
            "ocean-water",
            MaterialKind::Water {
                normal_map,
                environment: Some(environment_texture),
                distortion_scale: DISTORTION_SCALE,
                water_color: linear_rgb(0x001e0f),
                sun_color: [1.0; 3],
                size: 1.0,
            },
        ))?;

        let cube_geometry = build.geometry("ocean-cube", &MeshData::cuboid(CUBE_SIZE))?;
        let cube = build.material(
            &MaterialDescriptor::new(
                "ocean-cube",
                MaterialKind::Standard {
                    roughness: 0.0,
                    metalness: 0.0,
                    environment: Some(environment_texture),
                },
            ),
        )?;

        tracing::debug!(
            elevation = sun.elevation,
            azimuth = sun.azimuth,
            "ocean scene built"
        );
        Ok(Self {
            sky_geometry,
            sky,
            water_geometry,
            water,
            cube_geometry,
            cube,
            environment,
            sun,
            sun_direction,
            clock: 0.0,
        })
    }

    pub fn update(&mut self, input: &FrameInput, frame: &mut FrameDescription) -> Result<(), EngineError> {
        self.clock += input.delta.max(0.0);
        let t = self.clock;
        frame.sun_direction = Some(self.sun_direction);

        frame.draws.push(DrawCall::new(
            self.sky_geometry,
            self.sky,
            Mat4::from_scale(Vec3::splat(SKY_SCALE)),
        ));
        frame.draws.push(
            DrawCall::new(
                self.water_geometry,
                self.water,
                Mat4::from_rotation_x(-PI / 2.0),
            )
            .params([t, 0.0, 0.0, 0.0]),
        );
        let spin = Quat::from_euler(EulerRot::XYZ, t * 0.5, t * 0.51, 0.0);
        let bob = Vec3::new(0.0, t.sin() * 20.0 + 5.0, 0.0);
        frame.draws.push(DrawCall::new(
            self.cube_geometry,
            self.cube,
            Mat4::from_rotation_translation(spin, bob),
        ));
        Ok(())
    }

    pub fn sun(&self) -> SunParams {
        self.sun
    }

    pub fn environment_texture(&self, registry: &ResourceRegistry) -> Option<TextureId> {
        match registry.resource(self.environment)? {
            GpuResource::Texture(texture) => Some(texture),
            _ => None,
        }
    }

    /// Moves the sun and swaps in a regenerated environment texture. The
    /// previous texture is released once nothing samples it.
    pub fn set_sun<B: GpuBackend>(
        &mut self,
        backend: &mut B,
        registry: &mut ResourceRegistry,
        sun: SunParams,
    ) -> Result<(), EngineError> {
        let direction = sun.direction();
        let (texture, key) = upload_environment(backend, registry, direction)?;

        let rebound = backend
            .set_material_texture(self.water, TextureSlot::Environment, texture)
            .and_then(|()| backend.set_material_texture(self.cube, TextureSlot::Environment, texture));
        if let Err(error) = rebound {
            // Put the old environment back before dropping the new one.
            if let Some(previous) = self.environment_texture(registry) {
                for (surface, material) in [("water", self.water), ("cube", self.cube)] {
                    if let Err(restore) =
                        backend.set_material_texture(material, TextureSlot::Environment, previous)
                    {
                        tracing::warn!(
                            surface,
                            texture = previous.0,
                            error = %restore,
                            "failed to restore previous environment"
                        );
                    }
                }
            }
            registry.release(key, backend);
            return Err(error.into());
        }

        let previous = std::mem::replace(&mut self.environment, key);
        registry.release(previous, backend);
        self.sun = sun;
        self.sun_direction = direction;
        tracing::debug!(
            elevation = sun.elevation,
            azimuth = sun.azimuth,
            texture = texture.0,
            "sun moved; environment regenerated"
        );
        Ok(())
    }
}
