use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use crate::backend::{
    BackdropFill, FrameDescription, MaterialDescriptor, MaterialKind, PointSizing,
};

/// Mirrors `Frame` in `common.wgsl`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct FrameUniforms {
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub camera: [f32; 4],
    pub resolution: [f32; 4],
    pub ambient: [f32; 4],
    pub hemisphere_sky: [f32; 4],
    pub hemisphere_ground: [f32; 4],
    pub light_color: [f32; 4],
    pub light_direction: [f32; 4],
    pub fog: [f32; 4],
    pub sun: [f32; 4],
}

impl FrameUniforms {
    pub fn from_frame(frame: &FrameDescription, width: u32, height: u32, pixel_ratio: f32) -> Self {
        let camera = frame.camera;
        let scaled = |rgb: [f32; 3], intensity: f32| [rgb[0] * intensity, rgb[1] * intensity, rgb[2] * intensity, 0.0];

        let mut uniforms = Self {
            view: camera.view.to_cols_array_2d(),
            projection: camera.projection.to_cols_array_2d(),
            camera: [camera.position.x, camera.position.y, camera.position.z, frame.time],
            resolution: [width as f32, height as f32, pixel_ratio, 0.0],
            ..Self::zeroed()
        };
        if let Some(ambient) = frame.lights.ambient {
            uniforms.ambient = scaled(ambient.color, ambient.intensity);
        }
        if let Some(hemisphere) = frame.lights.hemisphere {
            uniforms.hemisphere_sky = scaled(hemisphere.sky, hemisphere.intensity);
            uniforms.hemisphere_ground = scaled(hemisphere.ground, hemisphere.intensity);
        }
        if let Some(light) = frame.lights.directional {
            uniforms.light_color = scaled(light.color, light.intensity);
            let toward = light.position.normalize_or_zero();
            uniforms.light_direction = [toward.x, toward.y, toward.z, 0.0];
        }
        if let Some(fog) = frame.fog {
            uniforms.fog = [fog.color[0], fog.color[1], fog.color[2], fog.density];
        }
        if let Some(sun) = frame.sun_direction {
            let sun = sun.normalize_or_zero();
            uniforms.sun = [sun.x, sun.y, sun.z, 1.0];
        }
        uniforms
    }
}

/// Mirrors `Draw` in `common.wgsl`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct DrawUniforms {
    pub model: [[f32; 4]; 4],
    pub color: [f32; 4],
    pub params: [f32; 4],
    pub material: [f32; 4],
    pub extra: [f32; 4],
}

/// Per-material constants, packed once when the material is created.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct MaterialConstants {
    pub material: [f32; 4],
    pub extra: [f32; 4],
}

impl MaterialConstants {
    pub fn pack(desc: &MaterialDescriptor) -> Self {
        let flag = |value: bool| if value { 1.0 } else { 0.0 };
        match desc.kind {
            MaterialKind::Points {
                sizing,
                animated,
                alpha_test,
                ..
            } => match sizing {
                PointSizing::Attenuated {
                    scale,
                    offset,
                    min,
                    max,
                } => Self {
                    material: [scale, offset, min, max],
                    extra: [0.0, 0.0, flag(animated), alpha_test],
                },
                PointSizing::World { size } => Self {
                    material: [0.0; 4],
                    extra: [1.0, size, flag(animated), alpha_test],
                },
            },
            MaterialKind::Unlit { texture } => Self {
                material: [flag(texture.is_some()), 0.0, 0.0, 0.0],
                ..Self::default()
            },
            MaterialKind::Phong {
                emissive,
                shininess,
            } => Self {
                material: [emissive[0], emissive[1], emissive[2], shininess],
                ..Self::default()
            },
            MaterialKind::Standard {
                roughness,
                metalness,
                environment,
            } => Self {
                material: [roughness, metalness, flag(environment.is_some()), 0.0],
                ..Self::default()
            },
            MaterialKind::Sky {
                turbidity,
                rayleigh,
                mie_coefficient,
                mie_directional_g,
            } => Self {
                material: [turbidity, rayleigh, mie_coefficient, mie_directional_g],
                ..Self::default()
            },
            MaterialKind::Water {
                distortion_scale,
                water_color,
                sun_color,
                size,
                ..
            } => Self {
                material: [water_color[0], water_color[1], water_color[2], distortion_scale],
                extra: [sun_color[0], sun_color[1], sun_color[2], size],
            },
            MaterialKind::Backdrop { fill } => Self {
                material: [flag(matches!(fill, BackdropFill::Texture(_))), 0.0, 0.0, 0.0],
                ..Self::default()
            },
            MaterialKind::Sprite { .. } | MaterialKind::Trail => Self::default(),
        }
    }

    pub fn with_draw(&self, model: Mat4, color: [f32; 4], tint: [f32; 4], params: [f32; 4]) -> DrawUniforms {
        DrawUniforms {
            model: model.to_cols_array_2d(),
            color: [
                color[0] * tint[0],
                color[1] * tint[1],
                color[2] * tint[2],
                color[3] * tint[3],
            ],
            params,
            material: self.material,
            extra: self.extra,
        }
    }
}

/// Settings for the final resolve, mirrors `Present` in `blit.wgsl`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct PresentUniforms {
    pub settings: [f32; 4],
}

impl PresentUniforms {
    pub fn new(exposure: Option<f32>, transparent: bool) -> Self {
        Self {
            settings: [
                exposure.unwrap_or(1.0),
                if exposure.is_some() { 1.0 } else { 0.0 },
                if transparent { 1.0 } else { 0.0 },
                0.0,
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{
        AmbientLight, CameraState, ClearMode, DirectionalLight, LightRig, TextureId,
    };
    use glam::Vec3;

    #[test]
    fn uniform_blocks_keep_std140_sizes() {
        assert_eq!(std::mem::size_of::<FrameUniforms>(), 2 * 64 + 9 * 16);
        assert_eq!(std::mem::size_of::<DrawUniforms>(), 64 + 4 * 16);
        assert_eq!(std::mem::size_of::<PresentUniforms>(), 16);
    }

    #[test]
    fn lights_are_premultiplied_by_intensity() {
        let frame = FrameDescription {
            camera: CameraState {
                view: Mat4::IDENTITY,
                projection: Mat4::IDENTITY,
                position: Vec3::new(1.0, 2.0, 3.0),
                aspect: 1.0,
            },
            time: 4.5,
            clear: ClearMode::Preserve,
            lights: LightRig {
                ambient: Some(AmbientLight {
                    color: [1.0; 3],
                    intensity: 0.45,
                }),
                hemisphere: None,
                directional: Some(DirectionalLight {
                    color: [1.0, 0.5, 0.0],
                    intensity: 0.5,
                    position: Vec3::new(0.0, 10.0, 0.0),
                }),
            },
            fog: None,
            sun_direction: None,
            exposure: None,
            draws: Vec::new(),
        };
        let uniforms = FrameUniforms::from_frame(&frame, 640, 480, 2.0);
        assert_eq!(uniforms.camera, [1.0, 2.0, 3.0, 4.5]);
        assert_eq!(uniforms.ambient, [0.45, 0.45, 0.45, 0.0]);
        assert_eq!(uniforms.light_color, [0.5, 0.25, 0.0, 0.0]);
        assert_eq!(uniforms.light_direction, [0.0, 1.0, 0.0, 0.0]);
        assert_eq!(uniforms.hemisphere_sky, [0.0; 4]);
        assert_eq!(uniforms.sun[3], 0.0);
    }

    #[test]
    fn world_sized_points_flag_their_mode() {
        let desc = MaterialDescriptor::new(
            "ink",
            MaterialKind::Points {
                texture: TextureId(1),
                accent: None,
                sizing: PointSizing::World { size: 0.3 },
                animated: false,
                alpha_test: 0.01,
            },
        );
        let packed = MaterialConstants::pack(&desc);
        assert_eq!(packed.extra, [1.0, 0.3, 0.0, 0.01]);
        let draw = packed.with_draw(Mat4::IDENTITY, [1.0, 1.0, 1.0, 0.5], [0.5; 4], [0.0; 4]);
        assert_eq!(draw.color, [0.5, 0.5, 0.5, 0.25]);
    }
}
