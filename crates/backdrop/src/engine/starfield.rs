use glam::Mat4;

use crate::backend::{
    BackdropFill, BlendMode, ClearMode, DrawCall, FrameDescription, GeometryId, GpuBackend,
    MaterialDescriptor, MaterialId, MaterialKind, PointSizing,
};
use crate::mesh::MeshData;
use crate::particles::{ParticleField, ParticleLayout};
use crate::texture::presets;

use super::{Build, EngineError, FrameInput, MountError};

const BACKDROP_OPACITY: f32 = 0.96;
/// Glow centre in UV space, slightly below the middle.
const GLOW_CENTRE: [f32; 2] = [0.5, 0.46];
const TRAIL_OPACITY: f32 = 0.72;

pub(crate) struct StarfieldScene {
    field: ParticleField,
    points_geometry: GeometryId,
    points: MaterialId,
    quad: GeometryId,
    backdrop: MaterialId,
    trail: Option<MaterialId>,
}

impl StarfieldScene {
    pub fn build<B: GpuBackend>(build: &mut Build<'_, B>) -> Result<Self, MountError> {
        let quality = *build.quality;
        let white = build.glow_sprite(
            "star-white",
            quality.point_texture_size,
            &presets::point_glow(presets::STAR_WHITE)?,
        )?;
        let gold = build.glow_sprite(
            "star-gold",
            quality.accent_texture_size(),
            &presets::point_glow(presets::STAR_GOLD)?,
        )?;

        let mut field = ParticleField::new(ParticleLayout::Star);
        field.populate(build.particles, build.random)?;
        let points_geometry = build.geometry(
            "starfield-points",
            &MeshData::points(field.positions().to_vec(), field.attributes()),
        )?;
        let points = build.material(
            &MaterialDescriptor::new(
                "starfield-points",
                MaterialKind::Points {
                    texture: white,
                    accent: Some(gold),
                    sizing: PointSizing::Attenuated {
                        scale: 110.0,
                        offset: 6.0,
                        min: 1.0,
                        max: 44.0,
                    },
                    animated: true,
                    alpha_test: 0.01,
                },
            )
            .blend(BlendMode::Additive),
        )?;

        let quad = build.geometry("starfield-quad", &MeshData::fullscreen_quad())?;
        let backdrop = build.material(
            &MaterialDescriptor::new(
                "starfield-backdrop",
                MaterialKind::Backdrop {
                    fill: BackdropFill::DuskFog,
                },
            )
            .blend(BlendMode::Alpha)
            .depth(false, false)
            .color([1.0; 3], BACKDROP_OPACITY),
        )?;

        let trail = if quality.enable_trail {
            let veil = MaterialDescriptor::new("starfield-trail", MaterialKind::Trail)
                .blend(BlendMode::Alpha)
                .depth(false, false)
                .color([0.0; 3], TRAIL_OPACITY);
            Some(build.material(&veil)?)
        } else {
            None
        };

        tracing::debug!(
            stars = field.len(),
            trail = trail.is_some(),
            "star field scene built"
        );
        Ok(Self {
            field,
            points_geometry,
            points,
            quad,
            backdrop,
            trail,
        })
    }

    pub fn update(&mut self, input: &FrameInput, frame: &mut FrameDescription) -> Result<(), EngineError> {
        // Drift runs in the vertex shader from the frame time.
        self.field.update(input.elapsed)?;

        if let Some(trail) = self.trail {
            frame.clear = ClearMode::Preserve;
            frame.draws.push(DrawCall::new(self.quad, trail, Mat4::IDENTITY));
        }
        frame.draws.push(
            DrawCall::new(self.quad, self.backdrop, Mat4::IDENTITY)
                .params([GLOW_CENTRE[0], GLOW_CENTRE[1], 0.0, 0.0]),
        );
        frame
            .draws
            .push(DrawCall::new(self.points_geometry, self.points, Mat4::IDENTITY));
        Ok(())
    }

    pub fn particle_count(&self) -> usize {
        self.field.len()
    }

    pub fn dispose(&mut self) {
        self.field.dispose();
    }
}
