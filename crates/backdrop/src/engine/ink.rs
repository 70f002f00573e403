//! Ink-wash night: paper backdrop, drifting mountain strips, a moon, rising
//! lanterns, a ribbon and a field of ink motes.

use std::f32::consts::PI;

use glam::{Mat4, Quat, Vec3};

use crate::backend::{
    linear_rgb, srgb_to_linear, BackdropFill, BlendMode, DrawCall, FrameDescription, GeometryId,
    GpuBackend, MaterialDescriptor, MaterialId, MaterialKind, PointSizing,
};
use crate::mesh::{CatmullRomCurve, MeshData};
use crate::particles::{sine_integral, wrap_rise, ParticleField, ParticleLayout};
use crate::random::Mulberry32;
use crate::texture::{parse_stops, presets};

use super::{Build, EngineError, FrameInput, MountError};

struct MountainLayer {
    depth: f32,
    height: f32,
    opacity: f32,
    top: &'static str,
    bottom: &'static str,
}

const MOUNTAIN_LAYERS: [MountainLayer; 3] = [
    MountainLayer {
        depth: -8.0,
        height: 14.0,
        opacity: 0.96,
        top: "#24161f",
        bottom: "#0d0607",
    },
    MountainLayer {
        depth: -14.0,
        height: 12.0,
        opacity: 0.78,
        top: "#180d15",
        bottom: "#070305",
    },
    MountainLayer {
        depth: -22.0,
        height: 10.0,
        opacity: 0.62,
        top: "#0f0a0c",
        bottom: "#020102",
    },
];
const MOUNTAIN_WIDTH: f32 = 120.0;
const MOUNTAIN_SEGMENTS: u32 = 160;

const MOON_POSITION: Vec3 = Vec3::new(-14.0, 8.0, -40.0);
const MOON_SCALE: f32 = 8.0;

const INK_POINT_SIZE: f32 = 0.3;

const LANTERN_COUNT: usize = 7;
const LANTERN_CEILING: f32 = 12.0;
const LANTERN_RISE: f32 = 0.24;
const LANTERN_BOB: (f32, f32) = (0.072, 0.6);
const LANTERN_SWAY: (f32, f32) = (0.18, 0.42);
const LANTERN_HUE: f32 = 0.08;
const LANTERN_SATURATION: f32 = 0.9;
const GLOW_SPREAD: f32 = 2.6;
const GLOW_OPACITY: f32 = 0.28;

const RIBBON_POINTS: [Vec3; 5] = [
    Vec3::new(-22.0, -3.5, -6.0),
    Vec3::new(-10.0, -2.0, -14.0),
    Vec3::new(0.0, 0.8, -22.0),
    Vec3::new(10.0, 2.2, -34.0),
    Vec3::new(24.0, 5.0, -46.0),
];
const RIBBON_RADIUS: f32 = 0.46;
const RIBBON_TUBULAR: u32 = 160;
const RIBBON_RADIAL: u32 = 12;
const RIBBON_OPACITY: f32 = 0.96;
/// Vertical pulse amplitude and frequency, per second.
const RIBBON_PULSE: (f32, f32) = (0.072, 0.5);

#[derive(Debug, Clone, Copy, PartialEq)]
struct Lantern {
    origin: Vec3,
    respawn_y: f32,
    glow_scale: f32,
    tint: [f32; 4],
}

impl Lantern {
    fn scatter(random: &mut Mulberry32) -> Self {
        let scale = random.span(3.0, 1.8);
        let origin = Vec3::new(
            (random.next_unit() - 0.5) * 40.0,
            random.next_unit() * 6.0 - 1.0,
            -6.0 - random.next_unit() * 40.0,
        );
        let lightness = 0.65 - random.next_unit() * 0.18;
        let [r, g, b] = hsl_to_rgb(LANTERN_HUE, LANTERN_SATURATION, lightness).map(srgb_to_linear);
        Self {
            origin,
            respawn_y: -1.0 - random.next_unit() * 2.0,
            glow_scale: scale * GLOW_SPREAD,
            tint: [r, g, b, 1.0],
        }
    }

    /// Position and sprite scale of lantern `index` at `t` seconds.
    fn placement(&self, index: usize, t: f32) -> (Vec3, f32) {
        let phase = index as f32;
        let lift = LANTERN_RISE * t + sine_integral(LANTERN_BOB.0, LANTERN_BOB.1, phase, t);
        let (y, _) = wrap_rise(self.origin.y, lift, LANTERN_CEILING, self.respawn_y);
        let x = self.origin.x + sine_integral(LANTERN_SWAY.0, LANTERN_SWAY.1, phase * 0.9, t);
        let breath = 3.0 + (t * 1.1 + phase).sin() * 0.22;
        (Vec3::new(x, y, self.origin.z), breath * (1.0 + phase * 0.06))
    }
}

/// HSL in `[0, 1]` to RGB in `[0, 1]`.
fn hsl_to_rgb(hue: f32, saturation: f32, lightness: f32) -> [f32; 3] {
    if saturation <= 0.0 {
        return [lightness; 3];
    }
    let q = if lightness < 0.5 {
        lightness * (1.0 + saturation)
    } else {
        lightness + saturation - lightness * saturation
    };
    let p = 2.0 * lightness - q;
    let channel = |offset: f32| {
        let t = (hue + offset).rem_euclid(1.0);
        if t < 1.0 / 6.0 {
            p + (q - p) * 6.0 * t
        } else if t < 0.5 {
            q
        } else if t < 2.0 / 3.0 {
            p + (q - p) * (2.0 / 3.0 - t) * 6.0
        } else {
            p
        }
    };
    [channel(1.0 / 3.0), channel(0.0), channel(-1.0 / 3.0)]
}

/// Strip whose ridge row follows a sine silhouette with seeded jitter.
fn mountain_mesh(layer: usize, height: f32, random: &mut Mulberry32) -> MeshData {
    let mut mesh = MeshData::plane(MOUNTAIN_WIDTH, height, MOUNTAIN_SEGMENTS, 1);
    let ridge = MOUNTAIN_SEGMENTS as usize + 1;
    let index = layer as f32;
    for position in mesh.positions.iter_mut().take(ridge) {
        let noise = ((position[0] + index * 18.0) * 0.12).sin() * (1.8 + index * 0.9)
            + (random.next_unit() - 0.5) * 0.8;
        position[1] = height * 0.5 + noise - index * 1.6;
    }
    mesh
}

fn mountain_transform(layer: usize, depth: f32, t: f32) -> Mat4 {
    let index = layer as f32;
    let x = (t * (0.07 + index * 0.02)).sin() * (1.2 + index * 0.8);
    let y = -2.0 - index * 0.8 + (t * (0.06 + index * 0.01)).cos() * 0.12;
    let roll = (t * 0.01 + index).sin() * 0.003;
    Mat4::from_rotation_translation(Quat::from_rotation_z(roll), Vec3::new(x, y, depth))
}

fn sprite_transform(position: Vec3, scale: f32) -> Mat4 {
    Mat4::from_scale_rotation_translation(Vec3::new(scale, scale, 1.0), Quat::IDENTITY, position)
}

/// Vertical offset of ribbon vertex `vertex` after `t` seconds of pulsing.
fn ribbon_offset(vertex: usize, t: f32) -> f32 {
    sine_integral(RIBBON_PULSE.0, RIBBON_PULSE.1, vertex as f32 * 0.02, t)
}

struct Mountain {
    geometry: GeometryId,
    material: MaterialId,
    depth: f32,
}

pub(crate) struct InkScene {
    field: ParticleField,
    points_geometry: GeometryId,
    points: MaterialId,
    quad: GeometryId,
    paper: MaterialId,
    mountains: Vec<Mountain>,
    sprite: GeometryId,
    moon: MaterialId,
    lanterns: Vec<Lantern>,
    lantern: MaterialId,
    glow: MaterialId,
    ribbon_geometry: GeometryId,
    ribbon: MaterialId,
    ribbon_rest: Vec<[f32; 3]>,
    ribbon_scratch: Vec<[f32; 3]>,
}

impl InkScene {
    pub fn build<B: GpuBackend>(build: &mut Build<'_, B>) -> Result<Self, MountError> {
        let quality = *build.quality;

        let paper_texture = build.linear_gradient(
            "ink-paper",
            quality.scale_sprite(32),
            quality.scale_sprite(256),
            &presets::paper()?,
        )?;
        let quad = build.geometry("ink-quad", &MeshData::fullscreen_quad())?;
        let paper = build.material(
            &MaterialDescriptor::new(
                "ink-paper",
                MaterialKind::Backdrop {
                    fill: BackdropFill::Texture(paper_texture),
                },
            )
            .depth(false, false),
        )?;

        let mut mountains = Vec::with_capacity(MOUNTAIN_LAYERS.len());
        for (index, layer) in MOUNTAIN_LAYERS.iter().enumerate() {
            let label = format!("ink-mountain-{index}");
            let texture = build.linear_gradient(
                &label,
                quality.scale_sprite(2048),
                quality.scale_sprite(256),
                &parse_stops(&[(0.0, layer.top), (1.0, layer.bottom)])?,
            )?;
            let mesh = mountain_mesh(index, layer.height, build.random);
            let geometry = build.geometry(&label, &mesh)?;
            let material = build.material(
                &MaterialDescriptor::new(
                    label,
                    MaterialKind::Unlit {
                        texture: Some(texture),
                    },
                )
                .blend(BlendMode::Alpha)
                .color([1.0; 3], layer.opacity),
            )?;
            mountains.push(Mountain {
                geometry,
                material,
                depth: layer.depth,
            });
        }

        let sprite = build.geometry("ink-sprite", &MeshData::sprite_quad())?;
        let moon_texture = build.glow_sprite("ink-moon", quality.scale_sprite(256), &presets::moon_disc()?)?;
        let moon = build.material(
            &MaterialDescriptor::new("ink-moon", MaterialKind::Sprite { texture: moon_texture })
                .blend(BlendMode::Additive)
                .depth(false, false),
        )?;

        let warm = build.glow_sprite(
            "ink-warm",
            quality.scale_sprite(128),
            &presets::ink_blot(presets::INK_WARM)?,
        )?;
        let violet = build.glow_sprite(
            "ink-violet",
            quality.scale_sprite(128),
            &presets::ink_blot(presets::INK_VIOLET)?,
        )?;
        let mut field = ParticleField::new(ParticleLayout::Ink);
        field.populate(build.particles, build.random)?;
        let points_geometry = build.geometry(
            "ink-points",
            &MeshData::points(field.positions().to_vec(), field.attributes()),
        )?;
        let points = build.material(
            &MaterialDescriptor::new(
                "ink-points",
                MaterialKind::Points {
                    texture: warm,
                    accent: Some(violet),
                    sizing: PointSizing::World {
                        size: INK_POINT_SIZE,
                    },
                    animated: false,
                    alpha_test: 0.01,
                },
            )
            .blend(BlendMode::Additive)
            .depth(false, false),
        )?;

        let lantern_texture =
            build.glow_sprite("ink-lantern", quality.scale_sprite(256), &presets::lantern_glow()?)?;
        let lantern = build.material(
            &MaterialDescriptor::new("ink-lantern", MaterialKind::Sprite { texture: lantern_texture })
                .blend(BlendMode::Additive)
                .depth(false, false),
        )?;
        let glow = build.material(
            &MaterialDescriptor::new("ink-lantern-glow", MaterialKind::Sprite { texture: lantern_texture })
                .blend(BlendMode::Additive)
                .depth(false, false)
                .color([1.0; 3], GLOW_OPACITY),
        )?;
        let lanterns = (0..LANTERN_COUNT)
            .map(|_| Lantern::scatter(build.random))
            .collect();

        let curve = CatmullRomCurve::new(RIBBON_POINTS.to_vec());
        let tube = MeshData::tube(&curve, RIBBON_TUBULAR, RIBBON_RADIUS, RIBBON_RADIAL);
        let ribbon_geometry = build.geometry("ink-ribbon", &tube)?;
        let ribbon = build.material(
            &MaterialDescriptor::new(
                "ink-ribbon",
                MaterialKind::Phong {
                    emissive: linear_rgb(0x1a0b14),
                    shininess: 12.0,
                },
            )
            .blend(BlendMode::Alpha)
            .color(linear_rgb(0x2b1a22), RIBBON_OPACITY),
        )?;

        tracing::debug!(
            motes = field.len(),
            lanterns = LANTERN_COUNT,
            ribbon_vertices = tube.vertex_count(),
            "ink scene built"
        );
        Ok(Self {
            field,
            points_geometry,
            points,
            quad,
            paper,
            mountains,
            sprite,
            moon,
            lanterns,
            lantern,
            glow,
            ribbon_geometry,
            ribbon,
            ribbon_scratch: tube.positions.clone(),
            ribbon_rest: tube.positions,
        })
    }

    pub fn update<B: GpuBackend>(
        &mut self,
        backend: &mut B,
        input: &FrameInput,
        frame: &mut FrameDescription,
    ) -> Result<(), EngineError> {
        let t = input.elapsed;

        if self.field.update(t)? {
            backend.update_positions(self.points_geometry, self.field.positions())?;
        }

        for (vertex, (rest, out)) in self
            .ribbon_rest
            .iter()
            .zip(self.ribbon_scratch.iter_mut())
            .enumerate()
        {
            *out = [rest[0], rest[1] + ribbon_offset(vertex, t), rest[2]];
        }
        backend.update_positions(self.ribbon_geometry, &self.ribbon_scratch)?;

        frame
            .draws
            .push(DrawCall::new(self.quad, self.paper, Mat4::IDENTITY));
        for (index, mountain) in self.mountains.iter().enumerate().rev() {
            frame.draws.push(DrawCall::new(
                mountain.geometry,
                mountain.material,
                mountain_transform(index, mountain.depth, t),
            ));
        }
        frame.draws.push(DrawCall::new(
            self.sprite,
            self.moon,
            sprite_transform(MOON_POSITION, MOON_SCALE),
        ));
        frame.draws.push(DrawCall::new(
            self.ribbon_geometry,
            self.ribbon,
            Mat4::from_rotation_x(-PI / 12.0),
        ));

        for (index, lantern) in self.lanterns.iter().enumerate() {
            let (position, _) = lantern.placement(index, t);
            frame.draws.push(DrawCall::new(
                self.sprite,
                self.glow,
                sprite_transform(position, lantern.glow_scale),
            ));
        }
        for (index, lantern) in self.lanterns.iter().enumerate() {
            let (position, scale) = lantern.placement(index, t);
            frame.draws.push(
                DrawCall::new(self.sprite, self.lantern, sprite_transform(position, scale))
                    .tint(lantern.tint),
            );
        }

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
        self.ribbon_rest = Vec::new();
        self.ribbon_scratch = Vec::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lantern_hue_is_warm_orange() {
        let [r, g, b] = hsl_to_rgb(0.08, 0.9, 0.6);
        assert!(r > g && g > b);
        assert!((r - 0.96).abs() < 1.0e-3);
        assert_eq!(hsl_to_rgb(0.3, 0.0, 0.4), [0.4; 3]);
    }

    #[test]
    fn lanterns_rise_and_wrap_within_band() {
        let mut random = Mulberry32::new(42);
        let lanterns: Vec<Lantern> = (0..LANTERN_COUNT).map(|_| Lantern::scatter(&mut random)).collect();
        let mut wrapped = false;
        for (index, lantern) in lanterns.iter().enumerate() {
            let mut last_y = lantern.origin.y;
            for step in 0..600 {
                let t = step as f32 * 0.5;
                let (position, scale) = lantern.placement(index, t);
                assert!(position.y <= LANTERN_CEILING + 1.0e-3);
                assert!(position.y >= -3.0 - 1.0e-3);
                assert!((position.x - lantern.origin.x).abs() <= 2.0 * 0.18 / 0.42 + 1.0e-3);
                assert!(scale > 2.0 && scale < 5.0);
                wrapped |= position.y < last_y;
                last_y = position.y;
            }
        }
        assert!(wrapped, "no lantern ever wrapped back down");
    }

    #[test]
    fn mountain_ridge_is_perturbed_and_base_is_flat() {
        let mut random = Mulberry32::new(7);
        let mesh = mountain_mesh(1, 12.0, &mut random);
        let ridge = MOUNTAIN_SEGMENTS as usize + 1;
        assert_eq!(mesh.vertex_count(), ridge * 2);
        for position in &mesh.positions[ridge..] {
            assert_eq!(position[1], -6.0);
        }
        let heights: Vec<f32> = mesh.positions[..ridge].iter().map(|p| p[1]).collect();
        let lowest = heights.iter().cloned().fold(f32::INFINITY, f32::min);
        let highest = heights.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        assert!(highest - lowest > 3.0);
        assert!(lowest > -6.0);
    }

    #[test]
    fn ribbon_pulse_is_bounded() {
        for vertex in [0, 100, 2000] {
            for step in 0..200 {
                let offset = ribbon_offset(vertex, step as f32 * 0.37);
                assert!(offset.abs() <= 2.0 * 0.072 / 0.5 + 1.0e-5);
            }
        }
        assert_eq!(ribbon_offset(10, 0.0), 0.0);
    }
}
