//! Column-wise particle storage and the closed-form motion functions.
//!
//! ```text
//!   Uninitialized ──populate──▶ Populated ──update──▶ Animating ─┐
//!         │                         │                    ▲      │ update
//!         └──────────────dispose────┴────────────────────┴──────┴──▶ Disposed
//! ```
//!
//! Positions are never integrated: every update recomputes them from the
//! initial columns and the elapsed time, so skipped frames cannot drift.

use std::f32::consts::TAU;

use crate::random::Mulberry32;

pub const MIN_PARTICLES: usize = 10;

/// Reference frame rate the per-frame rates below are expressed in.
const REFERENCE_FPS: f32 = 60.0;

/// Star drift: GPU time multiplier and per-axis amplitude/frequency.
pub const STAR_TIME_SCALE: f32 = 1.32;
const STAR_DRIFT: [(f32, f32, f32); 3] = [
    // (amplitude, phase multiplier, time frequency)
    (0.26, 1.0, 0.18),
    (0.22, 0.7, 0.21),
    (0.16, 0.6, 0.15),
];
pub const STAR_ACCENT_PROBABILITY: f32 = 0.07;

/// Ink rise, expressed per reference frame.
const INK_RISE_PER_FRAME: f32 = 0.0035;
const INK_WOBBLE_PER_FRAME: f32 = 0.0012;
const INK_WOBBLE_FREQUENCY: f32 = 0.9;
const INK_SWAY_PER_FRAME: f32 = 0.0016;
const INK_SWAY_FREQUENCY: f32 = 0.14;
pub const INK_UPPER_BOUND: f32 = 18.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticleLayout {
    /// Ring of stars around the camera, animated on the GPU.
    Star,
    /// Rising ink motes, animated on the CPU.
    Ink,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldState {
    Uninitialized,
    Populated,
    Animating,
    Disposed,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParticleError {
    #[error("particle field is already populated")]
    AlreadyPopulated,
    #[error("particle field has not been populated")]
    NotPopulated,
    #[error("particle field was disposed")]
    Disposed,
}

#[derive(Debug, Clone)]
pub struct ParticleField {
    layout: ParticleLayout,
    state: FieldState,
    origins: Vec<[f32; 3]>,
    positions: Vec<[f32; 3]>,
    sizes: Vec<f32>,
    phases: Vec<f32>,
    tones: Vec<f32>,
    respawn_y: Vec<f32>,
    respawn_z: Vec<f32>,
    elapsed: f32,
}

impl ParticleField {
    pub fn new(layout: ParticleLayout) -> Self {
        Self {
            layout,
            state: FieldState::Uninitialized,
            origins: Vec::new(),
            positions: Vec::new(),
            sizes: Vec::new(),
            phases: Vec::new(),
            tones: Vec::new(),
            respawn_y: Vec::new(),
            respawn_z: Vec::new(),
            elapsed: 0.0,
        }
    }

    pub fn layout(&self) -> ParticleLayout {
        self.layout
    }

    pub fn state(&self) -> FieldState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.origins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    /// Current positions (the initial layout for GPU-animated fields).
    pub fn positions(&self) -> &[[f32; 3]] {
        &self.positions
    }

    pub fn sizes(&self) -> &[f32] {
        &self.sizes
    }

    pub fn phases(&self) -> &[f32] {
        &self.phases
    }

    pub fn tones(&self) -> &[f32] {
        &self.tones
    }

    /// `[size, phase, tone, 0]` per particle, the layout GPU point sprites read.
    pub fn attributes(&self) -> Vec<[f32; 4]> {
        self.sizes
            .iter()
            .zip(&self.phases)
            .zip(&self.tones)
            .map(|((size, phase), tone)| [*size, *phase, *tone, 0.0])
            .collect()
    }

    /// Draws the initial layout. `count` is raised to at least [`MIN_PARTICLES`].
    pub fn populate(&mut self, count: usize, random: &mut Mulberry32) -> Result<(), ParticleError> {
        match self.state {
            FieldState::Uninitialized => {}
            FieldState::Disposed => return Err(ParticleError::Disposed),
            _ => return Err(ParticleError::AlreadyPopulated),
        }

        let count = count.max(MIN_PARTICLES);
        self.origins.reserve_exact(count);
        self.sizes.reserve_exact(count);
        self.phases.reserve_exact(count);
        self.tones.reserve_exact(count);

        match self.layout {
            ParticleLayout::Star => {
                for _ in 0..count {
                    let radius = random.span(6.0, 36.0);
                    let angle = random.next_unit() * TAU;
                    let x = angle.cos() * radius * random.span(0.6, 0.9);
                    let y = (random.next_unit() - 0.45) * 6.0;
                    let z = angle.sin() * radius * random.span(0.6, 0.9);
                    self.origins.push([x, y, z]);
                    self.sizes.push(random.span(0.6, 1.9));
                    self.phases.push(random.next_unit() * TAU);
                    let accent = random.next_unit() < STAR_ACCENT_PROBABILITY;
                    self.tones.push(if accent { 1.0 } else { 0.0 });
                }
            }
            ParticleLayout::Ink => {
                self.respawn_y.reserve_exact(count);
                self.respawn_z.reserve_exact(count);
                for index in 0..count {
                    let x = (random.next_unit() - 0.5) * 120.0;
                    let y = random.next_unit() * 18.0 - 6.0;
                    let z = -random.next_unit() * 80.0 - 0.5;
                    self.origins.push([x, y, z]);
                    self.sizes.push(random.span(0.8, 2.5));
                    self.phases.push((index % 17) as f32);
                    // Two ink tints, split evenly.
                    self.tones.push(if random.next_unit() < 0.5 { 0.0 } else { 1.0 });
                    self.respawn_y.push(-8.0 - random.next_unit() * 3.0);
                    self.respawn_z.push(-10.0 - random.next_unit() * 90.0);
                }
            }
        }

        self.positions = self.origins.clone();
        self.state = FieldState::Populated;
        tracing::debug!(layout = ?self.layout, count, "particle field populated");
        Ok(())
    }

    /// Advances to `elapsed` seconds. Returns true when CPU positions changed
    /// and need uploading.
    pub fn update(&mut self, elapsed: f32) -> Result<bool, ParticleError> {
        match self.state {
            FieldState::Uninitialized => return Err(ParticleError::NotPopulated),
            FieldState::Disposed => return Err(ParticleError::Disposed),
            FieldState::Populated | FieldState::Animating => {}
        }
        self.state = FieldState::Animating;
        self.elapsed = elapsed.max(0.0);

        match self.layout {
            // Star drift is evaluated per vertex on the GPU.
            ParticleLayout::Star => Ok(false),
            ParticleLayout::Ink => {
                let t = self.elapsed;
                for (index, position) in self.positions.iter_mut().enumerate() {
                    *position = ink_position(
                        index,
                        self.origins[index],
                        self.respawn_y[index],
                        self.respawn_z[index],
                        t,
                    );
                }
                Ok(true)
            }
        }
    }

    /// Where particle `index` is drawn at `elapsed`, on either layout.
    pub fn position_at(&self, index: usize, elapsed: f32) -> Option<[f32; 3]> {
        let origin = *self.origins.get(index)?;
        Some(match self.layout {
            ParticleLayout::Star => star_drift(origin, self.phases[index], elapsed),
            ParticleLayout::Ink => ink_position(
                index,
                origin,
                self.respawn_y[index],
                self.respawn_z[index],
                elapsed,
            ),
        })
    }

    /// Frees the columns. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        if self.state == FieldState::Disposed {
            return;
        }
        self.origins = Vec::new();
        self.positions = Vec::new();
        self.sizes = Vec::new();
        self.phases = Vec::new();
        self.tones = Vec::new();
        self.respawn_y = Vec::new();
        self.respawn_z = Vec::new();
        self.state = FieldState::Disposed;
    }
}

/// CPU mirror of the star vertex shader drift.
pub fn star_drift(origin: [f32; 3], phase: f32, elapsed: f32) -> [f32; 3] {
    let t = elapsed * STAR_TIME_SCALE;
    let [(ax, px, fx), (ay, py, fy), (az, pz, fz)] = STAR_DRIFT;
    [
        origin[0] + ax * (phase * px + t * fx).sin(),
        origin[1] + ay * (phase * py + t * fy).cos(),
        origin[2] + az * (phase * pz + t * fz).sin(),
    ]
}

/// CPU mirror of the star point-size falloff, in device pixels.
pub fn star_point_size(size: f32, depth: f32) -> f32 {
    let depth = depth.max(0.0001);
    (size * (110.0 / (depth + 6.0))).clamp(1.0, 44.0)
}

/// Integral of `amplitude * sin(offset + frequency * s)` over `s` in `[0, t]`.
pub(crate) fn sine_integral(amplitude: f32, frequency: f32, offset: f32, t: f32) -> f32 {
    -(amplitude / frequency) * ((offset + frequency * t).cos() - offset.cos())
}

/// Height after rising by `lift` from `start`, wrapping back into the
/// respawn band each time `upper` is crossed. Returns the height and whether
/// at least one wrap happened.
pub fn wrap_rise(start: f32, lift: f32, upper: f32, respawn: f32) -> (f32, bool) {
    let raw = start + lift;
    if raw <= upper {
        return (raw, false);
    }
    let span = (upper - respawn).max(f32::EPSILON);
    let excess = (raw - upper).rem_euclid(span);
    (respawn + excess, true)
}

fn ink_position(index: usize, origin: [f32; 3], respawn_y: f32, respawn_z: f32, t: f32) -> [f32; 3] {
    let wobble_offset = (index % 17) as f32;
    let lift = INK_RISE_PER_FRAME * REFERENCE_FPS * t
        + sine_integral(
            INK_WOBBLE_PER_FRAME * REFERENCE_FPS,
            INK_WOBBLE_FREQUENCY,
            wobble_offset,
            t,
        );
    let sway = sine_integral(
        INK_SWAY_PER_FRAME * REFERENCE_FPS,
        INK_SWAY_FREQUENCY,
        index as f32 * 0.23,
        t,
    );
    let (y, wrapped) = wrap_rise(origin[1], lift, INK_UPPER_BOUND, respawn_y);
    let z = if wrapped { respawn_z } else { origin[2] };
    [origin[0] + sway, y, z]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populated(layout: ParticleLayout, count: usize, seed: u32) -> ParticleField {
        let mut field = ParticleField::new(layout);
        field.populate(count, &mut Mulberry32::new(seed)).unwrap();
        field
    }

    #[test]
    fn same_seed_gives_identical_columns() {
        let a = populated(ParticleLayout::Star, 500, 123_456_789);
        let b = populated(ParticleLayout::Star, 500, 123_456_789);
        assert_eq!(a.positions(), b.positions());
        assert_eq!(a.sizes(), b.sizes());
        assert_eq!(a.phases(), b.phases());
        assert_eq!(a.tones(), b.tones());
    }

    #[test]
    fn star_layout_respects_bounds() {
        let field = populated(ParticleLayout::Star, 2000, 7);
        for ([x, y, z], size) in field.positions().iter().zip(field.sizes()) {
            let planar = (x * x + z * z).sqrt();
            assert!(planar <= 42.0 * 1.5 + 1.0e-3);
            assert!((-2.7..3.3).contains(y));
            assert!((0.6..2.5).contains(size));
        }
        let accents = field.tones().iter().filter(|tone| **tone == 1.0).count();
        assert!(accents > 60 && accents < 240, "{accents} accents");
    }

    #[test]
    fn count_has_a_floor() {
        assert_eq!(populated(ParticleLayout::Star, 0, 1).len(), MIN_PARTICLES);
    }

    #[test]
    fn state_machine_rejects_out_of_order_calls() {
        let mut field = ParticleField::new(ParticleLayout::Ink);
        assert_eq!(field.update(0.0), Err(ParticleError::NotPopulated));
        field.populate(20, &mut Mulberry32::new(3)).unwrap();
        assert_eq!(field.state(), FieldState::Populated);
        assert_eq!(
            field.populate(20, &mut Mulberry32::new(3)),
            Err(ParticleError::AlreadyPopulated)
        );
        assert_eq!(field.update(0.5), Ok(true));
        assert_eq!(field.state(), FieldState::Animating);
        field.dispose();
        field.dispose();
        assert_eq!(field.state(), FieldState::Disposed);
        assert_eq!(field.update(1.0), Err(ParticleError::Disposed));
        assert!(field.is_empty());
    }

    #[test]
    fn star_update_leaves_cpu_columns_alone() {
        let mut field = populated(ParticleLayout::Star, 50, 9);
        let before = field.positions().to_vec();
        assert_eq!(field.update(12.0), Ok(false));
        assert_eq!(field.positions(), &before[..]);
    }

    #[test]
    fn star_drift_is_bounded() {
        let field = populated(ParticleLayout::Star, 100, 11);
        for index in 0..field.len() {
            let origin = field.positions()[index];
            for t in [0.0, 1.0, 17.5, 300.0] {
                let moved = field.position_at(index, t).unwrap();
                assert!((moved[0] - origin[0]).abs() <= 0.26 + 1.0e-5);
                assert!((moved[1] - origin[1]).abs() <= 0.22 + 1.0e-5);
                assert!((moved[2] - origin[2]).abs() <= 0.16 + 1.0e-5);
            }
        }
    }

    #[test]
    fn star_point_size_is_clamped() {
        assert_eq!(star_point_size(2.5, 0.0), 44.0);
        assert_eq!(star_point_size(0.6, 500.0), 1.0);
        let mid = star_point_size(1.0, 16.0);
        assert!((mid - 5.0).abs() < 1.0e-5);
    }

    #[test]
    fn ink_update_is_closed_form() {
        let mut stepped = populated(ParticleLayout::Ink, 200, 5);
        for frame in 1..=120 {
            stepped.update(frame as f32 / 60.0).unwrap();
        }
        let mut jumped = populated(ParticleLayout::Ink, 200, 5);
        jumped.update(2.0).unwrap();
        for (a, b) in stepped.positions().iter().zip(jumped.positions()) {
            for axis in 0..3 {
                assert!((a[axis] - b[axis]).abs() < 1.0e-4);
            }
        }
    }

    #[test]
    fn ink_particles_stay_in_band() {
        let mut field = populated(ParticleLayout::Ink, 500, 21);
        for t in [0.0, 10.0, 60.0, 600.0, 3600.0] {
            field.update(t).unwrap();
            for [_, y, z] in field.positions() {
                assert!(*y <= INK_UPPER_BOUND + 1.0e-3, "y={y} at t={t}");
                assert!(*y >= -11.0 - 1.0e-3, "y={y} at t={t}");
                assert!(*z <= -0.5 && *z >= -100.0);
            }
        }
    }

    #[test]
    fn wrap_rise_lands_in_respawn_band() {
        assert_eq!(wrap_rise(0.0, 5.0, 18.0, -8.0), (5.0, false));
        let (y, wrapped) = wrap_rise(17.0, 2.0, 18.0, -8.0);
        assert!(wrapped);
        assert!((y - -7.0).abs() < 1.0e-5);
        let (y, wrapped) = wrap_rise(0.0, 18.0 + 26.0 * 3.0 + 1.0, 18.0, -8.0);
        assert!(wrapped);
        assert!((y - -7.0).abs() < 1.0e-3);
    }
}
