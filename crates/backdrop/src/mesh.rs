//! CPU-side geometry and the generators the themes draw with.

use glam::Vec3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    Triangles,
    /// One camera-facing sprite per vertex; `indices` is ignored.
    Points,
}

/// Plain vertex columns ready for upload.
///
/// `attributes` is a free-form per-vertex slot. Point fields store
/// `[size, phase, tone, 0]` there.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshData {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub attributes: Vec<[f32; 4]>,
    pub indices: Vec<u32>,
    pub topology: Topology,
}

impl MeshData {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn points(positions: Vec<[f32; 3]>, attributes: Vec<[f32; 4]>) -> Self {
        Self {
            positions,
            normals: Vec::new(),
            uvs: Vec::new(),
            attributes,
            indices: Vec::new(),
            topology: Topology::Points,
        }
    }

    /// Two triangles covering clip space; vertex shaders pass positions through.
    pub fn fullscreen_quad() -> Self {
        Self::quad(2.0)
    }

    /// Unit quad centred on the origin in the XY plane, used for sprites.
    pub fn sprite_quad() -> Self {
        Self::quad(1.0)
    }

    fn quad(extent: f32) -> Self {
        let half = extent * 0.5;
        Self {
            positions: vec![
                [-half, -half, 0.0],
                [half, -half, 0.0],
                [half, half, 0.0],
                [-half, half, 0.0],
            ],
            normals: vec![[0.0, 0.0, 1.0]; 4],
            uvs: vec![[0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]],
            attributes: Vec::new(),
            indices: vec![0, 1, 2, 0, 2, 3],
            topology: Topology::Triangles,
        }
    }

    /// Subdivided plane in the XY plane facing +Z, rows emitted top to bottom.
    pub fn plane(width: f32, height: f32, width_segments: u32, height_segments: u32) -> Self {
        let grid_x = width_segments.max(1);
        let grid_y = height_segments.max(1);
        let grid_x1 = grid_x + 1;
        let grid_y1 = grid_y + 1;
        let segment_width = width / grid_x as f32;
        let segment_height = height / grid_y as f32;

        let capacity = (grid_x1 * grid_y1) as usize;
        let mut positions = Vec::with_capacity(capacity);
        let mut normals = Vec::with_capacity(capacity);
        let mut uvs = Vec::with_capacity(capacity);
        for iy in 0..grid_y1 {
            let y = height * 0.5 - iy as f32 * segment_height;
            for ix in 0..grid_x1 {
                let x = ix as f32 * segment_width - width * 0.5;
                positions.push([x, y, 0.0]);
                normals.push([0.0, 0.0, 1.0]);
                uvs.push([ix as f32 / grid_x as f32, iy as f32 / grid_y as f32]);
            }
        }

        let mut indices = Vec::with_capacity((grid_x * grid_y * 6) as usize);
        for iy in 0..grid_y {
            for ix in 0..grid_x {
                let a = ix + grid_x1 * iy;
                let b = ix + grid_x1 * (iy + 1);
                let c = (ix + 1) + grid_x1 * (iy + 1);
                let d = (ix + 1) + grid_x1 * iy;
                indices.extend_from_slice(&[a, b, d, b, c, d]);
            }
        }

        Self {
            positions,
            normals,
            uvs,
            attributes: Vec::new(),
            indices,
            topology: Topology::Triangles,
        }
    }

    /// Axis-aligned cube with per-face normals.
    pub fn cuboid(size: f32) -> Self {
        let h = size * 0.5;
        // (normal, tangent u, tangent v)
        let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ];

        let mut mesh = Self {
            positions: Vec::with_capacity(24),
            normals: Vec::with_capacity(24),
            uvs: Vec::with_capacity(24),
            attributes: Vec::new(),
            indices: Vec::with_capacity(36),
            topology: Topology::Triangles,
        };
        for (normal, u, v) in faces {
            let n = Vec3::from(normal);
            let u = Vec3::from(u);
            let v = Vec3::from(v);
            let base = mesh.positions.len() as u32;
            for (su, sv, uv) in [
                (-1.0, -1.0, [0.0, 1.0]),
                (1.0, -1.0, [1.0, 1.0]),
                (1.0, 1.0, [1.0, 0.0]),
                (-1.0, 1.0, [0.0, 0.0]),
            ] {
                let p = (n + u * su + v * sv) * h;
                mesh.positions.push(p.to_array());
                mesh.normals.push(normal);
                mesh.uvs.push(uv);
            }
            mesh.indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        mesh
    }

    /// Open tube swept along `curve` with parallel-transported frames.
    pub fn tube(curve: &CatmullRomCurve, tubular_segments: u32, radius: f32, radial_segments: u32) -> Self {
        let tubular = tubular_segments.max(1);
        let radial = radial_segments.max(3);
        let frames = curve.frames(tubular);

        let ring = (radial + 1) as usize;
        let capacity = (tubular as usize + 1) * ring;
        let mut positions = Vec::with_capacity(capacity);
        let mut normals = Vec::with_capacity(capacity);
        let mut uvs = Vec::with_capacity(capacity);

        for (i, frame) in frames.iter().enumerate() {
            for j in 0..=radial {
                let angle = j as f32 / radial as f32 * std::f32::consts::TAU;
                let (sin, cos) = angle.sin_cos();
                let normal = (frame.normal * -cos + frame.binormal * sin).normalize_or_zero();
                positions.push((frame.point + normal * radius).to_array());
                normals.push(normal.to_array());
                uvs.push([i as f32 / tubular as f32, j as f32 / radial as f32]);
            }
        }

        let mut indices = Vec::with_capacity((tubular * radial * 6) as usize);
        for j in 1..=tubular {
            for i in 1..=radial {
                let a = (radial + 1) * (j - 1) + (i - 1);
                let b = (radial + 1) * j + (i - 1);
                let c = (radial + 1) * j + i;
                let d = (radial + 1) * (j - 1) + i;
                indices.extend_from_slice(&[a, b, d, b, c, d]);
            }
        }

        Self {
            positions,
            normals,
            uvs,
            attributes: Vec::new(),
            indices,
            topology: Topology::Triangles,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurveFrame {
    pub point: Vec3,
    pub tangent: Vec3,
    pub normal: Vec3,
    pub binormal: Vec3,
}

/// Centripetal Catmull-Rom spline through a list of control points.
///
/// Open curves extrapolate a phantom point at each end.
#[derive(Debug, Clone, PartialEq)]
pub struct CatmullRomCurve {
    points: Vec<Vec3>,
    arc_lengths: Vec<f32>,
}

const ARC_DIVISIONS: usize = 200;

impl CatmullRomCurve {
    pub fn new(points: Vec<Vec3>) -> Self {
        let mut curve = Self {
            points,
            arc_lengths: Vec::new(),
        };
        curve.arc_lengths = curve.compute_arc_lengths();
        curve
    }

    pub fn length(&self) -> f32 {
        self.arc_lengths.last().copied().unwrap_or(0.0)
    }

    /// Point at curve parameter `t` in `[0, 1]` (not arc-length uniform).
    pub fn point(&self, t: f32) -> Vec3 {
        match self.points.len() {
            0 => Vec3::ZERO,
            1 => self.points[0],
            len => {
                let scaled = (len - 1) as f32 * t.clamp(0.0, 1.0);
                let mut index = scaled.floor() as usize;
                let mut weight = scaled - index as f32;
                if index >= len - 1 {
                    index = len - 2;
                    weight = 1.0;
                }

                let p1 = self.points[index];
                let p2 = self.points[index + 1];
                let p0 = if index > 0 {
                    self.points[index - 1]
                } else {
                    p1 * 2.0 - p2
                };
                let p3 = if index + 2 < len {
                    self.points[index + 2]
                } else {
                    p2 * 2.0 - p1
                };
                centripetal(p0, p1, p2, p3, weight)
            }
        }
    }

    /// Point at arc-length fraction `u` in `[0, 1]`.
    pub fn point_at(&self, u: f32) -> Vec3 {
        self.point(self.u_to_t(u))
    }

    pub fn tangent_at(&self, u: f32) -> Vec3 {
        let t = self.u_to_t(u);
        let delta = 1.0e-4;
        let t1 = (t - delta).max(0.0);
        let t2 = (t + delta).min(1.0);
        (self.point(t2) - self.point(t1)).normalize_or_zero()
    }

    /// `segments + 1` frames evenly spaced by arc length.
    pub fn frames(&self, segments: u32) -> Vec<CurveFrame> {
        let segments = segments.max(1);
        let mut frames = Vec::with_capacity(segments as usize + 1);

        let first_tangent = self.tangent_at(0.0);
        let seed_axis = smallest_axis(first_tangent);
        let mut normal = first_tangent.cross(seed_axis).normalize_or_zero();
        normal = first_tangent.cross(normal).normalize_or_zero();

        let mut previous_tangent = first_tangent;
        for i in 0..=segments {
            let u = i as f32 / segments as f32;
            let tangent = self.tangent_at(u);
            if i > 0 {
                let axis = previous_tangent.cross(tangent);
                if axis.length() > f32::EPSILON {
                    let axis = axis.normalize();
                    let angle = previous_tangent.dot(tangent).clamp(-1.0, 1.0).acos();
                    normal = glam::Quat::from_axis_angle(axis, angle) * normal;
                }
            }
            let binormal = tangent.cross(normal).normalize_or_zero();
            frames.push(CurveFrame {
                point: self.point_at(u),
                tangent,
                normal,
                binormal,
            });
            previous_tangent = tangent;
        }
        frames
    }

    fn compute_arc_lengths(&self) -> Vec<f32> {
        let mut lengths = Vec::with_capacity(ARC_DIVISIONS + 1);
        let mut total = 0.0;
        let mut last = self.point(0.0);
        lengths.push(0.0);
        for i in 1..=ARC_DIVISIONS {
            let current = self.point(i as f32 / ARC_DIVISIONS as f32);
            total += current.distance(last);
            lengths.push(total);
            last = current;
        }
        lengths
    }

    fn u_to_t(&self, u: f32) -> f32 {
        let total = self.length();
        if total <= f32::EPSILON {
            return u.clamp(0.0, 1.0);
        }
        let target = u.clamp(0.0, 1.0) * total;
        let index = self
            .arc_lengths
            .partition_point(|length| *length < target)
            .clamp(1, ARC_DIVISIONS);
        let before = self.arc_lengths[index - 1];
        let after = self.arc_lengths[index];
        let span = after - before;
        let fraction = if span > f32::EPSILON {
            (target - before) / span
        } else {
            0.0
        };
        ((index - 1) as f32 + fraction) / ARC_DIVISIONS as f32
    }
}

fn smallest_axis(tangent: Vec3) -> Vec3 {
    let abs = tangent.abs();
    if abs.x <= abs.y && abs.x <= abs.z {
        Vec3::X
    } else if abs.y <= abs.z {
        Vec3::Y
    } else {
        Vec3::Z
    }
}

fn centripetal(p0: Vec3, p1: Vec3, p2: Vec3, p3: Vec3, weight: f32) -> Vec3 {
    let mut dt0 = p0.distance_squared(p1).powf(0.25);
    let mut dt1 = p1.distance_squared(p2).powf(0.25);
    let mut dt2 = p2.distance_squared(p3).powf(0.25);
    if dt1 < 1.0e-4 {
        dt1 = 1.0;
    }
    if dt0 < 1.0e-4 {
        dt0 = dt1;
    }
    if dt2 < 1.0e-4 {
        dt2 = dt1;
    }

    // Hermite tangents for non-uniform parameterisation, rescaled to [0, 1].
    let t1 = ((p1 - p0) / dt0 - (p2 - p0) / (dt0 + dt1) + (p2 - p1) / dt1) * dt1;
    let t2 = ((p2 - p1) / dt1 - (p3 - p1) / (dt1 + dt2) + (p3 - p2) / dt2) * dt1;

    let w2 = weight * weight;
    let w3 = w2 * weight;
    let c0 = p1;
    let c1 = t1;
    let c2 = -3.0 * p1 + 3.0 * p2 - 2.0 * t1 - t2;
    let c3 = 2.0 * p1 - 2.0 * p2 + t1 + t2;
    c0 + c1 * weight + c2 * w2 + c3 * w3
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ribbon_curve() -> CatmullRomCurve {
        CatmullRomCurve::new(vec![
            Vec3::new(-22.0, -3.5, -6.0),
            Vec3::new(-10.0, -2.0, -14.0),
            Vec3::new(0.0, 0.8, -22.0),
            Vec3::new(10.0, 2.2, -34.0),
            Vec3::new(24.0, 5.0, -46.0),
        ])
    }

    #[test]
    fn plane_layout_matches_segments() {
        let plane = MeshData::plane(120.0, 14.0, 160, 1);
        assert_eq!(plane.vertex_count(), 161 * 2);
        assert_eq!(plane.indices.len(), 160 * 6);
        assert_eq!(plane.positions[0], [-60.0, 7.0, 0.0]);
        assert_eq!(plane.positions[160], [60.0, 7.0, 0.0]);
        assert_eq!(plane.positions[161], [-60.0, -7.0, 0.0]);
    }

    #[test]
    fn curve_passes_through_control_points() {
        let curve = ribbon_curve();
        assert!(curve.point(0.0).distance(Vec3::new(-22.0, -3.5, -6.0)) < 1.0e-4);
        assert!(curve.point(0.5).distance(Vec3::new(0.0, 0.8, -22.0)) < 1.0e-4);
        assert!(curve.point(1.0).distance(Vec3::new(24.0, 5.0, -46.0)) < 1.0e-4);
    }

    #[test]
    fn arc_length_parameterisation_is_monotonic() {
        let curve = ribbon_curve();
        let mut previous = -1.0;
        for i in 0..=20 {
            let t = curve.u_to_t(i as f32 / 20.0);
            assert!(t >= previous);
            previous = t;
        }
        assert!((curve.u_to_t(1.0) - 1.0).abs() < 1.0e-4);
    }

    #[test]
    fn tube_vertices_sit_on_radius() {
        let curve = ribbon_curve();
        let tube = MeshData::tube(&curve, 160, 0.46, 12);
        assert_eq!(tube.vertex_count(), 161 * 13);
        assert_eq!(tube.indices.len(), 160 * 12 * 6);
        let frames = curve.frames(160);
        for (ring, frame) in frames.iter().enumerate().step_by(40) {
            let p = Vec3::from(tube.positions[ring * 13 + 5]);
            assert!((p.distance(frame.point) - 0.46).abs() < 1.0e-3);
        }
    }

    #[test]
    fn frames_are_orthonormal() {
        for frame in ribbon_curve().frames(32) {
            assert!(frame.tangent.dot(frame.normal).abs() < 1.0e-3);
            assert!(frame.tangent.dot(frame.binormal).abs() < 1.0e-3);
            assert!((frame.normal.length() - 1.0).abs() < 1.0e-3);
        }
    }

    #[test]
    fn cuboid_has_outward_normals() {
        let cube = MeshData::cuboid(30.0);
        assert_eq!(cube.vertex_count(), 24);
        for (position, normal) in cube.positions.iter().zip(&cube.normals) {
            assert!(Vec3::from(*position).dot(Vec3::from(*normal)) > 0.0);
            assert!(position.iter().all(|c| c.abs() <= 15.0 + 1.0e-4));
        }
    }
}
