//! Procedural gradient sprites.
//!
//! Gradients are rasterized into an [`image::RgbaImage`] the same way a 2D
//! canvas would paint them: stops are interpolated in straight-alpha sRGB,
//! radial gradients run from the centre to the inscribed circle and hold the
//! last stop beyond it. Uploads never generate mipmaps.

use std::collections::HashMap;

use image::{Rgba, RgbaImage};

use crate::backend::{BackendError, GpuBackend, GpuResource, TextureDescriptor, TextureId, TextureWrap};
use crate::resources::ResourceRegistry;

#[derive(Debug, thiserror::Error)]
pub enum TextureError {
    #[error("unrecognised colour '{0}'")]
    Color(String),
    #[error("gradient needs at least one stop")]
    NoStops,
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Straight-alpha colour with 8-bit channels and a fractional alpha.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f32,
}

impl StopColor {
    pub const TRANSPARENT: StopColor = StopColor::rgba(0, 0, 0, 0.0);

    pub const fn rgba(r: u8, g: u8, b: u8, a: f32) -> Self {
        Self { r, g, b, a }
    }

    fn lerp(self, other: StopColor, t: f32) -> [f32; 4] {
        let mix = |a: f32, b: f32| a + (b - a) * t;
        [
            mix(self.r as f32, other.r as f32),
            mix(self.g as f32, other.g as f32),
            mix(self.b as f32, other.b as f32),
            mix(self.a, other.a) * 255.0,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorStop {
    pub offset: f32,
    pub color: StopColor,
}

/// Parses `#rgb`, `#rrggbb`, `rgb(r,g,b)` and `rgba(r,g,b,a)`.
pub fn parse_color(raw: &str) -> Result<StopColor, TextureError> {
    let trimmed = raw.trim();
    let invalid = || TextureError::Color(raw.to_string());

    if let Some(hex) = trimmed.strip_prefix('#') {
        let expanded: String = match hex.len() {
            3 => hex.chars().flat_map(|c| [c, c]).collect(),
            6 => hex.to_string(),
            _ => return Err(invalid()),
        };
        let value = u32::from_str_radix(&expanded, 16).map_err(|_| invalid())?;
        return Ok(StopColor::rgba(
            (value >> 16) as u8,
            (value >> 8) as u8,
            value as u8,
            1.0,
        ));
    }

    let lowered = trimmed.to_ascii_lowercase();
    let (body, expects_alpha) = if let Some(body) = lowered.strip_prefix("rgba(") {
        (body, true)
    } else if let Some(body) = lowered.strip_prefix("rgb(") {
        (body, false)
    } else {
        return Err(invalid());
    };
    let body = body.strip_suffix(')').ok_or_else(invalid)?;
    let parts: Vec<&str> = body.split(',').map(str::trim).collect();
    if parts.len() != if expects_alpha { 4 } else { 3 } {
        return Err(invalid());
    }

    let channel = |part: &str| -> Result<u8, TextureError> {
        let value: f32 = part.parse().map_err(|_| invalid())?;
        Ok(value.round().clamp(0.0, 255.0) as u8)
    };
    let alpha = if expects_alpha {
        let value: f32 = parts[3].parse().map_err(|_| invalid())?;
        value.clamp(0.0, 1.0)
    } else {
        1.0
    };
    Ok(StopColor::rgba(
        channel(parts[0])?,
        channel(parts[1])?,
        channel(parts[2])?,
        alpha,
    ))
}

/// Builds stops from `(offset, css colour)` pairs.
pub fn parse_stops(stops: &[(f32, &str)]) -> Result<Vec<ColorStop>, TextureError> {
    stops
        .iter()
        .map(|(offset, color)| {
            Ok(ColorStop {
                offset: offset.clamp(0.0, 1.0),
                color: parse_color(color)?,
            })
        })
        .collect()
}

fn sample(stops: &[ColorStop], t: f32) -> Rgba<u8> {
    let t = t.clamp(0.0, 1.0);
    let first = stops[0];
    let last = stops[stops.len() - 1];
    let value = if t <= first.offset {
        first.color.lerp(first.color, 0.0)
    } else if t >= last.offset {
        last.color.lerp(last.color, 0.0)
    } else {
        let upper = stops
            .iter()
            .position(|stop| stop.offset >= t)
            .unwrap_or(stops.len() - 1)
            .max(1);
        let a = stops[upper - 1];
        let b = stops[upper];
        let span = b.offset - a.offset;
        let local = if span > f32::EPSILON {
            (t - a.offset) / span
        } else {
            1.0
        };
        a.color.lerp(b.color, local)
    };
    Rgba(value.map(|channel| channel.round().clamp(0.0, 255.0) as u8))
}

/// Square raster with a radial gradient from the centre to the edge midpoint.
pub fn rasterize_radial(size: u32, stops: &[ColorStop]) -> Result<RgbaImage, TextureError> {
    if stops.is_empty() {
        return Err(TextureError::NoStops);
    }
    let size = size.max(1);
    let centre = size as f32 * 0.5;
    Ok(RgbaImage::from_fn(size, size, |x, y| {
        let dx = x as f32 + 0.5 - centre;
        let dy = y as f32 + 0.5 - centre;
        sample(stops, (dx * dx + dy * dy).sqrt() / centre)
    }))
}

/// Vertical gradient, first stop at the top row.
pub fn rasterize_linear(width: u32, height: u32, stops: &[ColorStop]) -> Result<RgbaImage, TextureError> {
    if stops.is_empty() {
        return Err(TextureError::NoStops);
    }
    let width = width.max(1);
    let height = height.max(1);
    let rows: Vec<Rgba<u8>> = (0..height)
        .map(|y| sample(stops, (y as f32 + 0.5) / height as f32))
        .collect();
    Ok(RgbaImage::from_fn(width, height, |_, y| rows[y as usize]))
}

/// Colour stops for the sprites the themes share.
pub mod presets {
    use super::{parse_stops, ColorStop, TextureError};

    pub const STAR_WHITE: &str = "rgba(220,235,255,1)";
    pub const STAR_GOLD: &str = "rgba(245,220,140,1)";
    pub const INK_WARM: &str = "rgba(255,200,120,1)";
    pub const INK_VIOLET: &str = "rgba(200,120,255,1)";

    /// Soft point glow used by star particles.
    pub fn point_glow(core: &str) -> Result<Vec<ColorStop>, TextureError> {
        parse_stops(&[
            (0.0, core),
            (0.4, "rgba(255,255,255,0.6)"),
            (1.0, "rgba(0,0,0,0)"),
        ])
    }

    pub fn moon_disc() -> Result<Vec<ColorStop>, TextureError> {
        parse_stops(&[
            (0.0, "#fff3d6"),
            (0.5, "rgba(255,240,200,0.6)"),
            (1.0, "rgba(0,0,0,0)"),
        ])
    }

    pub fn lantern_glow() -> Result<Vec<ColorStop>, TextureError> {
        parse_stops(&[
            (0.0, "rgba(255,245,200,1)"),
            (0.18, "rgba(255,200,120,0.9)"),
            (0.45, "rgba(255,140,60,0.28)"),
            (1.0, "rgba(0,0,0,0)"),
        ])
    }

    pub fn ink_blot(tint: &str) -> Result<Vec<ColorStop>, TextureError> {
        parse_stops(&[
            (0.0, tint),
            (0.4, "rgba(120,70,220,0.6)"),
            (1.0, "rgba(0,0,0,0)"),
        ])
    }

    pub fn paper() -> Result<Vec<ColorStop>, TextureError> {
        parse_stops(&[(0.0, "#1a0f12"), (0.45, "#2b1922"), (1.0, "#080407")])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum GradientKind {
    Radial,
    Linear,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    kind: GradientKind,
    width: u32,
    height: u32,
    stops: Vec<(u32, [u8; 3], u32)>,
}

impl CacheKey {
    fn new(kind: GradientKind, width: u32, height: u32, stops: &[ColorStop]) -> Self {
        Self {
            kind,
            width,
            height,
            stops: stops
                .iter()
                .map(|stop| {
                    (
                        stop.offset.to_bits(),
                        [stop.color.r, stop.color.g, stop.color.b],
                        stop.color.a.to_bits(),
                    )
                })
                .collect(),
        }
    }
}

/// Rasterizes gradients and uploads them, registering each new texture.
///
/// With caching off (the default) every call allocates; with caching on,
/// identical requests within one mount share a texture.
#[derive(Debug, Default)]
pub struct TextureFactory {
    cache: Option<HashMap<CacheKey, TextureId>>,
}

impl TextureFactory {
    pub fn new(cache: bool) -> Self {
        Self {
            cache: cache.then(HashMap::new),
        }
    }

    pub fn caching(&self) -> bool {
        self.cache.is_some()
    }

    pub fn make_glow_sprite<B: GpuBackend>(
        &mut self,
        backend: &mut B,
        registry: &mut ResourceRegistry,
        label: &str,
        size: u32,
        stops: &[ColorStop],
    ) -> Result<TextureId, TextureError> {
        let key = CacheKey::new(GradientKind::Radial, size, size, stops);
        if let Some(hit) = self.lookup(&key) {
            return Ok(hit);
        }
        let raster = rasterize_radial(size, stops)?;
        self.upload(backend, registry, label, raster, key)
    }

    pub fn make_linear_gradient<B: GpuBackend>(
        &mut self,
        backend: &mut B,
        registry: &mut ResourceRegistry,
        label: &str,
        width: u32,
        height: u32,
        stops: &[ColorStop],
    ) -> Result<TextureId, TextureError> {
        let key = CacheKey::new(GradientKind::Linear, width, height, stops);
        if let Some(hit) = self.lookup(&key) {
            return Ok(hit);
        }
        let raster = rasterize_linear(width, height, stops)?;
        self.upload(backend, registry, label, raster, key)
    }

    /// Forgets cached handles; the registry still owns the textures.
    pub fn clear(&mut self) {
        if let Some(cache) = self.cache.as_mut() {
            cache.clear();
        }
    }

    fn lookup(&self, key: &CacheKey) -> Option<TextureId> {
        let hit = self.cache.as_ref()?.get(key).copied();
        if let Some(texture) = hit {
            tracing::trace!(texture = texture.0, "texture cache hit");
        }
        hit
    }

    fn upload<B: GpuBackend>(
        &mut self,
        backend: &mut B,
        registry: &mut ResourceRegistry,
        label: &str,
        raster: RgbaImage,
        key: CacheKey,
    ) -> Result<TextureId, TextureError> {
        let (width, height) = raster.dimensions();
        let texture = backend.create_texture(&TextureDescriptor {
            label,
            width,
            height,
            pixels: raster.as_raw(),
            wrap: TextureWrap::Clamp,
            srgb: true,
        })?;
        registry.register(GpuResource::Texture(texture));
        tracing::debug!(label, width, height, texture = texture.0, "uploaded gradient texture");
        if let Some(cache) = self.cache.as_mut() {
            cache.insert(key, texture);
        }
        Ok(texture)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessBackend;

    #[test]
    fn parses_css_colours() {
        assert_eq!(parse_color("#fff3d6").unwrap(), StopColor::rgba(255, 243, 214, 1.0));
        assert_eq!(parse_color("#abc").unwrap(), StopColor::rgba(0xaa, 0xbb, 0xcc, 1.0));
        assert_eq!(
            parse_color("rgba(255, 240, 200, 0.6)").unwrap(),
            StopColor::rgba(255, 240, 200, 0.6)
        );
        assert_eq!(parse_color("RGB(1,2,3)").unwrap(), StopColor::rgba(1, 2, 3, 1.0));
        for bad in ["", "#12", "rgba(1,2,3)", "hsl(0,0%,0%)", "rgb(a,b,c)"] {
            assert!(parse_color(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn radial_gradient_is_opaque_at_centre_and_clear_at_corners() {
        let stops = presets::point_glow(presets::STAR_WHITE).unwrap();
        let raster = rasterize_radial(96, &stops).unwrap();
        let centre = raster.get_pixel(48, 48);
        assert!(centre[3] > 240, "centre alpha {}", centre[3]);
        assert!(centre[2] > centre[0], "centre keeps the cool tint");
        assert_eq!(raster.get_pixel(0, 0)[3], 0);
        assert_eq!(raster.get_pixel(95, 95)[3], 0);
    }

    #[test]
    fn radial_gradient_alpha_falls_off_monotonically() {
        let stops = presets::lantern_glow().unwrap();
        let raster = rasterize_radial(128, &stops).unwrap();
        let mut previous = u8::MAX;
        for x in 64..128 {
            let alpha = raster.get_pixel(x, 64)[3];
            assert!(alpha <= previous);
            previous = alpha;
        }
    }

    #[test]
    fn linear_gradient_runs_top_to_bottom() {
        let stops = presets::paper().unwrap();
        let raster = rasterize_linear(32, 256, &stops).unwrap();
        let top = raster.get_pixel(0, 0);
        let bottom = raster.get_pixel(31, 255);
        assert!(top[0] > 0x14 && top[0] <= 0x1b);
        assert!(bottom[0] <= 0x09);
        assert_eq!(raster.get_pixel(0, 100), raster.get_pixel(31, 100));
    }

    #[test]
    fn empty_stops_are_rejected() {
        assert!(matches!(rasterize_radial(8, &[]), Err(TextureError::NoStops)));
    }

    #[test]
    fn uncached_factory_allocates_every_call() {
        let mut backend = HeadlessBackend::new();
        let mut registry = ResourceRegistry::new();
        let mut factory = TextureFactory::new(false);
        let stops = presets::moon_disc().unwrap();
        let a = factory
            .make_glow_sprite(&mut backend, &mut registry, "moon", 16, &stops)
            .unwrap();
        let b = factory
            .make_glow_sprite(&mut backend, &mut registry, "moon", 16, &stops)
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(registry.live_count(), 2);
    }

    #[test]
    fn cached_factory_shares_identical_requests() {
        let mut backend = HeadlessBackend::new();
        let mut registry = ResourceRegistry::new();
        let mut factory = TextureFactory::new(true);
        let stops = presets::moon_disc().unwrap();
        let a = factory
            .make_glow_sprite(&mut backend, &mut registry, "moon", 16, &stops)
            .unwrap();
        let b = factory
            .make_glow_sprite(&mut backend, &mut registry, "moon", 16, &stops)
            .unwrap();
        let c = factory
            .make_glow_sprite(&mut backend, &mut registry, "moon", 32, &stops)
            .unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(registry.live_count(), 2);

        let uncached = rasterize_radial(16, &stops).unwrap();
        assert_eq!(backend.texture(a).unwrap().pixels, uncached.into_raw());
    }
}
