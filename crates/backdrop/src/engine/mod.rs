//! Mounting, the per-frame protocol and teardown for every theme.
//!
//! ```text
//!  mount ─▶ capture profile ─▶ select tier ─▶ surface + subscriptions
//!                                                   │
//!            theme scene (textures, particles, decorations) ◀─┘
//!                                                   │
//!            initial render at t = 0 ─▶ scheduler.start
//!
//!  host frame ─▶ BackdropHandle::frame ─▶ resize ─▶ camera ─▶ scene.update ─▶ render
//!  unmount    ─▶ BackdropHandle::teardown ─▶ cancel ─▶ registry teardown
//! ```

mod ink;
mod ocean;
mod starfield;

use std::path::{Path, PathBuf};
use std::time::Duration;

use backdropconfig::{BackdropConfig, DEFAULT_SEED, DEFAULT_SUN_AZIMUTH, DEFAULT_SUN_ELEVATION};
use glam::Vec3;
use scheduler::{
    FrameRequestId, FrameScheduler, MonotonicClock, SchedulerError, SystemClock,
    DEFAULT_THROTTLE_INTERVAL,
};

use crate::backend::{
    BackendError, ClearMode, FrameDescription, GeometryId, GpuBackend, GpuResource, MaterialDescriptor,
    MaterialId, SurfaceDescriptor, SurfaceId, TextureId,
};
use crate::host::{ContainerId, ContainerRect, EventKind, Host, HostError, HostEvent, SubscriptionId};
use crate::mesh::MeshData;
use crate::particles::ParticleError;
use crate::profile::{capture, DeviceProfile, EnvironmentSignals};
use crate::quality::{select_with_interval, QualityTier};
use crate::random::Mulberry32;
use crate::resources::{ResourceRegistry, TeardownReport};
use crate::scene::{Camera, OrbitController, Parallax};
use crate::texture::{ColorStop, TextureError, TextureFactory};
use crate::theme::{ThemeConfig, ThemeKind};

use self::ink::InkScene;
use self::ocean::OceanScene;
use self::starfield::StarfieldScene;

#[derive(Debug, thiserror::Error)]
pub enum MountError {
    #[error("render backend failed during mount: {0}")]
    Backend(#[from] BackendError),
    #[error("procedural texture failed: {0}")]
    Texture(#[from] TextureError),
    #[error("host rejected the backdrop: {0}")]
    Host(#[from] HostError),
    #[error("particle field: {0}")]
    Particles(#[from] ParticleError),
    #[error("frame scheduler: {0}")]
    Scheduler(#[from] SchedulerError),
    #[error("initial frame failed: {0}")]
    Frame(#[from] EngineError),
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{operation} is not supported by the {theme} theme")]
    Unsupported {
        operation: &'static str,
        theme: ThemeKind,
    },
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Texture(#[from] TextureError),
    #[error(transparent)]
    Particles(#[from] ParticleError),
}

/// Sun placement in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SunParams {
    pub elevation: f32,
    pub azimuth: f32,
}

impl Default for SunParams {
    fn default() -> Self {
        Self {
            elevation: DEFAULT_SUN_ELEVATION,
            azimuth: DEFAULT_SUN_AZIMUTH,
        }
    }
}

impl SunParams {
    /// Unit vector toward the sun, +Y up.
    pub fn direction(&self) -> Vec3 {
        let phi = (90.0 - self.elevation).to_radians();
        let theta = self.azimuth.to_radians();
        Vec3::new(phi.sin() * theta.sin(), phi.cos(), phi.sin() * theta.cos()).normalize_or_zero()
    }
}

/// Everything a mount needs beyond the host and the environment signals.
pub struct MountOptions {
    pub seed: u32,
    pub throttle_interval: Duration,
    pub texture_cache: bool,
    pub sun: SunParams,
    /// Water normal map; a flat procedural map is used when absent or unreadable.
    pub normal_map: Option<PathBuf>,
    /// Defaults to a [`SystemClock`] started at mount.
    pub clock: Option<Box<dyn MonotonicClock>>,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            throttle_interval: DEFAULT_THROTTLE_INTERVAL,
            texture_cache: false,
            sun: SunParams::default(),
            normal_map: None,
            clock: None,
        }
    }
}

impl MountOptions {
    /// Options from a loaded config; relative asset paths resolve against `base`.
    pub fn from_config(config: &BackdropConfig, base: Option<&Path>) -> Self {
        Self {
            seed: config.seed(),
            throttle_interval: config.throttle_interval(),
            texture_cache: config.texture_cache(),
            sun: SunParams {
                elevation: config.sun_elevation(),
                azimuth: config.sun_azimuth(),
            },
            normal_map: Some(config.normal_map(base)),
            clock: None,
        }
    }

    pub fn with_clock(mut self, clock: Box<dyn MonotonicClock>) -> Self {
        self.clock = Some(clock);
        self
    }
}

/// Allocation context handed to theme builders. Every allocation is
/// registered before it is returned.
pub(crate) struct Build<'a, B: GpuBackend> {
    pub backend: &'a mut B,
    pub registry: &'a mut ResourceRegistry,
    pub textures: &'a mut TextureFactory,
    pub random: &'a mut Mulberry32,
    pub quality: &'a QualityTier,
    /// Resolved size of the theme's particle field.
    pub particles: usize,
    pub options: &'a MountOptions,
}

impl<B: GpuBackend> Build<'_, B> {
    pub fn geometry(&mut self, label: &str, mesh: &MeshData) -> Result<GeometryId, BackendError> {
        let id = self.backend.create_geometry(label, mesh)?;
        self.registry.register(GpuResource::Geometry(id));
        Ok(id)
    }

    pub fn material(&mut self, desc: &MaterialDescriptor) -> Result<MaterialId, BackendError> {
        let id = self.backend.create_material(desc)?;
        self.registry.register(GpuResource::Material(id));
        Ok(id)
    }

    pub fn glow_sprite(&mut self, label: &str, size: u32, stops: &[ColorStop]) -> Result<TextureId, TextureError> {
        self.textures
            .make_glow_sprite(self.backend, self.registry, label, size, stops)
    }

    pub fn linear_gradient(
        &mut self,
        label: &str,
        width: u32,
        height: u32,
        stops: &[ColorStop],
    ) -> Result<TextureId, TextureError> {
        self.textures
            .make_linear_gradient(self.backend, self.registry, label, width, height, stops)
    }
}

/// Per-frame timing shared by every theme, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct FrameInput {
    pub elapsed: f32,
    /// Since the previous invocation, rendered or not.
    pub delta: f32,
}

enum ThemeScene {
    Starfield(StarfieldScene),
    Ink(InkScene),
    Ocean(OceanScene),
}

impl ThemeScene {
    fn build<B: GpuBackend>(kind: ThemeKind, build: &mut Build<'_, B>) -> Result<Self, MountError> {
        Ok(match kind {
            ThemeKind::Starfield => ThemeScene::Starfield(StarfieldScene::build(build)?),
            ThemeKind::Ink => ThemeScene::Ink(InkScene::build(build)?),
            ThemeKind::Ocean => ThemeScene::Ocean(OceanScene::build(build)?),
        })
    }

    fn update<B: GpuBackend>(
        &mut self,
        backend: &mut B,
        input: &FrameInput,
        frame: &mut FrameDescription,
    ) -> Result<(), EngineError> {
        match self {
            ThemeScene::Starfield(scene) => scene.update(input, frame),
            ThemeScene::Ink(scene) => scene.update(backend, input, frame),
            ThemeScene::Ocean(scene) => scene.update(input, frame),
        }
    }

    fn particle_count(&self) -> usize {
        match self {
            ThemeScene::Starfield(scene) => scene.particle_count(),
            ThemeScene::Ink(scene) => scene.particle_count(),
            ThemeScene::Ocean(_) => 0,
        }
    }

    fn dispose(&mut self) {
        match self {
            ThemeScene::Starfield(scene) => scene.dispose(),
            ThemeScene::Ink(scene) => scene.dispose(),
            ThemeScene::Ocean(_) => {}
        }
    }
}

/// One mounted backdrop. Owns its camera, surface, scheduler and every GPU
/// resource it created.
pub struct Engine {
    theme: ThemeConfig,
    profile: DeviceProfile,
    quality: QualityTier,
    container: ContainerId,
    surface: SurfaceId,
    rect: ContainerRect,
    pixel_ratio: f32,
    camera: Camera,
    orbit: Option<OrbitController>,
    parallax: Option<Parallax>,
    scheduler: FrameScheduler,
    registry: ResourceRegistry,
    textures: TextureFactory,
    scene: ThemeScene,
    resize_pending: bool,
    torn_down: bool,
}

impl Engine {
    pub fn theme(&self) -> &ThemeConfig {
        &self.theme
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    pub fn quality(&self) -> &QualityTier {
        &self.quality
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn container(&self) -> ContainerId {
        self.container
    }

    pub fn surface(&self) -> SurfaceId {
        self.surface
    }

    pub fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }

    pub fn particle_count(&self) -> usize {
        self.scene.particle_count()
    }

    /// GPU resources still owned, the surface included.
    pub fn live_resources(&self) -> usize {
        self.registry.live_count()
    }

    /// Current ocean environment texture.
    pub fn environment_texture(&self) -> Option<TextureId> {
        match &self.scene {
            ThemeScene::Ocean(scene) => scene.environment_texture(&self.registry),
            _ => None,
        }
    }

    /// Current ocean sun.
    pub fn sun_params(&self) -> Option<SunParams> {
        match &self.scene {
            ThemeScene::Ocean(scene) => Some(scene.sun()),
            _ => None,
        }
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    fn frame<H: Host, B: GpuBackend>(&mut self, host: &mut H, backend: &mut B, id: FrameRequestId) -> bool {
        if self.torn_down {
            return false;
        }
        let Some(tick) = self.scheduler.on_frame(host, id) else {
            return false;
        };
        if !tick.render {
            tracing::trace!(frame = tick.frame_index, "surface hidden; frame body skipped");
            return false;
        }

        self.apply_resize(backend);
        if let Some(parallax) = self.parallax.as_mut() {
            parallax.step(&mut self.camera);
        }
        if let Some(orbit) = self.orbit.as_mut() {
            orbit.update(&mut self.camera);
        }

        match self.render(backend, tick.elapsed_secs(), tick.delta_secs()) {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(theme = %self.theme.kind, %error, "frame render failed; loop continues");
                false
            }
        }
    }

    fn render<B: GpuBackend>(&mut self, backend: &mut B, elapsed: f32, delta: f32) -> Result<(), EngineError> {
        let input = FrameInput { elapsed, delta };
        let mut frame = FrameDescription {
            camera: self.camera.state(),
            time: elapsed,
            clear: ClearMode::Color(self.theme.clear),
            lights: self.theme.lights,
            fog: self.theme.fog,
            sun_direction: None,
            exposure: self.theme.exposure,
            draws: Vec::new(),
        };
        self.scene.update(backend, &input, &mut frame)?;
        backend.render(self.surface, &frame)?;
        Ok(())
    }

    fn apply_resize<B: GpuBackend>(&mut self, backend: &mut B) {
        if !std::mem::take(&mut self.resize_pending) {
            return;
        }
        let (width, height) = self.rect.clamped_size();
        if let Err(error) = backend.resize_surface(self.surface, width, height, self.pixel_ratio) {
            tracing::warn!(width, height, %error, "failed to resize render surface");
        }
    }

    fn handle_event(&mut self, subscription: SubscriptionId, event: &HostEvent) {
        if self.torn_down || self.registry.subscription_kind(subscription) != Some(event.kind()) {
            return;
        }
        match *event {
            HostEvent::Resize(rect) => {
                self.rect = rect;
                self.camera.set_aspect(rect.aspect());
                self.resize_pending = true;
                tracing::debug!(width = rect.width, height = rect.height, "backdrop resized");
            }
            HostEvent::PointerMove { x, y } => {
                if let Some(parallax) = self.parallax.as_mut() {
                    parallax.set_target(self.rect.to_ndc(x, y));
                }
                if let Some(orbit) = self.orbit.as_mut() {
                    orbit.pointer_move(x, y, self.rect.height);
                }
            }
            HostEvent::PointerButton { pressed } => {
                if let Some(orbit) = self.orbit.as_mut() {
                    orbit.pointer_button(pressed);
                }
            }
            HostEvent::Wheel { delta } => {
                if let Some(orbit) = self.orbit.as_mut() {
                    orbit.wheel(delta);
                }
            }
            HostEvent::VisibilityChange { visible } => self.scheduler.set_visible(visible),
        }
    }

    fn set_sun_params<B: GpuBackend>(&mut self, backend: &mut B, sun: SunParams) -> Result<(), EngineError> {
        if self.torn_down {
            tracing::warn!("set_sun_params on a torn-down backdrop; ignoring");
            return Ok(());
        }
        match &mut self.scene {
            ThemeScene::Ocean(scene) => {
                scene.set_sun(backend, &mut self.registry, sun)?;
                Ok(())
            }
            _ => Err(EngineError::Unsupported {
                operation: "set_sun_params",
                theme: self.theme.kind,
            }),
        }
    }

    fn teardown<H: Host, B: GpuBackend>(&mut self, host: &mut H, backend: &mut B) -> TeardownReport {
        if self.torn_down {
            return TeardownReport::default();
        }
        self.torn_down = true;
        self.scheduler.cancel(host);
        self.scene.dispose();
        self.orbit = None;
        self.parallax = None;
        self.textures.clear();
        let report = self.registry.teardown(host, backend);
        tracing::info!(
            theme = %self.theme.kind,
            disposed = report.disposed,
            failures = report.failures,
            "backdrop torn down"
        );
        report
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if !self.torn_down {
            tracing::warn!(
                theme = %self.theme.kind,
                live = self.registry.live_count(),
                "backdrop dropped without teardown"
            );
        }
    }
}

/// What a mount hands back to the caller.
pub enum BackdropHandle {
    /// Nothing was mounted; every call is a no-op.
    Inert,
    Active(Box<Engine>),
}

impl BackdropHandle {
    pub fn is_active(&self) -> bool {
        matches!(self, BackdropHandle::Active(engine) if !engine.is_torn_down())
    }

    pub fn engine(&self) -> Option<&Engine> {
        match self {
            BackdropHandle::Active(engine) => Some(engine),
            BackdropHandle::Inert => None,
        }
    }

    /// Runs one scheduled frame. Returns true when a frame was rendered.
    pub fn frame<H: Host, B: GpuBackend>(&mut self, host: &mut H, backend: &mut B, id: FrameRequestId) -> bool {
        match self {
            BackdropHandle::Active(engine) => engine.frame(host, backend, id),
            BackdropHandle::Inert => false,
        }
    }

    /// Feeds a host event delivered to `subscription`.
    pub fn handle_event(&mut self, subscription: SubscriptionId, event: &HostEvent) {
        if let BackdropHandle::Active(engine) = self {
            engine.handle_event(subscription, event);
        }
    }

    /// Moves the ocean sun and regenerates its environment texture.
    pub fn set_sun_params<B: GpuBackend>(&mut self, backend: &mut B, sun: SunParams) -> Result<(), EngineError> {
        match self {
            BackdropHandle::Active(engine) => engine.set_sun_params(backend, sun),
            BackdropHandle::Inert => {
                tracing::warn!("set_sun_params on an inert backdrop; ignoring");
                Ok(())
            }
        }
    }

    /// Subscriptions this handle listens on for `kind`, for hosts that
    /// dispatch events by id.
    pub fn subscriptions(&self, kind: EventKind) -> Vec<SubscriptionId> {
        match self {
            BackdropHandle::Active(engine) => engine
                .registry
                .subscriptions()
                .filter(|id| engine.registry.subscription_kind(*id) == Some(kind))
                .collect(),
            BackdropHandle::Inert => Vec::new(),
        }
    }

    /// Releases everything the mount created. Safe to call repeatedly.
    pub fn teardown<H: Host, B: GpuBackend>(&mut self, host: &mut H, backend: &mut B) -> TeardownReport {
        match self {
            BackdropHandle::Active(engine) => engine.teardown(host, backend),
            BackdropHandle::Inert => TeardownReport::default(),
        }
    }
}

/// Mounts a backdrop of `kind` into `container`.
///
/// Without a container, themes that allow it fall back to the host's root
/// container; otherwise an inert handle is returned. A failure after the
/// first allocation releases everything allocated so far before the error
/// is returned.
pub fn mount<H: Host, B: GpuBackend>(
    host: &mut H,
    backend: &mut B,
    container: Option<ContainerId>,
    kind: ThemeKind,
    signals: &EnvironmentSignals,
    options: MountOptions,
) -> Result<BackdropHandle, MountError> {
    let theme = ThemeConfig::for_kind(kind);
    let container = container.or_else(|| {
        if theme.fallback_to_root {
            host.root_container()
        } else {
            None
        }
    });
    let Some(container) = container else {
        tracing::warn!(theme = %kind, "no container to mount into; backdrop is inert");
        return Ok(BackdropHandle::Inert);
    };

    let rect = host.container_rect(container)?;
    let mut signals = signals.clone();
    if signals.viewport.is_none() {
        let (width, height) = rect.clamped_size();
        signals.viewport = Some((width, height));
    }
    let profile = capture(&signals);
    let quality = select_with_interval(&profile, options.throttle_interval);
    let pixel_ratio = profile.clamped_pixel_density(theme.max_pixel_density);

    let removed = host.remove_tagged(container, theme.tag);
    if removed > 0 {
        tracing::debug!(removed, tag = theme.tag, "removed stale backdrop surfaces");
    }

    let mut registry = ResourceRegistry::new();
    let mut textures = TextureFactory::new(options.texture_cache);
    let built = assemble(
        host,
        backend,
        &mut registry,
        &mut textures,
        &theme,
        container,
        rect,
        pixel_ratio,
        &profile,
        &quality,
        &options,
    );
    let (surface, scene) = match built {
        Ok(parts) => parts,
        Err(error) => {
            let report = registry.teardown(host, backend);
            tracing::warn!(theme = %kind, %error, released = report.disposed, "backdrop mount failed");
            return Err(error);
        }
    };

    let camera = theme.camera.camera(rect.aspect());
    let orbit = theme
        .orbit
        .map(|settings| OrbitController::new(settings, &camera, theme.camera.target));
    let parallax = theme
        .parallax_enabled(&profile)
        .then(|| Parallax::new(profile.is_mobile, theme.camera.position.y, theme.camera.target));

    let clock = options
        .clock
        .unwrap_or_else(|| Box::new(SystemClock::new()));
    let scheduler =
        FrameScheduler::new(clock, quality.frame_cadence).with_visibility_gate(theme.visibility_gated);

    let mut engine = Box::new(Engine {
        theme,
        profile,
        quality,
        container,
        surface,
        rect,
        pixel_ratio,
        camera,
        orbit,
        parallax,
        scheduler,
        registry,
        textures,
        scene,
        resize_pending: false,
        torn_down: false,
    });

    if let Err(error) = start(&mut engine, host, backend) {
        engine.teardown(host, backend);
        return Err(error);
    }

    tracing::info!(
        theme = %kind,
        particles = engine.particle_count(),
        point_texture = engine.quality.point_texture_size,
        trail = engine.quality.enable_trail,
        cadence = ?engine.quality.frame_cadence,
        resources = engine.live_resources(),
        "backdrop mounted"
    );
    Ok(BackdropHandle::Active(engine))
}

#[allow(clippy::too_many_arguments)]
fn assemble<H: Host, B: GpuBackend>(
    host: &mut H,
    backend: &mut B,
    registry: &mut ResourceRegistry,
    textures: &mut TextureFactory,
    theme: &ThemeConfig,
    container: ContainerId,
    rect: ContainerRect,
    pixel_ratio: f32,
    profile: &DeviceProfile,
    quality: &QualityTier,
    options: &MountOptions,
) -> Result<(SurfaceId, ThemeScene), MountError> {
    let (width, height) = rect.clamped_size();
    let surface = backend.create_surface(&SurfaceDescriptor {
        width,
        height,
        pixel_ratio,
        antialias: theme.antialias,
        transparent: theme.transparent,
    })?;
    registry.track_surface(surface);
    host.attach_surface(container, surface, theme.tag)?;
    registry.mark_attached(container);

    for kind in theme.subscriptions(profile) {
        let subscription = host.subscribe(kind);
        registry.track_subscription(subscription, kind);
    }

    let mut random = Mulberry32::new(options.seed);
    let mut build = Build {
        backend,
        registry,
        textures,
        random: &mut random,
        quality,
        particles: theme.particles.resolve(quality, profile),
        options,
    };
    let scene = ThemeScene::build(theme.kind, &mut build)?;
    Ok((surface, scene))
}

/// First frame at t = 0, then hand the loop to the scheduler.
fn start<H: Host, B: GpuBackend>(engine: &mut Engine, host: &mut H, backend: &mut B) -> Result<(), MountError> {
    engine.render(backend, 0.0, 0.0)?;
    engine.scheduler.set_visible(host.is_visible());
    engine.scheduler.start(host)?;
    Ok(())
}
