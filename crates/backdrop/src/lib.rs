//! Procedural animated backdrops: a star field, an ink-wash night with
//! lanterns, and open water under a scattering sky.
//!
//! One engine serves all three themes. A mount captures the device once,
//! picks a quality tier, builds the theme's scene through a [`GpuBackend`]
//! and hands frame scheduling to the `scheduler` crate:
//!
//! ```text
//!   EnvironmentSignals ─▶ DeviceProfile ─▶ QualityTier
//!                                              │
//!   Host (container, frames, events) ─▶ mount ─┴─▶ BackdropHandle
//!                                              │
//!        TextureFactory · ParticleField · theme scene ─▶ GpuBackend
//!                                              │
//!                          ResourceRegistry ◀──┘ (everything disposed once)
//! ```
//!
//! [`WgpuBackend`] with [`window::run_windowed`] renders for real;
//! [`HeadlessHost`] and [`HeadlessBackend`] drive the same engine without a
//! GPU, for tests and the `backdropd headless` command.

pub mod backend;
pub mod engine;
pub mod gpu;
pub mod headless;
pub mod host;
pub mod mesh;
pub mod particles;
pub mod profile;
pub mod quality;
pub mod random;
pub mod resources;
pub mod scene;
pub mod texture;
pub mod theme;
pub mod window;

pub use backend::{GpuBackend, GpuResource, SurfaceId, TextureId};
pub use engine::{mount, BackdropHandle, Engine, EngineError, MountError, MountOptions, SunParams};
pub use gpu::WgpuBackend;
pub use headless::{HeadlessBackend, HeadlessHost};
pub use host::{ContainerId, ContainerRect, EventKind, Host, HostEvent, SubscriptionId};
pub use profile::{capture, DeviceProfile, EnvironmentSignals};
pub use quality::{select, QualityTier};
pub use random::Mulberry32;
pub use resources::TeardownReport;
pub use theme::{ThemeConfig, ThemeKind};
pub use window::{run_windowed, WindowOptions};
