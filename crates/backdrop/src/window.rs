//! A winit window acting as the backdrop host.
//!
//! The window is the only container. Frame requests are kept as deadlines
//! and drained on `RedrawRequested`; `AboutToWait` turns the nearest
//! deadline into the loop's control flow.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use scheduler::{FrameHost, FrameRequestId};
use winit::dpi::{LogicalSize, PhysicalPosition, PhysicalSize};
use winit::event::{ElementState, Event, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoopBuilder};
use winit::window::{Window, WindowBuilder};

use crate::backend::SurfaceId;
use crate::engine::{mount, MountOptions};
use crate::gpu::WgpuBackend;
use crate::host::{ContainerId, ContainerRect, EventKind, Host, HostError, HostEvent, SubscriptionId};
use crate::profile::EnvironmentSignals;
use crate::theme::ThemeKind;

const WINDOW_CONTAINER: ContainerId = ContainerId(1);
/// Pixels of trackpad scroll treated as one wheel notch.
const PIXELS_PER_LINE: f32 = 100.0;

/// Host backed by a single winit window.
pub struct WindowHost {
    window: Arc<Window>,
    pending: Vec<(FrameRequestId, Instant)>,
    next_request: u64,
    surfaces: Vec<(SurfaceId, String)>,
    subscriptions: HashMap<SubscriptionId, EventKind>,
    next_subscription: u64,
    visible: bool,
}

impl WindowHost {
    pub fn new(window: Arc<Window>) -> Self {
        Self {
            window,
            pending: Vec::new(),
            next_request: 0,
            surfaces: Vec::new(),
            subscriptions: HashMap::new(),
            next_subscription: 0,
            visible: true,
        }
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    fn logical_rect(&self, size: PhysicalSize<u32>) -> ContainerRect {
        let logical: LogicalSize<f64> = size.to_logical(self.window.scale_factor());
        ContainerRect::sized(logical.width.round() as u32, logical.height.round() as u32)
    }

    fn logical_point(&self, position: PhysicalPosition<f64>) -> (f32, f32) {
        let scale = self.window.scale_factor();
        ((position.x / scale) as f32, (position.y / scale) as f32)
    }

    /// Removes and returns the requests whose deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> Vec<FrameRequestId> {
        let mut due = Vec::new();
        self.pending.retain(|(id, deadline)| {
            if *deadline <= now {
                due.push(*id);
                false
            } else {
                true
            }
        });
        due
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.iter().map(|(_, deadline)| *deadline).min()
    }

    /// Subscribers registered for `kind`.
    pub fn subscribers(&self, kind: EventKind) -> Vec<SubscriptionId> {
        let mut ids: Vec<SubscriptionId> = self
            .subscriptions
            .iter()
            .filter(|(_, registered)| **registered == kind)
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }
}

impl FrameHost for WindowHost {
    fn request_frame(&mut self, delay: Option<Duration>) -> FrameRequestId {
        self.next_request += 1;
        let id = FrameRequestId(self.next_request);
        self.pending
            .push((id, Instant::now() + delay.unwrap_or(Duration::ZERO)));
        id
    }

    fn cancel_frame(&mut self, id: FrameRequestId) {
        self.pending.retain(|(pending, _)| *pending != id);
    }
}

impl Host for WindowHost {
    fn root_container(&self) -> Option<ContainerId> {
        Some(WINDOW_CONTAINER)
    }

    fn container_rect(&self, container: ContainerId) -> Result<ContainerRect, HostError> {
        if container != WINDOW_CONTAINER {
            return Err(HostError::UnknownContainer(container.0));
        }
        Ok(self.logical_rect(self.window.inner_size()))
    }

    fn attach_surface(&mut self, container: ContainerId, surface: SurfaceId, tag: &str) -> Result<(), HostError> {
        if container != WINDOW_CONTAINER {
            return Err(HostError::UnknownContainer(container.0));
        }
        self.surfaces.push((surface, tag.to_string()));
        Ok(())
    }

    fn detach_surface(&mut self, container: ContainerId, surface: SurfaceId) -> Result<(), HostError> {
        let before = self.surfaces.len();
        self.surfaces.retain(|(id, _)| *id != surface);
        if container != WINDOW_CONTAINER || self.surfaces.len() == before {
            return Err(HostError::NotAttached {
                container: container.0,
                surface: surface.0,
            });
        }
        Ok(())
    }

    fn is_attached(&self, container: ContainerId, surface: SurfaceId) -> bool {
        container == WINDOW_CONTAINER && self.surfaces.iter().any(|(id, _)| *id == surface)
    }

    fn remove_tagged(&mut self, container: ContainerId, tag: &str) -> usize {
        if container != WINDOW_CONTAINER {
            return 0;
        }
        let before = self.surfaces.len();
        self.surfaces.retain(|(_, existing)| existing != tag);
        before - self.surfaces.len()
    }

    fn subscribe(&mut self, kind: EventKind) -> SubscriptionId {
        self.next_subscription += 1;
        let id = SubscriptionId(self.next_subscription);
        self.subscriptions.insert(id, kind);
        id
    }

    fn unsubscribe(&mut self, subscription: SubscriptionId) -> Result<(), HostError> {
        self.subscriptions
            .remove(&subscription)
            .map(|_| ())
            .ok_or(HostError::UnknownSubscription(subscription.0))
    }

    fn is_visible(&self) -> bool {
        self.visible
    }
}

/// Window setup for [`run_windowed`].
pub struct WindowOptions {
    pub title: String,
    /// Logical size.
    pub size: (u32, u32),
    pub signals: EnvironmentSignals,
    pub mount: MountOptions,
    pub power: wgpu::PowerPreference,
    /// Close after this long; useful for smoke runs.
    pub run_for: Option<Duration>,
}

/// Opens a window, mounts `kind` into it and runs until the window closes.
pub fn run_windowed(kind: ThemeKind, options: WindowOptions) -> Result<()> {
    let event_loop = EventLoopBuilder::new()
        .build()
        .map_err(|err| anyhow!("failed to create event loop: {err}"))?;
    let window = WindowBuilder::new()
        .with_title(options.title.as_str())
        .with_inner_size(LogicalSize::new(options.size.0, options.size.1))
        .with_transparent(true)
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create backdrop window: {err}"))?;
    let window = Arc::new(window);

    let mut backend = WgpuBackend::new(window.clone(), options.power)?;
    let mut host = WindowHost::new(window.clone());
    let signals = options
        .signals
        .clone()
        .with_pixel_ratio(window.scale_factor() as f32);
    let mut handle = mount(
        &mut host,
        &mut backend,
        Some(WINDOW_CONTAINER),
        kind,
        &signals,
        options.mount,
    )?;
    let deadline = options.run_for.map(|limit| Instant::now() + limit);

    let dispatch = |host: &WindowHost, handle: &mut crate::engine::BackdropHandle, event: HostEvent| {
        for subscription in host.subscribers(event.kind()) {
            handle.handle_event(subscription, &event);
        }
    };

    let run_result = event_loop.run(move |event, elwt| match event {
        Event::WindowEvent { window_id, event } if window_id == host.window().id() => match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => elwt.exit(),
            WindowEvent::Resized(size) => {
                let rect = host.logical_rect(size);
                dispatch(&host, &mut handle, HostEvent::Resize(rect));
            }
            WindowEvent::CursorMoved { position, .. } => {
                let (x, y) = host.logical_point(position);
                dispatch(&host, &mut handle, HostEvent::PointerMove { x, y });
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                let pressed = state == ElementState::Pressed;
                dispatch(&host, &mut handle, HostEvent::PointerButton { pressed });
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(position) => position.y as f32 / PIXELS_PER_LINE,
                };
                dispatch(&host, &mut handle, HostEvent::Wheel { delta: -lines });
            }
            WindowEvent::Occluded(occluded) => {
                host.visible = !occluded;
                dispatch(&host, &mut handle, HostEvent::VisibilityChange { visible: !occluded });
            }
            WindowEvent::RedrawRequested => {
                for id in host.take_due(Instant::now()) {
                    handle.frame(&mut host, &mut backend, id);
                }
            }
            _ => {}
        },
        Event::AboutToWait => {
            let now = Instant::now();
            if deadline.is_some_and(|deadline| now >= deadline) {
                tracing::info!("run duration elapsed; closing backdrop window");
                elwt.exit();
                return;
            }
            match host.next_deadline() {
                Some(next) if next <= now => {
                    host.window().request_redraw();
                    elwt.set_control_flow(ControlFlow::Wait);
                }
                Some(next) => {
                    let next = deadline.map_or(next, |deadline| next.min(deadline));
                    elwt.set_control_flow(ControlFlow::WaitUntil(next));
                }
                None => match deadline {
                    Some(deadline) => elwt.set_control_flow(ControlFlow::WaitUntil(deadline)),
                    None => elwt.set_control_flow(ControlFlow::Wait),
                },
            }
        }
        Event::LoopExiting => {
            let report = handle.teardown(&mut host, &mut backend);
            tracing::debug!(
                disposed = report.disposed,
                leftover = backend.live_resources(),
                "window loop exiting"
            );
        }
        _ => {}
    });

    run_result.map_err(|err| anyhow!("window event loop error: {err}"))
}
