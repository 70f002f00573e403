//! What a backdrop needs from the surrounding UI.

use scheduler::FrameHost;

use crate::backend::SurfaceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// Placement of a container in client coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContainerRect {
    pub left: f32,
    pub top: f32,
    pub width: u32,
    pub height: u32,
}

impl ContainerRect {
    pub fn sized(width: u32, height: u32) -> Self {
        Self {
            left: 0.0,
            top: 0.0,
            width,
            height,
        }
    }

    /// Width and height clamped to at least one pixel.
    pub fn clamped_size(&self) -> (u32, u32) {
        (self.width.max(1), self.height.max(1))
    }

    pub fn aspect(&self) -> f32 {
        let (width, height) = self.clamped_size();
        width as f32 / height as f32
    }

    /// Maps a client position to normalised device coordinates, +Y up.
    pub fn to_ndc(&self, x: f32, y: f32) -> (f32, f32) {
        let (width, height) = self.clamped_size();
        let nx = (x - self.left) / width as f32 * 2.0 - 1.0;
        let ny = -((y - self.top) / height as f32) * 2.0 + 1.0;
        (nx, ny)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Resize,
    PointerMove,
    PointerButton,
    Wheel,
    VisibilityChange,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostEvent {
    Resize(ContainerRect),
    /// Client coordinates.
    PointerMove { x: f32, y: f32 },
    PointerButton { pressed: bool },
    /// Positive values scroll away from the viewer.
    Wheel { delta: f32 },
    VisibilityChange { visible: bool },
}

impl HostEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            HostEvent::Resize(_) => EventKind::Resize,
            HostEvent::PointerMove { .. } => EventKind::PointerMove,
            HostEvent::PointerButton { .. } => EventKind::PointerButton,
            HostEvent::Wheel { .. } => EventKind::Wheel,
            HostEvent::VisibilityChange { .. } => EventKind::VisibilityChange,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("container #{0} does not exist")]
    UnknownContainer(u32),
    #[error("surface #{surface} is not attached to container #{container}")]
    NotAttached { container: u32, surface: u32 },
    #[error("subscription #{0} is not registered")]
    UnknownSubscription(u64),
}

pub trait Host: FrameHost {
    /// Container to fall back on when none was supplied.
    fn root_container(&self) -> Option<ContainerId>;
    fn container_rect(&self, container: ContainerId) -> Result<ContainerRect, HostError>;
    fn attach_surface(
        &mut self,
        container: ContainerId,
        surface: SurfaceId,
        tag: &str,
    ) -> Result<(), HostError>;
    fn detach_surface(&mut self, container: ContainerId, surface: SurfaceId) -> Result<(), HostError>;
    fn is_attached(&self, container: ContainerId, surface: SurfaceId) -> bool;
    /// Removes stale surfaces carrying `tag`; returns how many were removed.
    fn remove_tagged(&mut self, container: ContainerId, tag: &str) -> usize;
    fn subscribe(&mut self, kind: EventKind) -> SubscriptionId;
    fn unsubscribe(&mut self, subscription: SubscriptionId) -> Result<(), HostError>;
    fn is_visible(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ndc_mapping_covers_container() {
        let rect = ContainerRect {
            left: 100.0,
            top: 50.0,
            width: 200,
            height: 100,
        };
        assert_eq!(rect.to_ndc(100.0, 50.0), (-1.0, 1.0));
        assert_eq!(rect.to_ndc(300.0, 150.0), (1.0, -1.0));
        assert_eq!(rect.to_ndc(200.0, 100.0), (0.0, 0.0));
    }

    #[test]
    fn degenerate_rect_is_safe() {
        let rect = ContainerRect::sized(0, 0);
        assert_eq!(rect.clamped_size(), (1, 1));
        assert_eq!(rect.aspect(), 1.0);
    }
}
