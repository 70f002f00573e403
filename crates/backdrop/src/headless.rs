//! In-memory host and backend.
//!
//! Both keep books instead of touching a window or a GPU, which makes them
//! the reference for lifecycle tests and the engine behind `--headless` runs.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::time::Duration;

use scheduler::{FrameHost, FrameRequestId};

use crate::backend::{
    physical_size, BackendError, FrameDescription, GeometryId, GpuBackend, GpuResource,
    MaterialDescriptor, MaterialId, SurfaceDescriptor, SurfaceId, TextureDescriptor, TextureId,
    TextureSlot,
};
use crate::host::{ContainerId, ContainerRect, EventKind, Host, HostError, SubscriptionId};
use crate::mesh::{MeshData, Topology};

#[derive(Debug, Clone)]
struct ContainerState {
    rect: ContainerRect,
    surfaces: Vec<(SurfaceId, String)>,
}

#[derive(Debug)]
pub struct HeadlessHost {
    containers: BTreeMap<ContainerId, ContainerState>,
    root: Option<ContainerId>,
    next_container: u32,
    next_request: u64,
    pending: VecDeque<(FrameRequestId, Option<Duration>)>,
    cancelled: Vec<FrameRequestId>,
    subscriptions: BTreeMap<SubscriptionId, EventKind>,
    next_subscription: u64,
    next_stale_surface: u32,
    visible: bool,
    surface_calls: usize,
}

impl HeadlessHost {
    /// Host whose root container has the given placement.
    pub fn new(root: ContainerRect) -> Self {
        let mut host = Self::without_root();
        let id = host.add_container(root);
        host.root = Some(id);
        host
    }

    /// Host with no root container, as when nothing is mounted yet.
    pub fn without_root() -> Self {
        Self {
            containers: BTreeMap::new(),
            root: None,
            next_container: 1,
            next_request: 0,
            pending: VecDeque::new(),
            cancelled: Vec::new(),
            subscriptions: BTreeMap::new(),
            next_subscription: 0,
            next_stale_surface: u32::MAX,
            visible: true,
            surface_calls: 0,
        }
    }

    pub fn add_container(&mut self, rect: ContainerRect) -> ContainerId {
        let id = ContainerId(self.next_container);
        self.next_container += 1;
        self.containers.insert(
            id,
            ContainerState {
                rect,
                surfaces: Vec::new(),
            },
        );
        id
    }

    pub fn set_container_rect(&mut self, container: ContainerId, rect: ContainerRect) {
        if let Some(state) = self.containers.get_mut(&container) {
            state.rect = rect;
        }
    }

    /// Plants a surface left behind by an earlier mount.
    pub fn insert_stale_surface(&mut self, container: ContainerId, tag: &str) {
        let surface = SurfaceId(self.next_stale_surface);
        self.next_stale_surface -= 1;
        if let Some(state) = self.containers.get_mut(&container) {
            state.surfaces.push((surface, tag.to_string()));
        }
    }

    pub fn attached_count(&self, container: ContainerId) -> usize {
        self.containers
            .get(&container)
            .map(|state| state.surfaces.len())
            .unwrap_or(0)
    }

    pub fn tagged_count(&self, container: ContainerId, tag: &str) -> usize {
        self.containers
            .get(&container)
            .map(|state| state.surfaces.iter().filter(|(_, t)| t == tag).count())
            .unwrap_or(0)
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn pending_frames(&self) -> impl Iterator<Item = &(FrameRequestId, Option<Duration>)> {
        self.pending.iter()
    }

    /// Attach, detach and tag-removal calls seen, including ones that changed nothing.
    pub fn surface_calls(&self) -> usize {
        self.surface_calls
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Delivers the oldest outstanding frame request.
    pub fn next_frame(&mut self) -> Option<(FrameRequestId, Option<Duration>)> {
        self.pending.pop_front()
    }

    pub fn cancelled(&self) -> &[FrameRequestId] {
        &self.cancelled
    }

    pub fn subscribers(&self, kind: EventKind) -> Vec<SubscriptionId> {
        self.subscriptions
            .iter()
            .filter(|(_, k)| **k == kind)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }
}

impl FrameHost for HeadlessHost {
    fn request_frame(&mut self, delay: Option<Duration>) -> FrameRequestId {
        self.next_request += 1;
        let id = FrameRequestId(self.next_request);
        self.pending.push_back((id, delay));
        id
    }

    fn cancel_frame(&mut self, id: FrameRequestId) {
        self.pending.retain(|(pending, _)| *pending != id);
        self.cancelled.push(id);
    }
}

impl Host for HeadlessHost {
    fn root_container(&self) -> Option<ContainerId> {
        self.root
    }

    fn container_rect(&self, container: ContainerId) -> Result<ContainerRect, HostError> {
        self.containers
            .get(&container)
            .map(|state| state.rect)
            .ok_or(HostError::UnknownContainer(container.0))
    }

    fn attach_surface(
        &mut self,
        container: ContainerId,
        surface: SurfaceId,
        tag: &str,
    ) -> Result<(), HostError> {
        self.surface_calls += 1;
        let state = self
            .containers
            .get_mut(&container)
            .ok_or(HostError::UnknownContainer(container.0))?;
        state.surfaces.push((surface, tag.to_string()));
        Ok(())
    }

    fn detach_surface(&mut self, container: ContainerId, surface: SurfaceId) -> Result<(), HostError> {
        self.surface_calls += 1;
        let state = self
            .containers
            .get_mut(&container)
            .ok_or(HostError::UnknownContainer(container.0))?;
        let before = state.surfaces.len();
        state.surfaces.retain(|(id, _)| *id != surface);
        if state.surfaces.len() == before {
            return Err(HostError::NotAttached {
                container: container.0,
                surface: surface.0,
            });
        }
        Ok(())
    }

    fn is_attached(&self, container: ContainerId, surface: SurfaceId) -> bool {
        self.containers
            .get(&container)
            .map(|state| state.surfaces.iter().any(|(id, _)| *id == surface))
            .unwrap_or(false)
    }

    fn remove_tagged(&mut self, container: ContainerId, tag: &str) -> usize {
        self.surface_calls += 1;
        let Some(state) = self.containers.get_mut(&container) else {
            return 0;
        };
        let before = state.surfaces.len();
        state.surfaces.retain(|(_, t)| t != tag);
        before - state.surfaces.len()
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

#[derive(Debug, Clone, PartialEq)]
pub struct TextureRecord {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeometryRecord {
    pub label: String,
    pub topology: Topology,
    pub positions: Vec<[f32; 3]>,
    pub uploads: usize,
}

#[derive(Debug, Default)]
pub struct HeadlessBackend {
    next_id: u32,
    surfaces: BTreeMap<SurfaceId, (u32, u32)>,
    textures: BTreeMap<TextureId, TextureRecord>,
    geometries: BTreeMap<GeometryId, GeometryRecord>,
    materials: BTreeMap<MaterialId, MaterialDescriptor>,
    disposed: HashSet<GpuResource>,
    double_disposals: usize,
    frames_rendered: usize,
    last_frame: Option<FrameDescription>,
    fail_after: Option<usize>,
    created: usize,
    material_updates: usize,
    failing_updates: Vec<usize>,
    textures_created: usize,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every creation after the first `successes` fail.
    pub fn fail_creations_after(mut self, successes: usize) -> Self {
        self.fail_after = Some(successes);
        self
    }

    /// Makes the `nth` upcoming texture rebind fail, counting from zero.
    pub fn fail_material_update(&mut self, nth: usize) {
        self.failing_updates.push(self.material_updates + nth);
    }

    pub fn live_resources(&self) -> usize {
        self.surfaces.len() + self.textures.len() + self.geometries.len() + self.materials.len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_surfaces(&self) -> usize {
        self.surfaces.len()
    }

    /// Textures created over the backend's whole life.
    pub fn textures_created(&self) -> usize {
        self.textures_created
    }

    pub fn texture(&self, id: TextureId) -> Option<&TextureRecord> {
        self.textures.get(&id)
    }

    pub fn geometry(&self, id: GeometryId) -> Option<&GeometryRecord> {
        self.geometries.get(&id)
    }

    pub fn material(&self, id: MaterialId) -> Option<&MaterialDescriptor> {
        self.materials.get(&id)
    }

    pub fn surface_size(&self, id: SurfaceId) -> Option<(u32, u32)> {
        self.surfaces.get(&id).copied()
    }

    pub fn was_disposed(&self, resource: GpuResource) -> bool {
        self.disposed.contains(&resource)
    }

    pub fn double_disposals(&self) -> usize {
        self.double_disposals
    }

    pub fn frames_rendered(&self) -> usize {
        self.frames_rendered
    }

    pub fn last_frame(&self) -> Option<&FrameDescription> {
        self.last_frame.as_ref()
    }

    fn allocate(&mut self) -> Result<u32, BackendError> {
        if let Some(limit) = self.fail_after {
            if self.created >= limit {
                return Err(BackendError::Device(format!(
                    "simulated allocation failure after {limit} resources"
                )));
            }
        }
        self.created += 1;
        self.next_id += 1;
        Ok(self.next_id)
    }

    fn check_texture(&self, texture: TextureId) -> Result<(), BackendError> {
        if self.textures.contains_key(&texture) {
            Ok(())
        } else {
            Err(BackendError::unknown(GpuResource::Texture(texture)))
        }
    }
}

impl GpuBackend for HeadlessBackend {
    fn create_surface(&mut self, desc: &SurfaceDescriptor) -> Result<SurfaceId, BackendError> {
        let id = SurfaceId(self.allocate()?);
        self.surfaces.insert(id, desc.physical_size());
        Ok(id)
    }

    fn resize_surface(
        &mut self,
        surface: SurfaceId,
        width: u32,
        height: u32,
        pixel_ratio: f32,
    ) -> Result<(), BackendError> {
        let size = self
            .surfaces
            .get_mut(&surface)
            .ok_or(BackendError::unknown(GpuResource::Surface(surface)))?;
        *size = physical_size(width, height, pixel_ratio);
        Ok(())
    }

    fn create_texture(&mut self, desc: &TextureDescriptor<'_>) -> Result<TextureId, BackendError> {
        if desc.pixels.len() != desc.expected_len() {
            return Err(BackendError::TextureSize {
                label: desc.label.to_string(),
                expected: desc.expected_len(),
                actual: desc.pixels.len(),
            });
        }
        let id = TextureId(self.allocate()?);
        self.textures_created += 1;
        self.textures.insert(
            id,
            TextureRecord {
                label: desc.label.to_string(),
                width: desc.width,
                height: desc.height,
                pixels: desc.pixels.to_vec(),
            },
        );
        Ok(id)
    }

    fn create_geometry(&mut self, label: &str, mesh: &MeshData) -> Result<GeometryId, BackendError> {
        let id = GeometryId(self.allocate()?);
        self.geometries.insert(
            id,
            GeometryRecord {
                label: label.to_string(),
                topology: mesh.topology,
                positions: mesh.positions.clone(),
                uploads: 1,
            },
        );
        Ok(id)
    }

    fn update_positions(
        &mut self,
        geometry: GeometryId,
        positions: &[[f32; 3]],
    ) -> Result<(), BackendError> {
        let record = self
            .geometries
            .get_mut(&geometry)
            .ok_or(BackendError::unknown(GpuResource::Geometry(geometry)))?;
        if record.positions.len() != positions.len() {
            return Err(BackendError::VertexCount {
                id: geometry.0,
                expected: record.positions.len(),
                actual: positions.len(),
            });
        }
        record.positions.copy_from_slice(positions);
        record.uploads += 1;
        Ok(())
    }

    fn create_material(&mut self, desc: &MaterialDescriptor) -> Result<MaterialId, BackendError> {
        for texture in desc.textures() {
            self.check_texture(texture)?;
        }
        let id = MaterialId(self.allocate()?);
        self.materials.insert(id, desc.clone());
        Ok(id)
    }

    fn set_material_texture(
        &mut self,
        material: MaterialId,
        slot: TextureSlot,
        texture: TextureId,
    ) -> Result<(), BackendError> {
        let update = self.material_updates;
        self.material_updates += 1;
        if self.failing_updates.contains(&update) {
            return Err(BackendError::Device(format!(
                "simulated rebind failure for material {}",
                material.0
            )));
        }
        self.check_texture(texture)?;
        let desc = self
            .materials
            .get_mut(&material)
            .ok_or(BackendError::unknown(GpuResource::Material(material)))?;
        rebind_texture(desc, slot, texture);
        Ok(())
    }

    fn render(&mut self, surface: SurfaceId, frame: &FrameDescription) -> Result<(), BackendError> {
        if !self.surfaces.contains_key(&surface) {
            return Err(BackendError::unknown(GpuResource::Surface(surface)));
        }
        for draw in &frame.draws {
            if !self.geometries.contains_key(&draw.geometry) {
                return Err(BackendError::unknown(GpuResource::Geometry(draw.geometry)));
            }
            if !self.materials.contains_key(&draw.material) {
                return Err(BackendError::unknown(GpuResource::Material(draw.material)));
            }
        }
        self.frames_rendered += 1;
        self.last_frame = Some(frame.clone());
        Ok(())
    }

    fn dispose(&mut self, resource: GpuResource) -> Result<(), BackendError> {
        let removed = match resource {
            GpuResource::Surface(id) => self.surfaces.remove(&id).is_some(),
            GpuResource::Texture(id) => self.textures.remove(&id).is_some(),
            GpuResource::Geometry(id) => self.geometries.remove(&id).is_some(),
            GpuResource::Material(id) => self.materials.remove(&id).is_some(),
        };
        if removed {
            self.disposed.insert(resource);
            return Ok(());
        }
        if self.disposed.contains(&resource) {
            self.double_disposals += 1;
            return Ok(());
        }
        Err(BackendError::unknown(resource))
    }
}

/// Points a material's texture slot at `texture`, for backends that keep
/// descriptors around.
pub(crate) fn rebind_texture(desc: &mut MaterialDescriptor, slot: TextureSlot, texture: TextureId) {
    use crate::backend::{BackdropFill, MaterialKind};

    match (&mut desc.kind, slot) {
        (MaterialKind::Backdrop { fill }, TextureSlot::Primary) => {
            *fill = BackdropFill::Texture(texture);
        }
        (MaterialKind::Sprite { texture: current }, TextureSlot::Primary)
        | (MaterialKind::Points { texture: current, .. }, TextureSlot::Primary)
        | (MaterialKind::Water { normal_map: current, .. }, TextureSlot::Primary) => {
            *current = texture;
        }
        (MaterialKind::Unlit { texture: current }, TextureSlot::Primary)
        | (MaterialKind::Points { accent: current, .. }, TextureSlot::Accent)
        | (MaterialKind::Standard { environment: current, .. }, TextureSlot::Environment)
        | (MaterialKind::Water { environment: current, .. }, TextureSlot::Environment) => {
            *current = Some(texture);
        }
        (kind, slot) => {
            tracing::debug!(?kind, ?slot, "material has no such texture slot; ignoring");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MaterialKind, TextureWrap};

    #[test]
    fn frame_requests_queue_in_order() {
        let mut host = HeadlessHost::new(ContainerRect::sized(10, 10));
        let a = host.request_frame(None);
        let b = host.request_frame(Some(Duration::from_millis(5)));
        host.cancel_frame(a);
        assert_eq!(host.next_frame(), Some((b, Some(Duration::from_millis(5)))));
        assert_eq!(host.next_frame(), None);
        assert_eq!(host.cancelled(), &[a]);
    }

    #[test]
    fn remove_tagged_only_touches_matching_surfaces() {
        let mut host = HeadlessHost::new(ContainerRect::sized(10, 10));
        let root = host.root_container().unwrap();
        host.insert_stale_surface(root, "starfield");
        host.insert_stale_surface(root, "starfield");
        host.insert_stale_surface(root, "other");
        assert_eq!(host.remove_tagged(root, "starfield"), 2);
        assert_eq!(host.attached_count(root), 1);
    }

    #[test]
    fn double_dispose_is_counted_not_fatal() {
        let mut backend = HeadlessBackend::new();
        let texture = backend
            .create_texture(&TextureDescriptor {
                label: "t",
                width: 1,
                height: 1,
                pixels: &[1, 2, 3, 4],
                wrap: TextureWrap::Clamp,
                srgb: true,
            })
            .unwrap();
        backend.dispose(GpuResource::Texture(texture)).unwrap();
        backend.dispose(GpuResource::Texture(texture)).unwrap();
        assert_eq!(backend.double_disposals(), 1);
        assert!(backend
            .dispose(GpuResource::Texture(TextureId(12345)))
            .is_err());
    }

    #[test]
    fn materials_must_reference_live_textures() {
        let mut backend = HeadlessBackend::new();
        let err = backend
            .create_material(&MaterialDescriptor::new(
                "sprite",
                MaterialKind::Sprite {
                    texture: TextureId(7),
                },
            ))
            .unwrap_err();
        assert!(matches!(err, BackendError::UnknownHandle { kind: "texture", .. }));
    }

    #[test]
    fn texture_payload_size_is_checked() {
        let mut backend = HeadlessBackend::new();
        let err = backend
            .create_texture(&TextureDescriptor {
                label: "short",
                width: 2,
                height: 2,
                pixels: &[0; 4],
                wrap: TextureWrap::Clamp,
                srgb: true,
            })
            .unwrap_err();
        assert!(matches!(err, BackendError::TextureSize { expected: 16, .. }));
    }

    #[test]
    fn injected_failures_start_after_budget() {
        let mut backend = HeadlessBackend::new().fail_creations_after(1);
        let mesh = MeshData::sprite_quad();
        assert!(backend.create_geometry("a", &mesh).is_ok());
        assert!(backend.create_geometry("b", &mesh).is_err());
    }
}
