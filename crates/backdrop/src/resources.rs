//! Ownership ledger for everything a mount allocates.
//!
//! Resources are recorded the moment they are created, so teardown after a
//! partial construction releases exactly what exists. Every step of teardown
//! is isolated: a failure is logged and the remaining steps still run.

use crate::backend::{GpuBackend, GpuResource, SurfaceId};
use crate::host::{ContainerId, EventKind, Host, SubscriptionId};

/// Handle to a registered resource. Slots are reused after release, so the
/// generation keeps a stale key from reaching the newer occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    index: usize,
    generation: u32,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    generation: u32,
    resource: Option<GpuResource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SurfaceBinding {
    surface: SurfaceId,
    container: Option<ContainerId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub unsubscribed: usize,
    pub disposed: usize,
    pub detached: bool,
    pub failures: usize,
}

#[derive(Debug, Default)]
pub struct ResourceRegistry {
    slots: Vec<Slot>,
    free: Vec<usize>,
    subscriptions: Vec<(SubscriptionId, EventKind)>,
    surface: Option<SurfaceBinding>,
    torn_down: bool,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, resource: GpuResource) -> ResourceKey {
        let key = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.generation = slot.generation.wrapping_add(1);
                slot.resource = Some(resource);
                ResourceKey {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    resource: Some(resource),
                });
                ResourceKey {
                    index: self.slots.len() - 1,
                    generation: 0,
                }
            }
        };
        tracing::trace!(kind = resource.kind(), id = resource.raw(), slot = key.index, "registered resource");
        key
    }

    fn slot_mut(&mut self, key: ResourceKey) -> Option<&mut Slot> {
        self.slots
            .get_mut(key.index)
            .filter(|slot| slot.generation == key.generation)
    }

    pub fn resource(&self, key: ResourceKey) -> Option<GpuResource> {
        self.slots
            .get(key.index)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.resource)
    }

    /// Slots ever allocated, occupied or free.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Disposes one resource ahead of teardown. Releasing twice is a no-op.
    pub fn release<B: GpuBackend>(&mut self, key: ResourceKey, backend: &mut B) -> bool {
        let Some(resource) = self.slot_mut(key).and_then(|slot| slot.resource.take()) else {
            return false;
        };
        self.free.push(key.index);
        match backend.dispose(resource) {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(
                    kind = resource.kind(),
                    id = resource.raw(),
                    %error,
                    "failed to release resource"
                );
                false
            }
        }
    }

    pub fn track_surface(&mut self, surface: SurfaceId) {
        self.surface = Some(SurfaceBinding {
            surface,
            container: None,
        });
    }

    pub fn mark_attached(&mut self, container: ContainerId) {
        if let Some(binding) = self.surface.as_mut() {
            binding.container = Some(container);
        }
    }

    pub fn surface(&self) -> Option<SurfaceId> {
        self.surface.map(|binding| binding.surface)
    }

    pub fn track_subscription(&mut self, subscription: SubscriptionId, kind: EventKind) {
        self.subscriptions.push((subscription, kind));
    }

    pub fn subscription_kind(&self, subscription: SubscriptionId) -> Option<EventKind> {
        self.subscriptions
            .iter()
            .find(|(id, _)| *id == subscription)
            .map(|(_, kind)| *kind)
    }

    pub fn subscriptions(&self) -> impl Iterator<Item = SubscriptionId> + '_ {
        self.subscriptions.iter().map(|(id, _)| *id)
    }

    /// Live GPU resources, the surface included.
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.resource.is_some()).count()
            + usize::from(self.surface.is_some())
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Unsubscribes, disposes every resource, detaches and releases the
    /// surface. Calling it again does nothing.
    pub fn teardown<H: Host, B: GpuBackend>(&mut self, host: &mut H, backend: &mut B) -> TeardownReport {
        let mut report = TeardownReport::default();
        if self.torn_down {
            return report;
        }
        self.torn_down = true;

        for (subscription, kind) in self.subscriptions.drain(..) {
            match host.unsubscribe(subscription) {
                Ok(()) => report.unsubscribed += 1,
                Err(error) => {
                    report.failures += 1;
                    tracing::warn!(?kind, %error, "failed to remove event subscription");
                }
            }
        }

        // Newest first: materials go before the textures they sample.
        self.free.clear();
        for slot in self.slots.iter_mut().rev() {
            let Some(resource) = slot.resource.take() else {
                continue;
            };
            match backend.dispose(resource) {
                Ok(()) => report.disposed += 1,
                Err(error) => {
                    report.failures += 1;
                    tracing::warn!(
                        kind = resource.kind(),
                        id = resource.raw(),
                        %error,
                        "failed to dispose resource; continuing teardown"
                    );
                }
            }
        }

        if let Some(binding) = self.surface.take() {
            if let Some(container) = binding.container {
                if host.is_attached(container, binding.surface) {
                    match host.detach_surface(container, binding.surface) {
                        Ok(()) => report.detached = true,
                        Err(error) => {
                            report.failures += 1;
                            tracing::warn!(%error, "failed to detach render surface");
                        }
                    }
                }
            }
            match backend.dispose(GpuResource::Surface(binding.surface)) {
                Ok(()) => report.disposed += 1,
                Err(error) => {
                    report.failures += 1;
                    tracing::warn!(%error, "failed to release render surface");
                }
            }
        }

        tracing::debug!(?report, "resource registry torn down");
        report
    }
}
