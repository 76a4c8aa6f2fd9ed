//! Discovered devices and the discovery subscriptions watching them.

use crate::Device;
use bacflow_core::types::MAX_INSTANCE;
use bacflow_core::types::{PropertyId, PropertyValue};
use bacflow_datalink::DataLinkAddress;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Which I-Am announcements a discovery wants to hear about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiscoveryFilter {
    pub low_limit: Option<u32>,
    pub high_limit: Option<u32>,
    /// Only accept devices reached through this station.
    pub address: Option<DataLinkAddress>,
}

impl DiscoveryFilter {
    pub fn matches(&self, device: &Device) -> bool {
        let low = self.low_limit.unwrap_or(0);
        let high = self.high_limit.unwrap_or(MAX_INSTANCE);
        (low..=high).contains(&device.device_id)
            && self
                .address
                .map_or(true, |addr| addr == device.address.datalink)
    }
}

/// Why a subscription stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionEnd {
    /// The collection window elapsed.
    Elapsed,
    Unsubscribed,
    /// The session closed.
    Cancelled,
}

pub trait DiscoveryHandler: Send {
    fn on_device(&mut self, device: &Device);

    fn on_end(self: Box<Self>, end: SubscriptionEnd);
}

/// Streams matches into a channel; the channel closes with the subscription.
impl DiscoveryHandler for mpsc::UnboundedSender<Device> {
    fn on_device(&mut self, device: &Device) {
        let _ = self.send(device.clone());
    }

    fn on_end(self: Box<Self>, _end: SubscriptionEnd) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

struct Subscription {
    filter: DiscoveryFilter,
    until: Instant,
    handler: Box<dyn DiscoveryHandler>,
}

#[derive(Debug, Clone)]
struct Entry {
    device: Device,
    last_seen: Instant,
}

/// Devices keyed by instance number. Entries never expire; callers that want
/// a staleness window can check [`DeviceRegistry::last_seen`].
#[derive(Default)]
pub struct DeviceRegistry {
    devices: HashMap<u32, Entry>,
    subscriptions: HashMap<SubscriptionHandle, Subscription>,
    next_handle: u64,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the entry for `device.device_id` and notifies every
    /// live subscription whose filter matches. Returns `true` for a new device.
    pub fn upsert(&mut self, device: Device, now: Instant) -> bool {
        for sub in self.subscriptions.values_mut() {
            if sub.until > now && sub.filter.matches(&device) {
                sub.handler.on_device(&device);
            }
        }
        if let Some(known) = self.devices.get(&device.device_id) {
            if known.device.address != device.address {
                log::debug!(
                    "device {} moved from {} to {}",
                    device.device_id,
                    known.device.address,
                    device.address
                );
            }
        }
        self.devices
            .insert(
                device.device_id,
                Entry {
                    device,
                    last_seen: now,
                },
            )
            .is_none()
    }

    pub fn lookup(&self, device_id: u32) -> Option<&Device> {
        self.devices.get(&device_id).map(|e| &e.device)
    }

    pub fn last_seen(&self, device_id: u32) -> Option<Instant> {
        self.devices.get(&device_id).map(|e| e.last_seen)
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values().map(|e| &e.device)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Refreshes a capability field of a known device from a property read.
    pub fn update_capability(
        &mut self,
        device_id: u32,
        property: PropertyId,
        value: &PropertyValue,
    ) -> bool {
        self.devices
            .get_mut(&device_id)
            .map_or(false, |e| e.device.apply_capability(property, value))
    }

    pub fn subscribe(
        &mut self,
        filter: DiscoveryFilter,
        until: Instant,
        handler: Box<dyn DiscoveryHandler>,
    ) -> SubscriptionHandle {
        let handle = SubscriptionHandle(self.next_handle);
        self.next_handle += 1;
        self.subscriptions.insert(
            handle,
            Subscription {
                filter,
                until,
                handler,
            },
        );
        handle
    }

    pub fn unsubscribe(&mut self, handle: SubscriptionHandle) -> bool {
        match self.subscriptions.remove(&handle) {
            Some(sub) => {
                sub.handler.on_end(SubscriptionEnd::Unsubscribed);
                true
            }
            None => false,
        }
    }

    /// Ends every subscription whose window closed at or before `now`.
    pub fn expire_subscriptions(&mut self, now: Instant) -> usize {
        let elapsed: Vec<SubscriptionHandle> = self
            .subscriptions
            .iter()
            .filter(|(_, sub)| sub.until <= now)
            .map(|(handle, _)| *handle)
            .collect();
        for handle in &elapsed {
            if let Some(sub) = self.subscriptions.remove(handle) {
                sub.handler.on_end(SubscriptionEnd::Elapsed);
            }
        }
        elapsed.len()
    }

    pub fn next_expiry(&self) -> Option<Instant> {
        self.subscriptions.values().map(|s| s.until).min()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn cancel_all(&mut self) -> usize {
        let count = self.subscriptions.len();
        for (_, sub) in self.subscriptions.drain() {
            sub.handler.on_end(SubscriptionEnd::Cancelled);
        }
        count
    }
}
