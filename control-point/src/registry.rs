//! Device registries: the devices of one class, exactly one of them active.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::device::Device;
use crate::effect::{DeviceClass, Effects};
use crate::error::{ControlError, Result};
use crate::store::KeyValueStore;

const ACTIVE_KEY: &str = "active";

/// Device list changes of one registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    Added { uuid: String, name: String },
    Removed { uuid: String },
    ActiveChanged { uuid: Option<String> },
}

/// What a registry operation produced: list changes, and device effects
/// tagged with the uuid of the device that must receive their completions.
#[derive(Debug, Default)]
pub struct RegistryOutput {
    pub events: Vec<RegistryEvent>,
    pub effects: Vec<(String, Effects)>,
}

impl RegistryOutput {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_effects(&mut self, uuid: &str, fx: Effects) {
        if !fx.is_empty() {
            self.effects.push((uuid.to_string(), fx));
        }
    }
}

/// Devices of one [`DeviceClass`].
///
/// During the startup grace period (`startup_polls` calls to [`poll`]) only
/// the remembered device is activated. Afterwards, whenever no device is
/// active, the device at row 0 is.
///
/// [`poll`]: DeviceRegistry::poll
pub struct DeviceRegistry<D: Device> {
    class: DeviceClass,
    devices: Vec<D>,
    active: Option<String>,
    store: Arc<dyn KeyValueStore>,
    remembered: Option<String>,
    polls_left: u32,
}

impl<D: Device> DeviceRegistry<D> {
    pub fn new(class: DeviceClass, store: Arc<dyn KeyValueStore>, startup_polls: u32) -> Self {
        let remembered = store.get(class.scope(), ACTIVE_KEY).filter(|uuid| !uuid.is_empty());
        debug!(class = %class, remembered = ?remembered, "Registry created");
        Self {
            class,
            devices: Vec::new(),
            active: None,
            store,
            remembered,
            polls_left: startup_polls,
        }
    }

    pub fn class(&self) -> DeviceClass {
        self.class
    }

    pub fn devices(&self) -> &[D] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn is_settled(&self) -> bool {
        self.polls_left == 0
    }

    /// Uuid persisted as the last user selection.
    pub fn remembered(&self) -> Option<&str> {
        self.remembered.as_deref()
    }

    pub fn get(&self, uuid: &str) -> Option<&D> {
        self.devices.iter().find(|d| d.uuid() == uuid)
    }

    pub fn get_mut(&mut self, uuid: &str) -> Option<&mut D> {
        self.devices.iter_mut().find(|d| d.uuid() == uuid)
    }

    pub fn active_uuid(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn active(&self) -> Option<&D> {
        self.get(self.active.as_deref()?)
    }

    pub fn active_mut(&mut self) -> Option<&mut D> {
        let uuid = self.active.clone()?;
        self.get_mut(&uuid)
    }

    /// Add a device that was not discovered, such as a built-in one, at row 0.
    pub fn insert_front(&mut self, device: D, out: &mut RegistryOutput) {
        if self.get(device.uuid()).is_some() {
            return;
        }
        out.events.push(RegistryEvent::Added {
            uuid: device.uuid().to_string(),
            name: device.info().name.clone(),
        });
        self.devices.insert(0, device);
    }

    /// Add a discovered device. Returns `false` for a uuid already present.
    pub fn add(&mut self, device: D, out: &mut RegistryOutput) -> bool {
        let uuid = device.uuid().to_string();
        if self.get(&uuid).is_some() {
            debug!(class = %self.class, device = %uuid, "Device already known");
            return false;
        }
        info!(class = %self.class, device = %uuid, name = %device.info().name, "Device added");
        out.events.push(RegistryEvent::Added {
            uuid: uuid.clone(),
            name: device.info().name.clone(),
        });
        self.devices.push(device);

        if self.remembered.as_deref() == Some(uuid.as_str()) && self.active.is_none() {
            self.switch_to(Some(uuid), out);
        } else if self.active.is_none() && self.is_settled() {
            self.activate_default(out);
        }
        true
    }

    /// Remove a device, deactivating it first. A `lost` device is not sent
    /// UNSUBSCRIBE. When it was active the default takes over.
    pub fn remove(&mut self, uuid: &str, lost: bool, out: &mut RegistryOutput) -> Option<D> {
        let index = self.devices.iter().position(|d| d.uuid() == uuid)?;
        let mut device = self.devices.remove(index);
        if lost {
            device.mark_lost();
        }
        info!(class = %self.class, device = %uuid, lost, "Device removed");

        let was_active = self.active.as_deref() == Some(uuid);
        if was_active {
            let mut fx = Effects::new();
            device.set_active(false, &mut fx);
            out.push_effects(uuid, fx);
            self.active = None;
        }
        out.events.push(RegistryEvent::Removed {
            uuid: uuid.to_string(),
        });
        if was_active {
            self.activate_default(out);
        }
        Some(device)
    }

    /// One startup tick. When the grace period ends without an active
    /// device, the default is activated.
    pub fn poll(&mut self, out: &mut RegistryOutput) {
        if self.polls_left == 0 {
            return;
        }
        self.polls_left -= 1;
        if self.polls_left == 0 && self.active.is_none() {
            debug!(class = %self.class, "Startup grace over, choosing default device");
            self.activate_default(out);
        }
    }

    /// A user selection: activate `uuid` and remember it.
    pub fn set_active(&mut self, uuid: &str, out: &mut RegistryOutput) -> Result<()> {
        if self.get(uuid).is_none() {
            return Err(ControlError::DeviceNotFound(uuid.to_string()));
        }
        self.remembered = Some(uuid.to_string());
        if let Err(e) = self.store.set(self.class.scope(), ACTIVE_KEY, uuid) {
            warn!(class = %self.class, error = %e, "Failed to persist active device");
        }
        self.switch_to(Some(uuid.to_string()), out);
        Ok(())
    }

    /// Deactivate whatever is active.
    pub fn shutdown(&mut self, out: &mut RegistryOutput) {
        if let Some(uuid) = self.active.take() {
            if let Some(device) = self.get_mut(&uuid) {
                let mut fx = Effects::new();
                device.set_active(false, &mut fx);
                out.push_effects(&uuid, fx);
            }
            out.events.push(RegistryEvent::ActiveChanged { uuid: None });
        }
    }

    fn activate_default(&mut self, out: &mut RegistryOutput) {
        let first = self.devices.first().map(|d| d.uuid().to_string());
        self.switch_to(first, out);
    }

    /// Deactivate the current device before activating `uuid`.
    fn switch_to(&mut self, uuid: Option<String>, out: &mut RegistryOutput) {
        if self.active == uuid {
            return;
        }
        if let Some(old) = self.active.take() {
            if let Some(device) = self.get_mut(&old) {
                let mut fx = Effects::new();
                device.set_active(false, &mut fx);
                out.push_effects(&old, fx);
            }
        }
        if let Some(new) = &uuid {
            if let Some(device) = self.get_mut(new) {
                let mut fx = Effects::new();
                device.set_active(true, &mut fx);
                out.push_effects(new, fx);
            }
        }
        info!(class = %self.class, active = ?uuid, "Active device changed");
        self.active = uuid.clone();
        out.events.push(RegistryEvent::ActiveChanged { uuid });
    }
}
