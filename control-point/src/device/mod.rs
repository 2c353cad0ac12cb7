//! Device abstraction shared by media servers and renderers.
//!
//! A device is a sans-I/O state machine. The runtime calls into it with
//! activation changes, finished jobs, fired timers and GENA events, and the
//! device answers with [`Effect`](crate::effect::Effect)s.

mod lifecycle;
mod subscriptions;

pub use lifecycle::{Completion, DeviceCore, PingAction};
pub use subscriptions::{Subscription, SubscriptionSet};

use upnp_discovery::{DiscoveredDevice, ServiceInfo};

use crate::content::TreeModel;
use crate::effect::{Effects, JobId, JobResult, TimerKind};

/// Population progress of a device's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Initial,
    Populating,
    Populated,
}

/// Identity and services of a device, as discovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub uuid: String,
    pub name: String,
    pub host: String,
    pub base_url: String,
    pub manufacturer: String,
    pub model_name: String,
    pub icon_url: Option<String>,
    /// Services this device kind uses; the rest are dropped on construction
    pub services: Vec<ServiceInfo>,
}

impl DeviceInfo {
    /// Copy a discovered device, keeping only the services `keep` accepts.
    pub fn from_discovered(device: &DiscoveredDevice, keep: impl Fn(&ServiceInfo) -> bool) -> Self {
        Self {
            uuid: device.uuid.clone(),
            name: device.name.clone(),
            host: device.host.clone(),
            base_url: device.base_url.clone(),
            manufacturer: device.manufacturer.clone(),
            model_name: device.model_name.clone(),
            icon_url: device.best_icon(64).map(|icon| icon.url.clone()),
            services: device.services.iter().filter(|s| keep(s)).cloned().collect(),
        }
    }

    /// First service whose type starts with `prefix`.
    pub fn service(&self, prefix: &str) -> Option<&ServiceInfo> {
        self.services
            .iter()
            .find(|s| s.service_type.starts_with(prefix))
    }
}

/// Behaviour the registries and the runtime rely on.
pub trait Device {
    fn info(&self) -> &DeviceInfo;

    fn uuid(&self) -> &str {
        &self.info().uuid
    }

    fn state(&self) -> DeviceState;

    fn is_active(&self) -> bool;

    /// Activate (populate + subscribe) or deactivate (cancel + clear +
    /// unsubscribe). Repeating the current state does nothing.
    fn set_active(&mut self, active: bool, fx: &mut Effects);

    /// The device stopped answering; deactivation must not talk to it.
    fn mark_lost(&mut self);

    fn handle_job(&mut self, job: JobId, result: JobResult, fx: &mut Effects);

    fn handle_timer(&mut self, timer: TimerKind, fx: &mut Effects);

    /// GENA variables from one NOTIFY on subscription `sid`.
    fn handle_event(&mut self, sid: &str, variables: &[(String, String)], fx: &mut Effects);

    fn model(&self) -> &dyn TreeModel;
}
