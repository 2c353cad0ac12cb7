//! Messages between the sans-I/O device logic and the runtime.
//!
//! Devices never perform I/O. Every operation appends [`Effect`]s to a
//! buffer; the runtime executes them and feeds each completion back as a
//! [`JobResult`] or a fired [`TimerKind`].

use std::fmt;
use std::time::Duration;

use soap_client::{ActionResponse, SoapError, SubscriptionResponse};

use crate::command::PlayCommand;
use crate::content::ModelEvent;
use crate::renderer::RendererEvent;
use crate::status::StatusMessage;

/// Which registry a device lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceClass {
    MediaServer,
    Renderer,
}

impl DeviceClass {
    /// Key scope used for persisted values of this registry.
    pub fn scope(&self) -> &'static str {
        match self {
            DeviceClass::MediaServer => "MediaServers",
            DeviceClass::Renderer => "Renderers",
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceClass::MediaServer => write!(f, "media server"),
            DeviceClass::Renderer => write!(f, "renderer"),
        }
    }
}

/// Identifies one device across both registries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceKey {
    pub class: DeviceClass,
    pub uuid: String,
}

impl DeviceKey {
    pub fn new(class: DeviceClass, uuid: impl Into<String>) -> Self {
        Self {
            class,
            uuid: uuid.into(),
        }
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.class, self.uuid)
    }
}

/// Per-device job handle. Only unique together with the owning device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Device timers. At most one of each kind runs per device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Subscription renewal
    Renewal,
    /// Abort a play request still waiting for content
    PlayTimeout,
}

/// A SOAP action ready to be posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapRequest {
    pub control_url: String,
    pub service_type: String,
    pub action: String,
    pub args: Vec<(String, String)>,
    pub timeout: Duration,
}

impl SoapRequest {
    /// Value of an input argument.
    pub fn arg(&self, name: &str) -> Option<&str> {
        self.args
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Completion of a job started by [`Effect::Soap`], [`Effect::Subscribe`] or
/// [`Effect::Renew`].
#[derive(Debug)]
pub enum JobResult {
    Soap(Result<ActionResponse, SoapError>),
    Subscribed(Result<SubscriptionResponse, SoapError>),
    Renewed(Result<u32, SoapError>),
}

/// Something a device wants the runtime to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// POST a SOAP action and report back with [`JobResult::Soap`]
    Soap { job: JobId, request: SoapRequest },
    /// GENA SUBSCRIBE; report back with [`JobResult::Subscribed`]
    Subscribe {
        job: JobId,
        event_url: String,
        lease_seconds: u32,
        timeout: Duration,
    },
    /// GENA renewal; report back with [`JobResult::Renewed`]
    Renew {
        job: JobId,
        event_url: String,
        sid: String,
        lease_seconds: u32,
        timeout: Duration,
    },
    /// Best-effort UNSUBSCRIBE, nobody waits for the answer
    Unsubscribe { event_url: String, sid: String },
    /// Abort in-flight jobs; their completions must not be delivered
    CancelJobs(Vec<JobId>),
    /// (Re)start a timer
    StartTimer { timer: TimerKind, after: Duration },
    CancelTimer(TimerKind),
    /// Content or queue model changed
    Model(ModelEvent),
    /// User-visible status line
    Status(StatusMessage),
    /// Tracks for the active renderer
    Play(PlayCommand),
    /// Renderer state changed
    Renderer(RendererEvent),
    /// A liveness ping failed
    DeviceLost,
}

/// Buffer devices append to.
pub type Effects = Vec<Effect>;
