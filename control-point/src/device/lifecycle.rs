//! Command and subscription bookkeeping shared by every device kind.

use std::collections::HashMap;
use std::time::Instant;

use soap_client::{ActionResponse, SoapError};
use tracing::{debug, info, warn};

use crate::config::ControlPointConfig;
use crate::effect::{Effect, Effects, JobId, JobResult, SoapRequest, TimerKind};

use super::subscriptions::SubscriptionSet;
use super::{DeviceInfo, DeviceState};

#[derive(Debug)]
enum Purpose<T> {
    Command(T),
    Ping,
}

#[derive(Debug)]
struct InFlight<T> {
    action: String,
    purpose: Purpose<T>,
}

/// What a finished job means to the owning device.
#[derive(Debug)]
pub enum Completion<T> {
    Succeeded { tag: T, response: ActionResponse },
    Failed { tag: T, error: SoapError },
    /// Subscription traffic, pings and stale completions
    Handled,
}

/// Liveness ping issued after a transport failure.
#[derive(Debug, Clone, Copy)]
pub struct PingAction {
    pub service: &'static str,
    pub action: &'static str,
}

/// Per-device state every device kind needs: identity, activation,
/// in-flight jobs tagged with `T`, and subscriptions.
#[derive(Debug)]
pub struct DeviceCore<T> {
    info: DeviceInfo,
    config: ControlPointConfig,
    state: DeviceState,
    active: bool,
    lost: bool,
    next_job: u64,
    jobs: HashMap<JobId, InFlight<T>>,
    subscriptions: SubscriptionSet,
    ping: Option<PingAction>,
}

impl<T> DeviceCore<T> {
    pub fn new(info: DeviceInfo, config: ControlPointConfig, ping: Option<PingAction>) -> Self {
        Self {
            info,
            config,
            state: DeviceState::Initial,
            active: false,
            lost: false,
            next_job: 0,
            jobs: HashMap::new(),
            subscriptions: SubscriptionSet::new(),
            ping,
        }
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn uuid(&self) -> &str {
        &self.info.uuid
    }

    pub fn config(&self) -> &ControlPointConfig {
        &self.config
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn set_state(&mut self, state: DeviceState) {
        if self.state != state {
            debug!(device = %self.info.uuid, from = ?self.state, to = ?state, "Device state");
            self.state = state;
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_lost(&self) -> bool {
        self.lost
    }

    /// Skip UNSUBSCRIBE on the following deactivation.
    pub fn mark_lost(&mut self) {
        self.lost = true;
    }

    pub fn subscriptions(&self) -> &SubscriptionSet {
        &self.subscriptions
    }

    /// Service type behind a subscription id.
    pub fn service_for_sid(&self, sid: &str) -> Option<&str> {
        self.subscriptions
            .by_sid(sid)
            .map(|s| s.service_type.as_str())
    }

    fn allocate_job(&mut self) -> JobId {
        self.next_job += 1;
        JobId(self.next_job)
    }

    /// Queue a SOAP action on the first service whose type starts with
    /// `service`. Returns `None` when the device has no such service.
    ///
    /// With `cancel_others`, in-flight jobs of the same action are cancelled
    /// first so their late responses cannot overwrite the new one.
    pub fn send_command(
        &mut self,
        fx: &mut Effects,
        service: &str,
        action: &str,
        args: &[(&str, String)],
        cancel_others: bool,
        tag: T,
    ) -> Option<JobId> {
        if cancel_others {
            self.cancel_matching(fx, |inflight| inflight.action == action);
        }
        self.post(fx, service, action, args, Purpose::Command(tag))
    }

    fn post(
        &mut self,
        fx: &mut Effects,
        service: &str,
        action: &str,
        args: &[(&str, String)],
        purpose: Purpose<T>,
    ) -> Option<JobId> {
        let Some(info) = self.info.service(service) else {
            warn!(device = %self.info.uuid, service, action, "Device has no such service");
            return None;
        };
        let timeout = match purpose {
            Purpose::Ping => self.config.ping_timeout,
            Purpose::Command(_) => self.config.command_timeout,
        };
        let request = SoapRequest {
            control_url: info.control_url.clone(),
            service_type: info.service_type.clone(),
            action: action.to_string(),
            args: args
                .iter()
                .map(|(name, value)| (name.to_string(), value.clone()))
                .collect(),
            timeout,
        };

        let job = self.allocate_job();
        debug!(device = %self.info.uuid, %job, action, "Sending command");
        self.jobs.insert(
            job,
            InFlight {
                action: action.to_string(),
                purpose,
            },
        );
        fx.push(Effect::Soap { job, request });
        Some(job)
    }

    fn cancel_matching(&mut self, fx: &mut Effects, matches: impl Fn(&InFlight<T>) -> bool) -> Vec<T> {
        let ids: Vec<JobId> = self
            .jobs
            .iter()
            .filter(|(_, inflight)| matches(inflight))
            .map(|(id, _)| *id)
            .collect();
        if ids.is_empty() {
            return Vec::new();
        }

        let mut tags = Vec::new();
        for id in &ids {
            if let Some(InFlight {
                purpose: Purpose::Command(tag),
                ..
            }) = self.jobs.remove(id)
            {
                tags.push(tag);
            }
        }
        fx.push(Effect::CancelJobs(ids));
        tags
    }

    /// Cancel the commands whose tag matches and return their tags.
    pub fn cancel_where(&mut self, fx: &mut Effects, matches: impl Fn(&T) -> bool) -> Vec<T> {
        self.cancel_matching(fx, |inflight| match &inflight.purpose {
            Purpose::Command(tag) => matches(tag),
            Purpose::Ping => false,
        })
    }

    pub fn has_job_where(&self, matches: impl Fn(&T) -> bool) -> bool {
        self.jobs.values().any(|inflight| match &inflight.purpose {
            Purpose::Command(tag) => matches(tag),
            Purpose::Ping => false,
        })
    }

    pub fn jobs_in_flight(&self) -> usize {
        self.jobs.len()
    }

    /// Mark active, subscribe every evented service and arm the renewal
    /// timer. Returns `false` when already active.
    pub fn activate(&mut self, fx: &mut Effects) -> bool {
        if self.active {
            return false;
        }
        info!(device = %self.info.uuid, name = %self.info.name, "Activating device");
        self.active = true;
        self.lost = false;

        let evented: Vec<(String, String)> = self
            .info
            .services
            .iter()
            .filter_map(|s| Some((s.event_url.clone()?, s.service_type.clone())))
            .collect();
        for (event_url, service_type) in evented {
            if self.subscriptions.covers(&event_url) {
                continue;
            }
            let job = self.allocate_job();
            self.subscriptions.begin_subscribe(job, &event_url, &service_type);
            fx.push(Effect::Subscribe {
                job,
                event_url,
                lease_seconds: self.config.subscription_lease,
                timeout: self.config.command_timeout,
            });
        }

        fx.push(Effect::StartTimer {
            timer: TimerKind::Renewal,
            after: self.config.renewal_interval,
        });
        true
    }

    /// Cancel every job, stop renewing and (unless lost) unsubscribe.
    /// Returns `false` when already inactive.
    pub fn deactivate(&mut self, fx: &mut Effects) -> bool {
        if !self.active {
            return false;
        }
        info!(device = %self.info.uuid, lost = self.lost, "Deactivating device");
        self.active = false;

        let (subscriptions, mut jobs) = self.subscriptions.drain();
        jobs.extend(self.jobs.drain().map(|(id, _)| id));
        if !jobs.is_empty() {
            jobs.sort();
            fx.push(Effect::CancelJobs(jobs));
        }
        fx.push(Effect::CancelTimer(TimerKind::Renewal));

        if !self.lost {
            for subscription in subscriptions {
                fx.push(Effect::Unsubscribe {
                    event_url: subscription.event_url,
                    sid: subscription.sid,
                });
            }
        }
        self.set_state(DeviceState::Initial);
        true
    }

    /// Renewal timer fired: renew everything and re-arm. Subscriptions whose
    /// lease already ran out (a renewal was missed) are subscribed again.
    pub fn renew_all(&mut self, fx: &mut Effects) {
        if !self.active {
            return;
        }
        for lapsed in self.subscriptions.take_lapsed(Instant::now()) {
            warn!(device = %self.info.uuid, event_url = %lapsed.event_url, "Subscription lapsed, subscribing again");
            let job = self.allocate_job();
            self.subscriptions
                .begin_subscribe(job, &lapsed.event_url, &lapsed.service_type);
            fx.push(Effect::Subscribe {
                job,
                event_url: lapsed.event_url,
                lease_seconds: self.config.subscription_lease,
                timeout: self.config.command_timeout,
            });
        }
        let current: Vec<(String, String)> = self
            .subscriptions
            .iter()
            .map(|s| (s.event_url.clone(), s.sid.clone()))
            .collect();
        for (event_url, sid) in current {
            let job = self.allocate_job();
            self.subscriptions.begin_renew(job, &event_url);
            fx.push(Effect::Renew {
                job,
                event_url,
                sid,
                lease_seconds: self.config.subscription_lease,
                timeout: self.config.command_timeout,
            });
        }
        fx.push(Effect::StartTimer {
            timer: TimerKind::Renewal,
            after: self.config.renewal_interval,
        });
    }

    /// Route a finished job. Device-specific results come back as
    /// [`Completion::Succeeded`] or [`Completion::Failed`].
    pub fn complete(&mut self, fx: &mut Effects, job: JobId, result: JobResult) -> Completion<T> {
        let result = match result {
            JobResult::Subscribed(result) => {
                let keep = self.active;
                self.subscriptions.subscribed(job, result, keep, fx);
                return Completion::Handled;
            }
            JobResult::Renewed(result) => {
                self.subscriptions.renewed(job, result);
                return Completion::Handled;
            }
            JobResult::Soap(result) => result,
        };

        let Some(inflight) = self.jobs.remove(&job) else {
            debug!(device = %self.info.uuid, %job, "Dropping stale completion");
            return Completion::Handled;
        };

        match (inflight.purpose, result) {
            (Purpose::Ping, Ok(_)) => {
                debug!(device = %self.info.uuid, "Ping answered, device still alive");
                Completion::Handled
            }
            (Purpose::Ping, Err(error)) => {
                warn!(device = %self.info.uuid, %error, "Ping failed, device lost");
                self.lost = true;
                fx.push(Effect::DeviceLost);
                Completion::Handled
            }
            (Purpose::Command(tag), Ok(response)) => Completion::Succeeded { tag, response },
            (Purpose::Command(tag), Err(error)) => {
                warn!(device = %self.info.uuid, action = %inflight.action, %error, "Command failed");
                if error.is_transport() {
                    self.send_ping(fx);
                }
                Completion::Failed { tag, error }
            }
        }
    }

    fn send_ping(&mut self, fx: &mut Effects) {
        let Some(ping) = self.ping else {
            return;
        };
        if self.lost || self.jobs.values().any(|j| matches!(j.purpose, Purpose::Ping)) {
            return;
        }
        self.post(fx, ping.service, ping.action, &[], Purpose::Ping);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceInfo;
    use upnp_discovery::ServiceInfo;

    fn core() -> DeviceCore<&'static str> {
        let info = DeviceInfo {
            uuid: "dev-1".to_string(),
            name: "Device".to_string(),
            host: "192.168.1.20".to_string(),
            base_url: "http://192.168.1.20:8080/".to_string(),
            manufacturer: String::new(),
            model_name: String::new(),
            icon_url: None,
            services: vec![
                ServiceInfo {
                    service_type: "urn:schemas-upnp-org:service:ContentDirectory:1".to_string(),
                    service_id: "urn:upnp-org:serviceId:ContentDirectory".to_string(),
                    control_url: "http://192.168.1.20:8080/cd/control".to_string(),
                    event_url: Some("http://192.168.1.20:8080/cd/event".to_string()),
                },
                ServiceInfo {
                    service_type: "urn:schemas-upnp-org:service:ConnectionManager:1".to_string(),
                    service_id: "urn:upnp-org:serviceId:ConnectionManager".to_string(),
                    control_url: "http://192.168.1.20:8080/cm/control".to_string(),
                    event_url: None,
                },
            ],
        };
        DeviceCore::new(
            info,
            ControlPointConfig::default(),
            Some(PingAction {
                service: "urn:schemas-upnp-org:service:ContentDirectory",
                action: "GetSystemUpdateID",
            }),
        )
    }

    fn subscribes(fx: &Effects) -> usize {
        fx.iter()
            .filter(|e| matches!(e, Effect::Subscribe { .. }))
            .count()
    }

    fn soap_jobs(fx: &Effects) -> Vec<(JobId, String)> {
        fx.iter()
            .filter_map(|e| match e {
                Effect::Soap { job, request } => Some((*job, request.action.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_activate_twice_subscribes_once() {
        let mut core = core();
        let mut fx = Effects::new();

        assert!(core.activate(&mut fx));
        assert!(!core.activate(&mut fx));
        assert_eq!(subscribes(&fx), 1);
    }

    #[test]
    fn test_lapsed_subscription_is_subscribed_again() {
        let mut core = core();
        let mut fx = Effects::new();
        core.activate(&mut fx);
        let job = fx
            .iter()
            .find_map(|e| match e {
                Effect::Subscribe { job, .. } => Some(*job),
                _ => None,
            })
            .unwrap();
        // Lease already over by the time the renewal timer fires
        core.complete(
            &mut fx,
            job,
            JobResult::Subscribed(Ok(soap_client::SubscriptionResponse {
                sid: "uuid:sub-1".to_string(),
                timeout_seconds: 0,
            })),
        );

        let mut fx = Effects::new();
        core.renew_all(&mut fx);
        assert_eq!(subscribes(&fx), 1);
        assert!(!fx.iter().any(|e| matches!(e, Effect::Renew { .. })));
        assert_eq!(core.service_for_sid("uuid:sub-1"), None);
        assert!(fx.contains(&Effect::StartTimer {
            timer: TimerKind::Renewal,
            after: core.config().renewal_interval,
        }));
    }

    #[test]
    fn test_live_subscription_is_renewed() {
        let mut core = core();
        let mut fx = Effects::new();
        core.activate(&mut fx);
        let job = fx
            .iter()
            .find_map(|e| match e {
                Effect::Subscribe { job, .. } => Some(*job),
                _ => None,
            })
            .unwrap();
        core.complete(
            &mut fx,
            job,
            JobResult::Subscribed(Ok(soap_client::SubscriptionResponse {
                sid: "uuid:sub-1".to_string(),
                timeout_seconds: 1800,
            })),
        );

        let mut fx = Effects::new();
        core.renew_all(&mut fx);
        assert_eq!(subscribes(&fx), 0);
        assert!(fx.iter().any(|e| matches!(e, Effect::Renew { sid, .. } if sid == "uuid:sub-1")));
    }

    #[test]
    fn test_late_subscription_after_deactivate_is_cancelled() {
        let mut core = core();
        let mut fx = Effects::new();
        core.activate(&mut fx);
        let job = fx
            .iter()
            .find_map(|e| match e {
                Effect::Subscribe { job, .. } => Some(*job),
                _ => None,
            })
            .unwrap();

        core.deactivate(&mut fx);
        assert!(fx.contains(&Effect::CancelJobs(vec![job])));

        // Completion that raced the cancellation
        let mut late = Effects::new();
        core.complete(
            &mut late,
            job,
            JobResult::Subscribed(Ok(soap_client::SubscriptionResponse {
                sid: "uuid:sub-1".to_string(),
                timeout_seconds: 1800,
            })),
        );
        assert!(core.subscriptions().is_empty());
    }

    #[test]
    fn test_deactivate_unsubscribes_unless_lost() {
        for lost in [false, true] {
            let mut core = core();
            let mut fx = Effects::new();
            core.activate(&mut fx);
            let job = fx
                .iter()
                .find_map(|e| match e {
                    Effect::Subscribe { job, .. } => Some(*job),
                    _ => None,
                })
                .unwrap();
            core.complete(
                &mut fx,
                job,
                JobResult::Subscribed(Ok(soap_client::SubscriptionResponse {
                    sid: "uuid:sub-1".to_string(),
                    timeout_seconds: 1800,
                })),
            );
            assert_eq!(
                core.service_for_sid("uuid:sub-1"),
                Some("urn:schemas-upnp-org:service:ContentDirectory:1")
            );

            if lost {
                core.mark_lost();
            }
            let mut fx = Effects::new();
            core.deactivate(&mut fx);
            let unsubscribed = fx.iter().any(|e| matches!(e, Effect::Unsubscribe { .. }));
            assert_eq!(unsubscribed, !lost);
            assert!(core.subscriptions().is_empty());
        }
    }

    #[test]
    fn test_cancel_others_cancels_same_action_only() {
        let mut core = core();
        let mut fx = Effects::new();
        let cd = "urn:schemas-upnp-org:service:ContentDirectory";
        let browse = core.send_command(&mut fx, cd, "Browse", &[], false, "browse").unwrap();
        let first = core.send_command(&mut fx, cd, "Search", &[], true, "search-1").unwrap();
        let second = core.send_command(&mut fx, cd, "Search", &[], true, "search-2").unwrap();

        assert!(fx.contains(&Effect::CancelJobs(vec![first])));
        assert!(!fx.iter().any(|e| matches!(e, Effect::CancelJobs(ids) if ids.contains(&browse))));
        assert!(core.has_job_where(|t| *t == "search-2"));
        assert!(!core.has_job_where(|t| *t == "search-1"));

        let mut fx = Effects::new();
        let stale = core.complete(&mut fx, first, JobResult::Soap(Ok(ActionResponse::new("Search"))));
        assert!(matches!(stale, Completion::Handled));
        let fresh = core.complete(&mut fx, second, JobResult::Soap(Ok(ActionResponse::new("Search"))));
        assert!(matches!(fresh, Completion::Succeeded { tag: "search-2", .. }));
    }

    #[test]
    fn test_missing_service_sends_nothing() {
        let mut core = core();
        let mut fx = Effects::new();
        assert!(core
            .send_command(&mut fx, "urn:av-openhome-org:service:Playlist", "Play", &[], false, "x")
            .is_none());
        assert!(fx.is_empty());
    }

    #[test]
    fn test_transport_failure_pings_and_failed_ping_loses_device() {
        let mut core = core();
        let mut fx = Effects::new();
        let cd = "urn:schemas-upnp-org:service:ContentDirectory";
        let job = core.send_command(&mut fx, cd, "Browse", &[], false, "browse").unwrap();

        let mut fx = Effects::new();
        let outcome = core.complete(&mut fx, job, JobResult::Soap(Err(SoapError::Timeout(15000))));
        assert!(matches!(outcome, Completion::Failed { tag: "browse", .. }));
        let pings = soap_jobs(&fx);
        assert_eq!(pings.len(), 1);
        assert_eq!(pings[0].1, "GetSystemUpdateID");
        match &fx[0] {
            Effect::Soap { request, .. } => assert_eq!(request.timeout, core.config().ping_timeout),
            other => panic!("unexpected {other:?}"),
        }

        let mut fx = Effects::new();
        core.complete(
            &mut fx,
            pings[0].0,
            JobResult::Soap(Err(SoapError::Network("refused".to_string()))),
        );
        assert_eq!(fx, vec![Effect::DeviceLost]);
        assert!(core.is_lost());
    }

    #[test]
    fn test_soap_fault_does_not_ping() {
        let mut core = core();
        let mut fx = Effects::new();
        let cd = "urn:schemas-upnp-org:service:ContentDirectory";
        let job = core.send_command(&mut fx, cd, "Browse", &[], false, "browse").unwrap();

        let mut fx = Effects::new();
        core.complete(
            &mut fx,
            job,
            JobResult::Soap(Err(SoapError::Fault {
                code: 701,
                description: "No such object".to_string(),
            })),
        );
        assert!(fx.is_empty());
    }

    #[test]
    fn test_renewal_renews_each_subscription_and_rearms() {
        let mut core = core();
        let mut fx = Effects::new();
        core.activate(&mut fx);
        let job = fx
            .iter()
            .find_map(|e| match e {
                Effect::Subscribe { job, .. } => Some(*job),
                _ => None,
            })
            .unwrap();
        core.complete(
            &mut fx,
            job,
            JobResult::Subscribed(Ok(soap_client::SubscriptionResponse {
                sid: "uuid:sub-1".to_string(),
                timeout_seconds: 1800,
            })),
        );

        let mut fx = Effects::new();
        core.renew_all(&mut fx);
        let renew = fx
            .iter()
            .find_map(|e| match e {
                Effect::Renew { job, sid, .. } => Some((*job, sid.clone())),
                _ => None,
            })
            .unwrap();
        assert_eq!(renew.1, "uuid:sub-1");
        assert!(fx.contains(&Effect::StartTimer {
            timer: TimerKind::Renewal,
            after: core.config().renewal_interval,
        }));

        // Failure is dropped and the subscription kept
        let mut fx = Effects::new();
        core.complete(&mut fx, renew.0, JobResult::Renewed(Err(SoapError::HttpStatus(412))));
        assert!(fx.is_empty());
        assert_eq!(core.subscriptions().len(), 1);
    }
}
