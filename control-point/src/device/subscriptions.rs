//! GENA subscriptions held by one device.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use soap_client::{SoapError, SubscriptionResponse};
use tracing::{debug, warn};

use crate::effect::{Effect, Effects, JobId};

/// An established subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub event_url: String,
    pub service_type: String,
    pub sid: String,
    pub expires_at: Instant,
}

/// Subscriptions by event URL, plus the SUBSCRIBE/renew jobs in flight.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    active: HashMap<String, Subscription>,
    subscribing: HashMap<JobId, (String, String)>,
    renewing: HashMap<JobId, String>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribed or being subscribed.
    pub fn covers(&self, event_url: &str) -> bool {
        self.active.contains_key(event_url)
            || self.subscribing.values().any(|(url, _)| url == event_url)
    }

    pub fn begin_subscribe(&mut self, job: JobId, event_url: &str, service_type: &str) {
        self.subscribing
            .insert(job, (event_url.to_string(), service_type.to_string()));
    }

    pub fn begin_renew(&mut self, job: JobId, event_url: &str) {
        self.renewing.insert(job, event_url.to_string());
    }

    /// Remove the subscriptions whose lease ended at or before `now`. The
    /// device has dropped them, so they can only be subscribed again.
    pub fn take_lapsed(&mut self, now: Instant) -> Vec<Subscription> {
        let mut lapsed: Vec<String> = self
            .active
            .iter()
            .filter(|(_, s)| s.expires_at <= now)
            .map(|(url, _)| url.clone())
            .collect();
        lapsed.sort();
        lapsed
            .into_iter()
            .filter_map(|url| self.active.remove(&url))
            .collect()
    }

    /// Record a SUBSCRIBE answer. A subscription that arrives after the device
    /// went inactive is cancelled right away.
    pub fn subscribed(
        &mut self,
        job: JobId,
        result: Result<SubscriptionResponse, SoapError>,
        keep: bool,
        fx: &mut Effects,
    ) {
        let Some((event_url, service_type)) = self.subscribing.remove(&job) else {
            return;
        };
        match result {
            Ok(response) if keep => {
                debug!(%event_url, sid = %response.sid, "Subscribed");
                self.active.insert(
                    event_url.clone(),
                    Subscription {
                        event_url,
                        service_type,
                        sid: response.sid,
                        expires_at: expiry(response.timeout_seconds),
                    },
                );
            }
            Ok(response) => fx.push(Effect::Unsubscribe {
                event_url,
                sid: response.sid,
            }),
            Err(e) => warn!(%event_url, error = %e, "SUBSCRIBE failed"),
        }
    }

    /// Record a renewal answer. Failures are dropped.
    pub fn renewed(&mut self, job: JobId, result: Result<u32, SoapError>) {
        let Some(event_url) = self.renewing.remove(&job) else {
            return;
        };
        match result {
            Ok(lease) => {
                if let Some(subscription) = self.active.get_mut(&event_url) {
                    subscription.expires_at = expiry(lease);
                }
            }
            Err(e) => debug!(%event_url, error = %e, "Renewal failed"),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.active.values()
    }

    pub fn by_sid(&self, sid: &str) -> Option<&Subscription> {
        self.active.values().find(|s| s.sid == sid)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Forget everything, returning the established subscriptions and the
    /// jobs that were still in flight.
    pub fn drain(&mut self) -> (Vec<Subscription>, Vec<JobId>) {
        let jobs = self
            .subscribing
            .drain()
            .map(|(job, _)| job)
            .chain(self.renewing.drain().map(|(job, _)| job))
            .collect();
        (self.active.drain().map(|(_, s)| s).collect(), jobs)
    }
}

fn expiry(lease_seconds: u32) -> Instant {
    let now = Instant::now();
    now.checked_add(Duration::from_secs(lease_seconds as u64))
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscribe(set: &mut SubscriptionSet, job: u64, url: &str, lease: u32) {
        let mut fx = Effects::new();
        set.begin_subscribe(JobId(job), url, "urn:schemas-upnp-org:service:ContentDirectory:1");
        set.subscribed(
            JobId(job),
            Ok(SubscriptionResponse {
                sid: format!("uuid:sub-{job}"),
                timeout_seconds: lease,
            }),
            true,
            &mut fx,
        );
        assert!(fx.is_empty());
    }

    #[test]
    fn test_failed_renewal_leaves_lease_to_lapse() {
        let mut set = SubscriptionSet::new();
        subscribe(&mut set, 1, "http://dev/a", 1800);
        subscribe(&mut set, 2, "http://dev/b", 1800);

        set.begin_renew(JobId(3), "http://dev/a");
        set.renewed(JobId(3), Err(SoapError::HttpStatus(412)));
        assert_eq!(set.len(), 2);
        assert!(set.take_lapsed(Instant::now()).is_empty());

        let later = Instant::now() + Duration::from_secs(1801);
        let lapsed = set.take_lapsed(later);
        assert_eq!(lapsed.len(), 2);
        assert_eq!(lapsed[0].event_url, "http://dev/a");
        assert!(set.is_empty());
    }

    #[test]
    fn test_renewal_extends_lease() {
        let mut set = SubscriptionSet::new();
        subscribe(&mut set, 1, "http://dev/a", 0);
        assert_eq!(set.take_lapsed(Instant::now()).len(), 1);

        subscribe(&mut set, 2, "http://dev/a", 0);
        set.begin_renew(JobId(3), "http://dev/a");
        set.renewed(JobId(3), Ok(1800));
        assert!(set.take_lapsed(Instant::now()).is_empty());
        assert_eq!(set.by_sid("uuid:sub-2").map(|s| s.event_url.as_str()), Some("http://dev/a"));
    }
}
