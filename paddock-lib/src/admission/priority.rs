//! Privileged admission paths: the priority lane and the emergency override.

use subtle::ConstantTimeEq;

use super::category::RoleTag;
use super::key::{priority_key, Identity};
use super::limiter::{AdmissionEngine, AdmissionResult};
use super::quota::QuotaConfig;

/// Independent counter lane for one privileged role.
///
/// Keys live under `priority:{user}:{lane}` and never collide with the
/// per-category keys, so a privileged caller's standard counters are
/// unaffected by priority traffic and vice versa.
#[derive(Debug, Clone, PartialEq)]
pub struct PriorityLane {
    pub role: RoleTag,
    pub lane: String,
    pub quota: QuotaConfig,
    /// When set, eligible callers skip the standard per-category check.
    pub skip_standard: bool,
}

impl PriorityLane {
    /// Only authenticated callers holding exactly the designated role qualify.
    pub fn is_eligible(&self, identity: &Identity) -> bool {
        identity.user_id.is_some() && identity.role == Some(self.role)
    }

    /// Run the priority check. `None` when the caller is not eligible.
    pub fn check(&self, engine: &AdmissionEngine, identity: &Identity) -> Option<AdmissionResult> {
        if !self.is_eligible(identity) {
            return None;
        }
        let user_id = identity.user_id.as_deref()?;
        let key = priority_key(user_id, &self.lane);
        Some(engine.check_and_increment(&key, &self.quota))
    }
}

/// Total bypass of admission control, guarded by a shared secret.
#[derive(Clone, Default)]
pub struct EmergencyOverride {
    secret: Option<Vec<u8>>,
}

impl EmergencyOverride {
    /// An empty secret disables the override.
    pub fn new(secret: Option<String>) -> Self {
        Self { secret: secret.filter(|s| !s.is_empty()).map(String::into_bytes) }
    }

    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    /// Compare the presented token against the configured secret in constant time.
    pub fn check(&self, presented: Option<&str>) -> bool {
        match (&self.secret, presented) {
            (Some(secret), Some(token)) => secret.as_slice().ct_eq(token.as_bytes()).into(),
            _ => false,
        }
    }
}

impl std::fmt::Debug for EmergencyOverride {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmergencyOverride")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::clock::ManualClock;
    use crate::admission::store::CounterStore;
    use std::sync::Arc;
    use std::time::Duration;

    fn lane() -> PriorityLane {
        PriorityLane {
            role: RoleTag::SuperAdmin,
            lane: "default".to_string(),
            quota: QuotaConfig { window: Duration::from_secs(60), max_requests: 2 },
            skip_standard: false,
        }
    }

    #[test]
    fn test_priority_lane_requires_role_and_user() {
        let engine = AdmissionEngine::new(
            Arc::new(CounterStore::new(2)),
            Arc::new(ManualClock::default()),
        );
        let lane = lane();

        let admin = Identity::user("1", RoleTag::Admin, "10.0.0.1");
        assert!(lane.check(&engine, &admin).is_none());

        let mut anonymous = Identity::anonymous("10.0.0.1");
        anonymous.role = Some(RoleTag::SuperAdmin);
        assert!(lane.check(&engine, &anonymous).is_none());

        let root = Identity::user("1", RoleTag::SuperAdmin, "10.0.0.1");
        assert!(lane.check(&engine, &root).is_some_and(|r| r.allowed));
        assert!(engine.store().get("priority:1:default").is_some());
    }

    #[test]
    fn test_priority_lane_enforces_its_own_quota() {
        let engine = AdmissionEngine::new(
            Arc::new(CounterStore::new(2)),
            Arc::new(ManualClock::default()),
        );
        let lane = lane();
        let root = Identity::user("9", RoleTag::SuperAdmin, "10.0.0.1");

        let results: Vec<_> = (0..3).filter_map(|_| lane.check(&engine, &root)).collect();
        assert_eq!(results.iter().filter(|r| r.allowed).count(), 2);
        assert_eq!(results[2].total_hits, 3);
    }

    #[test]
    fn test_emergency_override_matches_only_exact_token() {
        let gate = EmergencyOverride::new(Some("s3cret-token".to_string()));
        assert!(gate.check(Some("s3cret-token")));
        assert!(!gate.check(Some("s3cret-tokeN")));
        assert!(!gate.check(Some("s3cret")));
        assert!(!gate.check(None));
    }

    #[test]
    fn test_empty_secret_disables_override() {
        let gate = EmergencyOverride::new(Some(String::new()));
        assert!(!gate.is_enabled());
        assert!(!gate.check(Some("")));
        assert!(!format!("{gate:?}").contains("secret"));
    }
}
