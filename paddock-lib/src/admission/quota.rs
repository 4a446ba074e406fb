use std::time::Duration;

use super::category::{EndpointCategory, RoleTag};
use crate::error::{GateError, Result};

const CATEGORIES: usize = EndpointCategory::ALL.len();
const ROLES: usize = RoleTag::ALL.len();

/// Quota for one key: at most `max_requests` hits per `window`.
///
/// Values are copied out of the [`QuotaTable`] for every check, so a scaled
/// copy never leaks back into shared configuration. Outside this crate a
/// quota can only be built through [`QuotaConfig::new`], so the window is
/// never zero.
///
/// ```compile_fail
/// use paddock_lib::admission::QuotaConfig;
/// let _ = QuotaConfig { window: std::time::Duration::ZERO, max_requests: 1 };
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaConfig {
    pub(crate) window: Duration,
    pub(crate) max_requests: u32,
}

impl QuotaConfig {
    pub fn new(window: Duration, max_requests: u32) -> Result<Self> {
        if window.is_zero() {
            return Err(GateError::Config("quota window must be > 0".to_string()));
        }
        Ok(Self { window, max_requests })
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window_ms(&self) -> u128 {
        self.window.as_millis()
    }
}

/// Role-sensitive quota matrix: `[EndpointCategory][RoleTag] -> QuotaConfig`,
/// plus the fallback applied to unauthenticated callers.
///
/// Read-only at request time. Cells are optional so a table assembled in code
/// can be checked with [`QuotaTable::missing_pairs`] before use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaTable {
    cells: [[Option<QuotaConfig>; ROLES]; CATEGORIES],
    fallback: QuotaConfig,
}

impl QuotaTable {
    /// Create an empty table with only the unauthenticated fallback set.
    pub fn new(fallback: QuotaConfig) -> Self {
        Self { cells: [[None; ROLES]; CATEGORIES], fallback }
    }

    pub fn set(&mut self, category: EndpointCategory, role: RoleTag, quota: QuotaConfig) {
        self.cells[category.index()][role.index()] = Some(quota);
    }

    /// Builder form of [`QuotaTable::set`].
    pub fn with(mut self, category: EndpointCategory, role: RoleTag, quota: QuotaConfig) -> Self {
        self.set(category, role, quota);
        self
    }

    /// Set the same quota for every role of a category.
    pub fn set_category(&mut self, category: EndpointCategory, quota: QuotaConfig) {
        for role in RoleTag::ALL {
            self.set(category, role, quota);
        }
    }

    pub fn lookup(&self, category: EndpointCategory, role: RoleTag) -> Option<QuotaConfig> {
        self.cells[category.index()][role.index()]
    }

    pub fn fallback(&self) -> QuotaConfig {
        self.fallback
    }

    /// Every (category, role) pair without a configured quota.
    pub fn missing_pairs(&self) -> Vec<(EndpointCategory, RoleTag)> {
        EndpointCategory::ALL
            .into_iter()
            .flat_map(|c| RoleTag::ALL.into_iter().map(move |r| (c, r)))
            .filter(|(c, r)| self.lookup(*c, *r).is_none())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quota(secs: u64, max: u32) -> QuotaConfig {
        QuotaConfig { window: Duration::from_secs(secs), max_requests: max }
    }

    #[test]
    fn test_zero_window_is_rejected() {
        assert!(QuotaConfig::new(Duration::ZERO, 10).is_err());
        assert!(QuotaConfig::new(Duration::from_secs(1), 0).is_ok());
    }

    #[test]
    fn test_accessors_expose_validated_values() -> Result<()> {
        let quota = QuotaConfig::new(Duration::from_secs(90), 12)?;
        assert_eq!(quota.window(), Duration::from_secs(90));
        assert_eq!(quota.max_requests(), 12);
        assert_eq!(quota.window_ms(), 90_000);
        Ok(())
    }

    #[test]
    fn test_lookup_returns_configured_cell() {
        let table = QuotaTable::new(quota(60, 10)).with(
            EndpointCategory::ResourceRead,
            RoleTag::Worker,
            quota(60, 3),
        );

        assert_eq!(
            table.lookup(EndpointCategory::ResourceRead, RoleTag::Worker),
            Some(quota(60, 3))
        );
        assert_eq!(table.lookup(EndpointCategory::ResourceRead, RoleTag::Manager), None);
        assert_eq!(table.fallback(), quota(60, 10));
    }

    #[test]
    fn test_missing_pairs_shrinks_as_categories_fill() {
        let mut table = QuotaTable::new(quota(60, 10));
        assert_eq!(table.missing_pairs().len(), 48);

        table.set_category(EndpointCategory::Geo, quota(60, 5));
        let missing = table.missing_pairs();
        assert_eq!(missing.len(), 42);
        assert!(missing.iter().all(|(c, _)| *c != EndpointCategory::Geo));
    }
}
