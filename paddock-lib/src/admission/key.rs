use serde::Serialize;

use super::category::{EndpointCategory, RoleTag};

/// Who is calling, as reported by the identity resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    /// Authenticated user id, absent for anonymous callers
    pub user_id: Option<String>,
    pub role: Option<RoleTag>,
    /// Client address, used as the key for anonymous callers
    pub network_address: String,
}

impl Identity {
    pub fn user(user_id: impl Into<String>, role: RoleTag, network_address: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            role: Some(role),
            network_address: network_address.into(),
        }
    }

    pub fn anonymous(network_address: impl Into<String>) -> Self {
        Self { user_id: None, role: None, network_address: network_address.into() }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    /// Short label for logs and events: the user id, or the address.
    pub fn label(&self) -> String {
        match &self.user_id {
            Some(id) => format!("user:{id}"),
            None => format!("ip:{}", self.network_address),
        }
    }
}

/// Counter key for the standard per-category lane.
pub fn resolve_key(identity: &Identity, category: EndpointCategory) -> String {
    match &identity.user_id {
        Some(user_id) => format!("user:{user_id}:{category}"),
        None => format!("ip:{}:{category}", identity.network_address),
    }
}

/// Counter key for the priority lane.
pub fn priority_key(user_id: &str, lane: &str) -> String {
    format!("priority:{user_id}:{lane}")
}
