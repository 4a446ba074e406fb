use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Endpoint classification assigned at route registration time.
///
/// Every route of the farm API falls into exactly one category, and quotas are
/// configured per category. The string form (`as_str`) is part of the counter
/// key, so it must stay stable across deployments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointCategory {
    /// Login, token refresh, password reset
    Auth,
    /// Reads of cattle, health, finance and inventory records
    ResourceRead,
    /// Creates, updates and deletes of records
    ResourceWrite,
    /// Aggregated reports and exports
    Reports,
    /// Document and image uploads
    FileUpload,
    /// Bulk imports and batch mutations
    Bulk,
    /// Endpoints that call third-party services
    ExternalCall,
    /// Geolocation and mapping endpoints
    Geo,
}

impl EndpointCategory {
    pub const ALL: [EndpointCategory; 8] = [
        EndpointCategory::Auth,
        EndpointCategory::ResourceRead,
        EndpointCategory::ResourceWrite,
        EndpointCategory::Reports,
        EndpointCategory::FileUpload,
        EndpointCategory::Bulk,
        EndpointCategory::ExternalCall,
        EndpointCategory::Geo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointCategory::Auth => "auth",
            EndpointCategory::ResourceRead => "resource_read",
            EndpointCategory::ResourceWrite => "resource_write",
            EndpointCategory::Reports => "reports",
            EndpointCategory::FileUpload => "file_upload",
            EndpointCategory::Bulk => "bulk",
            EndpointCategory::ExternalCall => "external_call",
            EndpointCategory::Geo => "geo",
        }
    }

    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for EndpointCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EndpointCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EndpointCategory::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown endpoint category '{s}'"))
    }
}

/// Caller privilege tier, in ascending order of privilege.
///
/// Only used as a quota lookup key; hierarchy checks belong to the
/// authorization layer in front of the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleTag {
    Guest,
    Worker,
    Veterinarian,
    Manager,
    Admin,
    SuperAdmin,
}

impl RoleTag {
    pub const ALL: [RoleTag; 6] = [
        RoleTag::Guest,
        RoleTag::Worker,
        RoleTag::Veterinarian,
        RoleTag::Manager,
        RoleTag::Admin,
        RoleTag::SuperAdmin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoleTag::Guest => "guest",
            RoleTag::Worker => "worker",
            RoleTag::Veterinarian => "veterinarian",
            RoleTag::Manager => "manager",
            RoleTag::Admin => "admin",
            RoleTag::SuperAdmin => "super_admin",
        }
    }

    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for RoleTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RoleTag::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown role '{s}'"))
    }
}
