use ipnet::IpNet;
use serde::Deserialize;

/// How callers are identified from request headers
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct IdentityConfig {
    /// Header carrying the authenticated user id (set by the auth layer)
    /// Default: "x-user-id"
    #[serde(default = "default_user_header")]
    pub user_header: String,
    /// Header carrying the caller's role tag
    /// Default: "x-user-role"
    #[serde(default = "default_role_header")]
    pub role_header: String,
    /// Peers allowed to set X-Forwarded-For
    /// X-Forwarded-For is read only when the peer is in one of these networks; the
    /// rightmost hop outside them is taken as the client
    /// Supports CIDR notation: ["10.0.0.0/8", "::1/128"]
    /// Default: empty (always use the peer address)
    #[serde(default)]
    #[serde(deserialize_with = "deserialize_ip_networks")]
    pub trusted_proxies: Vec<IpNet>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            user_header: default_user_header(),
            role_header: default_role_header(),
            trusted_proxies: vec![],
        }
    }
}

fn default_user_header() -> String {
    "x-user-id".to_string()
}

fn default_role_header() -> String {
    "x-user-role".to_string()
}

/// Custom deserializer for IP networks that handles parsing errors gracefully
fn deserialize_ip_networks<'de, D>(deserializer: D) -> Result<Vec<IpNet>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let strings: Vec<String> = Vec::deserialize(deserializer)?;
    let mut networks = Vec::new();

    for s in strings {
        match s.parse::<IpNet>() {
            Ok(net) => networks.push(net),
            Err(e) => {
                return Err(serde::de::Error::custom(format!("Invalid IP network '{}': {}", s, e)));
            }
        }
    }

    Ok(networks)
}
