use serde::Deserialize;

use crate::admission::EndpointCategory;

/// Route classification rule
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RouteRule {
    /// URL path prefix to match (e.g., "/api/cattle", "/api/reports")
    /// The longest matching prefix wins
    pub prefix: String,
    /// Category assigned to matching requests
    pub category: EndpointCategory,
    /// HTTP methods this rule applies to (e.g., ["POST", "PUT"])
    /// Default: empty (any method)
    #[serde(default)]
    pub methods: Vec<String>,
}

impl RouteRule {
    pub fn new(prefix: impl Into<String>, category: EndpointCategory) -> Self {
        Self { prefix: prefix.into(), category, methods: vec![] }
    }

    pub fn with_methods(mut self, methods: &[&str]) -> Self {
        self.methods = methods.iter().map(|m| m.to_string()).collect();
        self
    }
}
