use http::Method;

use crate::admission::EndpointCategory;
use crate::config::RouteRule;

/// Maps a request to the endpoint category whose quota applies to it.
pub trait EndpointClassifier: Send + Sync {
    fn classify(&self, method: &Method, path: &str) -> EndpointCategory;
}

#[derive(Debug, Clone)]
struct CompiledRule {
    prefix: String,
    methods: Vec<Method>,
    category: EndpointCategory,
}

impl CompiledRule {
    fn matches(&self, method: &Method, path: &str) -> bool {
        path.starts_with(&self.prefix) && (self.methods.is_empty() || self.methods.contains(method))
    }
}

/// Longest-prefix route table with optional method filters.
#[derive(Debug, Clone)]
pub struct RouteClassifier {
    rules: Vec<CompiledRule>,
    default: EndpointCategory,
}

impl RouteClassifier {
    pub fn new(rules: &[RouteRule], default: EndpointCategory) -> Self {
        let mut rules: Vec<CompiledRule> = rules
            .iter()
            .map(|r| CompiledRule {
                prefix: r.prefix.clone(),
                methods: r
                    .methods
                    .iter()
                    .filter_map(|m| Method::from_bytes(m.to_ascii_uppercase().as_bytes()).ok())
                    .collect(),
                category: r.category,
            })
            .collect();
        // Stable sort keeps declaration order among equal prefixes, so a
        // method-filtered rule declared first shadows a catch-all one.
        rules.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        Self { rules, default }
    }

    pub fn default_category(&self) -> EndpointCategory {
        self.default
    }
}

impl EndpointClassifier for RouteClassifier {
    fn classify(&self, method: &Method, path: &str) -> EndpointCategory {
        self.rules
            .iter()
            .find(|r| r.matches(method, path))
            .map(|r| r.category)
            .unwrap_or(self.default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> RouteClassifier {
        RouteClassifier::new(
            &[
                RouteRule::new("/api", EndpointCategory::ResourceRead),
                RouteRule::new("/api/cattle", EndpointCategory::ResourceWrite)
                    .with_methods(&["post", "PUT", "DELETE"]),
                RouteRule::new("/api/cattle", EndpointCategory::ResourceRead),
                RouteRule::new("/api/cattle/bulk", EndpointCategory::Bulk),
                RouteRule::new("/api/auth", EndpointCategory::Auth),
            ],
            EndpointCategory::Geo,
        )
    }

    #[test]
    fn test_longest_prefix_wins() {
        let c = classifier();
        assert_eq!(c.classify(&Method::POST, "/api/cattle/bulk/import"), EndpointCategory::Bulk);
        assert_eq!(c.classify(&Method::GET, "/api/reports"), EndpointCategory::ResourceRead);
        assert_eq!(c.classify(&Method::POST, "/api/auth/login"), EndpointCategory::Auth);
    }

    #[test]
    fn test_method_filter() {
        let c = classifier();
        assert_eq!(c.classify(&Method::POST, "/api/cattle/17"), EndpointCategory::ResourceWrite);
        assert_eq!(c.classify(&Method::GET, "/api/cattle/17"), EndpointCategory::ResourceRead);
    }

    #[test]
    fn test_unmatched_path_uses_default() {
        let c = classifier();
        assert_eq!(c.classify(&Method::GET, "/healthz"), EndpointCategory::Geo);
        assert_eq!(c.default_category(), EndpointCategory::Geo);
    }
}
