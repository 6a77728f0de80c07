//! Resolution of registry endpoint references at dispatch time.

use std::collections::HashMap;

/// Turns an endpoint reference (an environment variable name) into a URL.
pub trait EndpointResolver: Send + Sync {
    /// `None` when the reference is unset or blank.
    fn resolve(&self, endpoint_ref: &str) -> Option<String>;
}

/// Reads the process environment on every call, so the same registry works
/// across deployments and picks up the live value.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvResolver;

impl EndpointResolver for EnvResolver {
    fn resolve(&self, endpoint_ref: &str) -> Option<String> {
        std::env::var(endpoint_ref)
            .ok()
            .filter(|v| !v.trim().is_empty())
    }
}

/// Fixed mapping, for tests and embedded use.
#[derive(Debug, Clone, Default)]
pub struct MapResolver(HashMap<String, String>);

impl MapResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, endpoint_ref: impl Into<String>, url: impl Into<String>) -> Self {
        self.0.insert(endpoint_ref.into(), url.into());
        self
    }
}

impl EndpointResolver for MapResolver {
    fn resolve(&self, endpoint_ref: &str) -> Option<String> {
        self.0
            .get(endpoint_ref)
            .filter(|v| !v.trim().is_empty())
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_resolver_ignores_blank_values() {
        let resolver = MapResolver::new()
            .with("DBI_SYSTEM_URL", "http://dbi.local/intake")
            .with("FIRE_SYSTEM_URL", "  ");
        assert_eq!(
            resolver.resolve("DBI_SYSTEM_URL").as_deref(),
            Some("http://dbi.local/intake")
        );
        assert_eq!(resolver.resolve("FIRE_SYSTEM_URL"), None);
        assert_eq!(resolver.resolve("PLANNING_SYSTEM_URL"), None);
    }

    #[test]
    fn env_resolver_misses_unset_variable() {
        assert_eq!(EnvResolver.resolve("ADU_TEST_ENDPOINT_THAT_IS_NEVER_SET"), None);
    }
}
