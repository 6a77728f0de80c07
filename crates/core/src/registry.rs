//! System Registry: the declarative tree of external systems.
//!
//! Each top-level entry is an external system keyed by its code. A system may
//! carry `dependants`, which are only dispatched once their parent has
//! succeeded for a submission. The tree is immutable once loaded and is passed
//! explicitly to the scheduler, dispatcher and exporter.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Substring replaced by the 1-based repetition counter inside grouping templates.
pub const GROUP_COUNTER_PLACEHOLDER: &str = "%#%";

/// Maximum nesting depth of the registry tree (top level counts as 1).
pub const MAX_REGISTRY_DEPTH: usize = 8;

const BUILTIN_REGISTRY: &str = include_str!("registry/builtin.yaml");

/// Ordered mapping of system code to its definition. Declaration order is kept.
pub type SystemMap = IndexMap<String, SystemNode>;

// ── Node definition ─────────────────────────────────────────────────

/// How a system receives submission data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SystemKind {
    /// JSON POST to an HTTP endpoint that answers with an external identifier.
    #[serde(rename = "api")]
    ApiCall,
    /// Delimited text artifact.
    #[serde(rename = "csv")]
    CsvExport,
}

impl fmt::Display for SystemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApiCall => write!(f, "api"),
            Self::CsvExport => write!(f, "csv"),
        }
    }
}

/// Retry behaviour applied when an API dispatch fails transiently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
    /// `None` retries indefinitely.
    #[serde(default)]
    pub max_retries: Option<u32>,
}

fn default_interval_seconds() -> u64 {
    300
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_seconds(),
            max_retries: Some(3),
        }
    }
}

impl RetryPolicy {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

/// One output column: `name` is the display name, `id` the key looked up in submission data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleField {
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(rename = "id")]
    pub data_key: String,
}

impl SimpleField {
    pub fn new(display_name: impl Into<String>, data_key: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            data_key: data_key.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingTag {
    Grouping,
}

/// A block of simple fields repeated `count` times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupingField {
    #[serde(rename = "type")]
    pub tag: GroupingTag,
    pub count: u32,
    pub template: Vec<SimpleField>,
}

/// Entry of a payload/CSV template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TemplateField {
    Grouping(GroupingField),
    Simple(SimpleField),
}

impl TemplateField {
    pub fn simple(display_name: impl Into<String>, data_key: impl Into<String>) -> Self {
        Self::Simple(SimpleField::new(display_name, data_key))
    }

    pub fn grouping(count: u32, template: Vec<SimpleField>) -> Self {
        Self::Grouping(GroupingField {
            tag: GroupingTag::Grouping,
            count,
            template,
        })
    }
}

/// Definition of one external system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemNode {
    #[serde(rename = "type")]
    pub kind: SystemKind,
    /// Name of the environment variable holding the endpoint, resolved at dispatch time.
    #[serde(rename = "env_var", default, skip_serializing_if = "Option::is_none")]
    pub endpoint_ref: Option<String>,
    #[serde(default)]
    pub template: Vec<TemplateField>,
    #[serde(rename = "retry", default)]
    pub retry_policy: RetryPolicy,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub dependants: SystemMap,
}

impl SystemNode {
    pub fn api(endpoint_ref: impl Into<String>) -> Self {
        Self {
            kind: SystemKind::ApiCall,
            endpoint_ref: Some(endpoint_ref.into()),
            template: Vec::new(),
            retry_policy: RetryPolicy::default(),
            dependants: SystemMap::new(),
        }
    }

    pub fn csv() -> Self {
        Self {
            kind: SystemKind::CsvExport,
            endpoint_ref: None,
            template: Vec::new(),
            retry_policy: RetryPolicy::default(),
            dependants: SystemMap::new(),
        }
    }

    pub fn with_template(mut self, template: Vec<TemplateField>) -> Self {
        self.template = template;
        self
    }

    pub fn with_retry(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_dependant(mut self, code: impl Into<String>, node: SystemNode) -> Self {
        self.dependants.insert(code.into(), node);
        self
    }
}

// ── Paths ───────────────────────────────────────────────────────────

/// Location of a node in the registry tree, from the top-level code downwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SystemPath(Vec<String>);

impl SystemPath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn child(&self, code: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(code.to_string());
        Self(segments)
    }

    /// Code of the addressed system (last segment).
    pub fn code(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or("")
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl<S: Into<String>> FromIterator<S> for SystemPath {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for SystemPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

// ── Registry ────────────────────────────────────────────────────────

/// Immutable, validated tree of external systems.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemRegistry {
    systems: SystemMap,
}

impl SystemRegistry {
    /// Build a registry from an already-constructed map, validating it.
    pub fn new(systems: SystemMap) -> Result<Self, CoreError> {
        validate_level(&systems, &SystemPath::root())?;
        Ok(Self { systems })
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, CoreError> {
        let systems: SystemMap = serde_yaml::from_str(yaml)?;
        Self::new(systems)
    }

    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    /// The registry shipped with the service.
    pub fn builtin() -> Result<Self, CoreError> {
        Self::from_yaml_str(BUILTIN_REGISTRY)
    }

    /// Load from `path` when given, otherwise fall back to the built-in registry.
    pub fn load_or_builtin(path: Option<&Path>) -> Result<Self, CoreError> {
        match path {
            Some(p) => {
                tracing::info!(path = %p.display(), "loading system registry");
                Self::load(p)
            }
            None => Self::builtin(),
        }
    }

    /// Top-level systems.
    pub fn systems(&self) -> &SystemMap {
        &self.systems
    }

    /// Look up a node by its path.
    pub fn node(&self, path: &SystemPath) -> Option<&SystemNode> {
        let (first, rest) = path.segments().split_first()?;
        let mut node = self.systems.get(first)?;
        for code in rest {
            node = node.dependants.get(code)?;
        }
        Some(node)
    }

    /// Every CSV-kind node in the tree, depth-first in declaration order.
    pub fn csv_nodes(&self) -> Vec<(SystemPath, &SystemNode)> {
        let mut out = Vec::new();
        collect_kind(&self.systems, &SystemPath::root(), SystemKind::CsvExport, &mut out);
        out
    }

    /// Depth of the deepest branch (top level = 1, empty registry = 0).
    pub fn depth(&self) -> usize {
        map_depth(&self.systems)
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }
}

fn collect_kind<'a>(
    systems: &'a SystemMap,
    parent: &SystemPath,
    kind: SystemKind,
    out: &mut Vec<(SystemPath, &'a SystemNode)>,
) {
    for (code, node) in systems {
        let path = parent.child(code);
        if node.kind == kind {
            out.push((path.clone(), node));
        }
        collect_kind(&node.dependants, &path, kind, out);
    }
}

fn map_depth(systems: &SystemMap) -> usize {
    systems
        .values()
        .map(|node| 1 + map_depth(&node.dependants))
        .max()
        .unwrap_or(0)
}

fn validate_level(systems: &SystemMap, parent: &SystemPath) -> Result<(), CoreError> {
    if parent.depth() >= MAX_REGISTRY_DEPTH && !systems.is_empty() {
        return Err(CoreError::DepthExceeded { max: MAX_REGISTRY_DEPTH });
    }
    for (code, node) in systems {
        let path = parent.child(code);
        if code.trim().is_empty() {
            return Err(invalid(&path, "system code must not be empty"));
        }
        if node.kind == SystemKind::ApiCall
            && node.endpoint_ref.as_deref().map_or(true, str::is_empty)
        {
            // Dispatch reports this as a configuration error; surface it early too.
            tracing::warn!(system = %path, "api system has no env_var endpoint reference");
        }
        if node.retry_policy.max_retries == Some(0) {
            return Err(invalid(&path, "max_retries must be at least 1"));
        }
        for field in &node.template {
            if let TemplateField::Grouping(group) = field {
                if group.count == 0 {
                    return Err(invalid(&path, "grouping count must be at least 1"));
                }
                if group.template.is_empty() {
                    return Err(invalid(&path, "grouping template must not be empty"));
                }
            }
        }
        validate_level(&node.dependants, &path)?;
    }
    Ok(())
}

fn invalid(path: &SystemPath, reason: &str) -> CoreError {
    CoreError::InvalidRegistry {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}
