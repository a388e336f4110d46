//! Dead code detection
//!
//! A function, class or method is a candidate when nothing calls, extends or implements
//! it. Candidates are then filtered by entry-point files, lifecycle method names and
//! test files, and tiered by whether the extractor marked them exported.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::QueryEngine;
use crate::Result;
use crate::entity::{Entity, EntityType};
use crate::relationship::RelationshipType;

/// File stems treated as program entry points
pub const DEFAULT_ENTRY_POINTS: &[&str] = &[
    "main", "index", "app", "server", "cli", "lib", "mod", "__main__", "__init__",
];

/// Names invoked by runtimes and frameworks rather than by project code
pub const DEFAULT_LIFECYCLE_METHODS: &[&str] = &[
    "constructor",
    "__init__",
    "__new__",
    "__call__",
    "new",
    "main",
    "render",
    "componentDidMount",
    "componentDidUpdate",
    "componentWillUnmount",
    "ngOnInit",
    "ngOnDestroy",
    "setUp",
    "tearDown",
    "beforeEach",
    "afterEach",
    "drop",
    "default",
    "fmt",
    "toString",
    "equals",
    "hashCode",
];

pub const DEFAULT_TEST_PATTERNS: &[&str] = &[
    "**/*.test.*",
    "**/*.spec.*",
    "**/*_test.*",
    "**/test_*.py",
    "**/tests/**",
    "**/test/**",
    "**/__tests__/**",
];

/// How sure the detector is that a finding is unused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Not exported and never referenced
    High,
    /// Exported, so possibly used outside the indexed code
    Medium,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct DeadCodeOptions {
    pub include_tests: bool,
    /// Report at most this many findings
    pub limit: Option<usize>,
    pub entry_points: Vec<String>,
    pub lifecycle_methods: Vec<String>,
    pub test_patterns: Vec<String>,
}

impl Default for DeadCodeOptions {
    fn default() -> Self {
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            include_tests: false,
            limit: None,
            entry_points: owned(DEFAULT_ENTRY_POINTS),
            lifecycle_methods: owned(DEFAULT_LIFECYCLE_METHODS),
            test_patterns: owned(DEFAULT_TEST_PATTERNS),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeadCodeFinding {
    pub entity: Entity,
    pub confidence: Confidence,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadCodeSummary {
    /// Findings before the limit was applied
    pub total: usize,
    pub reported: usize,
    pub truncated: bool,
    pub by_confidence: BTreeMap<Confidence, usize>,
    pub by_type: BTreeMap<EntityType, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeadCodeReport {
    pub findings: Vec<DeadCodeFinding>,
    pub summary: DeadCodeSummary,
}

/// Compiled exclusion rules
struct Exclusions {
    entry_points: HashSet<String>,
    lifecycle_methods: HashSet<String>,
    test_patterns: Vec<glob::Pattern>,
    include_tests: bool,
}

impl Exclusions {
    fn new(options: &DeadCodeOptions) -> Self {
        let test_patterns = options
            .test_patterns
            .iter()
            .filter_map(|pattern| match glob::Pattern::new(pattern) {
                Ok(compiled) => Some(compiled),
                Err(e) => {
                    tracing::warn!("Ignoring invalid test pattern '{}': {}", pattern, e);
                    None
                }
            })
            .collect();

        Self {
            entry_points: options.entry_points.iter().cloned().collect(),
            lifecycle_methods: options.lifecycle_methods.iter().cloned().collect(),
            test_patterns,
            include_tests: options.include_tests,
        }
    }

    fn is_entry_point(&self, entity: &Entity) -> bool {
        Path::new(&entity.file_path)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .is_some_and(|stem| self.entry_points.contains(stem))
    }

    fn is_lifecycle(&self, entity: &Entity) -> bool {
        self.lifecycle_methods.contains(&entity.name)
    }

    fn is_test(&self, entity: &Entity) -> bool {
        self.test_patterns
            .iter()
            .any(|pattern| pattern.matches(&entity.file_path))
    }

    fn excludes(&self, entity: &Entity) -> bool {
        self.is_entry_point(entity)
            || self.is_lifecycle(entity)
            || (!self.include_tests && self.is_test(entity))
    }
}

impl QueryEngine<'_> {
    /// Functions, classes and methods nothing calls, extends or implements
    pub fn find_dead_code(&self, options: &DeadCodeOptions) -> Result<DeadCodeReport> {
        let exclusions = Exclusions::new(options);

        self.db.snapshot(|| {
            let relationships = self.relationships();
            let mut referenced: HashSet<String> = HashSet::new();
            for rel_type in [
                RelationshipType::Calls,
                RelationshipType::Extends,
                RelationshipType::Implements,
            ] {
                referenced.extend(relationships.find_by_type(rel_type)?.into_iter().map(|r| r.target_id));
            }

            let mut findings = Vec::new();
            for entity in self.entities().get_all()? {
                if !entity.entity_type.is_code_unit()
                    || referenced.contains(&entity.id)
                    || exclusions.excludes(&entity)
                {
                    continue;
                }

                let (confidence, reason) = if entity.is_exported() {
                    (Confidence::Medium, "exported but never referenced internally")
                } else {
                    (Confidence::High, "never called, extended or implemented")
                };
                findings.push(DeadCodeFinding {
                    entity,
                    confidence,
                    reason: reason.to_string(),
                });
            }

            findings.sort_by(|a, b| {
                a.confidence
                    .cmp(&b.confidence)
                    .then_with(|| a.entity.file_path.cmp(&b.entity.file_path))
                    .then_with(|| a.entity.start_line.cmp(&b.entity.start_line))
            });

            let total = findings.len();
            if let Some(limit) = options.limit {
                findings.truncate(limit);
            }

            let mut summary = DeadCodeSummary {
                total,
                reported: findings.len(),
                truncated: findings.len() < total,
                ..Default::default()
            };
            for finding in &findings {
                *summary.by_confidence.entry(finding.confidence).or_default() += 1;
                *summary.by_type.entry(finding.entity.entity_type).or_default() += 1;
            }

            tracing::debug!(
                "Dead code: {} candidates, {} reported",
                summary.total,
                summary.reported
            );

            Ok(DeadCodeReport { findings, summary })
        })
    }
}
