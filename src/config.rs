use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::indexer::IndexerOptions;
use crate::query::cycles::DEFAULT_MAX_CYCLES;
use crate::query::{CycleOptions, DeadCodeOptions};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CodegraphConfig {
    pub database: Option<String>,
    #[serde(default)]
    pub indexer: IndexerConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    pub use_hash_check: bool,
    pub exclude: Vec<String>,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            use_hash_check: true,
            exclude: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub max_cycles: usize,
    pub blast_radius_depth: u32,
    pub entry_points: Vec<String>,
    pub lifecycle_methods: Vec<String>,
    pub test_patterns: Vec<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let defaults = DeadCodeOptions::default();
        Self {
            max_cycles: DEFAULT_MAX_CYCLES,
            blast_radius_depth: 3,
            entry_points: defaults.entry_points,
            lifecycle_methods: defaults.lifecycle_methods,
            test_patterns: defaults.test_patterns,
        }
    }
}

impl CodegraphConfig {
    pub fn indexer_options(&self) -> IndexerOptions {
        IndexerOptions {
            use_hash_check: self.indexer.use_hash_check,
            exclude: self.indexer.exclude.clone(),
        }
    }

    pub fn cycle_options(&self, entity_name: Option<String>) -> CycleOptions {
        CycleOptions {
            entity_name,
            max_cycles: self.analysis.max_cycles,
        }
    }

    pub fn dead_code_options(&self, include_tests: bool, limit: Option<usize>) -> DeadCodeOptions {
        DeadCodeOptions {
            include_tests,
            limit,
            entry_points: self.analysis.entry_points.clone(),
            lifecycle_methods: self.analysis.lifecycle_methods.clone(),
            test_patterns: self.analysis.test_patterns.clone(),
        }
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("codegraph.toml")
}

pub fn default_database_path_in(base: &Path) -> PathBuf {
    base.join(".codegraph").join("graph.db")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<CodegraphConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: CodegraphConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &CodegraphConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::dead_code::{
        DEFAULT_ENTRY_POINTS, DEFAULT_LIFECYCLE_METHODS, DEFAULT_TEST_PATTERNS,
    };

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("codegraph.toml"))).unwrap().is_none());
    }

    #[test]
    fn test_sections_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codegraph.toml");
        std::fs::write(
            &path,
            "database = \"graph.db\"\n\n[analysis]\nmax_cycles = 5\n",
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap().unwrap();
        assert_eq!(config.database.as_deref(), Some("graph.db"));
        assert!(config.indexer.use_hash_check);
        assert_eq!(config.analysis.max_cycles, 5);
        assert_eq!(config.analysis.blast_radius_depth, 3);
        assert_eq!(config.analysis.entry_points.len(), DEFAULT_ENTRY_POINTS.len());
        assert_eq!(config.analysis.lifecycle_methods.len(), DEFAULT_LIFECYCLE_METHODS.len());
        assert_eq!(config.analysis.test_patterns.len(), DEFAULT_TEST_PATTERNS.len());
        assert_eq!(config.cycle_options(None).max_cycles, 5);
    }

    #[test]
    fn test_write_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codegraph.toml");
        let mut config = CodegraphConfig::default();
        config.indexer.exclude.push("generated/".to_string());

        write_config(&path, &config, false).unwrap();
        assert!(write_config(&path, &config, false).is_err());
        write_config(&path, &config, true).unwrap();

        let loaded = load_config(Some(&path)).unwrap().unwrap();
        assert_eq!(loaded.indexer_options().exclude, vec!["generated/".to_string()]);
    }

    #[test]
    fn test_database_path_and_dir() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = default_database_path_in(dir.path());
        assert!(db_path.ends_with(".codegraph/graph.db"));

        ensure_db_dir(&db_path).unwrap();
        assert!(dir.path().join(".codegraph").is_dir());
    }
}
