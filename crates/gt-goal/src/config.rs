//! Goal Tree configuration
//!
//! Loaded from `.goaltree/config.toml`. Every key has a default, so an empty
//! or missing file yields the stock behaviour.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::GoalError;
use crate::model::DEFAULT_ESTIMATED_TIME;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoalTreeConfig {
    /// How progress is derived and committed.
    #[serde(default)]
    pub aggregation: AggregationConfig,

    /// Limits on the goal tree shape.
    #[serde(default)]
    pub hierarchy: HierarchyConfig,

    /// Task defaults.
    #[serde(default)]
    pub tasks: TaskConfig,
}

/// How a goal without subgoals gets its progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildlessProgress {
    /// Progress is whatever the user last set. Task changes only trigger a
    /// recompute of the ancestors.
    #[default]
    Manual,

    /// Progress is the share of completed tasks among non-cancelled tasks.
    TaskRatio,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationConfig {
    #[serde(default)]
    pub childless_progress: ChildlessProgress,

    /// Attempts to re-run a recompute whose versioned write lost a race.
    #[serde(default = "default_max_commit_retries")]
    pub max_commit_retries: u32,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            childless_progress: ChildlessProgress::default(),
            max_commit_retries: default_max_commit_retries(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyConfig {
    /// Deepest ancestor chain accepted when validating a parent assignment.
    #[serde(default = "default_max_tree_depth")]
    pub max_tree_depth: usize,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            max_tree_depth: default_max_tree_depth(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Minutes assigned to new tasks that don't state an estimate.
    #[serde(default = "default_estimated_time")]
    pub default_estimated_time: u32,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            default_estimated_time: default_estimated_time(),
        }
    }
}

// Serde default functions
fn default_max_commit_retries() -> u32 {
    3
}

fn default_max_tree_depth() -> usize {
    64
}

fn default_estimated_time() -> u32 {
    DEFAULT_ESTIMATED_TIME
}

impl GoalTreeConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self, GoalError> {
        let content = std::fs::read_to_string(path).map_err(|e| GoalError::Config {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| GoalError::Config {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        if config.hierarchy.max_tree_depth == 0 {
            return Err(GoalError::Config {
                path: path.display().to_string(),
                reason: "hierarchy.max_tree_depth must be at least 1".into(),
            });
        }
        Ok(config)
    }

    /// Try to load config, returning the default if the file is missing or
    /// malformed.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("{}; using default configuration", e);
            Self::default()
        })
    }
}

/// Where a project keeps its Goal Tree state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    /// SQLite database file.
    pub db_path: PathBuf,

    /// TOML configuration file.
    pub config_path: PathBuf,
}

impl ProjectPaths {
    /// Standard `.goaltree/` layout under a project root.
    pub fn for_project(project_root: impl AsRef<Path>) -> Self {
        let dir = project_root.as_ref().join(".goaltree");
        Self {
            db_path: dir.join("goaltree.db"),
            config_path: dir.join("config.toml"),
        }
    }
}
