//! Scenario discovery, parsing and structural validation.
//!
//! [`ScenarioCatalog`] walks a directory tree of `*.yaml` / `*.yml` files on
//! first use, renders each file's template variables, and indexes every
//! definition that passes structural validation. Broken files and broken
//! definitions are logged and skipped; they never take down their siblings.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use rand::seq::IndexedRandom;
use rand::Rng;
use serde::Deserialize;
use serde_yaml::Value;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::context::{render, ContextGenerator};
use super::error::{ScenarioError, ScenarioResult};
use super::model::{
    Category, CheckKind, Difficulty, Distribution, Scenario, ValidationCheck, ValidationRules,
};

// ---------------------------------------------------------------------------
// Raw definitions
// ---------------------------------------------------------------------------

/// Loosely typed mirror of a scenario mapping.
///
/// Every field is optional so that validation can report all problems at
/// once instead of stopping at the first missing key.
#[derive(Debug, Deserialize)]
struct RawScenario {
    id: Option<String>,
    category: Option<String>,
    difficulty: Option<String>,
    task: Option<String>,
    points: Option<i64>,
    distribution: Option<String>,
    #[serde(default)]
    setup_commands: Vec<String>,
    #[serde(default)]
    hints: Vec<String>,
    time_limit: Option<i64>,
    #[serde(default)]
    tags: Vec<String>,
    validation: Option<RawValidation>,
}

#[derive(Debug, Deserialize)]
struct RawValidation {
    #[serde(default)]
    checks: Vec<Value>,
}

/// Split a rendered file into scenario entries.
///
/// Accepts a single mapping, a top-level list, or several `---` documents
/// each holding either shape. Empty documents are ignored.
fn split_entries(text: &str) -> Result<Vec<Value>, serde_yaml::Error> {
    let mut entries = Vec::new();
    for document in serde_yaml::Deserializer::from_str(text) {
        match Value::deserialize(document)? {
            Value::Null => {}
            Value::Sequence(items) => entries.extend(items),
            other => entries.push(other),
        }
    }
    Ok(entries)
}

/// Turn one entry into a [`Scenario`], collecting every violated rule.
fn build_scenario(entry: Value) -> Result<Scenario, Vec<String>> {
    if !entry.is_mapping() {
        return Err(vec!["scenario entry must be a mapping".to_string()]);
    }
    let raw: RawScenario = serde_yaml::from_value(entry)
        .map_err(|e| vec![format!("malformed definition: {e}")])?;

    let mut errors = Vec::new();

    let id = match raw.id {
        Some(id) if !id.trim().is_empty() => Some(id),
        Some(_) => {
            errors.push("id must not be empty".to_string());
            None
        }
        None => {
            errors.push("missing required field: id".to_string());
            None
        }
    };

    let category = required_enum::<Category>(raw.category.as_deref(), "category", &mut errors);
    let difficulty =
        required_enum::<Difficulty>(raw.difficulty.as_deref(), "difficulty", &mut errors);

    let distribution = match raw.distribution.as_deref() {
        None => None,
        Some(d) => match d.parse::<Distribution>() {
            Ok(dist) => Some(dist),
            Err(e) => {
                errors.push(e.to_string());
                None
            }
        },
    };

    let task = match raw.task {
        Some(task) if !task.trim().is_empty() => Some(task),
        Some(_) => {
            errors.push("task must not be empty".to_string());
            None
        }
        None => {
            errors.push("missing required field: task".to_string());
            None
        }
    };

    let points = match raw.points {
        None => {
            errors.push("missing required field: points".to_string());
            None
        }
        Some(p) => match u32::try_from(p) {
            Ok(p) if p > 0 => Some(p),
            _ => {
                errors.push("points must be a positive integer".to_string());
                None
            }
        },
    };

    let time_limit = match raw.time_limit {
        None => None,
        Some(t) => match u32::try_from(t) {
            Ok(t) if t > 0 => Some(t),
            _ => {
                errors.push("time_limit must be a positive integer".to_string());
                None
            }
        },
    };

    let checks = match raw.validation {
        None => {
            errors.push("missing required field: validation".to_string());
            Vec::new()
        }
        Some(validation) if validation.checks.is_empty() => {
            errors.push("validation.checks must not be empty".to_string());
            Vec::new()
        }
        Some(validation) => validation
            .checks
            .into_iter()
            .enumerate()
            .filter_map(|(i, value)| match build_check(value) {
                Ok(check) => Some(check),
                Err(e) => {
                    errors.push(format!("check {}: {}", i + 1, e));
                    None
                }
            })
            .collect(),
    };

    match (id, category, difficulty, task, points) {
        (Some(id), Some(category), Some(difficulty), Some(task), Some(points))
            if errors.is_empty() =>
        {
            Ok(Scenario {
                id,
                category,
                difficulty,
                task,
                points,
                distribution,
                setup_commands: raw.setup_commands,
                hints: raw.hints,
                time_limit,
                tags: raw.tags,
                validation: ValidationRules { checks },
            })
        }
        _ => Err(errors),
    }
}

fn required_enum<T>(value: Option<&str>, field: &str, errors: &mut Vec<String>) -> Option<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => {
            errors.push(format!("missing required field: {field}"));
            None
        }
        Some(v) => match v.parse::<T>() {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                errors.push(e.to_string());
                None
            }
        },
    }
}

fn build_check(value: Value) -> Result<ValidationCheck, String> {
    let kind = match value.get("type") {
        None => return Err("missing required field: type".to_string()),
        Some(Value::String(t)) => t
            .parse::<CheckKind>()
            .map_err(|_| format!("unknown check type '{t}'"))?,
        Some(_) => return Err("type must be a string".to_string()),
    };

    let check: ValidationCheck = serde_yaml::from_value(value).map_err(|e| e.to_string())?;

    let (field, content) = match &check {
        ValidationCheck::Command(c) => ("command", c.command.as_str()),
        ValidationCheck::File(c) => ("path", c.path.as_str()),
        ValidationCheck::Service(c) => ("service_name", c.service_name.as_str()),
        ValidationCheck::Custom(c) => ("script_path", c.script_path.as_str()),
    };
    if content.trim().is_empty() {
        return Err(format!("{} check: {field} must not be empty", kind.as_str()));
    }
    Ok(check)
}

fn is_scenario_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ScenarioIndex {
    by_id: HashMap<String, Arc<Scenario>>,
    by_category: BTreeMap<Category, Vec<Arc<Scenario>>>,
}

/// Lazily loaded, read-only scenario index rooted at one directory.
#[derive(Debug)]
pub struct ScenarioCatalog {
    root: PathBuf,
    generator: ContextGenerator,
    index: OnceCell<ScenarioIndex>,
}

impl ScenarioCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            generator: ContextGenerator::new(),
            index: OnceCell::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load every definition under the root. Idempotent; later calls reuse
    /// the first successful load. Returns the number of indexed ids.
    pub fn load_all(&self) -> ScenarioResult<usize> {
        Ok(self.index()?.by_id.len())
    }

    fn index(&self) -> ScenarioResult<&ScenarioIndex> {
        self.index.get_or_try_init(|| self.scan())
    }

    fn scan(&self) -> ScenarioResult<ScenarioIndex> {
        if !self.root.is_dir() {
            return Err(ScenarioError::RootMissing(self.root.clone()));
        }
        info!(root = %self.root.display(), "loading scenarios");

        let mut index = ScenarioIndex::default();
        let files = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "skipping unreadable directory entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file() && is_scenario_file(entry.path()));

        for entry in files {
            let path = entry.path();
            match self.load_file(path) {
                Ok(outcomes) => {
                    for outcome in outcomes {
                        match outcome {
                            Ok(scenario) => insert(&mut index, scenario, path),
                            Err(ScenarioError::Invalid { label, errors }) => {
                                warn!(
                                    file = %path.display(),
                                    scenario = %label,
                                    errors = %errors.join("; "),
                                    "skipping invalid scenario"
                                );
                            }
                            Err(e) => warn!(file = %path.display(), error = %e, "skipping scenario"),
                        }
                    }
                }
                Err(e) => warn!(file = %path.display(), error = %e, "skipping scenario file"),
            }
        }

        info!(
            scenarios = index.by_id.len(),
            categories = index.by_category.len(),
            "scenarios loaded"
        );
        Ok(index)
    }

    /// Read, render and parse one file. The outer error covers the whole file
    /// (unreadable, not YAML); inner errors are per-entry.
    fn load_file(&self, path: &Path) -> ScenarioResult<Vec<ScenarioResult<Scenario>>> {
        let text = std::fs::read_to_string(path).map_err(|source| ScenarioError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let rendered = render(&text, &self.generator.generate());
        let entries = split_entries(&rendered).map_err(|e| ScenarioError::Yaml {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        Ok(entries
            .into_iter()
            .enumerate()
            .map(|(i, entry)| {
                let label = entry
                    .get("id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{}#{}", path.display(), i + 1));
                build_scenario(entry).map_err(|errors| ScenarioError::Invalid { label, errors })
            })
            .collect())
    }

    /// Lint one definition file without touching the index.
    ///
    /// Returns one line per problem; an empty list means every entry is valid.
    pub fn check_file(&self, path: &Path) -> ScenarioResult<Vec<String>> {
        let outcomes = match self.load_file(path) {
            Ok(outcomes) => outcomes,
            Err(e @ ScenarioError::Yaml { .. }) => return Ok(vec![e.to_string()]),
            Err(e) => return Err(e),
        };
        if outcomes.is_empty() {
            return Ok(vec!["file contains no scenario definitions".to_string()]);
        }

        let mut problems = Vec::new();
        for outcome in outcomes {
            if let Err(ScenarioError::Invalid { label, errors }) = outcome {
                problems.extend(errors.into_iter().map(|e| format!("{label}: {e}")));
            }
        }
        Ok(problems)
    }

    /// Pick a random scenario matching every supplied filter.
    pub fn pick_random(
        &self,
        category: Option<Category>,
        difficulty: Option<Difficulty>,
        distribution: Option<Distribution>,
    ) -> ScenarioResult<Arc<Scenario>> {
        self.pick_random_with(&mut rand::rng(), category, difficulty, distribution)
    }

    pub fn pick_random_with<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        category: Option<Category>,
        difficulty: Option<Difficulty>,
        distribution: Option<Distribution>,
    ) -> ScenarioResult<Arc<Scenario>> {
        let candidates: Vec<Arc<Scenario>> = self
            .list(category, difficulty)?
            .into_iter()
            .filter(|s| distribution.map_or(true, |d| s.supports(d)))
            .collect();

        candidates.choose(rng).cloned().ok_or_else(|| {
            ScenarioError::NoMatch(describe_filters(category, difficulty, distribution))
        })
    }

    pub fn get(&self, id: &str) -> ScenarioResult<Option<Arc<Scenario>>> {
        Ok(self.index()?.by_id.get(id).cloned())
    }

    /// Scenarios in category order, then load order.
    pub fn list(
        &self,
        category: Option<Category>,
        difficulty: Option<Difficulty>,
    ) -> ScenarioResult<Vec<Arc<Scenario>>> {
        let index = self.index()?;
        Ok(index
            .by_category
            .iter()
            .filter(|(cat, _)| category.map_or(true, |c| c == **cat))
            .flat_map(|(_, scenarios)| scenarios.iter())
            .filter(|s| difficulty.map_or(true, |d| s.difficulty == d))
            .cloned()
            .collect())
    }

    /// Categories that have at least one scenario.
    pub fn categories(&self) -> ScenarioResult<Vec<Category>> {
        Ok(self.index()?.by_category.keys().copied().collect())
    }

    pub fn count(&self, category: Option<Category>) -> ScenarioResult<usize> {
        Ok(self.list(category, None)?.len())
    }
}

fn insert(index: &mut ScenarioIndex, scenario: Scenario, path: &Path) {
    let scenario = Arc::new(scenario);
    debug!(scenario_id = %scenario.id, file = %path.display(), "scenario indexed");
    // The id index keeps the last definition; the category listing keeps
    // every loaded one.
    if index
        .by_id
        .insert(scenario.id.clone(), Arc::clone(&scenario))
        .is_some()
    {
        warn!(
            scenario_id = %scenario.id,
            file = %path.display(),
            "duplicate scenario id; later definition replaces earlier"
        );
    }
    index
        .by_category
        .entry(scenario.category)
        .or_default()
        .push(scenario);
}

fn describe_filters(
    category: Option<Category>,
    difficulty: Option<Difficulty>,
    distribution: Option<Distribution>,
) -> String {
    let parts: Vec<String> = [
        category.map(|c| format!("category={c}")),
        difficulty.map(|d| format!("difficulty={d}")),
        distribution.map(|d| format!("distribution={d}")),
    ]
    .into_iter()
    .flatten()
    .collect();

    if parts.is_empty() {
        "any filter".to_string()
    } else {
        parts.join(", ")
    }
}
