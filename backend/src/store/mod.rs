//! Registry store - keep and reuse mapping registries between runs.
//!
//! Registries are saved as JSON under a directory and matched to incoming
//! survey exports by the raw columns they read.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{StoreError, StoreResult};
use crate::transform::registry::{MappingRegistry, RegistryConfig};

/// Default store directory, relative to the current dir.
pub const DEFAULT_STORE_DIR: &str = ".surveyquant/registries";

/// Minimum share of a registry's columns an export must carry to be a match.
const COMPATIBILITY_THRESHOLD: f64 = 0.5;

/// A stored registry with usage metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRegistry {
    pub id: String,
    pub name: String,
    pub registry: RegistryConfig,
    /// Raw columns the registry reads.
    pub columns: Vec<String>,
    pub created_at: String,
    pub last_used: Option<String>,
    /// Exponential moving average of clean runs (0.0 to 1.0).
    pub success_rate: f64,
    pub use_count: u32,
}

impl StoredRegistry {
    /// Build the validated registry.
    pub fn load(&self) -> StoreResult<MappingRegistry> {
        Ok(MappingRegistry::from_config(self.registry.clone())?)
    }
}

/// On-disk collection of registries.
pub struct RegistryStore {
    dir: PathBuf,
    registries: HashMap<String, StoredRegistry>,
}

impl RegistryStore {
    pub fn new() -> Self {
        Self::with_dir(DEFAULT_STORE_DIR)
    }

    /// Open a store rooted at `dir`, loading whatever it already holds.
    pub fn with_dir(dir: impl AsRef<Path>) -> Self {
        let mut store = Self {
            dir: PathBuf::from(dir.as_ref()),
            registries: HashMap::new(),
        };
        store.load_all();
        store
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn load_all(&mut self) {
        let entries = match fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(_) => return,
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.extension().is_some_and(|e| e == "json") {
                continue;
            }
            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };
            // Unreadable or invalid documents are skipped, not fatal.
            if let Ok(stored) = serde_json::from_str::<StoredRegistry>(&content) {
                if stored.load().is_ok() {
                    self.registries.insert(stored.id.clone(), stored);
                }
            }
        }
    }

    /// All stored registries, most recently created first.
    pub fn list(&self) -> Vec<&StoredRegistry> {
        let mut all: Vec<_> = self.registries.values().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        all
    }

    pub fn get(&self, id: &str) -> StoreResult<&StoredRegistry> {
        self.registries
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Registries whose columns mostly appear in `headers`, best first.
    ///
    /// Ranked by compatibility score times success rate.
    pub fn find_compatible(&self, headers: &[String]) -> Vec<(&StoredRegistry, f64)> {
        let mut compatible: Vec<_> = self
            .registries
            .values()
            .filter_map(|r| {
                let score = compatibility(&r.columns, headers);
                (score > COMPATIBILITY_THRESHOLD).then_some((r, score))
            })
            .collect();

        compatible.sort_by(|a, b| {
            let score_a = a.1 * a.0.success_rate;
            let score_b = b.1 * b.0.success_rate;
            score_b
                .partial_cmp(&score_a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.id.cmp(&b.0.id))
        });

        compatible
    }

    /// Validate and save a registry. Returns the new id.
    pub fn save(&mut self, registry: RegistryConfig, name: &str) -> StoreResult<String> {
        MappingRegistry::from_config(registry.clone())?;
        fs::create_dir_all(&self.dir)?;

        let id = generate_id(name);
        let stored = StoredRegistry {
            id: id.clone(),
            name: name.to_string(),
            columns: registry.source_columns(),
            registry,
            created_at: chrono::Utc::now().to_rfc3339(),
            last_used: None,
            success_rate: 1.0,
            use_count: 0,
        };

        self.write(&stored)?;
        self.registries.insert(id.clone(), stored);
        Ok(id)
    }

    /// Import a registry JSON file; the name defaults to the file stem.
    pub fn import(&mut self, path: &Path, name: Option<&str>) -> StoreResult<String> {
        let registry = MappingRegistry::from_file(path)?;
        let name = name.unwrap_or_else(|| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("imported")
        });
        self.save(registry.config().clone(), name)
    }

    /// Record a run. A run is clean when it produced no warnings.
    pub fn update_stats(&mut self, id: &str, clean: bool) -> StoreResult<()> {
        let stored = self
            .registries
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        stored.success_rate = if clean {
            stored.success_rate * 0.9 + 0.1
        } else {
            stored.success_rate * 0.9
        };
        stored.last_used = Some(chrono::Utc::now().to_rfc3339());
        stored.use_count += 1;

        let stored = stored.clone();
        self.write(&stored)
    }

    pub fn delete(&mut self, id: &str) -> StoreResult<()> {
        if self.registries.remove(id).is_none() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        fs::remove_file(self.path_for(id))?;
        Ok(())
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    fn write(&self, stored: &StoredRegistry) -> StoreResult<()> {
        let content = serde_json::to_string_pretty(stored)?;
        fs::write(self.path_for(&stored.id), content)?;
        Ok(())
    }
}

impl Default for RegistryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Share of `stored` columns present in `headers` (case-insensitive).
fn compatibility(stored: &[String], headers: &[String]) -> f64 {
    if stored.is_empty() {
        return 0.0;
    }

    let headers: Vec<String> = headers.iter().map(|h| h.to_lowercase()).collect();
    let matched = stored
        .iter()
        .filter(|col| headers.contains(&col.to_lowercase()))
        .count();

    matched as f64 / stored.len() as f64
}

fn generate_id(name: &str) -> String {
    let slug = name
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", slug, &suffix[..8])
}
