// Recognized vehicle catalog
// Loaded once at startup from a vMenu-style addons.json; a missing or empty list is fatal

use crate::error::{Result, StatsError};
use crate::stats::VehicleKind;
use regex::Regex;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{error, info};

/// Set of vehicle kinds a session may be started for
#[derive(Debug, Clone, Default)]
pub struct VehicleCatalog {
    kinds: BTreeSet<VehicleKind>,
}

impl VehicleCatalog {
    /// Load and validate the addons file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            error!(path = %path.display(), "Vehicle catalog not found");
            return Err(StatsError::CatalogMissing { path: path.to_path_buf() });
        }

        let raw = std::fs::read_to_string(path).map_err(|e| StatsError::CatalogInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let catalog = Self::parse(&raw).map_err(|reason| StatsError::CatalogInvalid {
            path: path.to_path_buf(),
            reason,
        })?;

        info!(path = %path.display(), vehicles = catalog.len(), "Loaded vehicles from catalog");
        Ok(catalog)
    }

    /// Parse the addons document. Errors are human-readable reasons.
    pub fn parse(raw: &str) -> std::result::Result<Self, String> {
        let cleaned = clean_json(raw);
        let document: serde_json::Value =
            serde_json::from_str(&cleaned).map_err(|e| format!("unparseable JSON: {e}"))?;

        let vehicles = document
            .get("vehicles")
            .and_then(|v| v.as_array())
            .ok_or_else(|| "no `vehicles` array".to_string())?;

        let catalog = Self::from_names(
            vehicles
                .iter()
                .filter_map(|v| v.as_str())
                .filter(|name| !name.trim().starts_with("##")),
        );

        if catalog.is_empty() {
            return Err("no vehicles found".to_string());
        }
        Ok(catalog)
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            kinds: names
                .into_iter()
                .filter_map(|name| VehicleKind::new(name.as_ref()))
                .collect(),
        }
    }

    /// Whether `name` (normalized) is a recognized kind
    pub fn contains(&self, name: &str) -> bool {
        VehicleKind::new(name).is_some_and(|kind| self.kinds.contains(&kind))
    }

    pub fn names(&self) -> Vec<String> {
        self.kinds.iter().map(|k| k.to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

/// Strip `##` comment lines and trailing commas so the file parses as JSON
fn clean_json(raw: &str) -> String {
    static TRAILING_COMMA: OnceLock<Regex> = OnceLock::new();

    let without_comments = raw
        .lines()
        .filter(|line| !line.trim_start().starts_with("##"))
        .collect::<Vec<_>>()
        .join("\n");

    let re = TRAILING_COMMA
        .get_or_init(|| Regex::new(r",(\s*[}\]])").expect("valid trailing comma pattern"));
    re.replace_all(&without_comments, "$1").into_owned()
}
