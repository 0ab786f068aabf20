//! Package catalog - the parsed `packages.json`.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::method::InstallMethod;

/// Key holding the list of Homebrew taps
const BREW_TAPS_KEY: &str = "_brew_taps";

/// One named package with its per-target install methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub name: String,
    pub description: String,
    /// Install method keyed by platform target ("darwin", "ubuntu", ...)
    pub methods: BTreeMap<String, InstallMethod>,
}

impl Package {
    pub fn method_for(&self, target: &str) -> Option<&InstallMethod> {
        self.methods.get(target)
    }

    pub fn supports(&self, target: &str) -> bool {
        self.methods.contains_key(target)
    }
}

/// Errors that make the whole catalog unusable.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("reading {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing package catalog: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("package catalog must be a JSON object")]
    NotAnObject,

    #[error("parsing _brew_taps: {0}")]
    Taps(#[source] serde_json::Error),
}

/// A single entry (or one target of an entry) that was skipped during load.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("skipped {}: {reason}", describe_entry(.package, .target))]
pub struct EntryParseError {
    pub package: String,
    /// Set when only one target of the package was malformed
    pub target: Option<String>,
    pub reason: String,
}

fn describe_entry(package: &str, target: &Option<String>) -> String {
    match target {
        Some(target) => format!("{} [{}]", package, target),
        None => package.to_string(),
    }
}

#[derive(Deserialize)]
struct RawEntry {
    #[serde(default)]
    description: String,
    packages: Option<Map<String, Value>>,
}

/// All packages of a catalog, sorted by name, plus the taps to apply first.
#[derive(Debug, Clone, Default)]
pub struct PackageCatalog {
    pub brew_taps: Vec<String>,
    pub packages: Vec<Package>,
    skipped: Vec<EntryParseError>,
}

impl PackageCatalog {
    /// Load and parse a catalog file.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let data = fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&data)
    }

    /// Parse catalog JSON. Malformed entries are collected in
    /// [`skipped_entries`](Self::skipped_entries) rather than failing the load.
    pub fn from_json_str(data: &str) -> Result<Self, CatalogError> {
        let raw: Value = serde_json::from_str(data).map_err(CatalogError::Parse)?;
        let Value::Object(raw) = raw else {
            return Err(CatalogError::NotAnObject);
        };

        let mut catalog = PackageCatalog::default();

        if let Some(taps) = raw.get(BREW_TAPS_KEY) {
            catalog.brew_taps =
                serde_json::from_value(taps.clone()).map_err(CatalogError::Taps)?;
        }

        for (name, value) in raw {
            if name.starts_with('_') {
                continue;
            }
            match parse_entry(&name, value) {
                Ok((package, skipped_targets)) => {
                    catalog.skipped.extend(skipped_targets);
                    catalog.packages.push(package);
                }
                Err(err) => catalog.skipped.push(err),
            }
        }

        catalog.packages.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(catalog)
    }

    /// Packages that have an install method for `target`, in name order.
    pub fn filter_for_target(&self, target: &str) -> Vec<&Package> {
        self.packages.iter().filter(|p| p.supports(target)).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Package> {
        self.packages
            .binary_search_by(|p| p.name.as_str().cmp(name))
            .ok()
            .map(|idx| &self.packages[idx])
    }

    pub fn skipped_entries(&self) -> &[EntryParseError] {
        &self.skipped
    }
}

fn parse_entry(
    name: &str,
    value: Value,
) -> Result<(Package, Vec<EntryParseError>), EntryParseError> {
    let entry_error = |reason: String| EntryParseError {
        package: name.to_string(),
        target: None,
        reason,
    };

    let entry: RawEntry =
        serde_json::from_value(value).map_err(|e| entry_error(e.to_string()))?;
    let targets = entry
        .packages
        .ok_or_else(|| entry_error("missing `packages` map".to_string()))?;

    let mut methods = BTreeMap::new();
    let mut skipped = Vec::new();
    for (target, raw_method) in targets {
        match serde_json::from_value::<InstallMethod>(raw_method) {
            Ok(method) => {
                methods.insert(target, method);
            }
            Err(e) => skipped.push(EntryParseError {
                package: name.to_string(),
                target: Some(target),
                reason: e.to_string(),
            }),
        }
    }

    Ok((
        Package {
            name: name.to_string(),
            description: entry.description,
            methods,
        },
        skipped,
    ))
}
