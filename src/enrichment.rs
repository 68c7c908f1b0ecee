/*!
 * Optional enrichment side files
 *
 * Provider directory files map a provider id to its registered state, name
 * and location. Procedure description files map a code to display text.
 * Both are optional: an absent file is logged and skipped, but a file that
 * exists and cannot be parsed is an error.
 *
 * Several files of each kind may be given in priority order. Earlier files
 * win field by field.
 */

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::Deserialize;

use crate::{Result, RollupError};

/// Directory attributes for one provider
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProviderInfo {
    pub state: Option<String>,
    pub name: Option<String>,
    pub city: Option<String>,
    pub zip: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

impl ProviderInfo {
    /// Fill fields that are still missing from `other`
    fn fill_from(&mut self, other: ProviderInfo) {
        fill(&mut self.state, other.state);
        fill(&mut self.name, other.name);
        fill(&mut self.city, other.city);
        fill(&mut self.zip, other.zip);
        if self.lat.is_none() {
            self.lat = other.lat;
        }
        if self.lng.is_none() {
            self.lng = other.lng;
        }
    }
}

fn fill(slot: &mut Option<String>, value: Option<String>) {
    if slot.is_none() {
        *slot = value.filter(|v| !v.trim().is_empty());
    }
}

#[derive(Deserialize)]
struct ListedProvider {
    npi: String,
    #[serde(flatten)]
    info: ProviderInfo,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DirectoryFile {
    Keyed(HashMap<String, ProviderInfo>),
    Listed(Vec<ListedProvider>),
}

/// Provider id -> directory attributes
#[derive(Debug, Clone, Default)]
pub struct ProviderDirectory {
    entries: HashMap<String, ProviderInfo>,
}

impl ProviderDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add attributes for a provider. Fields already known are kept.
    pub fn insert(&mut self, npi: impl Into<String>, info: ProviderInfo) {
        self.entries.entry(npi.into()).or_default().fill_from(info);
    }

    /// Parse one directory file, either an object keyed by provider id or
    /// an array of `{npi, state, name, ...}` records
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let parsed: DirectoryFile = read_json(path)?;
        let mut directory = Self::new();
        match parsed {
            DirectoryFile::Keyed(map) => {
                for (npi, info) in map {
                    directory.insert(npi, info);
                }
            }
            DirectoryFile::Listed(list) => {
                for entry in list {
                    directory.insert(entry.npi, entry.info);
                }
            }
        }
        Ok(directory)
    }

    /// Load every file that exists, merged in priority order
    ///
    /// Returns `None` when none of the files exist.
    pub fn load_optional(paths: &[PathBuf]) -> Result<Option<Self>> {
        let mut merged: Option<Self> = None;
        for path in paths {
            if !path.is_file() {
                warn!(
                    "Provider directory {} not found; state and name fields will be incomplete",
                    path.display()
                );
                continue;
            }
            let directory = Self::from_file(path)?;
            info!(
                "Loaded {} provider directory entries ({} with state) from {}",
                directory.len(),
                directory.states_known(),
                path.display()
            );
            match merged.as_mut() {
                Some(existing) => existing.merge(directory),
                None => merged = Some(directory),
            }
        }
        Ok(merged)
    }

    /// Merge a lower-priority directory into this one
    pub fn merge(&mut self, other: ProviderDirectory) {
        for (npi, info) in other.entries {
            self.insert(npi, info);
        }
    }

    pub fn get(&self, npi: &str) -> Option<&ProviderInfo> {
        self.entries.get(npi)
    }

    pub fn state_of(&self, npi: &str) -> Option<&str> {
        self.get(npi).and_then(|info| info.state.as_deref())
    }

    pub fn name_of(&self, npi: &str) -> Option<&str> {
        self.get(npi).and_then(|info| info.name.as_deref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries that carry a state
    pub fn states_known(&self) -> usize {
        self.entries.values().filter(|info| info.state.is_some()).count()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescriptionEntry {
    code: String,
    #[serde(default)]
    short_desc: Option<String>,
    #[serde(default)]
    long_desc: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DescriptionFile {
    Listed(Vec<DescriptionEntry>),
    Keyed(HashMap<String, String>),
}

/// Procedure code -> description
#[derive(Debug, Clone, Default)]
pub struct ProcedureDescriptions {
    entries: HashMap<String, String>,
}

impl ProcedureDescriptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a description unless the code already has one
    pub fn insert(&mut self, code: impl Into<String>, description: impl Into<String>) {
        let description = description.into();
        if description.trim().is_empty() {
            return;
        }
        self.entries.entry(code.into()).or_insert(description);
    }

    /// Parse `[{code, shortDesc, longDesc}]` (short preferred) or `{code: text}`
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let parsed: DescriptionFile = read_json(path.as_ref())?;
        let mut descriptions = Self::new();
        match parsed {
            DescriptionFile::Listed(list) => {
                for entry in list {
                    let text = entry
                        .short_desc
                        .filter(|s| !s.trim().is_empty())
                        .or(entry.long_desc);
                    if let Some(text) = text {
                        descriptions.insert(entry.code, text);
                    }
                }
            }
            DescriptionFile::Keyed(map) => {
                for (code, text) in map {
                    descriptions.insert(code, text);
                }
            }
        }
        Ok(descriptions)
    }

    /// Load every file that exists, merged in priority order
    pub fn load_optional(paths: &[PathBuf]) -> Result<Option<Self>> {
        let mut merged: Option<Self> = None;
        for path in paths {
            if !path.is_file() {
                warn!("Procedure descriptions {} not found; descriptions will be null", path.display());
                continue;
            }
            let descriptions = Self::from_file(path)?;
            info!("Loaded {} procedure descriptions from {}", descriptions.len(), path.display());
            match merged.as_mut() {
                Some(existing) => existing.merge(descriptions),
                None => merged = Some(descriptions),
            }
        }
        Ok(merged)
    }

    pub fn merge(&mut self, other: ProcedureDescriptions) {
        for (code, text) in other.entries {
            self.insert(code, text);
        }
    }

    pub fn get(&self, code: &str) -> Option<&str> {
        self.entries.get(code).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|e| RollupError::Enrichment {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| RollupError::Enrichment {
        path: path.to_path_buf(),
        message: format!("unrecognised JSON layout: {e}"),
    })
}
