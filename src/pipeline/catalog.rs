//! Process catalog and dataset resolution.
//!
//! The catalog is a closed mapping from the process token embedded in a
//! sample name to the process name used in artifact names. It is built once
//! at startup and passed explicitly to whoever needs it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use super::config::ConfigError;

/// Default catalog entries.
pub const DEFAULT_PROCESSES: [(&str, &str); 18] = [
    ("Hlnuqq", "Hlnuqq"),
    ("Hqqlnu", "Hqqlnu"),
    ("enueqq", "enueqq"),
    ("eeqq", "eeqq"),
    ("munumuqq", "munumuqq"),
    ("mumuqq", "mumuqq"),
    ("taunutauqq", "taunutauqq"),
    ("tautauqq", "tautauqq"),
    ("Htautau", "Htautau"),
    ("Hllnunu", "Hllnunu"),
    ("eenunu", "eenunu"),
    ("mumununu", "mumununu"),
    ("tautaununu", "tautaununu"),
    ("l1l2nunu", "l1l2nunu"),
    ("tautau", "tautau"),
    ("Hgg", "Hgg"),
    ("Hbb", "Hbb"),
    ("qq", "qq"),
];

/// Glob matching the per-sample input event files.
const INPUT_FILE_GLOB: &str = "*.root";

fn sample_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"wzp6_ee_(.+?)_ecm125").expect("Invalid regex for sample names"))
}

/// Immutable process-name mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCatalog {
    entries: BTreeMap<String, String>,
}

impl Default for ProcessCatalog {
    fn default() -> Self {
        Self {
            entries: DEFAULT_PROCESSES
                .iter()
                .map(|(token, process)| (token.to_string(), process.to_string()))
                .collect(),
        }
    }
}

impl ProcessCatalog {
    /// Builds a catalog from explicit entries.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` on empty names or duplicate tokens.
    pub fn from_entries<I, K, V>(entries: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut map = BTreeMap::new();
        for (token, process) in entries {
            let token = token.into();
            let process = process.into();
            if token.is_empty() || process.is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "process catalog entries cannot be empty".to_string(),
                ));
            }
            if map.insert(token.clone(), process).is_some() {
                return Err(ConfigError::ValidationFailed(format!(
                    "duplicate process catalog entry '{}'",
                    token
                )));
            }
        }
        Ok(Self { entries: map })
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up the process for a token.
    pub fn get(&self, token: &str) -> Option<&str> {
        self.entries.get(token).map(String::as_str)
    }

    /// Extracts the process token from a sample name and maps it.
    pub fn process_for_sample(&self, sample: &str) -> Result<&str, ConfigError> {
        let token = sample_regex()
            .captures(sample)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
            .ok_or_else(|| ConfigError::UnparsableSample(sample.to_string()))?;

        self.get(token).ok_or_else(|| ConfigError::UnknownProcess {
            sample: sample.to_string(),
            process: token.to_string(),
        })
    }

    /// Resolves a sample into a dataset rooted at `input_dir`.
    pub fn resolve(&self, sample: &str, input_dir: &Path) -> Result<Dataset, ConfigError> {
        let process = self.process_for_sample(sample)?;
        Ok(Dataset {
            sample: sample.to_string(),
            process: process.to_string(),
            input_dir: input_dir.to_path_buf(),
        })
    }
}

/// A resolved sample: its process name and input directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dataset {
    pub sample: String,
    pub process: String,
    pub input_dir: PathBuf,
}

impl Dataset {
    /// Glob over the sample's event files, handed verbatim to the stage1 job.
    pub fn input_glob(&self) -> String {
        self.input_dir
            .join(&self.sample)
            .join(INPUT_FILE_GLOB)
            .display()
            .to_string()
    }
}
