//! Suite manifest and the registry completeness invariant
//!
//! A suite directory holds one `.evo` file per case plus a `suite.toml`
//! manifest registering every case id. At load time the discovered files
//! and the registered ids must match exactly, in both directions; any
//! asymmetry fails the whole suite before a single case runs.

use crate::case::{CaseError, CaseId, EvolutionCase};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Manifest file name inside a suite directory.
pub const MANIFEST_NAME: &str = "suite.toml";

#[derive(Debug, Deserialize)]
struct Manifest {
    suite: SuiteMeta,
    #[serde(default, rename = "case")]
    cases: Vec<CaseEntry>,
}

#[derive(Debug, Deserialize)]
struct SuiteMeta {
    name: String,
}

#[derive(Debug, Deserialize)]
struct CaseEntry {
    id: String,
}

/// Problems loading a suite directory.
#[derive(Debug, Error)]
pub enum SuiteError {
    /// Filesystem failure with the offending path.
    #[error("cannot read {path:?}: {source}")]
    Io {
        /// Path that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The manifest is not valid TOML or misses required keys.
    #[error("invalid suite manifest: {0}")]
    Manifest(#[from] toml::de::Error),
    /// A `.evo` file exists without a manifest entry.
    #[error("case file `{id}` is not registered in suite.toml")]
    UnregisteredFile {
        /// Id derived from the unregistered file.
        id: CaseId,
    },
    /// A manifest entry has no `.evo` file.
    #[error("registered case `{id}` has no .evo file")]
    MissingFile {
        /// The orphaned registration.
        id: CaseId,
    },
    /// Two files normalize to the same id.
    #[error("case files {first:?} and {second:?} both map to id `{id}`")]
    IdCollision {
        /// The contested id.
        id: CaseId,
        /// First file claiming the id.
        first: PathBuf,
        /// Second file claiming the id.
        second: PathBuf,
    },
    /// The same id registered twice in the manifest.
    #[error("case `{id}` is registered twice")]
    DuplicateRegistration {
        /// The repeated id.
        id: CaseId,
    },
    /// A case file failed to parse.
    #[error("case `{id}` does not parse: {source}")]
    Case {
        /// The broken case.
        id: CaseId,
        /// Parse failure detail.
        #[source]
        source: CaseError,
    },
    /// A requested id is not part of this suite.
    #[error("no case named `{id}` in this suite")]
    UnknownCase {
        /// The id as requested.
        id: String,
    },
}

/// A loaded suite: named, completeness-checked, cases sorted by id.
#[derive(Debug, Clone)]
pub struct CaseRegistry {
    name: String,
    cases: Vec<EvolutionCase>,
}

impl CaseRegistry {
    /// Loads and verifies a suite directory.
    ///
    /// # Errors
    ///
    /// Returns [`SuiteError`] on I/O failure, manifest problems, any
    /// registry/file asymmetry, or an unparseable case.
    pub fn load(dir: &Path) -> Result<Self, SuiteError> {
        let manifest_path = dir.join(MANIFEST_NAME);
        let manifest_text =
            std::fs::read_to_string(&manifest_path).map_err(|source| SuiteError::Io {
                path: manifest_path,
                source,
            })?;
        let manifest: Manifest = toml::from_str(&manifest_text)?;

        let mut registered = BTreeSet::new();
        for entry in &manifest.cases {
            let id = CaseId::from_stem(&entry.id);
            if !registered.insert(id.clone()) {
                return Err(SuiteError::DuplicateRegistration { id });
            }
        }

        let files = discover(dir)?;
        for id in files.keys() {
            if !registered.contains(id) {
                return Err(SuiteError::UnregisteredFile { id: id.clone() });
            }
        }
        for id in &registered {
            if !files.contains_key(id) {
                return Err(SuiteError::MissingFile { id: id.clone() });
            }
        }

        let mut cases = Vec::with_capacity(files.len());
        for (id, path) in &files {
            let case = EvolutionCase::load(path).map_err(|source| SuiteError::Case {
                id: id.clone(),
                source,
            })?;
            cases.push(case);
        }
        tracing::info!(suite = %manifest.suite.name, cases = cases.len(), "suite loaded");

        Ok(Self {
            name: manifest.suite.name,
            cases,
        })
    }

    /// Suite name from the manifest.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All cases, sorted by id.
    #[inline]
    #[must_use]
    pub fn cases(&self) -> &[EvolutionCase] {
        &self.cases
    }

    /// Number of cases.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    /// True when the suite has no cases.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Looks up one case by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&EvolutionCase> {
        self.cases.iter().find(|case| case.id.as_str() == id)
    }

    /// A sub-registry restricted to the named ids, in suite order.
    ///
    /// # Errors
    ///
    /// Returns [`SuiteError::UnknownCase`] for any id not in the suite.
    pub fn subset(&self, ids: &[String]) -> Result<Self, SuiteError> {
        for id in ids {
            if self.get(id).is_none() {
                return Err(SuiteError::UnknownCase { id: id.clone() });
            }
        }
        let cases = self
            .cases
            .iter()
            .filter(|case| ids.iter().any(|id| case.id.as_str() == id))
            .cloned()
            .collect();
        Ok(Self {
            name: self.name.clone(),
            cases,
        })
    }
}

/// Maps every `*.evo` file under `dir` to its derived id, rejecting
/// collisions. Sorted by id via the map.
fn discover(dir: &Path) -> Result<BTreeMap<CaseId, PathBuf>, SuiteError> {
    let mut files: BTreeMap<CaseId, PathBuf> = BTreeMap::new();
    let entries = std::fs::read_dir(dir).map_err(|source| SuiteError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| SuiteError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("evo") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            return Err(SuiteError::Case {
                id: CaseId::from_stem(&path.to_string_lossy()),
                source: CaseError::BadFileName,
            });
        };
        let id = CaseId::from_stem(stem);
        if let Some(first) = files.get(&id) {
            return Err(SuiteError::IdCollision {
                id,
                first: first.clone(),
                second: path,
            });
        }
        files.insert(id, path);
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    const CASE: &str = "\
//// baseline
module lib
fun greet(): Str = \"hi\"
//// evolved
module lib
fun greet(): Str = \"hi\"
//// client
module main
use lib
fun main() { print(lib.greet()) }
//// expect: runtime-match
hi
";

    fn write_suite(dir: &Path, manifest: &str, files: &[(&str, &str)]) {
        fs::write(dir.join(MANIFEST_NAME), manifest).unwrap();
        for (name, text) in files {
            fs::write(dir.join(name), text).unwrap();
        }
    }

    #[test]
    fn loads_a_complete_suite_sorted() {
        let dir = tempfile::tempdir().unwrap();
        write_suite(
            dir.path(),
            "[suite]\nname = \"demo\"\n[[case]]\nid = \"BCase\"\n[[case]]\nid = \"ACase\"\n",
            &[("bCase.evo", CASE), ("aCase.evo", CASE)],
        );
        let registry = CaseRegistry::load(dir.path()).unwrap();
        assert_eq!(registry.name(), "demo");
        let ids: Vec<_> = registry.cases().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["ACase", "BCase"]);
    }

    #[test]
    fn unregistered_file_fails_the_load() {
        let dir = tempfile::tempdir().unwrap();
        write_suite(
            dir.path(),
            "[suite]\nname = \"demo\"\n",
            &[("stray.evo", CASE)],
        );
        let err = CaseRegistry::load(dir.path()).unwrap_err();
        assert!(matches!(err, SuiteError::UnregisteredFile { id } if id.as_str() == "Stray"));
    }

    #[test]
    fn registration_without_file_fails_the_load() {
        let dir = tempfile::tempdir().unwrap();
        write_suite(
            dir.path(),
            "[suite]\nname = \"demo\"\n[[case]]\nid = \"Ghost\"\n",
            &[],
        );
        let err = CaseRegistry::load(dir.path()).unwrap_err();
        assert!(matches!(err, SuiteError::MissingFile { id } if id.as_str() == "Ghost"));
    }

    #[test]
    fn colliding_stems_fail_the_load() {
        let dir = tempfile::tempdir().unwrap();
        write_suite(
            dir.path(),
            "[suite]\nname = \"demo\"\n[[case]]\nid = \"AddOpenToClass\"\n",
            &[("addOpenToClass.evo", CASE), ("add-open-to-class.evo", CASE)],
        );
        let err = CaseRegistry::load(dir.path()).unwrap_err();
        assert!(matches!(err, SuiteError::IdCollision { .. }));
    }

    #[test]
    fn duplicate_registration_fails_the_load() {
        let dir = tempfile::tempdir().unwrap();
        write_suite(
            dir.path(),
            "[suite]\nname = \"demo\"\n[[case]]\nid = \"Same\"\n[[case]]\nid = \"Same\"\n",
            &[("same.evo", CASE)],
        );
        let err = CaseRegistry::load(dir.path()).unwrap_err();
        assert!(matches!(err, SuiteError::DuplicateRegistration { .. }));
    }

    #[test]
    fn subset_rejects_unknown_ids() {
        let dir = tempfile::tempdir().unwrap();
        write_suite(
            dir.path(),
            "[suite]\nname = \"demo\"\n[[case]]\nid = \"Known\"\n",
            &[("known.evo", CASE)],
        );
        let registry = CaseRegistry::load(dir.path()).unwrap();
        assert!(registry.subset(&["Known".to_owned()]).is_ok());
        let err = registry.subset(&["Nope".to_owned()]).unwrap_err();
        assert!(matches!(err, SuiteError::UnknownCase { id } if id == "Nope"));
    }
}
