//! Evolution cases and the `.evo` file format
//!
//! One `.evo` file holds one case: three ulib source regions and the
//! expected outcome, separated by `////` directives in fixed order:
//!
//! ```text
//! //// case: optional free-form title
//! //// baseline
//! <ulib source>
//! //// evolved
//! <ulib source>
//! //// client
//! <ulib source>
//! //// expect: runtime-match | link-only | link-error | behavior-change
//! <expected stdout, or `pattern: <regex>` for link-error>
//! ```
//!
//! The oracle is data in the case file, not code in the harness.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Stable case identity, UpperCamel-cased from the file stem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseId(String);

impl CaseId {
    /// Derives the id from a file stem: `addOpenToClass` and
    /// `add-open-to-class` both become `AddOpenToClass`.
    #[must_use]
    pub fn from_stem(stem: &str) -> Self {
        let mut id = String::with_capacity(stem.len());
        for segment in stem.split(['-', '_', '.', ' ']) {
            let mut chars = segment.chars();
            if let Some(first) = chars.next() {
                id.extend(first.to_uppercase());
                id.push_str(chars.as_str());
            }
        }
        Self(id)
    }

    /// The id as text.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The oracle a case's verdict is compared against.
#[derive(Debug, Clone)]
pub enum ExpectedOutcome {
    /// Links, executes, and prints exactly this.
    CompatibleRuntimeMatch {
        /// Expected stdout, one trailing newline per line.
        stdout: String,
    },
    /// Links; the execution outcome is not part of the oracle.
    CompatibleLinkOnly,
    /// Fails to link with at least one matching link diagnostic.
    IncompatibleLinkError {
        /// Pattern matched against link-origin diagnostic messages.
        pattern: Regex,
    },
    /// Links and executes, but prints the *captured old* behavior.
    IncompatibleRuntimeBehaviorChange {
        /// The pinned pre-evolution stdout.
        stdout: String,
    },
}

impl ExpectedOutcome {
    /// The directive keyword this expectation was declared with.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CompatibleRuntimeMatch { .. } => "runtime-match",
            Self::CompatibleLinkOnly => "link-only",
            Self::IncompatibleLinkError { .. } => "link-error",
            Self::IncompatibleRuntimeBehaviorChange { .. } => "behavior-change",
        }
    }
}

/// One loaded evolution case; immutable after load.
#[derive(Debug, Clone)]
pub struct EvolutionCase {
    /// Identity derived from the file stem.
    pub id: CaseId,
    /// Optional free-form title from the `case:` directive.
    pub title: Option<String>,
    /// Library source compiled first and used for the client compile.
    pub baseline: String,
    /// Library source the client is re-linked against.
    pub evolved: String,
    /// Program source compiled once, against the baseline.
    pub client: String,
    /// The oracle.
    pub expected: ExpectedOutcome,
}

/// Problems loading or parsing one `.evo` file.
#[derive(Debug, Error)]
pub enum CaseError {
    /// Could not read the file.
    #[error("cannot read case file: {0}")]
    Io(#[from] std::io::Error),
    /// The path has no usable file stem.
    #[error("case path has no file stem")]
    BadFileName,
    /// A required region never appeared.
    #[error("missing `//// {0}` region")]
    MissingRegion(&'static str),
    /// A directive appeared out of the fixed order.
    #[error("misplaced `//// {0}` directive")]
    MisplacedDirective(String),
    /// A `////` line that is not part of the format.
    #[error("unknown directive `//// {0}`")]
    UnknownDirective(String),
    /// The file ended without an `expect:` directive.
    #[error("missing `//// expect:` directive")]
    MissingExpectation,
    /// The `expect:` value is not one of the four kinds.
    #[error("unknown expectation `{0}`")]
    UnknownExpectation(String),
    /// `link-error` without a `pattern:` line.
    #[error("expectation `link-error` needs a `pattern:` line")]
    MissingPattern,
    /// The `pattern:` regex does not compile.
    #[error("invalid link-error pattern: {0}")]
    BadPattern(#[from] regex::Error),
    /// Text after an expectation that takes none.
    #[error("unexpected content after `{0}` expectation")]
    UnexpectedTrailer(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Baseline,
    Evolved,
    Client,
    Expect,
}

impl EvolutionCase {
    /// Loads one case file, deriving the id from the file stem.
    ///
    /// # Errors
    ///
    /// Returns [`CaseError`] for unreadable files or format violations.
    pub fn load(path: &Path) -> Result<Self, CaseError> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or(CaseError::BadFileName)?;
        let text = std::fs::read_to_string(path)?;
        Self::parse(CaseId::from_stem(stem), &text)
    }

    /// Parses case text under an explicit id.
    ///
    /// # Errors
    ///
    /// Returns [`CaseError`] when regions are missing, misordered, or the
    /// expectation block is malformed.
    pub fn parse(id: CaseId, text: &str) -> Result<Self, CaseError> {
        let mut title = None;
        let mut baseline = None;
        let mut evolved = None;
        let mut client = None;
        let mut expect_kind: Option<String> = None;

        let mut section = Section::Preamble;
        let mut bucket: Vec<&str> = Vec::new();

        for line in text.lines() {
            let Some(directive) = line.trim().strip_prefix("////") else {
                bucket.push(line);
                continue;
            };
            let directive = directive.trim();

            if let Some(value) = directive.strip_prefix("case:") {
                if section != Section::Preamble {
                    return Err(CaseError::MisplacedDirective(directive.to_owned()));
                }
                title = Some(value.trim().to_owned());
            } else if directive == "baseline" {
                if section != Section::Preamble {
                    return Err(CaseError::MisplacedDirective(directive.to_owned()));
                }
                bucket.clear();
                section = Section::Baseline;
            } else if directive == "evolved" {
                if section != Section::Baseline {
                    return Err(CaseError::MisplacedDirective(directive.to_owned()));
                }
                baseline = Some(source_region(&mut bucket));
                section = Section::Evolved;
            } else if directive == "client" {
                if section != Section::Evolved {
                    return Err(CaseError::MisplacedDirective(directive.to_owned()));
                }
                evolved = Some(source_region(&mut bucket));
                section = Section::Client;
            } else if let Some(value) = directive.strip_prefix("expect:") {
                if section != Section::Client {
                    return Err(CaseError::MisplacedDirective(directive.to_owned()));
                }
                client = Some(source_region(&mut bucket));
                expect_kind = Some(value.trim().to_owned());
                section = Section::Expect;
            } else {
                return Err(CaseError::UnknownDirective(directive.to_owned()));
            }
        }

        let baseline = baseline.ok_or(CaseError::MissingRegion("baseline"))?;
        let evolved = evolved.ok_or(CaseError::MissingRegion("evolved"))?;
        let client = client.ok_or(CaseError::MissingRegion("client"))?;
        let kind = expect_kind.ok_or(CaseError::MissingExpectation)?;
        let expected = parse_expectation(&kind, &bucket)?;

        Ok(Self {
            id,
            title,
            baseline,
            evolved,
            client,
            expected,
        })
    }
}

/// Drains the bucket into region text: outer blank lines dropped, one
/// trailing newline when non-empty.
fn source_region(bucket: &mut Vec<&str>) -> String {
    let lines = trimmed(bucket);
    let text = join_lines(&lines);
    bucket.clear();
    text
}

fn trimmed<'a>(lines: &[&'a str]) -> Vec<&'a str> {
    let start = lines
        .iter()
        .position(|l| !l.trim().is_empty())
        .unwrap_or(lines.len());
    let end = lines
        .iter()
        .rposition(|l| !l.trim().is_empty())
        .map_or(start, |i| i + 1);
    lines[start..end].to_vec()
}

fn join_lines(lines: &[&str]) -> String {
    if lines.is_empty() {
        return String::new();
    }
    let mut out = String::new();
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    out
}

fn parse_expectation(kind: &str, tail: &[&str]) -> Result<ExpectedOutcome, CaseError> {
    let lines = trimmed(tail);
    match kind {
        "runtime-match" => Ok(ExpectedOutcome::CompatibleRuntimeMatch {
            stdout: join_lines(&lines),
        }),
        "behavior-change" => Ok(ExpectedOutcome::IncompatibleRuntimeBehaviorChange {
            stdout: join_lines(&lines),
        }),
        "link-only" => {
            if lines.is_empty() {
                Ok(ExpectedOutcome::CompatibleLinkOnly)
            } else {
                Err(CaseError::UnexpectedTrailer("link-only"))
            }
        }
        "link-error" => {
            let [line] = &lines[..] else {
                return Err(if lines.is_empty() {
                    CaseError::MissingPattern
                } else {
                    CaseError::UnexpectedTrailer("link-error")
                });
            };
            let Some(raw) = line.trim().strip_prefix("pattern:") else {
                return Err(CaseError::MissingPattern);
            };
            let pattern = Regex::new(raw.trim())?;
            Ok(ExpectedOutcome::IncompatibleLinkError { pattern })
        }
        other => Err(CaseError::UnknownExpectation(other.to_owned())),
    }
}
