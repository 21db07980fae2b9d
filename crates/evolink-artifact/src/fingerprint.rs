//! Interface fingerprint deltas
//!
//! [`InterfaceDelta`] diffs the exported surfaces of two artifacts of the
//! same logical library. It exists to *explain* verdicts in reports; the
//! compatibility decision itself is always empirical (link and run), never
//! derived from the delta.

use crate::interface::{InterfaceTable, SignatureDescriptor, SymbolKind, TypeRef, Visibility};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// One field-level difference in a surviving symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldChange {
    /// Symbol kind changed.
    Kind {
        /// Baseline kind.
        from: SymbolKind,
        /// Evolved kind.
        to: SymbolKind,
    },
    /// Visibility widened or narrowed.
    Visibility {
        /// Baseline visibility.
        from: Visibility,
        /// Evolved visibility.
        to: Visibility,
    },
    /// Return type (functions) or value type (properties) changed.
    ValueType {
        /// Baseline type.
        from: TypeRef,
        /// Evolved type.
        to: TypeRef,
    },
    /// Property switched between `val` and `var`.
    Mutability {
        /// Baseline mutability.
        from: bool,
        /// Evolved mutability.
        to: bool,
    },
    /// A declaration modifier appeared.
    ModifierAdded(String),
    /// A declaration modifier disappeared.
    ModifierRemoved(String),
    /// Parameter names changed (types are pinned by the mangled key).
    ParamNames {
        /// Baseline names.
        from: Vec<String>,
        /// Evolved names.
        to: Vec<String>,
    },
}

impl Display for FieldChange {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kind { from, to } => write!(f, "kind {from} -> {to}"),
            Self::Visibility { from, to } => write!(f, "visibility {from} -> {to}"),
            Self::ValueType { from, to } => write!(f, "type {from} -> {to}"),
            Self::Mutability { from, to } => {
                let word = |m: bool| if m { "var" } else { "val" };
                write!(f, "mutability {} -> {}", word(*from), word(*to))
            }
            Self::ModifierAdded(m) => write!(f, "modifier `{m}` added"),
            Self::ModifierRemoved(m) => write!(f, "modifier `{m}` removed"),
            Self::ParamNames { from, to } => {
                write!(f, "params renamed ({}) -> ({})", from.join(","), to.join(","))
            }
        }
    }
}

/// All differences found in one symbol present on both sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolChange {
    /// Mangled symbol key.
    pub key: String,
    /// Field-level changes, in comparison order.
    pub changes: Vec<FieldChange>,
}

/// Structural diff between two interface tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceDelta {
    /// Keys only the evolved table exports.
    pub added: Vec<String>,
    /// Keys only the baseline table exports.
    pub removed: Vec<String>,
    /// Keys on both sides whose descriptors differ.
    pub changed: Vec<SymbolChange>,
}

impl InterfaceDelta {
    /// Diff `evolved` against `baseline`.
    #[must_use]
    pub fn between(baseline: &InterfaceTable, evolved: &InterfaceTable) -> Self {
        let mut delta = Self::default();

        for (key, base_desc) in baseline.iter() {
            match evolved.get(key) {
                None => delta.removed.push(key.to_owned()),
                Some(evo_desc) => {
                    let changes = diff_descriptors(base_desc, evo_desc);
                    if !changes.is_empty() {
                        delta.changed.push(SymbolChange {
                            key: key.to_owned(),
                            changes,
                        });
                    }
                }
            }
        }
        for (key, _) in evolved.iter() {
            if baseline.get(key).is_none() {
                delta.added.push(key.to_owned());
            }
        }
        delta
    }

    /// True when the two surfaces are structurally identical.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    /// Multi-line rendering for failure reports.
    #[must_use]
    pub fn render(&self) -> String {
        if self.is_empty() {
            return "interface unchanged".to_owned();
        }
        let mut out = String::new();
        for key in &self.added {
            out.push_str(&format!("+ {key}\n"));
        }
        for key in &self.removed {
            out.push_str(&format!("- {key}\n"));
        }
        for change in &self.changed {
            for field in &change.changes {
                out.push_str(&format!("~ {}: {}\n", change.key, field));
            }
        }
        out.pop();
        out
    }
}

fn diff_descriptors(base: &SignatureDescriptor, evo: &SignatureDescriptor) -> Vec<FieldChange> {
    let mut changes = Vec::new();

    if base.kind != evo.kind {
        changes.push(FieldChange::Kind {
            from: base.kind,
            to: evo.kind,
        });
    }
    if base.visibility != evo.visibility {
        changes.push(FieldChange::Visibility {
            from: base.visibility,
            to: evo.visibility,
        });
    }
    if base.return_type != evo.return_type {
        changes.push(FieldChange::ValueType {
            from: base.return_type.clone(),
            to: evo.return_type.clone(),
        });
    }
    if base.mutable != evo.mutable {
        changes.push(FieldChange::Mutability {
            from: base.mutable,
            to: evo.mutable,
        });
    }

    let base_mods = base.modifiers.as_keywords();
    let evo_mods = evo.modifiers.as_keywords();
    for m in &evo_mods {
        if !base_mods.contains(m) {
            changes.push(FieldChange::ModifierAdded((*m).to_owned()));
        }
    }
    for m in &base_mods {
        if !evo_mods.contains(m) {
            changes.push(FieldChange::ModifierRemoved((*m).to_owned()));
        }
    }

    let base_names: Vec<String> = base.params.iter().map(|p| p.name.clone()).collect();
    let evo_names: Vec<String> = evo.params.iter().map(|p| p.name.clone()).collect();
    if base_names != evo_names {
        changes.push(FieldChange::ParamNames {
            from: base_names,
            to: evo_names,
        });
    }

    changes
}
