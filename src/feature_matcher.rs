//! Reconciliation of the training-time feature contract against the columns
//! the preprocessing transform actually produces.
//!
//! Transforms rename and expand columns (`num__person_income`,
//! `cat__loan_grade_A`) in ways the contract cannot anticipate. Each canonical
//! name is resolved through an ordered list of match tiers, from strict to
//! loose; the first tier that finds anything wins. The tier used is recorded
//! per name so loose matches can be audited.

use crate::error::{ScoringError, Stage};
use crate::types::frame::{SelectedFrame, TransformedFrame};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Delimiter transforms use between a namespace prefix and the base name
pub const NAMESPACE_DELIMITER: &str = "__";

/// Ordered feature names the model was trained on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureContract {
    /// Feature-vector version the contract belongs to
    #[serde(default)]
    pub version: String,
    /// Canonical names in training order; duplicates are tolerated
    #[serde(rename = "selected_features", alias = "features")]
    pub features: Vec<String>,
}

impl FeatureContract {
    pub fn new(version: impl Into<String>, features: Vec<String>) -> Self {
        Self {
            version: version.into(),
            features,
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Strategy that resolved a canonical name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchTier {
    /// Column name equals the canonical name
    Exact,
    /// Column ends with `__<name>` or with `<name>`
    Suffix,
    /// Column contains `<name>` anywhere; may produce false positives
    Containment,
}

type Matcher = fn(column: &str, canonical: &str) -> bool;

/// Tiers in the order they are tried.
const MATCH_STRATEGIES: &[(MatchTier, Matcher)] = &[
    (MatchTier::Exact, matches_exact),
    (MatchTier::Suffix, matches_suffix),
    (MatchTier::Containment, matches_containment),
];

fn matches_exact(column: &str, canonical: &str) -> bool {
    column == canonical
}

fn matches_suffix(column: &str, canonical: &str) -> bool {
    column
        .strip_suffix(canonical)
        .is_some_and(|prefix| prefix.ends_with(NAMESPACE_DELIMITER))
        || column.ends_with(canonical)
}

fn matches_containment(column: &str, canonical: &str) -> bool {
    column.contains(canonical)
}

/// Resolution of one canonical name
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureMatch {
    pub canonical: String,
    /// `None` for a soft miss
    pub tier: Option<MatchTier>,
    /// Matched columns in transformed-frame order
    pub columns: Vec<String>,
}

impl FeatureMatch {
    pub fn is_miss(&self) -> bool {
        self.tier.is_none()
    }
}

/// Per-name matches plus the deduplicated column selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureMapping {
    matches: Vec<FeatureMatch>,
    selected: Vec<String>,
}

impl FeatureMapping {
    /// Matches in contract order
    pub fn matches(&self) -> &[FeatureMatch] {
        &self.matches
    }

    /// Deduplicated columns in first-occurrence order
    pub fn selected(&self) -> &[String] {
        &self.selected
    }

    pub fn tier_of(&self, canonical: &str) -> Option<MatchTier> {
        self.matches
            .iter()
            .find(|m| m.canonical == canonical)
            .and_then(|m| m.tier)
    }

    /// Canonical names with no matching column
    pub fn unmatched(&self) -> Vec<String> {
        self.matches
            .iter()
            .filter(|m| m.is_miss())
            .map(|m| m.canonical.clone())
            .collect()
    }

    /// Diagnostic summary attached to scoring results
    pub fn report(&self) -> ReconciliationReport {
        let loose_matches = self
            .matches
            .iter()
            .filter(|m| m.tier == Some(MatchTier::Containment))
            .map(|m| m.canonical.clone())
            .collect();
        let unmatched = self.unmatched();

        ReconciliationReport {
            expected: self.matches.len(),
            matched: self.matches.len() - unmatched.len(),
            selected: self.selected.len(),
            unmatched,
            loose_matches,
        }
    }
}

/// Counts and names describing how well the contract was satisfied.
///
/// A non-empty `unmatched` list means the model is running on a degraded
/// input set; scoring still succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// Canonical names in the contract
    pub expected: usize,
    /// Canonical names resolved by any tier
    pub matched: usize,
    /// Columns handed to the model
    pub selected: usize,
    pub unmatched: Vec<String>,
    /// Canonical names resolved only by the containment tier
    pub loose_matches: Vec<String>,
}

impl ReconciliationReport {
    pub fn is_degraded(&self) -> bool {
        !self.unmatched.is_empty()
    }
}

/// Map each canonical name onto the transformed columns.
///
/// Fails with [`ScoringError::FeatureMatch`] only when nothing at all is
/// selected; partial misses are logged and recorded in the mapping.
pub fn reconcile(
    transformed_columns: &[String],
    canonical_names: &[String],
) -> Result<FeatureMapping, ScoringError> {
    let mut matches = Vec::with_capacity(canonical_names.len());
    let mut ordered: Vec<&str> = Vec::new();

    for canonical in canonical_names {
        let found = resolve(transformed_columns, canonical);

        match &found {
            Some((MatchTier::Containment, columns)) => {
                debug!(
                    canonical = %canonical,
                    columns = ?columns,
                    "Feature resolved by containment fallback"
                );
            }
            Some((tier, columns)) => {
                debug!(canonical = %canonical, tier = ?tier, columns = ?columns, "Feature resolved");
            }
            None => {
                warn!(canonical = %canonical, "No transformed column matches canonical feature");
            }
        }

        let (tier, columns) = match found {
            Some((tier, columns)) => (Some(tier), columns),
            None => (None, Vec::new()),
        };
        ordered.extend(columns.iter().copied());
        matches.push(FeatureMatch {
            canonical: canonical.clone(),
            tier,
            columns: columns.into_iter().map(str::to_string).collect(),
        });
    }

    let mut seen = HashSet::with_capacity(ordered.len());
    let selected: Vec<String> = ordered
        .into_iter()
        .filter(|column| seen.insert(*column))
        .map(str::to_string)
        .collect();

    if selected.is_empty() {
        return Err(ScoringError::FeatureMatch {
            canonical: canonical_names.to_vec(),
            available: transformed_columns.to_vec(),
        });
    }

    let mapping = FeatureMapping { matches, selected };
    let report = mapping.report();
    if report.is_degraded() {
        warn!(
            selected = report.selected,
            expected = report.expected,
            unmatched = ?report.unmatched,
            "Feature contract partially satisfied"
        );
    }

    Ok(mapping)
}

/// First tier that finds any column for `canonical`, with its columns.
fn resolve<'a>(columns: &'a [String], canonical: &str) -> Option<(MatchTier, Vec<&'a str>)> {
    if canonical.is_empty() {
        return None;
    }

    MATCH_STRATEGIES.iter().find_map(|(tier, matcher)| {
        let found: Vec<&str> = columns
            .iter()
            .map(String::as_str)
            .filter(|column| matcher(column, canonical))
            .collect();
        (!found.is_empty()).then_some((*tier, found))
    })
}

/// Restrict `frame` to the mapping's selection, in selection order.
pub fn select(
    frame: &TransformedFrame,
    mapping: &FeatureMapping,
) -> Result<SelectedFrame, ScoringError> {
    if mapping.selected.is_empty() {
        return Err(ScoringError::FeatureMatch {
            canonical: mapping.matches.iter().map(|m| m.canonical.clone()).collect(),
            available: frame.columns().to_vec(),
        });
    }

    let indices = mapping
        .selected
        .iter()
        .map(|column| {
            frame.column_index(column).ok_or_else(|| {
                ScoringError::internal(
                    Stage::Select,
                    format!("selected column '{}' is not in the transformed frame", column),
                )
            })
        })
        .collect::<Result<Vec<usize>, ScoringError>>()?;

    Ok(SelectedFrame::new(
        mapping.selected.clone(),
        frame.take_columns(&indices),
    ))
}
