//! Audience-targeting selection algebra.
//!
//! Three independent segment axes (school, batch, center) each hold either the
//! `ALL` sentinel or an explicit set of codes. The toggle rules below are pure
//! and deterministic so the canonicalization laws can be tested directly,
//! without any UI event system in the loop.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Sentinel string used in the persisted document shape.
pub const ALL_SENTINEL: &str = "ALL";

/// One axis of a targeting selection: every known code, or an explicit set.
///
/// Canonical form guarantees the two representations never alias: an explicit
/// set that covers the whole axis universe collapses to `All`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SegmentSetRepr", into = "SegmentSetRepr")]
pub enum SegmentSet {
    All,
    Codes(BTreeSet<String>),
}

/// Wire shape: `"ALL"` or a JSON array of codes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum SegmentSetRepr {
    Sentinel(String),
    Codes(Vec<String>),
}

impl From<SegmentSetRepr> for SegmentSet {
    fn from(repr: SegmentSetRepr) -> Self {
        match repr {
            SegmentSetRepr::Sentinel(value) if value == ALL_SENTINEL => SegmentSet::All,
            // A bare string that is not the sentinel is treated as a one-code set.
            SegmentSetRepr::Sentinel(value) => SegmentSet::Codes(BTreeSet::from([value])),
            SegmentSetRepr::Codes(codes) => SegmentSet::Codes(codes.into_iter().collect()),
        }
    }
}

impl From<SegmentSet> for SegmentSetRepr {
    fn from(set: SegmentSet) -> Self {
        match set {
            SegmentSet::All => SegmentSetRepr::Sentinel(ALL_SENTINEL.to_string()),
            SegmentSet::Codes(codes) => SegmentSetRepr::Codes(codes.into_iter().collect()),
        }
    }
}

impl Default for SegmentSet {
    fn default() -> Self {
        Self::Codes(BTreeSet::new())
    }
}

impl SegmentSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn codes<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Codes(codes.into_iter().map(Into::into).collect())
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    /// An axis with neither the sentinel nor any code selected.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::All => false,
            Self::Codes(codes) => codes.is_empty(),
        }
    }

    pub fn contains(&self, code: &str) -> bool {
        match self {
            Self::All => true,
            Self::Codes(codes) => codes.contains(code),
        }
    }

    /// Toggle the `ALL` sentinel: selecting it clears any individual codes,
    /// toggling it again returns the axis to empty.
    pub fn toggle_all(&mut self) {
        *self = match self {
            Self::All => Self::empty(),
            Self::Codes(_) => Self::All,
        };
    }

    /// Toggle one code against an axis whose universe holds `universe_size`
    /// known codes. A set that grows to cover the whole universe collapses to
    /// `All` so exhaustive selections and the sentinel never diverge.
    pub fn toggle_code(&mut self, code: &str, universe_size: usize) {
        match self {
            Self::All => {
                *self = Self::Codes(BTreeSet::from([code.to_string()]));
            }
            Self::Codes(codes) => {
                if !codes.remove(code) {
                    codes.insert(code.to_string());
                }
                if universe_size > 0 && codes.len() == universe_size {
                    *self = Self::All;
                }
            }
        }
    }
}

/// One of the three independently targetable axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentAxis {
    School,
    Batch,
    Center,
}

impl SegmentAxis {
    pub const fn ordered() -> [Self; 3] {
        [Self::School, Self::Batch, Self::Center]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::School => "School",
            Self::Batch => "Batch",
            Self::Center => "Center",
        }
    }
}

/// The known codes per axis, used for the collapse-to-`All` rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentUniverse {
    pub schools: BTreeSet<String>,
    pub batches: BTreeSet<String>,
    pub centers: BTreeSet<String>,
}

impl SegmentUniverse {
    pub fn new<A, B, C, S>(schools: A, batches: B, centers: C) -> Self
    where
        A: IntoIterator<Item = S>,
        B: IntoIterator<Item = S>,
        C: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            schools: schools.into_iter().map(Into::into).collect(),
            batches: batches.into_iter().map(Into::into).collect(),
            centers: centers.into_iter().map(Into::into).collect(),
        }
    }

    pub fn axis_len(&self, axis: SegmentAxis) -> usize {
        match axis {
            SegmentAxis::School => self.schools.len(),
            SegmentAxis::Batch => self.batches.len(),
            SegmentAxis::Center => self.centers.len(),
        }
    }
}

/// The full targeting selection attached to a posting when it is published.
///
/// Serialized flattened into the posting document as `target_schools`,
/// `target_batches`, and `target_centers`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSelection {
    #[serde(rename = "target_schools", default)]
    pub schools: SegmentSet,
    #[serde(rename = "target_batches", default)]
    pub batches: SegmentSet,
    #[serde(rename = "target_centers", default)]
    pub centers: SegmentSet,
}

impl TargetSelection {
    pub fn new(schools: SegmentSet, batches: SegmentSet, centers: SegmentSet) -> Self {
        Self {
            schools,
            batches,
            centers,
        }
    }

    /// Selection targeting every known code on every axis.
    pub fn everyone() -> Self {
        Self::new(SegmentSet::All, SegmentSet::All, SegmentSet::All)
    }

    fn axis_mut(&mut self, axis: SegmentAxis) -> &mut SegmentSet {
        match axis {
            SegmentAxis::School => &mut self.schools,
            SegmentAxis::Batch => &mut self.batches,
            SegmentAxis::Center => &mut self.centers,
        }
    }

    pub fn axis(&self, axis: SegmentAxis) -> &SegmentSet {
        match axis {
            SegmentAxis::School => &self.schools,
            SegmentAxis::Batch => &self.batches,
            SegmentAxis::Center => &self.centers,
        }
    }

    pub fn toggle_all(&mut self, axis: SegmentAxis) {
        self.axis_mut(axis).toggle_all();
    }

    pub fn toggle_code(&mut self, axis: SegmentAxis, code: &str, universe: &SegmentUniverse) {
        let universe_size = universe.axis_len(axis);
        self.axis_mut(axis).toggle_code(code, universe_size);
    }

    /// A posting may only be activated once every axis targets someone.
    pub fn is_complete(&self) -> bool {
        SegmentAxis::ordered()
            .iter()
            .all(|axis| !self.axis(*axis).is_empty())
    }

    /// Would a student in the given cohort see this posting?
    pub fn applies_to(&self, school: &str, batch: &str, center: &str) -> bool {
        self.schools.contains(school)
            && self.batches.contains(batch)
            && self.centers.contains(center)
    }
}
