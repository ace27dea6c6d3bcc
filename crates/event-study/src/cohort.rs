//! Declarative cohort segmentation.
//!
//! A cohort is a named predicate over a deal's classification pair. Each
//! definition lists the acquirer and target classes it admits; an empty list
//! admits every class. Definitions are data, so new cohorts come from
//! configuration rather than new code paths.

use crate::{
    deal::{AcquirerClass, DealProfile, TargetClass},
    returns::{AbnormalReturn, ExclusionCounts, WindowSample},
};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A named cohort predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CohortDefinition {
    /// Cohort name, unique within a study
    pub name: String,
    /// Admitted acquirer classes; empty admits all
    #[serde(default)]
    pub acquirer: Vec<AcquirerClass>,
    /// Admitted target classes; empty admits all
    #[serde(default)]
    pub target: Vec<TargetClass>,
}

impl CohortDefinition {
    /// A cohort admitting every deal.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            acquirer: Vec::new(),
            target: Vec::new(),
        }
    }

    /// Restricts the cohort to an additional acquirer class.
    pub fn with_acquirer(mut self, class: AcquirerClass) -> Self {
        self.acquirer.push(class);
        self
    }

    /// Restricts the cohort to an additional target class.
    pub fn with_target(mut self, class: TargetClass) -> Self {
        self.target.push(class);
        self
    }

    /// Whether the predicate places no restriction on classification.
    pub fn is_unconstrained(&self) -> bool {
        self.acquirer.is_empty() && self.target.is_empty()
    }

    /// Evaluates the predicate.
    pub fn matches(&self, profile: &DealProfile) -> bool {
        (self.acquirer.is_empty() || self.acquirer.contains(&profile.acquirer))
            && (self.target.is_empty() || self.target.contains(&profile.target))
    }

    /// Whether a dropped deal counts against this cohort.
    ///
    /// Deals whose classification could not be read are attributed only to
    /// unconstrained cohorts.
    pub fn attributes(&self, profile: Option<&DealProfile>) -> bool {
        profile.map_or_else(|| self.is_unconstrained(), |p| self.matches(p))
    }
}

/// The three cohorts of the carbon M&A study.
pub fn default_cohorts() -> Vec<CohortDefinition> {
    vec![
        CohortDefinition::new("All Deals"),
        CohortDefinition::new("Green Target").with_target(TargetClass::Green),
        CohortDefinition::new("Brown Acquirer - Green Target")
            .with_acquirer(AcquirerClass::Brown)
            .with_target(TargetClass::Green),
    ]
}

/// Members of one cohort within one window.
#[derive(Debug, Clone)]
pub struct Cohort<'a> {
    /// Predicate that selected the members
    pub definition: &'a CohortDefinition,
    /// Matching observations, ordered by deal id then dates
    pub members: Vec<&'a AbnormalReturn>,
    /// Window-level exclusions attributable to this cohort
    pub exclusions: ExclusionCounts,
}

impl Cohort<'_> {
    /// Cohort name.
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the cohort has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Splits a window sample into one cohort per definition.
///
/// Cohorts may overlap. Membership depends only on the set of observations,
/// not on their input order.
pub fn segment<'a>(sample: &'a WindowSample, definitions: &'a [CohortDefinition]) -> Vec<Cohort<'a>> {
    definitions
        .iter()
        .map(|definition| {
            let mut members: Vec<&AbnormalReturn> = sample
                .observations
                .iter()
                .filter(|obs| definition.matches(&obs.profile))
                .collect();
            members.sort_by(|a, b| {
                a.deal_id
                    .cmp(&b.deal_id)
                    .then(a.start_date.cmp(&b.start_date))
                    .then(a.end_date.cmp(&b.end_date))
                    .then(a.abnormal_return.total_cmp(&b.abnormal_return))
            });

            let exclusions = sample
                .exclusions
                .iter()
                .filter(|e| definition.attributes(e.profile.as_ref()))
                .map(|e| e.reason)
                .collect();

            if members.is_empty() {
                warn!(cohort = %definition.name, window = sample.window_days, "cohort has no members");
            }
            Cohort {
                definition,
                members,
                exclusions,
            }
        })
        .collect()
}

/// Names of the cohorts an observation belongs to.
pub fn memberships<'a>(obs: &AbnormalReturn, definitions: &'a [CohortDefinition]) -> Vec<&'a str> {
    definitions
        .iter()
        .filter(|d| d.matches(&obs.profile))
        .map(|d| d.name.as_str())
        .collect()
}
