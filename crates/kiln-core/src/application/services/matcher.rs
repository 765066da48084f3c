//! Transformer Matcher - selects the transformers that apply to a component.
//!
//! A transformer is a candidate when at least one of the component's
//! elements is covered by its declarations. An element is covered when a
//! declaration equals its FQN or its short name.
//!
//! ## Strategies
//!
//! - `all`: every candidate is selected
//! - `best`: candidates whose coverage is a strict subset of another
//!   candidate's coverage are dropped; equal coverage keeps the lowest FQN
//!
//! Selection is a pure function of (component, provider, options): it does
//! not depend on map iteration order, and the result is sorted by FQN.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::{
    application::ApplicationError,
    domain::{Component, Fqn, MatchStrategy, Provider, Transformer},
    error::KilnResult,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchOptions {
    pub strategy: MatchStrategy,
    pub strict: bool,
}

/// Transformers selected for one component.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub component_id: String,
    /// Sorted by transformer FQN.
    pub selected: Vec<Arc<Transformer>>,
    /// Elements no selected transformer covers, sorted by FQN.
    pub unmatched: Vec<Fqn>,
}

impl MatchResult {
    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn selected_fqns(&self) -> impl Iterator<Item = &Fqn> {
        self.selected.iter().map(|t| t.fqn())
    }
}

struct Candidate {
    transformer: Arc<Transformer>,
    coverage: BTreeSet<Fqn>,
}

impl Candidate {
    /// Whether `self` makes `other` redundant under `best`.
    fn dominates(&self, other: &Candidate) -> bool {
        let strictly_wider = self.coverage.len() > other.coverage.len()
            && other.coverage.is_subset(&self.coverage);
        let tie_winner =
            self.coverage == other.coverage && self.transformer.fqn() < other.transformer.fqn();
        strictly_wider || tie_winner
    }
}

/// Matches components against one provider.
pub struct Matcher {
    provider: Arc<Provider>,
    options: MatchOptions,
}

impl Matcher {
    pub fn new(provider: Arc<Provider>, options: MatchOptions) -> Self {
        Self { provider, options }
    }

    pub fn options(&self) -> MatchOptions {
        self.options
    }

    /// Select transformers for a flattened component.
    ///
    /// # Errors
    ///
    /// `ApplicationError::Match` when `strict` is set and some element is
    /// covered by no selected transformer.
    #[instrument(
        skip_all,
        fields(
            component = %component.id,
            provider = %self.provider.name(),
            strategy = %self.options.strategy
        )
    )]
    pub fn match_component(&self, component: &Component) -> KilnResult<MatchResult> {
        let candidates: Vec<Candidate> = self
            .provider
            .transformers
            .values()
            .filter_map(|transformer| {
                let coverage = coverage(transformer, component);
                (!coverage.is_empty()).then(|| Candidate {
                    transformer: Arc::clone(transformer),
                    coverage,
                })
            })
            .collect();

        let kept: Vec<&Candidate> = match self.options.strategy {
            MatchStrategy::All => candidates.iter().collect(),
            MatchStrategy::Best => candidates
                .iter()
                .filter(|c| !candidates.iter().any(|other| other.dominates(c)))
                .collect(),
        };

        let covered: HashSet<&Fqn> = kept.iter().flat_map(|c| c.coverage.iter()).collect();
        let unmatched: Vec<Fqn> = component
            .element_fqns()
            .filter(|fqn| !covered.contains(fqn))
            .cloned()
            .collect();

        let mut selected: Vec<Arc<Transformer>> =
            kept.iter().map(|c| Arc::clone(&c.transformer)).collect();
        selected.sort_by(|a, b| a.fqn().cmp(b.fqn()));

        debug!(
            candidates = candidates.len(),
            selected = selected.len(),
            unmatched = unmatched.len(),
            "Matched transformers"
        );

        if self.options.strict && !unmatched.is_empty() {
            return Err(ApplicationError::Match {
                component: component.id.clone(),
                unmatched,
            }
            .into());
        }

        Ok(MatchResult {
            component_id: component.id.clone(),
            selected,
            unmatched,
        })
    }
}

/// Elements of `component` covered by `transformer`'s declarations.
///
/// Only the FQN and the short name take part. Element `labels` classify
/// elements for display and never widen coverage, so a declaration equal
/// to a label value covers nothing.
fn coverage(transformer: &Transformer, component: &Component) -> BTreeSet<Fqn> {
    let declared: HashSet<&str> = transformer.declarations().collect();
    component
        .elements
        .values()
        .filter(|e| declared.contains(e.fqn.as_str()) || declared.contains(e.name.as_str()))
        .map(|e| e.fqn.clone())
        .collect()
}
