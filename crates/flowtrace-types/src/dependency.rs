//! Dependency policies and readiness-resolution results.
//!
//! A sink's start call names a [`DependencyCheck`] policy; the resolver
//! reports what is currently queued as a [`ReadySet`], and the run
//! lifecycle evaluates [`ReadySet::satisfies`] against the policy.

use serde::{Deserialize, Serialize};

use crate::ids::{ObserverId, RelId, RunId};
use crate::observer::ObserverKey;

/// Dependency-satisfaction policy for starting a sink run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyCheck {
    /// Start when at least one associated source is ready (or the sink has
    /// no associations at all).
    Any,
    /// Start only when every associated source is ready (or the sink has
    /// no associations at all).
    All,
    /// Start regardless of source readiness; queued entries are still
    /// reported and claimed.
    Ignore,
    /// Start only when at least one of the named source observers is
    /// ready; only their entries are matched.
    SourceIds(Vec<ObserverId>),
    /// Start only when at least one of the named source runs is queued;
    /// only their entries are matched.
    SourceRunIds(Vec<RunId>),
}

impl DependencyCheck {
    /// Wire-format policy name.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::All => "all",
            Self::Ignore => "ignore",
            Self::SourceIds(_) => "source_ids",
            Self::SourceRunIds(_) => "source_run_ids",
        }
    }

    /// True for the two policies that carry a caller-supplied id list.
    #[must_use]
    pub fn is_specific(&self) -> bool {
        matches!(self, Self::SourceIds(_) | Self::SourceRunIds(_))
    }
}

/// One unconsumed readiness-queue entry, joined to its association, the
/// source run's metadata, and the source observer's coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadySource {
    /// Queue row identity.
    pub queue_id: i64,
    /// Association that produced this entry.
    pub rel_id: RelId,
    pub source_id: ObserverId,
    pub sink_id: ObserverId,
    pub source_run_id: RunId,
    /// When the source run finished successfully.
    pub source_ready_at: String,
    /// Batch run id reported by the source run, if any.
    pub batch_run_id: Option<String>,
    /// Partition-key metadata reported by the source run, if any.
    pub partition_key: Option<String>,
    /// Record count reported by the source run, if any.
    pub record_count: Option<i64>,
    /// Coordinates of the source observer.
    pub source_key: ObserverKey,
}

/// Resolver output for one sink: what is queued and how it relates to the
/// declared fan-in.
///
/// `entries` are ordered oldest-ready-first. For the `all` policy the
/// resolver clears `entries` when the distinct ready-source count falls
/// short of `static_count`, so an unsatisfied `all` can never claim a
/// partial set; the summary fields still report what was found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadySet {
    /// Matched unconsumed queue entries, ordered by `source_ready_at` ASC.
    pub entries: Vec<ReadySource>,
    /// Number of currently-active associations with this sink (declared fan-in).
    pub static_count: usize,
    /// Distinct source observer ids represented among matched entries.
    pub source_ids: Vec<ObserverId>,
    /// Source run ids of matched entries, in entry order.
    pub source_run_ids: Vec<RunId>,
    /// True when the sink currently has a run in `ready`/`started` status.
    pub orphan: bool,
}

impl ReadySet {
    /// Evaluate the policy satisfaction rule against this result.
    ///
    /// `any` and `all` are trivially satisfied for a sink with no active
    /// associations; the specific-id policies require at least one match.
    #[must_use]
    pub fn satisfies(&self, check: &DependencyCheck) -> bool {
        match check {
            DependencyCheck::Ignore => true,
            DependencyCheck::Any => self.static_count == 0 || !self.source_ids.is_empty(),
            DependencyCheck::All => {
                self.static_count == 0 || self.source_ids.len() == self.static_count
            }
            DependencyCheck::SourceIds(_) | DependencyCheck::SourceRunIds(_) => {
                !self.source_ids.is_empty()
            }
        }
    }
}

/// Result of a successful start call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartOutcome {
    /// Id of the newly created run.
    pub run_id: RunId,
    /// The sink observer the run belongs to.
    pub sink_id: ObserverId,
    /// The readiness entries matched (and claimed) by this start.
    pub ready: ReadySet,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(static_count: usize, sources: usize) -> ReadySet {
        ReadySet {
            static_count,
            source_ids: (0..sources).map(|_| ObserverId::generate()).collect(),
            ..ReadySet::default()
        }
    }

    #[test]
    fn ignore_always_satisfied() {
        assert!(set(5, 0).satisfies(&DependencyCheck::Ignore));
    }

    #[test]
    fn any_satisfied_with_one_source_or_no_fan_in() {
        assert!(set(0, 0).satisfies(&DependencyCheck::Any));
        assert!(set(3, 1).satisfies(&DependencyCheck::Any));
        assert!(!set(3, 0).satisfies(&DependencyCheck::Any));
    }

    #[test]
    fn all_requires_full_fan_in() {
        assert!(set(0, 0).satisfies(&DependencyCheck::All));
        assert!(set(2, 2).satisfies(&DependencyCheck::All));
        assert!(!set(2, 1).satisfies(&DependencyCheck::All));
    }

    #[test]
    fn specific_policies_require_a_match() {
        let ids = vec![ObserverId::generate()];
        assert!(!set(2, 0).satisfies(&DependencyCheck::SourceIds(ids.clone())));
        assert!(set(2, 1).satisfies(&DependencyCheck::SourceIds(ids)));
        let runs = vec![RunId::generate()];
        assert!(!set(0, 0).satisfies(&DependencyCheck::SourceRunIds(runs)));
    }

    #[test]
    fn kind_strings() {
        assert_eq!(DependencyCheck::Any.kind(), "any");
        assert_eq!(DependencyCheck::SourceIds(vec![]).kind(), "source_ids");
        assert!(DependencyCheck::SourceRunIds(vec![]).is_specific());
        assert!(!DependencyCheck::Ignore.is_specific());
    }
}
