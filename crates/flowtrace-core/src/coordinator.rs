//! Public coordinator surface.
//!
//! One [`Coordinator`] per deployment, constructed with an injected
//! session provider. Each operation checks a session out of the
//! provider, runs inside one transaction, and releases the session on
//! every exit path via drop.

use flowtrace_store::SqliteSessionProvider;
use flowtrace_types::dependency::{DependencyCheck, ReadySet, StartOutcome};
use flowtrace_types::ids::{ObserverId, RelId, RunId};
use flowtrace_types::observer::{Observer, ObserverKey, ObserverSpec, ObserverStatus, ObserverUpdate, SinkRef};
use flowtrace_types::run::{FinishStatus, FinishUpdate, RunRecord, StartOptions};

use crate::error::Result;
use crate::{graph, lifecycle, registry, resolver};

/// The dataset-run coordinator.
pub struct Coordinator {
    provider: SqliteSessionProvider,
}

impl Coordinator {
    /// Build a coordinator over the given session provider.
    #[must_use]
    pub fn new(provider: SqliteSessionProvider) -> Self {
        Self { provider }
    }

    /// Coordinator over a fresh in-memory store (for tests and demos).
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Internal`](crate::CoordinatorError::Internal)
    /// if the store cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(SqliteSessionProvider::in_memory()?))
    }

    /// Register a new observer; see the registry for dedup caveats.
    ///
    /// # Errors
    ///
    /// `Validation` for a negative zone tag; `Internal` on store failure.
    pub fn declare_observer(&self, spec: &ObserverSpec) -> Result<ObserverId> {
        let session = self.provider.acquire()?;
        let tx = session.unchecked_transaction()?;
        let id = registry::declare(&tx, spec)?;
        tx.commit()?;
        Ok(id)
    }

    /// Apply a partial update to an observer. Returns rows written.
    ///
    /// # Errors
    ///
    /// `Validation` when no field is set; `Internal` on store failure.
    pub fn update_observer(&self, id: &ObserverId, update: &ObserverUpdate) -> Result<usize> {
        let session = self.provider.acquire()?;
        let tx = session.unchecked_transaction()?;
        let rows = registry::update(&tx, id, update)?;
        tx.commit()?;
        Ok(rows)
    }

    /// Transition an observer's status. Returns rows written.
    ///
    /// # Errors
    ///
    /// `NotFound` when retiring an observer that still has active
    /// associations; `Internal` on store failure.
    pub fn update_observer_status(&self, id: &ObserverId, status: ObserverStatus) -> Result<usize> {
        let session = self.provider.acquire()?;
        let tx = session.unchecked_transaction()?;
        let rows = registry::update_status(&tx, id, status)?;
        tx.commit()?;
        Ok(rows)
    }

    /// Fetch an observer by id.
    ///
    /// # Errors
    ///
    /// `Internal` on store failure.
    pub fn get_observer(&self, id: &ObserverId) -> Result<Option<Observer>> {
        let session = self.provider.acquire()?;
        registry::get(&session, id)
    }

    /// True when an observer with this id exists, in any status.
    ///
    /// # Errors
    ///
    /// `Internal` on store failure.
    pub fn observer_exists(&self, id: &ObserverId) -> Result<bool> {
        let session = self.provider.acquire()?;
        registry::exists(&session, id)
    }

    /// Resolve an observer id from its coordinate tuple.
    ///
    /// # Errors
    ///
    /// `Internal` on store failure.
    pub fn lookup_observer_id(&self, key: &ObserverKey) -> Result<Option<ObserverId>> {
        let session = self.provider.acquire()?;
        registry::lookup_id(&session, key)
    }

    /// Remove a disabled, history-free observer. Returns false when the
    /// id matches nothing.
    ///
    /// # Errors
    ///
    /// `Validation` when the observer is not disabled or still has
    /// associations or runs; `Internal` on store failure.
    pub fn delete_observer(&self, id: &ObserverId) -> Result<bool> {
        let session = self.provider.acquire()?;
        let tx = session.unchecked_transaction()?;
        let removed = registry::delete(&tx, id)?;
        tx.commit()?;
        Ok(removed)
    }

    /// Create (or find) the active source→sink association.
    ///
    /// # Errors
    ///
    /// `NotFound` unless both endpoints exist and are enabled;
    /// `Internal` on store failure.
    pub fn associate(&self, source: &ObserverId, sink: &ObserverId) -> Result<RelId> {
        let session = self.provider.acquire()?;
        let tx = session.unchecked_transaction()?;
        let rel_id = graph::associate(&tx, source, sink)?;
        tx.commit()?;
        Ok(rel_id)
    }

    /// Terminate the active association between the pair, if any.
    /// Returns false when no active edge matched.
    ///
    /// # Errors
    ///
    /// `Internal` on store failure.
    pub fn disassociate(&self, source: &ObserverId, sink: &ObserverId) -> Result<bool> {
        let session = self.provider.acquire()?;
        let tx = session.unchecked_transaction()?;
        let terminated = graph::disassociate(&tx, source, sink)?;
        tx.commit()?;
        Ok(terminated)
    }

    /// Hard-delete every association where `source` is the source
    /// endpoint. Returns rows removed.
    ///
    /// # Errors
    ///
    /// `Internal` on store failure.
    pub fn disassociate_all_sinks_of(&self, source: &ObserverId) -> Result<usize> {
        let session = self.provider.acquire()?;
        let tx = session.unchecked_transaction()?;
        let rows = graph::disassociate_all_sinks_of(&tx, source)?;
        tx.commit()?;
        Ok(rows)
    }

    /// Hard-delete every association where `sink` is the sink endpoint.
    /// Returns rows removed.
    ///
    /// # Errors
    ///
    /// `Internal` on store failure.
    pub fn disassociate_all_sources_of(&self, sink: &ObserverId) -> Result<usize> {
        let session = self.provider.acquire()?;
        let tx = session.unchecked_transaction()?;
        let rows = graph::disassociate_all_sources_of(&tx, sink)?;
        tx.commit()?;
        Ok(rows)
    }

    /// Start a run for the sink if the dependency check passes, claiming
    /// the matched readiness entries exactly once.
    ///
    /// # Errors
    ///
    /// `Validation` for a disabled sink or an empty id list on a
    /// specific policy; `NotFound` for an unresolvable sink;
    /// `AlreadyActive` when the sink has an active run; `Dependency`
    /// when the policy is unsatisfied; `Internal` on store failure or a
    /// claim-count mismatch.
    pub fn start_run(
        &self,
        sink: &SinkRef,
        check: &DependencyCheck,
        opts: &StartOptions,
    ) -> Result<StartOutcome> {
        let session = self.provider.acquire()?;
        lifecycle::start(&session, sink, check, opts)
    }

    /// Finish a run; on success, fan readiness entries out to every
    /// active outgoing association. Returns entries created.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown run (or one finished concurrently);
    /// `AlreadyFinished` for a terminal run; `Internal` on store failure.
    pub fn finish_run(
        &self,
        run_id: &RunId,
        status: FinishStatus,
        update: &FinishUpdate,
    ) -> Result<usize> {
        let session = self.provider.acquire()?;
        lifecycle::finish(&session, run_id, status, update)
    }

    /// Inspect what is queued for a sink under a policy without
    /// consuming anything.
    ///
    /// Runs inside one transaction so the counts, the orphan flag, and
    /// the entry list describe a single store snapshot.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unresolvable sink; `Validation` for an empty id
    /// list on a specific policy; `Internal` on store failure.
    pub fn fetch_ready_sources(&self, sink: &SinkRef, check: &DependencyCheck) -> Result<ReadySet> {
        let session = self.provider.acquire()?;
        let tx = session.unchecked_transaction()?;
        let sink_id = resolver::resolve_sink(&tx, sink)?;
        let ready = resolver::ready_sources(&tx, &sink_id, check)?;
        tx.commit()?;
        Ok(ready)
    }

    /// Fetch a run record by id.
    ///
    /// # Errors
    ///
    /// `Internal` on store failure.
    pub fn get_run(&self, run_id: &RunId) -> Result<Option<RunRecord>> {
        let session = self.provider.acquire()?;
        lifecycle::get_run(&session, run_id)
    }
}
