//! Dependency resolver.
//!
//! Read-only view over the readiness queue for one sink. The resolver
//! runs on the caller's connection inside the caller's transaction; it
//! never opens its own and never consumes queue entries. Claiming is the
//! run lifecycle's job.

use rusqlite::{Connection, OptionalExtension, ToSql};

use flowtrace_types::dependency::{DependencyCheck, ReadySet, ReadySource};
use flowtrace_types::ids::{ObserverId, RelId, RunId};
use flowtrace_types::observer::{ObserverKey, SinkRef};
use flowtrace_types::run::RunStatus;

use crate::error::{CoordinatorError, Result};
use crate::registry;

/// Parse a wire-format dependency check (policy kind plus optional id
/// list) into its typed form.
///
/// # Errors
///
/// Returns [`CoordinatorError::Validation`] for an unknown kind, or for
/// a `source_ids`/`source_run_ids` kind with an empty id list.
pub fn parse_dependency_check(kind: &str, ids: &[String]) -> Result<DependencyCheck> {
    match kind {
        "any" => Ok(DependencyCheck::Any),
        "all" => Ok(DependencyCheck::All),
        "ignore" => Ok(DependencyCheck::Ignore),
        "source_ids" => {
            if ids.is_empty() {
                return Err(CoordinatorError::Validation(
                    "source_ids dependency check requires a non-empty id list".into(),
                ));
            }
            Ok(DependencyCheck::SourceIds(
                ids.iter().cloned().map(ObserverId::new).collect(),
            ))
        }
        "source_run_ids" => {
            if ids.is_empty() {
                return Err(CoordinatorError::Validation(
                    "source_run_ids dependency check requires a non-empty id list".into(),
                ));
            }
            Ok(DependencyCheck::SourceRunIds(
                ids.iter().cloned().map(RunId::new).collect(),
            ))
        }
        other => Err(CoordinatorError::Validation(format!(
            "unknown dependency check kind '{other}'"
        ))),
    }
}

/// Resolve a sink reference to a concrete observer id.
pub(crate) fn resolve_sink(conn: &Connection, sink: &SinkRef) -> Result<ObserverId> {
    match sink {
        SinkRef::ById(id) => {
            if registry::exists(conn, id)? {
                Ok(id.clone())
            } else {
                Err(CoordinatorError::NotFound(format!(
                    "observer {id} does not exist"
                )))
            }
        }
        SinkRef::ByKey(key) => registry::lookup_id(conn, key)?.ok_or_else(|| {
            CoordinatorError::NotFound(format!(
                "no observer matches coordinates {}/{}/{}/{}",
                key.model_namespace, key.model_name, key.model_dataset_props, key.model_zone_tag
            ))
        }),
    }
}

/// Comma-separated `?N` placeholder list for a dynamic IN clause,
/// numbering from `start`.
pub(crate) fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// What is currently queued for `sink_id`, filtered per the policy.
///
/// Entries join the association endpoints, the source run's reported
/// metadata, and the source observer's coordinates, ordered oldest-ready
/// first. For the `all` policy an incomplete fan-in clears `entries` so
/// a partial set can never be claimed; the summary fields still report
/// what was found.
pub(crate) fn ready_sources(
    conn: &Connection,
    sink_id: &ObserverId,
    check: &DependencyCheck,
) -> Result<ReadySet> {
    match check {
        DependencyCheck::SourceIds(ids) if ids.is_empty() => {
            return Err(CoordinatorError::Validation(
                "source_ids dependency check requires a non-empty id list".into(),
            ));
        }
        DependencyCheck::SourceRunIds(ids) if ids.is_empty() => {
            return Err(CoordinatorError::Validation(
                "source_run_ids dependency check requires a non-empty id list".into(),
            ));
        }
        _ => {}
    }

    let static_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM associations WHERE sink_id = ?1 AND terminated_at IS NULL",
        [sink_id.as_str()],
        |row| row.get(0),
    )?;
    let active_run: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM observer_runs WHERE observer_id = ?1 AND status IN (?2, ?3) LIMIT 1",
            rusqlite::params![
                sink_id.as_str(),
                RunStatus::Ready.as_code(),
                RunStatus::Started.as_code()
            ],
            |row| row.get(0),
        )
        .optional()?;

    let success_code = RunStatus::Success.as_code();
    let mut sql = String::from(
        "SELECT q.queue_id, q.rel_id, a.source_id, a.sink_id, q.source_run_id, \
                q.source_ready_at, r.batch_run_id, r.partition_key, r.record_count, \
                o.model_name, o.model_namespace, o.model_dataset_props, o.model_zone_tag \
         FROM readiness_queue q \
         JOIN associations a ON a.rel_id = q.rel_id \
         JOIN observer_runs r ON r.run_id = q.source_run_id \
         JOIN observers o ON o.observer_id = a.source_id \
         WHERE a.sink_id = ?1 AND q.sink_run_id IS NULL AND r.status = ?2",
    );
    let mut values: Vec<Box<dyn ToSql>> =
        vec![Box::new(sink_id.as_str().to_owned()), Box::new(success_code)];
    match check {
        DependencyCheck::SourceIds(ids) => {
            sql.push_str(&format!(
                " AND a.source_id IN ({})",
                placeholders(values.len() + 1, ids.len())
            ));
            for id in ids {
                values.push(Box::new(id.as_str().to_owned()));
            }
        }
        DependencyCheck::SourceRunIds(run_ids) => {
            sql.push_str(&format!(
                " AND q.source_run_id IN ({})",
                placeholders(values.len() + 1, run_ids.len())
            ));
            for id in run_ids {
                values.push(Box::new(id.as_str().to_owned()));
            }
        }
        _ => {}
    }
    sql.push_str(" ORDER BY q.source_ready_at ASC, q.queue_id ASC");

    let refs: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(refs.as_slice(), |row| {
        Ok(ReadySource {
            queue_id: row.get(0)?,
            rel_id: RelId::new(row.get::<_, String>(1)?),
            source_id: ObserverId::new(row.get::<_, String>(2)?),
            sink_id: ObserverId::new(row.get::<_, String>(3)?),
            source_run_id: RunId::new(row.get::<_, String>(4)?),
            source_ready_at: row.get(5)?,
            batch_run_id: row.get(6)?,
            partition_key: row.get(7)?,
            record_count: row.get(8)?,
            source_key: ObserverKey {
                model_name: row.get(9)?,
                model_namespace: row.get(10)?,
                model_dataset_props: row.get(11)?,
                model_zone_tag: row.get(12)?,
            },
        })
    })?;
    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?);
    }

    let mut source_ids: Vec<ObserverId> = Vec::new();
    let mut source_run_ids: Vec<RunId> = Vec::new();
    for entry in &entries {
        if !source_ids.contains(&entry.source_id) {
            source_ids.push(entry.source_id.clone());
        }
        source_run_ids.push(entry.source_run_id.clone());
    }

    let static_count = usize::try_from(static_count).unwrap_or(0);
    if matches!(check, DependencyCheck::All) && source_ids.len() != static_count {
        // an unsatisfied `all` must never offer a partial set for claiming
        entries.clear();
    }

    Ok(ReadySet {
        entries,
        static_count,
        source_ids,
        source_run_ids,
        orphan: active_run.is_some(),
    })
}
