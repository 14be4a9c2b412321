//! Run lifecycle.
//!
//! Start and finish own their transaction: every check, the queue claim,
//! and the run row mutation commit together or not at all. The
//! transaction rolls back on drop, so each early return leaves the store
//! untouched.

use rusqlite::{params, Connection, OptionalExtension, ToSql};

use flowtrace_store::schema;
use flowtrace_types::dependency::{DependencyCheck, ReadySet, StartOutcome};
use flowtrace_types::ids::{ObserverId, RunId};
use flowtrace_types::observer::{ObserverStatus, SinkRef};
use flowtrace_types::run::{FinishStatus, FinishUpdate, RunRecord, RunStatus, StartOptions};

use crate::error::{CoordinatorError, Result};
use crate::resolver;

/// Start a run for the sink if its dependency check is satisfied.
///
/// Claims the matched readiness entries for the new run and inserts the
/// run row in `started` status, snapshotting the observer's config. The
/// at-most-one-active-run invariant is enforced twice: the orphan
/// pre-check and a recount after the insert, which catches two starters
/// racing past the pre-check.
pub(crate) fn start(
    conn: &Connection,
    sink: &SinkRef,
    check: &DependencyCheck,
    opts: &StartOptions,
) -> Result<StartOutcome> {
    let tx = conn.unchecked_transaction()?;
    let sink_id = resolver::resolve_sink(&tx, sink)?;

    let status_code: i64 = tx.query_row(
        "SELECT status FROM observers WHERE observer_id = ?1",
        [sink_id.as_str()],
        |row| row.get(0),
    )?;
    if ObserverStatus::from_code(status_code) != Some(ObserverStatus::Enabled) {
        return Err(CoordinatorError::Validation(format!(
            "observer {sink_id} is not enabled and cannot start a run"
        )));
    }

    let ready = resolver::ready_sources(&tx, &sink_id, check)?;
    if ready.orphan {
        return Err(CoordinatorError::AlreadyActive(format!(
            "observer {sink_id} already has an active run"
        )));
    }
    if !ready.satisfies(check) {
        return Err(CoordinatorError::Dependency(format!(
            "{} check not satisfied for observer {sink_id}: {} of {} sources ready",
            check.kind(),
            ready.source_ids.len(),
            ready.static_count
        )));
    }

    let run_id = RunId::generate();
    let now = schema::now_timestamp();
    let claimed = claim_entries(&tx, &run_id, &now, &ready, check)?;
    if let DependencyCheck::SourceRunIds(requested) = check {
        // compare against distinct run ids so a repeated id in the
        // caller's list is not mistaken for a consistency breach
        let mut distinct: Vec<&str> = Vec::new();
        for id in requested {
            if !distinct.contains(&id.as_str()) {
                distinct.push(id.as_str());
            }
        }
        if claimed != distinct.len() {
            return Err(CoordinatorError::internal(format!(
                "claimed {claimed} readiness entries but {} distinct source runs were requested",
                distinct.len()
            )));
        }
    }

    let inserted = tx.execute(
        "INSERT INTO observer_runs (run_id, observer_id, status, start_dt, breadcrumb, \
         ext_job_run_key, ext_job_run_log_link, ext_etl_proc_key, ext_etl_proc_log_link, \
         observer_config) \
         SELECT ?1, observer_id, ?2, ?3, ?4, ?5, ?6, ?7, ?8, observer_config \
         FROM observers WHERE observer_id = ?9",
        params![
            run_id.as_str(),
            RunStatus::Started.as_code(),
            now,
            opts.breadcrumb,
            opts.ext_job_run_key,
            opts.ext_job_run_log_link,
            opts.ext_etl_proc_key,
            opts.ext_etl_proc_log_link,
            sink_id.as_str(),
        ],
    )?;
    if inserted != 1 {
        return Err(CoordinatorError::internal(format!(
            "run insert for observer {sink_id} affected {inserted} rows"
        )));
    }

    let active: i64 = tx.query_row(
        "SELECT COUNT(*) FROM observer_runs WHERE observer_id = ?1 AND status IN (?2, ?3)",
        params![
            sink_id.as_str(),
            RunStatus::Ready.as_code(),
            RunStatus::Started.as_code()
        ],
        |row| row.get(0),
    )?;
    if active > 1 {
        // a concurrent starter won; dropping the transaction undoes our insert
        return Err(CoordinatorError::AlreadyActive(format!(
            "observer {sink_id} gained a concurrent active run"
        )));
    }

    tx.commit()?;
    tracing::info!(
        run_id = %run_id,
        observer_id = %sink_id,
        policy = check.kind(),
        claimed,
        "run started"
    );
    Ok(StartOutcome {
        run_id,
        sink_id,
        ready,
    })
}

/// Mark the matched queue entries consumed by `run_id`.
///
/// The conditional `sink_run_id IS NULL` makes the claim exactly-once:
/// an entry already taken by a concurrent starter is silently skipped.
/// The update is restricted to the associations the resolver matched,
/// plus the caller's run list for the `source_run_ids` policy.
fn claim_entries(
    tx: &Connection,
    run_id: &RunId,
    now: &str,
    ready: &ReadySet,
    check: &DependencyCheck,
) -> Result<usize> {
    if ready.entries.is_empty() {
        return Ok(0);
    }
    let mut rel_ids: Vec<&str> = Vec::new();
    for entry in &ready.entries {
        if !rel_ids.contains(&entry.rel_id.as_str()) {
            rel_ids.push(entry.rel_id.as_str());
        }
    }
    let mut values: Vec<&str> = vec![run_id.as_str(), now];
    let mut sql = format!(
        "UPDATE readiness_queue SET sink_run_id = ?1, sink_started_at = ?2 \
         WHERE sink_run_id IS NULL AND rel_id IN ({})",
        resolver::placeholders(values.len() + 1, rel_ids.len())
    );
    values.extend(rel_ids);
    if let DependencyCheck::SourceRunIds(run_ids) = check {
        sql.push_str(&format!(
            " AND source_run_id IN ({})",
            resolver::placeholders(values.len() + 1, run_ids.len())
        ));
        values.extend(run_ids.iter().map(RunId::as_str));
    }
    let claimed = tx.execute(&sql, rusqlite::params_from_iter(values))?;
    Ok(claimed)
}

/// Move a run to a terminal status and, on success, fan readiness
/// entries out to every active outgoing association.
///
/// Returns the number of queue entries created (0 for `error`).
pub(crate) fn finish(
    conn: &Connection,
    run_id: &RunId,
    status: FinishStatus,
    update: &FinishUpdate,
) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let current: Option<(String, i64)> = tx
        .query_row(
            "SELECT observer_id, status FROM observer_runs WHERE run_id = ?1",
            [run_id.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let Some((observer_id, code)) = current else {
        return Err(CoordinatorError::NotFound(format!(
            "run {run_id} does not exist"
        )));
    };
    if RunStatus::from_code(code).is_some_and(RunStatus::is_terminal) {
        return Err(CoordinatorError::AlreadyFinished(format!(
            "run {run_id} is already in a terminal status"
        )));
    }

    let now = schema::now_timestamp();
    let mut sets = vec!["status = ?1".to_owned(), "end_dt = ?2".to_owned()];
    let mut values: Vec<Box<dyn ToSql>> = vec![
        Box::new(status.as_run_status().as_code()),
        Box::new(now.clone()),
    ];
    if let Some(count) = update.record_count {
        values.push(Box::new(count));
        sets.push(format!("record_count = ?{}", values.len()));
    }
    for (column, value) in [
        ("batch_run_id", &update.batch_run_id),
        ("partition_key", &update.partition_key),
        ("ext_job_run_key", &update.ext_job_run_key),
        ("ext_job_run_log_link", &update.ext_job_run_log_link),
        ("ext_etl_proc_key", &update.ext_etl_proc_key),
        ("ext_etl_proc_log_link", &update.ext_etl_proc_log_link),
    ] {
        if let Some(value) = value {
            values.push(Box::new(value.clone()));
            sets.push(format!("{column} = ?{}", values.len()));
        }
    }
    values.push(Box::new(run_id.as_str().to_owned()));
    let run_param = values.len();
    values.push(Box::new(RunStatus::Ready.as_code()));
    values.push(Box::new(RunStatus::Started.as_code()));
    let sql = format!(
        "UPDATE observer_runs SET {} WHERE run_id = ?{run_param} \
         AND status IN (?{}, ?{})",
        sets.join(", "),
        run_param + 1,
        run_param + 2
    );
    let refs: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
    let rows = tx.execute(&sql, refs.as_slice())?;
    if rows != 1 {
        // lost the race with another finisher between the read and the update
        return Err(CoordinatorError::NotFound(format!(
            "run {run_id} was finished concurrently"
        )));
    }

    let fanned_out = if status == FinishStatus::Success {
        tx.execute(
            "INSERT INTO readiness_queue (rel_id, source_run_id, source_ready_at) \
             SELECT rel_id, ?1, ?2 FROM associations \
             WHERE source_id = ?3 AND terminated_at IS NULL",
            params![run_id.as_str(), now, observer_id],
        )?
    } else {
        0
    };

    tx.commit()?;
    tracing::info!(run_id = %run_id, status = %status, fanned_out, "run finished");
    Ok(fanned_out)
}

/// Fetch a full run record by id.
pub(crate) fn get_run(conn: &Connection, run_id: &RunId) -> Result<Option<RunRecord>> {
    let record = conn
        .query_row(
            "SELECT run_id, observer_id, status, start_dt, end_dt, record_count, batch_run_id, \
             partition_key, ext_job_run_key, ext_job_run_log_link, ext_etl_proc_key, \
             ext_etl_proc_log_link, breadcrumb, observer_config \
             FROM observer_runs WHERE run_id = ?1",
            [run_id.as_str()],
            |row| {
                let code: i64 = row.get(2)?;
                let status = RunStatus::from_code(code)
                    .ok_or(rusqlite::Error::IntegralValueOutOfRange(2, code))?;
                Ok(RunRecord {
                    run_id: RunId::new(row.get::<_, String>(0)?),
                    observer_id: ObserverId::new(row.get::<_, String>(1)?),
                    status,
                    start_dt: row.get(3)?,
                    end_dt: row.get(4)?,
                    record_count: row.get(5)?,
                    batch_run_id: row.get(6)?,
                    partition_key: row.get(7)?,
                    ext_job_run_key: row.get(8)?,
                    ext_job_run_log_link: row.get(9)?,
                    ext_etl_proc_key: row.get(10)?,
                    ext_etl_proc_log_link: row.get(11)?,
                    breadcrumb: row.get(12)?,
                    observer_config: row.get(13)?,
                })
            },
        )
        .optional()?;
    Ok(record)
}
