//! Association graph.
//!
//! Source→sink edges in the `associations` table. An edge with
//! `terminated_at IS NULL` is active; disassociation terminates it in
//! place so queue history stays attributable, while the bulk variants
//! hard-delete.

use rusqlite::{params, Connection, OptionalExtension};

use flowtrace_store::schema;
use flowtrace_types::ids::{ObserverId, RelId};
use flowtrace_types::observer::ObserverStatus;

use crate::error::{CoordinatorError, Result};

/// Create (or find) the active association from `source` to `sink`.
///
/// Idempotent: an existing active edge between the pair is returned
/// as-is. Both endpoints must currently exist and be enabled.
pub(crate) fn associate(
    conn: &Connection,
    source: &ObserverId,
    sink: &ObserverId,
) -> Result<RelId> {
    let enabled: i64 = conn.query_row(
        "SELECT COUNT(*) FROM observers WHERE observer_id IN (?1, ?2) AND status = ?3",
        params![
            source.as_str(),
            sink.as_str(),
            ObserverStatus::Enabled.as_code()
        ],
        |row| row.get(0),
    )?;
    match enabled {
        2 => {}
        1 => {
            return Err(CoordinatorError::NotFound(format!(
                "one of observers {source} and {sink} is missing or not enabled"
            )))
        }
        _ => {
            return Err(CoordinatorError::NotFound(format!(
                "both observers {source} and {sink} are missing or not enabled"
            )))
        }
    }
    let existing: Option<String> = conn
        .query_row(
            "SELECT rel_id FROM associations \
             WHERE source_id = ?1 AND sink_id = ?2 AND terminated_at IS NULL",
            params![source.as_str(), sink.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(rel_id) = existing {
        tracing::debug!(rel_id = %rel_id, "association already active");
        return Ok(RelId::new(rel_id));
    }
    let rel_id = RelId::generate();
    conn.execute(
        "INSERT INTO associations (rel_id, source_id, sink_id, created_at) \
         VALUES (?1, ?2, ?3, ?4)",
        params![
            rel_id.as_str(),
            source.as_str(),
            sink.as_str(),
            schema::now_timestamp()
        ],
    )?;
    tracing::info!(rel_id = %rel_id, source = %source, sink = %sink, "association created");
    Ok(rel_id)
}

/// Terminate the active association between the pair, if any.
///
/// Returns false when no active edge matched; that is not an error.
pub(crate) fn disassociate(
    conn: &Connection,
    source: &ObserverId,
    sink: &ObserverId,
) -> Result<bool> {
    let rows = conn.execute(
        "UPDATE associations SET terminated_at = ?1 \
         WHERE source_id = ?2 AND sink_id = ?3 AND terminated_at IS NULL",
        params![schema::now_timestamp(), source.as_str(), sink.as_str()],
    )?;
    tracing::info!(source = %source, sink = %sink, rows, "association terminated");
    Ok(rows > 0)
}

/// Hard-delete every association (active or terminated) where `source`
/// is the source endpoint. Returns rows removed.
pub(crate) fn disassociate_all_sinks_of(conn: &Connection, source: &ObserverId) -> Result<usize> {
    let rows = conn.execute(
        "DELETE FROM associations WHERE source_id = ?1",
        [source.as_str()],
    )?;
    tracing::info!(source = %source, rows, "outgoing associations removed");
    Ok(rows)
}

/// Hard-delete every association (active or terminated) where `sink` is
/// the sink endpoint. Returns rows removed.
pub(crate) fn disassociate_all_sources_of(conn: &Connection, sink: &ObserverId) -> Result<usize> {
    let rows = conn.execute(
        "DELETE FROM associations WHERE sink_id = ?1",
        [sink.as_str()],
    )?;
    tracing::info!(sink = %sink, rows, "incoming associations removed");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry;
    use flowtrace_types::observer::{ObserverKey, ObserverSpec};

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        schema::init(&conn).unwrap();
        conn
    }

    fn observer(conn: &Connection, name: &str) -> ObserverId {
        registry::declare(conn, &ObserverSpec::new(ObserverKey::new(name))).unwrap()
    }

    #[test]
    fn associate_is_idempotent() {
        let conn = conn();
        let source = observer(&conn, "raw");
        let sink = observer(&conn, "curated");
        let first = associate(&conn, &source, &sink).unwrap();
        let second = associate(&conn, &source, &sink).unwrap();
        assert_eq!(first, second);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM associations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn associate_requires_enabled_endpoints() {
        let conn = conn();
        let source = observer(&conn, "raw");
        let sink = observer(&conn, "curated");
        registry::update_status(&conn, &sink, ObserverStatus::Disabled).unwrap();
        let err = associate(&conn, &source, &sink).unwrap_err();
        assert!(matches!(err, CoordinatorError::NotFound(_)));
        assert!(err.to_string().contains("one of"));

        registry::update_status(&conn, &source, ObserverStatus::Disabled).unwrap();
        let err = associate(&conn, &source, &sink).unwrap_err();
        assert!(err.to_string().contains("both"));
    }

    #[test]
    fn disassociate_then_reassociate_creates_a_new_edge() {
        let conn = conn();
        let source = observer(&conn, "raw");
        let sink = observer(&conn, "curated");
        let first = associate(&conn, &source, &sink).unwrap();
        assert!(disassociate(&conn, &source, &sink).unwrap());
        assert!(!disassociate(&conn, &source, &sink).unwrap());
        let second = associate(&conn, &source, &sink).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn bulk_disassociation_hard_deletes() {
        let conn = conn();
        let source = observer(&conn, "raw");
        let a = observer(&conn, "curated_a");
        let b = observer(&conn, "curated_b");
        associate(&conn, &source, &a).unwrap();
        associate(&conn, &source, &b).unwrap();
        disassociate(&conn, &source, &b).unwrap();
        // terminated rows are removed too
        assert_eq!(disassociate_all_sinks_of(&conn, &source).unwrap(), 2);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM associations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn bulk_disassociation_by_sink() {
        let conn = conn();
        let a = observer(&conn, "raw_a");
        let b = observer(&conn, "raw_b");
        let sink = observer(&conn, "curated");
        associate(&conn, &a, &sink).unwrap();
        associate(&conn, &b, &sink).unwrap();
        assert_eq!(disassociate_all_sources_of(&conn, &sink).unwrap(), 2);
    }

    #[test]
    fn retirement_blocked_while_associated() {
        let conn = conn();
        let source = observer(&conn, "raw");
        let sink = observer(&conn, "curated");
        associate(&conn, &source, &sink).unwrap();
        assert!(matches!(
            registry::update_status(&conn, &source, ObserverStatus::Retired),
            Err(CoordinatorError::NotFound(_))
        ));
        disassociate(&conn, &source, &sink).unwrap();
        assert_eq!(
            registry::update_status(&conn, &source, ObserverStatus::Retired).unwrap(),
            1
        );
    }
}
