//! Observer registry.
//!
//! CRUD over the `observers` table. Every function runs on a borrowed
//! connection; the caller owns the transaction boundary.

use rusqlite::{params, Connection, OptionalExtension, ToSql};

use flowtrace_store::schema;
use flowtrace_types::ids::ObserverId;
use flowtrace_types::observer::{
    Observer, ObserverKey, ObserverSpec, ObserverStatus, ObserverUpdate,
};

use crate::error::{CoordinatorError, Result};

/// Register a new observer in `enabled` status and return its fresh id.
///
/// Coordinates are NOT checked for uniqueness; callers that need the
/// alternate key to stay unique must `lookup_id` first.
pub(crate) fn declare(conn: &Connection, spec: &ObserverSpec) -> Result<ObserverId> {
    if spec.key.model_zone_tag < 0 {
        return Err(CoordinatorError::Validation(format!(
            "model_zone_tag must be non-negative, got {}",
            spec.key.model_zone_tag
        )));
    }
    let id = ObserverId::generate();
    let now = schema::now_timestamp();
    conn.execute(
        "INSERT INTO observers (observer_id, model_name, model_namespace, model_dataset_props, \
         model_zone_tag, display_name, description, observer_config, status, created_at, \
         status_updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
        params![
            id.as_str(),
            spec.key.model_name,
            spec.key.model_namespace,
            spec.key.model_dataset_props,
            spec.key.model_zone_tag,
            spec.display_name,
            spec.description,
            spec.observer_config,
            ObserverStatus::Enabled.as_code(),
            now,
        ],
    )?;
    tracing::info!(observer_id = %id, model_name = %spec.key.model_name, "observer declared");
    Ok(id)
}

/// Apply a partial update to an observer's mutable fields.
///
/// Returns the number of rows written; 0 means the id matched nothing,
/// which is not an error. An update with no fields set is rejected.
pub(crate) fn update(conn: &Connection, id: &ObserverId, update: &ObserverUpdate) -> Result<usize> {
    if update.is_empty() {
        return Err(CoordinatorError::Validation(
            "observer update has no fields set".into(),
        ));
    }
    let mut sets: Vec<String> = Vec::new();
    let mut values: Vec<Box<dyn ToSql>> = Vec::new();
    if let Some(name) = &update.display_name {
        values.push(Box::new(name.clone()));
        sets.push(format!("display_name = ?{}", values.len()));
    }
    if let Some(description) = &update.description {
        values.push(Box::new(description.clone()));
        sets.push(format!("description = ?{}", values.len()));
    }
    if let Some(config) = &update.observer_config {
        values.push(Box::new(config.clone()));
        sets.push(format!("observer_config = ?{}", values.len()));
    }
    values.push(Box::new(schema::now_timestamp()));
    sets.push(format!("status_updated_at = ?{}", values.len()));
    values.push(Box::new(id.as_str().to_owned()));
    let sql = format!(
        "UPDATE observers SET {} WHERE observer_id = ?{}",
        sets.join(", "),
        values.len()
    );
    let refs: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
    let rows = conn.execute(&sql, refs.as_slice())?;
    tracing::debug!(observer_id = %id, rows, "observer updated");
    Ok(rows)
}

/// Transition an observer's lifecycle status.
///
/// Retirement is refused while any active association still references
/// the observer as source or sink.
pub(crate) fn update_status(
    conn: &Connection,
    id: &ObserverId,
    status: ObserverStatus,
) -> Result<usize> {
    if status == ObserverStatus::Retired {
        let active: i64 = conn.query_row(
            "SELECT COUNT(*) FROM associations \
             WHERE (source_id = ?1 OR sink_id = ?1) AND terminated_at IS NULL",
            [id.as_str()],
            |row| row.get(0),
        )?;
        if active > 0 {
            return Err(CoordinatorError::NotFound(format!(
                "observer {id} still has {active} active association(s) and cannot be retired"
            )));
        }
    }
    let rows = conn.execute(
        "UPDATE observers SET status = ?1, status_updated_at = ?2 WHERE observer_id = ?3",
        params![status.as_code(), schema::now_timestamp(), id.as_str()],
    )?;
    tracing::info!(observer_id = %id, status = %status, rows, "observer status updated");
    Ok(rows)
}

/// Fetch a full observer record by id.
pub(crate) fn get(conn: &Connection, id: &ObserverId) -> Result<Option<Observer>> {
    let observer = conn
        .query_row(
            "SELECT observer_id, model_name, model_namespace, model_dataset_props, \
             model_zone_tag, display_name, description, observer_config, status, created_at, \
             status_updated_at \
             FROM observers WHERE observer_id = ?1",
            [id.as_str()],
            |row| {
                let code: i64 = row.get(8)?;
                let status = ObserverStatus::from_code(code)
                    .ok_or(rusqlite::Error::IntegralValueOutOfRange(8, code))?;
                Ok(Observer {
                    observer_id: ObserverId::new(row.get::<_, String>(0)?),
                    key: ObserverKey {
                        model_name: row.get(1)?,
                        model_namespace: row.get(2)?,
                        model_dataset_props: row.get(3)?,
                        model_zone_tag: row.get(4)?,
                    },
                    display_name: row.get(5)?,
                    description: row.get(6)?,
                    observer_config: row.get(7)?,
                    status,
                    created_at: row.get(9)?,
                    status_updated_at: row.get(10)?,
                })
            },
        )
        .optional()?;
    Ok(observer)
}

/// True when an observer row with this id exists, in any status.
pub(crate) fn exists(conn: &Connection, id: &ObserverId) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM observers WHERE observer_id = ?1",
            [id.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Resolve an observer id from its coordinate tuple.
///
/// If duplicate coordinates exist, the oldest declaration wins.
pub(crate) fn lookup_id(conn: &Connection, key: &ObserverKey) -> Result<Option<ObserverId>> {
    let id: Option<String> = conn
        .query_row(
            "SELECT observer_id FROM observers \
             WHERE model_namespace = ?1 AND model_name = ?2 \
               AND model_dataset_props = ?3 AND model_zone_tag = ?4 \
             ORDER BY created_at ASC, observer_id ASC LIMIT 1",
            params![
                key.model_namespace,
                key.model_name,
                key.model_dataset_props,
                key.model_zone_tag,
            ],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id.map(ObserverId::new))
}

/// Remove an observer that is disabled and free of associations and runs.
///
/// Returns false when the id matches nothing. A live observer (wrong
/// status, or with association/run history) is refused.
pub(crate) fn delete(conn: &Connection, id: &ObserverId) -> Result<bool> {
    let Some(observer) = get(conn, id)? else {
        return Ok(false);
    };
    if observer.status != ObserverStatus::Disabled {
        return Err(CoordinatorError::Validation(format!(
            "observer {id} must be disabled before deletion, current status is {}",
            observer.status
        )));
    }
    let associations: i64 = conn.query_row(
        "SELECT COUNT(*) FROM associations WHERE source_id = ?1 OR sink_id = ?1",
        [id.as_str()],
        |row| row.get(0),
    )?;
    if associations > 0 {
        return Err(CoordinatorError::Validation(format!(
            "observer {id} has {associations} association(s) and cannot be deleted"
        )));
    }
    let runs: i64 = conn.query_row(
        "SELECT COUNT(*) FROM observer_runs WHERE observer_id = ?1",
        [id.as_str()],
        |row| row.get(0),
    )?;
    if runs > 0 {
        return Err(CoordinatorError::Validation(format!(
            "observer {id} has {runs} run(s) and cannot be deleted"
        )));
    }
    let rows = conn.execute("DELETE FROM observers WHERE observer_id = ?1", [id.as_str()])?;
    tracing::info!(observer_id = %id, "observer deleted");
    Ok(rows > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        schema::init(&conn).unwrap();
        conn
    }

    #[test]
    fn declare_defaults_to_enabled() {
        let conn = conn();
        let id = declare(&conn, &ObserverSpec::new(ObserverKey::new("billing"))).unwrap();
        let observer = get(&conn, &id).unwrap().unwrap();
        assert_eq!(observer.status, ObserverStatus::Enabled);
        assert_eq!(observer.key.model_namespace, "ROOT");
        assert_eq!(observer.created_at, observer.status_updated_at);
    }

    #[test]
    fn declare_rejects_negative_zone_tag() {
        let conn = conn();
        let spec = ObserverSpec::new(ObserverKey::new("billing").with_zone_tag(-1));
        assert!(matches!(
            declare(&conn, &spec),
            Err(CoordinatorError::Validation(_))
        ));
    }

    #[test]
    fn declare_does_not_dedupe_coordinates() {
        let conn = conn();
        let spec = ObserverSpec::new(ObserverKey::new("billing"));
        let a = declare(&conn, &spec).unwrap();
        let b = declare(&conn, &spec).unwrap();
        assert_ne!(a, b);
        // lookup is deterministic under duplicates
        let found = lookup_id(&conn, &ObserverKey::new("billing")).unwrap().unwrap();
        assert_eq!(found, a);
    }

    #[test]
    fn update_writes_only_set_fields() {
        let conn = conn();
        let spec = ObserverSpec::new(ObserverKey::new("billing")).with_description("original");
        let id = declare(&conn, &spec).unwrap();
        let rows = update(&conn, &id, &ObserverUpdate::new().display_name("Billing")).unwrap();
        assert_eq!(rows, 1);
        let observer = get(&conn, &id).unwrap().unwrap();
        assert_eq!(observer.display_name.as_deref(), Some("Billing"));
        assert_eq!(observer.description.as_deref(), Some("original"));
    }

    #[test]
    fn empty_update_is_rejected() {
        let conn = conn();
        let id = declare(&conn, &ObserverSpec::new(ObserverKey::new("billing"))).unwrap();
        assert!(matches!(
            update(&conn, &id, &ObserverUpdate::new()),
            Err(CoordinatorError::Validation(_))
        ));
    }

    #[test]
    fn update_of_missing_observer_writes_zero_rows() {
        let conn = conn();
        let rows = update(
            &conn,
            &ObserverId::generate(),
            &ObserverUpdate::new().description("x"),
        )
        .unwrap();
        assert_eq!(rows, 0);
    }

    #[test]
    fn status_transition_touches_timestamp() {
        let conn = conn();
        let id = declare(&conn, &ObserverSpec::new(ObserverKey::new("billing"))).unwrap();
        let before = get(&conn, &id).unwrap().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        update_status(&conn, &id, ObserverStatus::Disabled).unwrap();
        let after = get(&conn, &id).unwrap().unwrap();
        assert_eq!(after.status, ObserverStatus::Disabled);
        assert!(after.status_updated_at > before.status_updated_at);
    }

    #[test]
    fn lookup_by_coordinates() {
        let conn = conn();
        let key = ObserverKey::new("billing")
            .with_namespace("finance")
            .with_zone_tag(2);
        let id = declare(&conn, &ObserverSpec::new(key.clone())).unwrap();
        assert_eq!(lookup_id(&conn, &key).unwrap(), Some(id));
        assert_eq!(lookup_id(&conn, &ObserverKey::new("billing")).unwrap(), None);
    }

    #[test]
    fn delete_requires_disabled() {
        let conn = conn();
        let id = declare(&conn, &ObserverSpec::new(ObserverKey::new("billing"))).unwrap();
        assert!(matches!(
            delete(&conn, &id),
            Err(CoordinatorError::Validation(_))
        ));
        update_status(&conn, &id, ObserverStatus::Disabled).unwrap();
        assert!(delete(&conn, &id).unwrap());
        assert!(!exists(&conn, &id).unwrap());
        assert!(!delete(&conn, &id).unwrap());
    }
}
