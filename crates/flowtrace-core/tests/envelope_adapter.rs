//! A thin request/response envelope over the coordinator, as a serverless
//! façade would mount it. Lives entirely in test code: the core never
//! sees the envelope shape.

use serde_json::{json, Value};

use flowtrace_core::{parse_dependency_check, Coordinator, CoordinatorError};
use flowtrace_types::ids::{ObserverId, RunId};
use flowtrace_types::observer::{ObserverKey, ObserverSpec, ObserverStatus, SinkRef};
use flowtrace_types::run::{FinishStatus, FinishUpdate, StartOptions};

fn status_of(err: &CoordinatorError) -> u16 {
    match err {
        CoordinatorError::Validation(_) => 400,
        CoordinatorError::NotFound(_) => 404,
        CoordinatorError::AlreadyActive(_)
        | CoordinatorError::AlreadyFinished(_)
        | CoordinatorError::Dependency(_) => 409,
        CoordinatorError::Internal { .. } => 500,
    }
}

fn string_list(request: &Value, field: &str) -> Vec<String> {
    request[field]
        .as_array()
        .map(|values| {
            values
                .iter()
                .filter_map(|v| v.as_str().map(str::to_owned))
                .collect()
        })
        .unwrap_or_default()
}

fn dispatch(coordinator: &Coordinator, request: &Value) -> Value {
    let result = match request["action"].as_str() {
        Some("declare_observer") => {
            let Some(name) = request["model_name"].as_str() else {
                return json!({ "statusCode": 400, "body": "model_name is required" });
            };
            coordinator
                .declare_observer(&ObserverSpec::new(ObserverKey::new(name)))
                .map(|id| json!({ "observer_id": id }))
        }
        Some("update_observer_status") => {
            let id = ObserverId::new(request["observer_id"].as_str().unwrap_or_default());
            match request["status"].as_str().and_then(ObserverStatus::parse) {
                Some(status) => coordinator
                    .update_observer_status(&id, status)
                    .map(|rows| json!({ "updated": rows })),
                None => Err(CoordinatorError::Validation(
                    "status must be 'disabled', 'enabled', or 'retired'".into(),
                )),
            }
        }
        Some("associate") => {
            let source = ObserverId::new(request["source_id"].as_str().unwrap_or_default());
            let sink = ObserverId::new(request["sink_id"].as_str().unwrap_or_default());
            coordinator
                .associate(&source, &sink)
                .map(|rel_id| json!({ "rel_id": rel_id }))
        }
        Some("start_run") => {
            let sink = SinkRef::ById(ObserverId::new(
                request["observer_id"].as_str().unwrap_or_default(),
            ));
            let kind = request["dependency_check"].as_str().unwrap_or("any");
            let ids = string_list(request, "dependency_sources");
            parse_dependency_check(kind, &ids).and_then(|check| {
                coordinator
                    .start_run(&sink, &check, &StartOptions::new())
                    .map(|outcome| {
                        json!({
                            "run_id": outcome.run_id,
                            "ready_sources": outcome.ready.source_ids,
                        })
                    })
            })
        }
        Some("finish_run") => {
            let run_id = RunId::new(request["run_id"].as_str().unwrap_or_default());
            match FinishStatus::parse(request["status"].as_str().unwrap_or_default()) {
                Some(status) => coordinator
                    .finish_run(&run_id, status, &FinishUpdate::new())
                    .map(|fanned_out| json!({ "queued": fanned_out })),
                None => Err(CoordinatorError::Validation(
                    "status must be 'error' or 'success'".into(),
                )),
            }
        }
        _ => Err(CoordinatorError::Validation("unknown action".into())),
    };
    match result {
        Ok(body) => json!({ "statusCode": 200, "body": body }),
        Err(err) => json!({ "statusCode": status_of(&err), "body": err.to_string() }),
    }
}

#[test]
fn happy_path_round_trip() {
    let coordinator = Coordinator::in_memory().unwrap();
    let source = dispatch(
        &coordinator,
        &json!({ "action": "declare_observer", "model_name": "orders_raw" }),
    );
    assert_eq!(source["statusCode"], 200);
    let sink = dispatch(
        &coordinator,
        &json!({ "action": "declare_observer", "model_name": "orders_curated" }),
    );
    let source_id = source["body"]["observer_id"].as_str().unwrap();
    let sink_id = sink["body"]["observer_id"].as_str().unwrap();

    let associated = dispatch(
        &coordinator,
        &json!({ "action": "associate", "source_id": source_id, "sink_id": sink_id }),
    );
    assert_eq!(associated["statusCode"], 200);

    let started = dispatch(
        &coordinator,
        &json!({ "action": "start_run", "observer_id": source_id, "dependency_check": "ignore" }),
    );
    assert_eq!(started["statusCode"], 200);
    let run_id = started["body"]["run_id"].as_str().unwrap();

    let finished = dispatch(
        &coordinator,
        &json!({ "action": "finish_run", "run_id": run_id, "status": "success" }),
    );
    assert_eq!(finished["statusCode"], 200);
    assert_eq!(finished["body"]["queued"], 1);

    let sink_started = dispatch(
        &coordinator,
        &json!({ "action": "start_run", "observer_id": sink_id, "dependency_check": "any" }),
    );
    assert_eq!(sink_started["statusCode"], 200);
}

#[test]
fn validation_maps_to_400() {
    let coordinator = Coordinator::in_memory().unwrap();
    let response = dispatch(&coordinator, &json!({ "action": "does_not_exist" }));
    assert_eq!(response["statusCode"], 400);
    let response = dispatch(
        &coordinator,
        &json!({ "action": "start_run", "observer_id": "x", "dependency_check": "sometimes" }),
    );
    assert_eq!(response["statusCode"], 400);
    let response = dispatch(
        &coordinator,
        &json!({ "action": "update_observer_status", "observer_id": "x", "status": "archived" }),
    );
    assert_eq!(response["statusCode"], 400);
}

#[test]
fn status_transition_round_trip() {
    let coordinator = Coordinator::in_memory().unwrap();
    let declared = dispatch(
        &coordinator,
        &json!({ "action": "declare_observer", "model_name": "orders_raw" }),
    );
    let id = declared["body"]["observer_id"].as_str().unwrap();
    let response = dispatch(
        &coordinator,
        &json!({ "action": "update_observer_status", "observer_id": id, "status": "disabled" }),
    );
    assert_eq!(response["statusCode"], 200);
    assert_eq!(response["body"]["updated"], 1);
}

#[test]
fn not_found_maps_to_404() {
    let coordinator = Coordinator::in_memory().unwrap();
    let response = dispatch(
        &coordinator,
        &json!({ "action": "start_run", "observer_id": "missing", "dependency_check": "any" }),
    );
    assert_eq!(response["statusCode"], 404);
    let response = dispatch(
        &coordinator,
        &json!({ "action": "finish_run", "run_id": "missing", "status": "success" }),
    );
    assert_eq!(response["statusCode"], 404);
}

#[test]
fn conflicts_map_to_409() {
    let coordinator = Coordinator::in_memory().unwrap();
    let declared = dispatch(
        &coordinator,
        &json!({ "action": "declare_observer", "model_name": "orders_raw" }),
    );
    let id = declared["body"]["observer_id"].as_str().unwrap();

    let started = dispatch(
        &coordinator,
        &json!({ "action": "start_run", "observer_id": id, "dependency_check": "ignore" }),
    );
    let again = dispatch(
        &coordinator,
        &json!({ "action": "start_run", "observer_id": id, "dependency_check": "ignore" }),
    );
    assert_eq!(again["statusCode"], 409);

    let run_id = started["body"]["run_id"].as_str().unwrap();
    dispatch(
        &coordinator,
        &json!({ "action": "finish_run", "run_id": run_id, "status": "error" }),
    );
    let refinish = dispatch(
        &coordinator,
        &json!({ "action": "finish_run", "run_id": run_id, "status": "success" }),
    );
    assert_eq!(refinish["statusCode"], 409);
}
