use serde_json::json;

use crate::ipc::error::{err, ok};
use crate::ipc::events;
use crate::ipc::helpers::{param_str, require_db, require_teacher};
use crate::ipc::types::{AppState, Request, SubTarget, Subscription};

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(target_kind) = param_str(req, "target") else {
        return err(&req.id, "bad_params", "missing target", None);
    };

    let target = match target_kind {
        "students" => SubTarget::Students,
        "rubrics" => {
            let teacher = match require_teacher(state) {
                Ok(t) => t,
                Err(e) => return e.response(&req.id),
            };
            SubTarget::RubricList {
                teacher_email: teacher.email,
            }
        }
        "rubric" => {
            let teacher = match require_teacher(state) {
                Ok(t) => t,
                Err(e) => return e.response(&req.id),
            };
            let Some(rubric_id) = param_str(req, "rubricId") else {
                return err(&req.id, "bad_params", "missing rubricId", None);
            };
            SubTarget::Rubric {
                teacher_email: teacher.email,
                rubric_id: rubric_id.to_string(),
            }
        }
        other => {
            return err(
                &req.id,
                "bad_params",
                format!("unknown subscription target: {other}"),
                None,
            )
        }
    };

    // The first snapshot is delivered immediately, before any mutation.
    let initial = {
        let conn = match require_db(state) {
            Ok(c) => c,
            Err(e) => return e.response(&req.id),
        };
        let snapshot = match &target {
            SubTarget::Students => events::students_snapshot(conn),
            SubTarget::RubricList { teacher_email } => {
                events::rubric_list_snapshot(conn, teacher_email)
            }
            SubTarget::Rubric {
                teacher_email,
                rubric_id,
            } => events::rubric_snapshot(conn, teacher_email, rubric_id),
        };
        match snapshot {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", format!("{e:?}"), None),
        }
    };

    let target_name = match &target {
        SubTarget::Students => "students",
        SubTarget::RubricList { .. } => "rubrics",
        SubTarget::Rubric { .. } => "rubric",
    };
    let sub_id = state.next_sub_id;
    state.next_sub_id += 1;
    state.subs.push(Subscription {
        id: sub_id,
        target,
    });
    state
        .pending_events
        .push(events::frame(sub_id, target_name, initial));

    ok(&req.id, json!({ "subscriptionId": sub_id }))
}

fn handle_cancel(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(sub_id) = req.params.get("subscriptionId").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing subscriptionId", None);
    };
    let before = state.subs.len();
    state.subs.retain(|sub| sub.id != sub_id);
    ok(
        &req.id,
        json!({ "cancelled": state.subs.len() != before }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "subs.create" => Some(handle_create(state, req)),
        "subs.cancel" => Some(handle_cancel(state, req)),
        _ => None,
    }
}
