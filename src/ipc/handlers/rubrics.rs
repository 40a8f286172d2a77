use serde_json::json;

use crate::ipc::error::{err, ok};
use crate::ipc::events::{self, Touched};
use crate::ipc::helpers::{fetch_rubric, param_str, param_usize, require_db, require_teacher, store_rubric};
use crate::ipc::types::{AppState, GradingSession, Request};
use crate::model::{self, LineField, Rubric};
use crate::store;

fn handle_rubrics_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let teacher = match require_teacher(state) {
        Ok(t) => t,
        Err(e) => return e.response(&req.id),
    };
    let conn = match require_db(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    match events::rubric_list_snapshot(conn, &teacher.email) {
        Ok(result) => ok(&req.id, result),
        Err(e) => err(&req.id, "db_query_failed", format!("{e:?}"), None),
    }
}

fn handle_rubrics_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let teacher = match require_teacher(state) {
        Ok(t) => t,
        Err(e) => return e.response(&req.id),
    };
    let conn = match require_db(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };

    let mut rubric = model::new_rubric(&teacher.email, &teacher.name);
    if let Some(title) = param_str(req, "title") {
        if !title.trim().is_empty() {
            rubric.header.title = title.trim().to_string();
        }
    }

    let (rubric_id, revision) = match store_rubric(conn, &rubric, None) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    rubric.id = Some(rubric_id.clone());

    let response = ok(&req.id, json!({ "rubric": rubric, "revision": revision }));
    events::notify(
        state,
        &Touched::Rubric {
            teacher_email: teacher.email,
            rubric_id,
        },
    );
    response
}

fn handle_rubrics_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let teacher = match require_teacher(state) {
        Ok(t) => t,
        Err(e) => return e.response(&req.id),
    };
    let conn = match require_db(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let Some(rubric_id) = param_str(req, "rubricId") else {
        return err(&req.id, "bad_params", "missing rubricId", None);
    };

    let (rubric, revision) = match fetch_rubric(conn, &teacher.email, rubric_id) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let max_grade = model::max_grade(&rubric.rubric_lines);
    let gradable_line_ids = model::gradable_line_ids(&rubric.rubric_lines);
    ok(
        &req.id,
        json!({
            "rubric": rubric,
            "revision": revision,
            "maxGrade": max_grade,
            "gradableLineIds": gradable_line_ids,
        }),
    )
}

fn handle_rubrics_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let teacher = match require_teacher(state) {
        Ok(t) => t,
        Err(e) => return e.response(&req.id),
    };
    let conn = match require_db(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let Some(raw) = req.params.get("rubric") else {
        return err(&req.id, "bad_params", "missing rubric", None);
    };
    let mut rubric: Rubric = match serde_json::from_value(raw.clone()) {
        Ok(r) => r,
        Err(e) => {
            return err(
                &req.id,
                "bad_params",
                format!("invalid rubric document: {e}"),
                None,
            )
        }
    };
    let expected_revision = req
        .params
        .get("expectedRevision")
        .and_then(|v| v.as_i64());

    // Owner identity is denormalized from the signed-in profile at save time,
    // and the cached grades are renormalized against the saved lines.
    rubric.teacher_email = teacher.email.clone();
    rubric.teacher_name = teacher.name.clone();
    model::recompute_grades(&mut rubric);

    let (rubric_id, revision) = match store_rubric(conn, &rubric, expected_revision) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let response = ok(
        &req.id,
        json!({ "rubricId": rubric_id, "revision": revision }),
    );
    events::notify(
        state,
        &Touched::Rubric {
            teacher_email: teacher.email,
            rubric_id,
        },
    );
    response
}

fn handle_rubrics_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let teacher = match require_teacher(state) {
        Ok(t) => t,
        Err(e) => return e.response(&req.id),
    };
    let conn = match require_db(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let Some(rubric_id) = param_str(req, "rubricId") else {
        return err(&req.id, "bad_params", "missing rubricId", None);
    };

    let deleted = match store::rubric_delete(conn, &teacher.email, rubric_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_delete_failed", format!("{e:?}"), None),
    };

    let response = ok(&req.id, json!({ "deleted": deleted }));
    if deleted {
        if state.session.rubric_id.as_deref() == Some(rubric_id) {
            state.session = GradingSession::default();
        }
        events::notify(
            state,
            &Touched::Rubric {
                teacher_email: teacher.email,
                rubric_id: rubric_id.to_string(),
            },
        );
    }
    response
}

fn handle_update_header(state: &mut AppState, req: &Request) -> serde_json::Value {
    let teacher = match require_teacher(state) {
        Ok(t) => t,
        Err(e) => return e.response(&req.id),
    };
    let conn = match require_db(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let Some(rubric_id) = param_str(req, "rubricId") else {
        return err(&req.id, "bad_params", "missing rubricId", None);
    };

    let (mut rubric, revision) = match fetch_rubric(conn, &teacher.email, rubric_id) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    if let Some(title) = param_str(req, "title") {
        rubric.header.title = title.to_string();
    }
    if let Some(levels) = req.params.get("gradeLevels").and_then(|v| v.as_array()) {
        // Insertion order preserved, duplicates and blanks dropped.
        let mut deduped: Vec<String> = Vec::new();
        for level in levels {
            if let Some(s) = level.as_str() {
                let s = s.trim();
                if !s.is_empty() && !deduped.iter().any(|seen| seen == s) {
                    deduped.push(s.to_string());
                }
            }
        }
        rubric.header.grade_levels = deduped;
    }

    let (rubric_id, revision) = match store_rubric(conn, &rubric, Some(revision)) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let response = ok(
        &req.id,
        json!({ "header": rubric.header, "revision": revision }),
    );
    events::notify(
        state,
        &Touched::Rubric {
            teacher_email: teacher.email,
            rubric_id,
        },
    );
    response
}

fn handle_add_line(state: &mut AppState, req: &Request) -> serde_json::Value {
    let teacher = match require_teacher(state) {
        Ok(t) => t,
        Err(e) => return e.response(&req.id),
    };
    let conn = match require_db(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let Some(rubric_id) = param_str(req, "rubricId") else {
        return err(&req.id, "bad_params", "missing rubricId", None);
    };

    let (mut rubric, revision) = match fetch_rubric(conn, &teacher.email, rubric_id) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let line = model::add_line(&mut rubric);

    let (rubric_id, revision) = match store_rubric(conn, &rubric, Some(revision)) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let max_grade = model::max_grade(&rubric.rubric_lines);
    let response = ok(
        &req.id,
        json!({ "line": line, "revision": revision, "maxGrade": max_grade }),
    );
    events::notify(
        state,
        &Touched::Rubric {
            teacher_email: teacher.email,
            rubric_id,
        },
    );
    response
}

fn handle_edit_line(state: &mut AppState, req: &Request) -> serde_json::Value {
    let teacher = match require_teacher(state) {
        Ok(t) => t,
        Err(e) => return e.response(&req.id),
    };
    let Some(rubric_id) = param_str(req, "rubricId") else {
        return err(&req.id, "bad_params", "missing rubricId", None);
    };
    let Some(line_id) = param_str(req, "lineId") else {
        return err(&req.id, "bad_params", "missing lineId", None);
    };

    let field = match (
        param_str(req, "categoryName"),
        param_usize(req, "scoreIndex"),
        param_str(req, "scoreText"),
    ) {
        (Some(value), None, None) => LineField::CategoryName(value),
        (None, Some(score_index), Some(text)) => {
            if score_index >= model::TIER_SCORES.len() {
                return err(&req.id, "bad_params", "scoreIndex must be 0..=3", None);
            }
            LineField::ScoreText { score_index, text }
        }
        _ => {
            return err(
                &req.id,
                "bad_params",
                "provide categoryName or scoreIndex+scoreText",
                None,
            )
        }
    };

    let conn = match require_db(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let (mut rubric, revision) = match fetch_rubric(conn, &teacher.email, rubric_id) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if !model::edit_line(&mut rubric, line_id, field) {
        return err(&req.id, "not_found", "rubric line not found", None);
    }

    let (rubric_id, revision) = match store_rubric(conn, &rubric, Some(revision)) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let max_grade = model::max_grade(&rubric.rubric_lines);
    let gradable_line_ids = model::gradable_line_ids(&rubric.rubric_lines);
    let response = ok(
        &req.id,
        json!({
            "revision": revision,
            "maxGrade": max_grade,
            "gradableLineIds": gradable_line_ids,
        }),
    );
    events::notify(
        state,
        &Touched::Rubric {
            teacher_email: teacher.email,
            rubric_id,
        },
    );
    response
}

fn handle_remove_line(state: &mut AppState, req: &Request) -> serde_json::Value {
    let teacher = match require_teacher(state) {
        Ok(t) => t,
        Err(e) => return e.response(&req.id),
    };
    let conn = match require_db(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let Some(rubric_id) = param_str(req, "rubricId") else {
        return err(&req.id, "bad_params", "missing rubricId", None);
    };
    let Some(line_id) = param_str(req, "lineId") else {
        return err(&req.id, "bad_params", "missing lineId", None);
    };

    let (mut rubric, revision) = match fetch_rubric(conn, &teacher.email, rubric_id) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    // Unknown lineId is a silent no-op.
    let removed = model::remove_line(&mut rubric, line_id);
    let mut revision = revision;
    if removed {
        match store_rubric(conn, &rubric, Some(revision)) {
            Ok((_, next)) => revision = next,
            Err(e) => return e.response(&req.id),
        }
    }

    let max_grade = model::max_grade(&rubric.rubric_lines);
    let response = ok(
        &req.id,
        json!({ "removed": removed, "revision": revision, "maxGrade": max_grade }),
    );
    if removed {
        events::notify(
            state,
            &Touched::Rubric {
                teacher_email: teacher.email,
                rubric_id: rubric_id.to_string(),
            },
        );
    }
    response
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "rubrics.list" => Some(handle_rubrics_list(state, req)),
        "rubrics.create" => Some(handle_rubrics_create(state, req)),
        "rubrics.get" => Some(handle_rubrics_get(state, req)),
        "rubrics.save" => Some(handle_rubrics_save(state, req)),
        "rubrics.delete" => Some(handle_rubrics_delete(state, req)),
        "rubrics.updateHeader" => Some(handle_update_header(state, req)),
        "rubrics.addLine" => Some(handle_add_line(state, req)),
        "rubrics.editLine" => Some(handle_edit_line(state, req)),
        "rubrics.removeLine" => Some(handle_remove_line(state, req)),
        _ => None,
    }
}
