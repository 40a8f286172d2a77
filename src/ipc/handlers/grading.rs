use serde_json::json;

use crate::ipc::error::{err, ok};
use crate::ipc::events::{self, Touched};
use crate::ipc::helpers::{fetch_rubric, param_str, param_usize, require_db, require_teacher, store_rubric};
use crate::ipc::types::{AppState, Request};
use crate::model::{self, GradeRejection};

fn handle_select_student(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let Some(email) = param_str(req, "email") else {
        return err(&req.id, "bad_params", "missing email", None);
    };

    let (rubric, _) = match fetch_rubric(conn, &teacher.email, rubric_id) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if !rubric
        .student_rubric_grade
        .iter()
        .any(|g| g.student_email == email)
    {
        return err(
            &req.id,
            "not_assigned",
            "student is not assigned to this rubric",
            None,
        );
    }

    state.session.rubric_id = Some(rubric_id.to_string());
    state.session.selected_student = Some(email.to_string());
    ok(&req.id, json!({ "selectedStudent": email }))
}

fn handle_set_edition_mode(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(enabled) = req.params.get("enabled").and_then(|v| v.as_bool()) else {
        return err(&req.id, "bad_params", "missing enabled", None);
    };
    state.session.edition_mode = enabled;
    ok(&req.id, json!({ "editionMode": enabled }))
}

fn handle_select_cell(state: &mut AppState, req: &Request) -> serde_json::Value {
    let teacher = match require_teacher(state) {
        Ok(t) => t,
        Err(e) => return e.response(&req.id),
    };
    let Some(rubric_id) = param_str(req, "rubricId") else {
        return err(&req.id, "bad_params", "missing rubricId", None);
    };
    let Some(category_index) = param_usize(req, "categoryIndex") else {
        return err(&req.id, "bad_params", "missing/invalid categoryIndex", None);
    };
    let Some(grading_index) = param_usize(req, "gradingIndex") else {
        return err(&req.id, "bad_params", "missing/invalid gradingIndex", None);
    };

    if state.session.edition_mode {
        return err(
            &req.id,
            "edition_mode_active",
            "finish editing before grading",
            None,
        );
    }
    let selected = match (&state.session.rubric_id, &state.session.selected_student) {
        (Some(session_rubric), Some(email)) if session_rubric == rubric_id => email.clone(),
        _ => {
            return err(
                &req.id,
                "no_student_selected",
                "select a student before grading",
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

    let current_grade =
        match model::select_grade(&mut rubric, &selected, category_index, grading_index) {
            Ok(v) => v,
            Err(GradeRejection::LineNotGradable) => {
                return err(
                    &req.id,
                    "not_gradable",
                    "this line does not count toward the grade",
                    None,
                )
            }
            Err(GradeRejection::BadTier) => {
                return err(&req.id, "bad_params", "gradingIndex must be 0..=3", None)
            }
            Err(GradeRejection::NotAssigned) => {
                return err(
                    &req.id,
                    "not_assigned",
                    "selected student is no longer assigned",
                    None,
                )
            }
        };

    if let Err(e) = store_rubric(conn, &rubric, Some(revision)) {
        return e.response(&req.id);
    }

    let max_grade = model::max_grade(&rubric.rubric_lines);
    let response = ok(
        &req.id,
        json!({ "currentGrade": current_grade, "maxGrade": max_grade }),
    );
    events::notify(
        state,
        &Touched::Rubric {
            teacher_email: teacher.email,
            rubric_id: rubric_id.to_string(),
        },
    );
    response
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grading.selectStudent" => Some(handle_select_student(state, req)),
        "grading.setEditionMode" => Some(handle_set_edition_mode(state, req)),
        "grading.selectCell" => Some(handle_select_cell(state, req)),
        _ => None,
    }
}
