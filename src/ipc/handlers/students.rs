use serde_json::json;
use std::collections::HashMap;

use crate::ipc::error::{err, ok};
use crate::ipc::events::{self, Touched};
use crate::ipc::helpers::{fetch_rubric, param_str, require_db, require_teacher, store_rubric};
use crate::ipc::types::{AppState, Request};
use crate::model::{self, AssignRejection};
use crate::store;

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    match events::students_snapshot(conn) {
        Ok(result) => ok(&req.id, result),
        Err(e) => err(&req.id, "db_query_failed", format!("{e:?}"), None),
    }
}

fn handle_assign(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let Some(email) = param_str(req, "email")
        .map(str::trim)
        .filter(|e| !e.is_empty())
    else {
        return err(&req.id, "bad_params", "student has no email", None);
    };

    // Only roster students can be assigned.
    match store::student_get(conn, email) {
        Ok(Some(_)) => {}
        Ok(None) => return err(&req.id, "not_found", "student not found in roster", None),
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:?}"), None),
    }

    let (mut rubric, revision) = match fetch_rubric(conn, &teacher.email, rubric_id) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match model::assign_student(&mut rubric, email) {
        Ok(()) => {}
        Err(AssignRejection::MissingEmail) => {
            return err(&req.id, "bad_params", "student has no email", None)
        }
        Err(AssignRejection::AlreadyAssigned) => {
            return err(
                &req.id,
                "already_assigned",
                "student is already assigned",
                None,
            )
        }
    }
    if let Err(e) = store_rubric(conn, &rubric, Some(revision)) {
        return e.response(&req.id);
    }

    let response = ok(&req.id, json!({ "assigned": email, "currentGrade": 0 }));
    // A freshly assigned student becomes the grading selection.
    state.session.rubric_id = Some(rubric_id.to_string());
    state.session.selected_student = Some(email.to_string());
    events::notify(
        state,
        &Touched::Rubric {
            teacher_email: teacher.email,
            rubric_id: rubric_id.to_string(),
        },
    );
    response
}

fn handle_unassign(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    let (mut rubric, revision) = match fetch_rubric(conn, &teacher.email, rubric_id) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let removed = model::unassign_student(&mut rubric, email);
    if removed {
        if let Err(e) = store_rubric(conn, &rubric, Some(revision)) {
            return e.response(&req.id);
        }
    }

    let response = ok(&req.id, json!({ "removed": removed }));
    if removed {
        if state.session.rubric_id.as_deref() == Some(rubric_id)
            && state.session.selected_student.as_deref() == Some(email)
        {
            state.session.selected_student = None;
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

fn handle_assigned_list(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    let (rubric, _) = match fetch_rubric(conn, &teacher.email, rubric_id) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let roster = match store::students_list(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:?}"), None),
    };
    let by_email: HashMap<&str, &crate::model::Student> =
        roster.iter().map(|s| (s.email.as_str(), s)).collect();

    // Join grade records against the roster by email. Records that no longer
    // resolve are reported as ghosts instead of being dropped.
    let mut students = Vec::new();
    let mut ghosts = Vec::new();
    for grade in &rubric.student_rubric_grade {
        match by_email.get(grade.student_email.as_str()) {
            Some(student) => students.push(json!({
                "email": student.email,
                "name": student.name,
                "studentId": student.student_id,
                "gradeLevel": student.grade_level,
                "displayGradeLevel": model::grade_level_with_suffix(&student.grade_level),
                "currentGrade": grade.current_grade,
            })),
            None => ghosts.push(grade.student_email.clone()),
        }
    }

    let max_grade = model::max_grade(&rubric.rubric_lines);
    ok(
        &req.id,
        json!({
            "students": students,
            "ghosts": ghosts,
            "maxGrade": max_grade,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.assign" => Some(handle_assign(state, req)),
        "students.unassign" => Some(handle_unassign(state, req)),
        "students.assignedList" => Some(handle_assigned_list(state, req)),
        _ => None,
    }
}
