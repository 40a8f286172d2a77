use serde_json::json;

use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{fetch_rubric, param_str, require_db, require_teacher};
use crate::ipc::types::{AppState, Request};
use crate::model;
use crate::share::{decode_student_email, encode_student_email, feedback_url};
use crate::store;

fn handle_create_link(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let Some(student_email) = param_str(req, "studentEmail")
        .map(str::trim)
        .filter(|e| !e.is_empty())
    else {
        return err(&req.id, "bad_params", "missing studentEmail", None);
    };
    let base_url = param_str(req, "baseUrl").unwrap_or("");

    let (rubric, _) = match fetch_rubric(conn, &teacher.email, rubric_id) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if !rubric
        .student_rubric_grade
        .iter()
        .any(|g| g.student_email == student_email)
    {
        return err(
            &req.id,
            "not_assigned",
            "student is not assigned to this rubric",
            None,
        );
    }

    let url = feedback_url(base_url, rubric_id, student_email, &teacher.email);
    ok(
        &req.id,
        json!({
            "url": url,
            "studentToken": encode_student_email(student_email),
        }),
    )
}

/// Read-only feedback view. No sign-in, no writes; the three URL parameters
/// are all required.
fn handle_resolve(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let Some(rubric_id) = param_str(req, "id") else {
        return err(&req.id, "bad_params", "missing id", None);
    };
    let Some(token) = param_str(req, "student") else {
        return err(&req.id, "bad_params", "missing student", None);
    };
    let Some(teacher_uid) = param_str(req, "teacherUid") else {
        return err(&req.id, "bad_params", "missing teacherUid", None);
    };

    let Some(email) = decode_student_email(token) else {
        return err(
            &req.id,
            "bad_student_token",
            "student link token is not decodable",
            None,
        );
    };

    let rubric = match store::rubric_get(conn, teacher_uid, rubric_id) {
        Ok(Some((rubric, _))) => rubric,
        Ok(None) => return err(&req.id, "not_found", "rubric not found", None),
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:?}"), None),
    };
    let student = match store::student_get(conn, &email) {
        Ok(Some(s)) => s,
        Ok(None) => {
            return err(
                &req.id,
                "not_found",
                format!("student with email '{email}' not found"),
                None,
            )
        }
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:?}"), None),
    };

    let grade = rubric
        .student_rubric_grade
        .iter()
        .find(|g| g.student_email == email);
    let locations = grade
        .map(|g| g.rubric_grades_location.clone())
        .unwrap_or_default();
    let current_grade = grade.map(|g| g.current_grade).unwrap_or(0);

    let max_grade = model::max_grade(&rubric.rubric_lines);
    let gradable_line_ids = model::gradable_line_ids(&rubric.rubric_lines);
    let display_grade_level = model::grade_level_with_suffix(&student.grade_level);
    ok(
        &req.id,
        json!({
            "rubric": {
                "header": rubric.header,
                "rubricLines": rubric.rubric_lines,
            },
            "student": {
                "email": student.email,
                "name": student.name,
                "studentId": student.student_id,
                "gradeLevel": student.grade_level,
                "displayGradeLevel": display_grade_level,
            },
            "rubricGradesLocation": locations,
            "currentGrade": current_grade,
            "maxGrade": max_grade,
            "gradableLineIds": gradable_line_ids,
            "readOnly": true,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "share.createLink" => Some(handle_create_link(state, req)),
        "share.resolve" => Some(handle_resolve(state, req)),
        _ => None,
    }
}
