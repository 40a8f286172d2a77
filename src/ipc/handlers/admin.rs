use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::ipc::error::{err, ok};
use crate::ipc::events::{self, Touched};
use crate::ipc::helpers::{param_str, require_db, require_teacher};
use crate::ipc::types::{AppState, Request};
use crate::model::Student;
use crate::store;

fn handle_grant(state: &mut AppState, req: &Request) -> serde_json::Value {
    let teacher = match require_teacher(state) {
        Ok(t) => t,
        Err(e) => return e.response(&req.id),
    };
    let conn = match require_db(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let Some(email) = param_str(req, "email")
        .map(str::trim)
        .filter(|e| !e.is_empty())
    else {
        return err(&req.id, "bad_params", "missing email", None);
    };

    // The first grant on an empty allowlist bootstraps it; after that only
    // admins may grant.
    let count = match store::admin_count(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:?}"), None),
    };
    if count > 0 {
        match store::admin_is_allowed(conn, &teacher.email) {
            Ok(true) => {}
            Ok(false) => {
                return err(&req.id, "not_admin", "admin allowlist access required", None)
            }
            Err(e) => return err(&req.id, "db_query_failed", format!("{e:?}"), None),
        }
    }

    if let Err(e) = store::admin_grant(conn, email) {
        return err(&req.id, "db_insert_failed", format!("{e:?}"), None);
    }
    ok(&req.id, json!({ "granted": email }))
}

fn handle_import_students(state: &mut AppState, req: &Request) -> serde_json::Value {
    let teacher = match require_teacher(state) {
        Ok(t) => t,
        Err(e) => return e.response(&req.id),
    };
    let conn = match require_db(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    match store::admin_is_allowed(conn, &teacher.email) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_admin", "admin allowlist access required", None),
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:?}"), None),
    }
    let Some(rows) = req.params.get("rows").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing rows[]", None);
    };

    // Rows arrive pre-parsed with the CSV column names. A row missing any of
    // email/full_name/grade_level is skipped and counted as an error.
    let mut imported: usize = 0;
    let mut errors: usize = 0;
    for row in rows {
        let email = row
            .get("email")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .unwrap_or("");
        let name = row
            .get("full_name")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .unwrap_or("");
        let grade_level = row
            .get("grade_level")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .unwrap_or("");
        if email.is_empty() || name.is_empty() || grade_level.is_empty() {
            errors += 1;
            continue;
        }
        let student_id = row
            .get("student_id")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("temp-{}", Uuid::new_v4()));

        let student = Student {
            email: email.to_string(),
            name: name.to_string(),
            student_id,
            grade_level: grade_level.to_string(),
        };
        match store::student_upsert(conn, &student) {
            Ok(()) => imported += 1,
            Err(e) => {
                warn!(email = %student.email, "student upsert failed: {e:?}");
                errors += 1;
            }
        }
    }
    info!(imported, errors, "roster import finished");

    let response = ok(&req.id, json!({ "imported": imported, "errors": errors }));
    if imported > 0 {
        events::notify(state, &Touched::Students);
    }
    response
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "admin.grant" => Some(handle_grant(state, req)),
        "admin.importStudents" => Some(handle_import_students(state, req)),
        _ => None,
    }
}
