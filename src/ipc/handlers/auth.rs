use serde_json::json;
use tracing::warn;

use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, GradingSession, Request, TeacherProfile};
use crate::store;

fn domain_allowed(email: &str, allowed_domain: &str) -> bool {
    email
        .rsplit_once('@')
        .map(|(_, domain)| domain.eq_ignore_ascii_case(allowed_domain))
        .unwrap_or(false)
}

fn handle_sign_in(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let email = match req.params.get("email").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing email", None),
    };
    let name = match req.params.get("name").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing name", None),
    };

    if !domain_allowed(&email, &state.allowed_domain) {
        // Accounts outside the school domain are signed straight back out.
        state.teacher = None;
        state.session = GradingSession::default();
        warn!(email = %email, "sign-in rejected: domain not allowed");
        return err(
            &req.id,
            "domain_not_allowed",
            format!(
                "sign-in is restricted to @{} accounts",
                state.allowed_domain
            ),
            None,
        );
    }

    let is_admin = match store::admin_is_allowed(conn, &email) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:?}"), None),
    };

    state.teacher = Some(TeacherProfile {
        email: email.clone(),
        name: name.clone(),
    });
    state.session = GradingSession::default();
    ok(
        &req.id,
        json!({ "email": email, "name": name, "isAdmin": is_admin }),
    )
}

fn handle_sign_out(state: &mut AppState, req: &Request) -> serde_json::Value {
    state.teacher = None;
    state.session = GradingSession::default();
    ok(&req.id, json!({ "signedOut": true }))
}

fn handle_current(state: &mut AppState, req: &Request) -> serde_json::Value {
    let teacher = state
        .teacher
        .as_ref()
        .map(|t| json!({ "email": t.email, "name": t.name }))
        .unwrap_or(serde_json::Value::Null);
    ok(&req.id, json!({ "teacher": teacher }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.signIn" => Some(handle_sign_in(state, req)),
        "auth.signOut" => Some(handle_sign_out(state, req)),
        "auth.current" => Some(handle_current(state, req)),
        _ => None,
    }
}
