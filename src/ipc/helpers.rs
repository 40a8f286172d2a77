use rusqlite::Connection;
use serde_json::json;

use crate::ipc::error::HandlerErr;
use crate::ipc::types::{AppState, Request, TeacherProfile};
use crate::model::Rubric;
use crate::store;

pub fn require_db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn require_teacher(state: &AppState) -> Result<TeacherProfile, HandlerErr> {
    state
        .teacher
        .clone()
        .ok_or_else(|| HandlerErr::new("not_signed_in", "sign in first"))
}

pub fn fetch_rubric(
    conn: &Connection,
    teacher_email: &str,
    rubric_id: &str,
) -> Result<(Rubric, i64), HandlerErr> {
    match store::rubric_get(conn, teacher_email, rubric_id) {
        Ok(Some(found)) => Ok(found),
        Ok(None) => Err(HandlerErr::new("not_found", "rubric not found")),
        Err(e) => Err(HandlerErr::new("db_query_failed", format!("{e:?}"))),
    }
}

pub fn store_rubric(
    conn: &Connection,
    rubric: &Rubric,
    expected_revision: Option<i64>,
) -> Result<(String, i64), HandlerErr> {
    match store::rubric_put(conn, rubric, expected_revision) {
        Ok(store::RubricPut::Stored {
            rubric_id,
            revision,
        }) => Ok((rubric_id, revision)),
        Ok(store::RubricPut::Conflict { current_revision }) => Err(HandlerErr {
            code: "conflict",
            message: "rubric was modified by another writer".to_string(),
            details: Some(json!({ "currentRevision": current_revision })),
        }),
        Err(e) => Err(HandlerErr::new("db_insert_failed", format!("{e:?}"))),
    }
}

pub fn param_str<'a>(req: &'a Request, key: &str) -> Option<&'a str> {
    req.params.get(key).and_then(|v| v.as_str())
}

pub fn param_usize(req: &Request, key: &str) -> Option<usize> {
    req.params.get(key).and_then(|v| v.as_u64()).map(|v| v as usize)
}
