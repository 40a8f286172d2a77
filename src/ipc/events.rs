use rusqlite::Connection;
use serde_json::json;
use tracing::warn;

use crate::ipc::types::{AppState, SubTarget};
use crate::{model, store};

/// Which part of the document set a successful mutation touched.
#[derive(Debug, Clone)]
pub enum Touched {
    Students,
    Rubric {
        teacher_email: String,
        rubric_id: String,
    },
}

pub fn frame(subscription_id: i64, target: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "event": "snapshot",
        "subscriptionId": subscription_id,
        "target": target,
        "result": result,
    })
}

pub fn students_snapshot(conn: &Connection) -> anyhow::Result<serde_json::Value> {
    let students = store::students_list(conn)?;
    Ok(json!({ "students": students }))
}

/// Home-screen listing shape: one row per rubric of the given teacher.
pub fn rubric_list_snapshot(
    conn: &Connection,
    teacher_email: &str,
) -> anyhow::Result<serde_json::Value> {
    let rubrics = store::rubric_list(conn, teacher_email)?;
    let listings: Vec<serde_json::Value> = rubrics
        .iter()
        .map(|(rubric, _)| {
            json!({
                "id": rubric.id,
                "title": rubric.header.title,
                "numberOfAssignedStudents": rubric.student_rubric_grade.len(),
            })
        })
        .collect();
    Ok(json!({ "rubrics": listings }))
}

/// Full document snapshot with derived values; `null` once the document is
/// gone.
pub fn rubric_snapshot(
    conn: &Connection,
    teacher_email: &str,
    rubric_id: &str,
) -> anyhow::Result<serde_json::Value> {
    match store::rubric_get(conn, teacher_email, rubric_id)? {
        Some((rubric, revision)) => {
            let max_grade = model::max_grade(&rubric.rubric_lines);
            let gradable_line_ids = model::gradable_line_ids(&rubric.rubric_lines);
            Ok(json!({
                "rubric": rubric,
                "revision": revision,
                "maxGrade": max_grade,
                "gradableLineIds": gradable_line_ids,
            }))
        }
        None => Ok(serde_json::Value::Null),
    }
}

fn snapshot_or_log(result: anyhow::Result<serde_json::Value>) -> Option<serde_json::Value> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("subscription snapshot failed: {e:?}");
            None
        }
    }
}

/// Re-deliver authoritative snapshots to every subscription matching the
/// touched documents. Events are queued behind the triggering response.
pub fn notify(state: &mut AppState, touched: &Touched) {
    let frames = {
        let Some(conn) = state.db.as_ref() else {
            return;
        };
        let mut frames = Vec::new();
        for sub in &state.subs {
            let snapshot = match (&sub.target, touched) {
                (SubTarget::Students, Touched::Students) => {
                    snapshot_or_log(students_snapshot(conn)).map(|result| ("students", result))
                }
                (
                    SubTarget::RubricList { teacher_email },
                    Touched::Rubric {
                        teacher_email: touched_teacher,
                        ..
                    },
                ) if teacher_email == touched_teacher => {
                    snapshot_or_log(rubric_list_snapshot(conn, teacher_email))
                        .map(|result| ("rubrics", result))
                }
                (
                    SubTarget::Rubric {
                        teacher_email,
                        rubric_id,
                    },
                    Touched::Rubric {
                        teacher_email: touched_teacher,
                        rubric_id: touched_rubric,
                    },
                ) if teacher_email == touched_teacher && rubric_id == touched_rubric => {
                    snapshot_or_log(rubric_snapshot(conn, teacher_email, rubric_id))
                        .map(|result| ("rubric", result))
                }
                _ => None,
            };
            if let Some((target, result)) = snapshot {
                frames.push(frame(sub.id, target, result));
            }
        }
        frames
    };
    state.pending_events.extend(frames);
}
