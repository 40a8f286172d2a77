use anyhow::Context;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use uuid::Uuid;

use crate::model::{Rubric, Student};

/// Open (or create) the workspace's document store. One table per
/// collection, JSON bodies keyed the way the remote documents were keyed:
/// rubrics by opaque id under a per-teacher scope, students and admins by
/// email.
pub fn open_store(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("rubrics.sqlite3");
    let conn = Connection::open(db_path)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS rubrics(
            id TEXT PRIMARY KEY,
            teacher_email TEXT NOT NULL,
            revision INTEGER NOT NULL,
            body TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_rubrics_teacher ON rubrics(teacher_email)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            email TEXT PRIMARY KEY,
            body TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS admins(
            email TEXT PRIMARY KEY
        )",
        [],
    )?;

    Ok(conn)
}

pub enum RubricPut {
    Stored { rubric_id: String, revision: i64 },
    Conflict { current_revision: i64 },
}

/// Full-document upsert. A missing id means "first save": the store assigns
/// one. `expected_revision` is the optimistic check for whole-document saves;
/// `None` keeps last-write-wins.
pub fn rubric_put(
    conn: &Connection,
    rubric: &Rubric,
    expected_revision: Option<i64>,
) -> anyhow::Result<RubricPut> {
    let rubric_id = rubric
        .id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let mut doc = rubric.clone();
    doc.id = None;
    let body = serde_json::to_string(&doc).context("serialize rubric")?;
    let now = Utc::now().to_rfc3339();

    let current: Option<i64> = conn
        .query_row(
            "SELECT revision FROM rubrics WHERE id = ? AND teacher_email = ?",
            (&rubric_id, &rubric.teacher_email),
            |r| r.get(0),
        )
        .optional()?;

    match current {
        None => {
            if expected_revision.is_some() {
                return Ok(RubricPut::Conflict {
                    current_revision: 0,
                });
            }
            conn.execute(
                "INSERT INTO rubrics(id, teacher_email, revision, body, updated_at)
                 VALUES(?, ?, 1, ?, ?)",
                (&rubric_id, &rubric.teacher_email, &body, &now),
            )?;
            Ok(RubricPut::Stored {
                rubric_id,
                revision: 1,
            })
        }
        Some(current_revision) => {
            if let Some(expected) = expected_revision {
                if expected != current_revision {
                    return Ok(RubricPut::Conflict { current_revision });
                }
            }
            let next = current_revision + 1;
            conn.execute(
                "UPDATE rubrics SET revision = ?, body = ?, updated_at = ?
                 WHERE id = ? AND teacher_email = ?",
                (next, &body, &now, &rubric_id, &rubric.teacher_email),
            )?;
            Ok(RubricPut::Stored {
                rubric_id,
                revision: next,
            })
        }
    }
}

pub fn rubric_get(
    conn: &Connection,
    teacher_email: &str,
    rubric_id: &str,
) -> anyhow::Result<Option<(Rubric, i64)>> {
    let row: Option<(String, i64)> = conn
        .query_row(
            "SELECT body, revision FROM rubrics WHERE id = ? AND teacher_email = ?",
            (rubric_id, teacher_email),
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((body, revision)) = row else {
        return Ok(None);
    };
    let mut rubric: Rubric = serde_json::from_str(&body).context("parse rubric body")?;
    rubric.id = Some(rubric_id.to_string());
    Ok(Some((rubric, revision)))
}

pub fn rubric_list(conn: &Connection, teacher_email: &str) -> anyhow::Result<Vec<(Rubric, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT id, body, revision FROM rubrics WHERE teacher_email = ? ORDER BY rowid",
    )?;
    let rows = stmt
        .query_map([teacher_email], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, i64>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Vec::with_capacity(rows.len());
    for (id, body, revision) in rows {
        let mut rubric: Rubric = serde_json::from_str(&body).context("parse rubric body")?;
        rubric.id = Some(id);
        out.push((rubric, revision));
    }
    Ok(out)
}

pub fn rubric_delete(
    conn: &Connection,
    teacher_email: &str,
    rubric_id: &str,
) -> anyhow::Result<bool> {
    let removed = conn.execute(
        "DELETE FROM rubrics WHERE id = ? AND teacher_email = ?",
        (rubric_id, teacher_email),
    )?;
    Ok(removed > 0)
}

pub fn student_upsert(conn: &Connection, student: &Student) -> anyhow::Result<()> {
    let body = serde_json::to_string(student).context("serialize student")?;
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO students(email, body, updated_at) VALUES(?, ?, ?)
         ON CONFLICT(email) DO UPDATE SET
           body = excluded.body,
           updated_at = excluded.updated_at",
        (&student.email, &body, &now),
    )?;
    Ok(())
}

pub fn student_get(conn: &Connection, email: &str) -> anyhow::Result<Option<Student>> {
    let body: Option<String> = conn
        .query_row("SELECT body FROM students WHERE email = ?", [email], |r| {
            r.get(0)
        })
        .optional()?;
    let Some(body) = body else {
        return Ok(None);
    };
    let student: Student = serde_json::from_str(&body).context("parse student body")?;
    Ok(Some(student))
}

pub fn students_list(conn: &Connection) -> anyhow::Result<Vec<Student>> {
    let mut stmt = conn.prepare("SELECT body FROM students ORDER BY email")?;
    let bodies = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Vec::with_capacity(bodies.len());
    for body in bodies {
        out.push(serde_json::from_str(&body).context("parse student body")?);
    }
    Ok(out)
}

pub fn admin_is_allowed(conn: &Connection, email: &str) -> anyhow::Result<bool> {
    let hit: Option<i64> = conn
        .query_row("SELECT 1 FROM admins WHERE email = ?", [email], |r| {
            r.get(0)
        })
        .optional()?;
    Ok(hit.is_some())
}

pub fn admin_grant(conn: &Connection, email: &str) -> anyhow::Result<()> {
    conn.execute("INSERT OR IGNORE INTO admins(email) VALUES(?)", [email])?;
    Ok(())
}

pub fn admin_count(conn: &Connection) -> anyhow::Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM admins", [], |r| r.get(0))?;
    Ok(count)
}
