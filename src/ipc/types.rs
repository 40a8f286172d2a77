use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

/// Sign-in is restricted to this email domain unless `workspace.select`
/// overrides it.
pub const DEFAULT_ALLOWED_DOMAIN: &str = "ear.com.br";

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct TeacherProfile {
    pub email: String,
    pub name: String,
}

/// Per-screen grading state: which rubric is open, which assigned student is
/// selected, and whether edition mode (structure editing) is active.
#[derive(Debug, Clone, Default)]
pub struct GradingSession {
    pub rubric_id: Option<String>,
    pub selected_student: Option<String>,
    pub edition_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubTarget {
    Students,
    RubricList {
        teacher_email: String,
    },
    Rubric {
        teacher_email: String,
        rubric_id: String,
    },
}

#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: i64,
    pub target: SubTarget,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub allowed_domain: String,
    pub teacher: Option<TeacherProfile>,
    pub session: GradingSession,
    pub subs: Vec<Subscription>,
    pub next_sub_id: i64,
    pub pending_events: Vec<serde_json::Value>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            workspace: None,
            db: None,
            allowed_domain: DEFAULT_ALLOWED_DOMAIN.to_string(),
            teacher: None,
            session: GradingSession::default(),
            subs: Vec::new(),
            next_sub_id: 1,
            pending_events: Vec::new(),
        }
    }

    /// Event lines queued by the last request, to be written after its
    /// response.
    pub fn drain_events(&mut self) -> Vec<serde_json::Value> {
        std::mem::take(&mut self.pending_events)
    }
}
