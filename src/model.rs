use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fixed tier point values, indexed by `gradingIndex`.
pub const TIER_SCORES: [u32; 4] = [25, 20, 15, 10];

pub const DEFAULT_RUBRIC_TITLE: &str = "Untitled Rubric";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PossibleScore {
    pub score: u32,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RubricLine {
    pub line_id: String,
    pub category_name: String,
    pub possible_scores: [PossibleScore; 4],
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GradeLocation {
    pub category_index: usize,
    pub grading_index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StudentRubricGrade {
    pub student_email: String,
    #[serde(default)]
    pub rubric_grades_location: Vec<GradeLocation>,
    #[serde(default)]
    pub current_grade: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RubricHeader {
    pub title: String,
    #[serde(default)]
    pub grade_levels: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Rubric {
    /// Document key, assigned by the store on first save; not part of the
    /// stored body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub teacher_email: String,
    pub teacher_name: String,
    pub header: RubricHeader,
    #[serde(default)]
    pub rubric_lines: Vec<RubricLine>,
    #[serde(default)]
    pub student_rubric_grade: Vec<StudentRubricGrade>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub student_id: String,
    #[serde(default)]
    pub grade_level: String,
}

pub fn new_line() -> RubricLine {
    RubricLine {
        line_id: Uuid::new_v4().to_string(),
        category_name: String::new(),
        possible_scores: TIER_SCORES.map(|score| PossibleScore {
            score,
            text: String::new(),
        }),
    }
}

/// A fresh rubric starts with one blank placeholder line.
pub fn new_rubric(teacher_email: &str, teacher_name: &str) -> Rubric {
    Rubric {
        id: None,
        teacher_email: teacher_email.to_string(),
        teacher_name: teacher_name.to_string(),
        header: RubricHeader {
            title: DEFAULT_RUBRIC_TITLE.to_string(),
            grade_levels: Vec::new(),
        },
        rubric_lines: vec![new_line()],
        student_rubric_grade: Vec::new(),
    }
}

pub fn line_is_blank(line: &RubricLine) -> bool {
    line.category_name.trim().is_empty()
        && line
            .possible_scores
            .iter()
            .all(|slot| slot.text.trim().is_empty())
}

/// Number of gradable lines: everything except the maximal trailing run of
/// fully-blank lines. A blank line followed by a non-blank one still counts.
pub fn gradable_line_count(lines: &[RubricLine]) -> usize {
    let mut count = lines.len();
    while count > 0 && line_is_blank(&lines[count - 1]) {
        count -= 1;
    }
    count
}

pub fn gradable_line_ids(lines: &[RubricLine]) -> Vec<String> {
    lines[..gradable_line_count(lines)]
        .iter()
        .map(|line| line.line_id.clone())
        .collect()
}

pub fn max_grade(lines: &[RubricLine]) -> u32 {
    gradable_line_count(lines) as u32 * TIER_SCORES[0]
}

pub fn tier_score(grading_index: usize) -> Option<u32> {
    TIER_SCORES.get(grading_index).copied()
}

/// Sum of selected tiers, counting only entries on gradable lines.
pub fn compute_grade(lines: &[RubricLine], locations: &[GradeLocation]) -> u32 {
    let gradable = gradable_line_count(lines);
    locations
        .iter()
        .filter(|loc| loc.category_index < gradable)
        .filter_map(|loc| tier_score(loc.grading_index))
        .sum()
}

/// `currentGrade` is derived state; every mutation that can affect it goes
/// through here.
pub fn recompute_grades(rubric: &mut Rubric) {
    let lines = &rubric.rubric_lines;
    for grade in &mut rubric.student_rubric_grade {
        grade.current_grade = compute_grade(lines, &grade.rubric_grades_location);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradeRejection {
    NotAssigned,
    LineNotGradable,
    BadTier,
}

/// Record a tier selection for the given student, replacing any prior
/// selection for the same category. Returns the recomputed current grade.
pub fn select_grade(
    rubric: &mut Rubric,
    student_email: &str,
    category_index: usize,
    grading_index: usize,
) -> Result<u32, GradeRejection> {
    if grading_index >= TIER_SCORES.len() {
        return Err(GradeRejection::BadTier);
    }
    let gradable = gradable_line_count(&rubric.rubric_lines);
    if category_index >= gradable {
        return Err(GradeRejection::LineNotGradable);
    }
    let Some(grade) = rubric
        .student_rubric_grade
        .iter_mut()
        .find(|g| g.student_email == student_email)
    else {
        return Err(GradeRejection::NotAssigned);
    };

    grade
        .rubric_grades_location
        .retain(|loc| loc.category_index != category_index);
    grade.rubric_grades_location.push(GradeLocation {
        category_index,
        grading_index,
    });
    grade.current_grade = grade
        .rubric_grades_location
        .iter()
        .filter(|loc| loc.category_index < gradable)
        .filter_map(|loc| tier_score(loc.grading_index))
        .sum();
    Ok(grade.current_grade)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignRejection {
    MissingEmail,
    AlreadyAssigned,
}

pub fn assign_student(rubric: &mut Rubric, student_email: &str) -> Result<(), AssignRejection> {
    let email = student_email.trim();
    if email.is_empty() {
        return Err(AssignRejection::MissingEmail);
    }
    if rubric
        .student_rubric_grade
        .iter()
        .any(|g| g.student_email == email)
    {
        return Err(AssignRejection::AlreadyAssigned);
    }
    rubric.student_rubric_grade.push(StudentRubricGrade {
        student_email: email.to_string(),
        rubric_grades_location: Vec::new(),
        current_grade: 0,
    });
    Ok(())
}

pub fn unassign_student(rubric: &mut Rubric, student_email: &str) -> bool {
    let before = rubric.student_rubric_grade.len();
    rubric
        .student_rubric_grade
        .retain(|g| g.student_email != student_email);
    rubric.student_rubric_grade.len() != before
}

pub fn add_line(rubric: &mut Rubric) -> RubricLine {
    let line = new_line();
    rubric.rubric_lines.push(line.clone());
    line
}

pub enum LineField<'a> {
    CategoryName(&'a str),
    ScoreText { score_index: usize, text: &'a str },
}

/// In-place field edit addressed by `lineId`. Returns false when the line (or
/// score slot) does not exist. Grades are recomputed because an edit can flip
/// the gradability of a trailing run.
pub fn edit_line(rubric: &mut Rubric, line_id: &str, field: LineField) -> bool {
    let Some(line) = rubric
        .rubric_lines
        .iter_mut()
        .find(|l| l.line_id == line_id)
    else {
        return false;
    };
    match field {
        LineField::CategoryName(value) => line.category_name = value.to_string(),
        LineField::ScoreText { score_index, text } => {
            let Some(slot) = line.possible_scores.get_mut(score_index) else {
                return false;
            };
            slot.text = text.to_string();
        }
    }
    recompute_grades(rubric);
    true
}

/// Remove a line by `lineId`. Unknown ids are a silent no-op. Stored grade
/// locations are reindexed: entries at the removed index are dropped, entries
/// past it shift down by one, and every current grade is recomputed.
pub fn remove_line(rubric: &mut Rubric, line_id: &str) -> bool {
    let Some(removed_at) = rubric
        .rubric_lines
        .iter()
        .position(|l| l.line_id == line_id)
    else {
        return false;
    };
    rubric.rubric_lines.remove(removed_at);
    for grade in &mut rubric.student_rubric_grade {
        grade
            .rubric_grades_location
            .retain(|loc| loc.category_index != removed_at);
        for loc in &mut grade.rubric_grades_location {
            if loc.category_index > removed_at {
                loc.category_index -= 1;
            }
        }
    }
    recompute_grades(rubric);
    true
}

/// "10" -> "10th", "1" -> "1st", 11..=13 -> "th". Labels that are not plain
/// numbers pass through unchanged.
pub fn grade_level_with_suffix(grade_level: &str) -> String {
    let trimmed = grade_level.trim();
    let Ok(num) = trimmed.parse::<u32>() else {
        return grade_level.to_string();
    };
    let suffix = match (num % 100, num % 10) {
        (11..=13, _) => "th",
        (_, 1) => "st",
        (_, 2) => "nd",
        (_, 3) => "rd",
        _ => "th",
    };
    format!("{trimmed}{suffix}")
}
