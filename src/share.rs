use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

// The token is reversible obfuscation against casual URL reading, not an
// access-control mechanism.

pub fn encode_student_email(email: &str) -> String {
    URL_SAFE_NO_PAD.encode(email.as_bytes())
}

pub fn decode_student_email(token: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(token.as_bytes()).ok()?;
    String::from_utf8(bytes).ok()
}

/// Feedback URL with the three parameters the read-only view requires.
pub fn feedback_url(
    base_url: &str,
    rubric_id: &str,
    student_email: &str,
    teacher_email: &str,
) -> String {
    format!(
        "{}/rubric-feedback?id={}&student={}&teacherUid={}",
        base_url.trim_end_matches('/'),
        rubric_id,
        encode_student_email(student_email),
        teacher_email
    )
}
