//! Input validators shared by the upload and access handlers.

use crate::errors::AppError;
use serde_json::Value;

const MAX_ID_LEN: usize = 100;
const ALLOWED_CONTENT_TYPE_PREFIXES: [&str; 5] = ["video/", "audio/", "image/", "text/", "application/"];

/// Fail with a 400 listing every field whose value is absent or blank.
pub fn require(fields: &[(&'static str, Option<&str>)]) -> Result<(), AppError> {
    let missing = fields
        .iter()
        .filter(|(_, value)| value.is_none_or(|v| v.trim().is_empty()))
        .map(|(name, _)| *name)
        .collect::<Vec<_>>();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(AppError::missing_fields(missing))
    }
}

/// Identifiers embedded in keys: `[A-Za-z0-9_-]`, at most 100 chars.
pub fn validate_id(name: &str, value: &str) -> Result<(), AppError> {
    if value.is_empty() {
        return Err(AppError::bad_request(format!("{} is required", name)));
    }
    if value.len() > MAX_ID_LEN {
        return Err(AppError::bad_request(format!(
            "{} must be {} characters or less",
            name, MAX_ID_LEN
        )));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(AppError::bad_request(format!(
            "{} contains invalid characters",
            name
        )));
    }
    Ok(())
}

pub fn validate_content_type(value: &str) -> Result<(), AppError> {
    if ALLOWED_CONTENT_TYPE_PREFIXES
        .iter()
        .any(|prefix| value.starts_with(prefix))
    {
        Ok(())
    } else {
        Err(AppError::bad_request(format!("File type not allowed: {}", value)))
    }
}

/// Parse an optional `fileSize` sent either as a number or a numeric string.
pub fn parse_file_size(value: Option<&Value>, max: u64) -> Result<Option<u64>, AppError> {
    let Some(value) = value.filter(|v| !v.is_null()) else {
        return Ok(None);
    };

    let size = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
    .filter(|size| *size > 0)
    .ok_or_else(|| AppError::bad_request("Invalid file size"))?;

    if size > max {
        return Err(AppError::bad_request(format!(
            "File too large. Maximum size is {}MB",
            max / 1024 / 1024
        )));
    }
    Ok(Some(size))
}

/// Lowercase a display name into a key segment.
///
/// Runs of anything but ASCII letters and digits collapse to one `_`, and
/// leading/trailing `_` are dropped. Falls back to `user`.
pub fn sanitize_name_segment(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "user".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn require_reports_every_missing_field() {
        let err = require(&[
            ("filename", None),
            ("contentType", Some("video/mp4")),
            ("courseId", Some("  ")),
            ("lessonId", Some("l1")),
        ])
        .unwrap_err();
        assert_eq!(err.required, Some(vec!["filename".to_string(), "courseId".to_string()]));
        assert!(require(&[("fileKey", Some("k"))]).is_ok());
    }

    #[test]
    fn ids() {
        assert!(validate_id("courseId", "course_1-A").is_ok());
        assert_eq!(
            validate_id("courseId", "../x").unwrap_err().message,
            "courseId contains invalid characters"
        );
        assert!(validate_id("lessonId", &"a".repeat(101)).is_err());
    }

    #[test]
    fn content_types() {
        assert!(validate_content_type("application/pdf").is_ok());
        assert!(validate_content_type("video/mp4").is_ok());
        assert_eq!(
            validate_content_type("chemical/x-pdb").unwrap_err().message,
            "File type not allowed: chemical/x-pdb"
        );
    }

    #[test]
    fn file_sizes() {
        let max = 10 * 1024 * 1024;
        assert_eq!(parse_file_size(None, max).unwrap(), None);
        assert_eq!(parse_file_size(Some(&json!(null)), max).unwrap(), None);
        assert_eq!(parse_file_size(Some(&json!(1024)), max).unwrap(), Some(1024));
        assert_eq!(parse_file_size(Some(&json!("2048")), max).unwrap(), Some(2048));
        assert!(parse_file_size(Some(&json!(0)), max).is_err());
        assert!(parse_file_size(Some(&json!("abc")), max).is_err());
        assert_eq!(
            parse_file_size(Some(&json!(max + 1)), max).unwrap_err().message,
            "File too large. Maximum size is 10MB"
        );
    }

    #[test]
    fn name_segments() {
        assert_eq!(sanitize_name_segment("John@Doe#123!"), "john_doe_123");
        assert_eq!(sanitize_name_segment("  Mary   Ann "), "mary_ann");
        assert_eq!(sanitize_name_segment("@@@"), "user");
        assert_eq!(sanitize_name_segment("Zoë"), "zo");
    }
}
