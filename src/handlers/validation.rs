//! Request normalization for event writes: structural checks, sanitization,
//! then timestamp parsing and range checks.

use chrono::{DateTime, Utc};
use validator::{Validate, ValidationErrors};

use crate::models::{EventRequest, NewEvent};
use crate::utils::response::FieldErrors;
use crate::utils::AppError;

/// Escapes characters that are significant in HTML markup.
pub fn sanitize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn field_errors(errors: &ValidationErrors) -> FieldErrors {
    errors
        .field_errors()
        .into_iter()
        .map(|(field, errs)| {
            let reason = errs
                .first()
                .map(|e| match &e.message {
                    Some(message) => message.to_string(),
                    None => e.code.to_string(),
                })
                .unwrap_or_else(|| "is invalid".to_string());
            (field.to_string(), reason)
        })
        .collect()
}

/// `YYYY-MM-DDTHH:MM:SS[.frac]` followed by `Z` or a `+HH:MM`/`-HH:MM` offset.
/// chrono's RFC 3339 parser also takes a space separator and a lowercase `z`;
/// those are refused here.
fn has_timestamp_shape(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.len() < 20 || bytes[10] != b'T' {
        return false;
    }
    if bytes.ends_with(b"Z") {
        return true;
    }
    let offset = &bytes[bytes.len() - 6..];
    matches!(offset[0], b'+' | b'-') && offset[3] == b':'
}

fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>, AppError> {
    let invalid = || {
        AppError::invalid_field(
            field,
            "must be an RFC 3339 timestamp, e.g. 2025-06-13T09:00:00Z",
            format!("Invalid {field} format"),
        )
    };

    if !has_timestamp_shape(value) {
        return Err(invalid());
    }

    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| invalid())
}

/// Runs the full pipeline and yields the fields ready for the repository.
pub fn prepare_event(request: EventRequest) -> Result<NewEvent, AppError> {
    if let Err(errors) = request.validate() {
        return Err(AppError::validation(
            "Request validation failed",
            field_errors(&errors),
        ));
    }

    let title = sanitize(request.title.as_deref().unwrap_or_default());
    let description = request.description.as_deref().map(sanitize);

    let start_time = parse_timestamp("start_time", request.start_time.as_deref().unwrap_or_default())?;
    let end_time = parse_timestamp("end_time", request.end_time.as_deref().unwrap_or_default())?;

    if end_time <= start_time {
        return Err(AppError::invalid_field(
            "end_time",
            "must be after start_time",
            "end_time must be after start_time",
        ));
    }

    Ok(NewEvent {
        title,
        description,
        start_time,
        end_time,
    })
}
