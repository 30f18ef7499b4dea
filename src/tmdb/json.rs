//! Typed decoding of collaborator response bodies.
//!
//! Upstream payloads are narrowed into explicit record types at the boundary.
//! When a body does not fit, the error names the failing path and quotes the
//! surrounding text so the mismatch can be found without a debugger.

use super::errors::ApiError;

/// Decode `body` into `T`, or produce a [`ApiError::ParseFailed`] describing
/// where the payload diverged from the expected shape.
pub fn decode_body<T: serde::de::DeserializeOwned>(
    body: &str,
    status: u16,
    url: &str,
) -> Result<T, ApiError> {
    parse_json_with_context(body).map_err(|message| ApiError::ParseFailed {
        status,
        url: url.to_owned(),
        message,
    })
}

/// Parse JSON, reporting the serde path, type mismatch and a short snippet on failure.
pub fn parse_json_with_context<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, String> {
    let jd = &mut serde_json::Deserializer::from_str(body);
    serde_path_to_error::deserialize(jd).map_err(|err| {
        let inner = err.inner();
        let (line, column) = (inner.line(), inner.column());
        let path = err.path().to_string();

        let raw = inner.to_string();
        let loc = format!(" at line {line} column {column}");
        let reason = describe_mismatch(raw.strip_suffix(&loc).unwrap_or(&raw));
        let snippet = snippet_at(body, line, column, 24);

        let mut message = String::new();
        if !path.is_empty() && path != "." {
            message.push_str(&format!("at '{path}': "));
        }
        message.push_str(&format!("{reason} (line {line} col {column})\n{snippet}"));
        message
    })
}

/// Rewrite "invalid type: X, expected Y" as "expected Y, got X".
fn describe_mismatch(msg: &str) -> String {
    if let Some(rest) = msg.strip_prefix("invalid type: ")
        && let Some((actual, expected)) = rest.split_once(", expected ")
    {
        return format!("expected {}, got {}", expected.trim(), actual);
    }
    msg.to_owned()
}

fn snippet_at(body: &str, line: usize, column: usize, width: usize) -> String {
    let text = body.lines().nth(line.saturating_sub(1)).unwrap_or("");
    if text.is_empty() {
        return "(empty line)".to_owned();
    }

    let chars: Vec<char> = text.chars().collect();
    let at = column.saturating_sub(1).min(chars.len());
    let start = at.saturating_sub(width / 2);
    let end = (at + width / 2).min(chars.len());
    let slice: String = chars[start..end].iter().collect();
    let marker = " ".repeat(at - start) + "^";

    format!("...{slice}...\n   {marker}")
}
