use serde::de::DeserializeOwned;
use tracing::debug;

use super::connection::ApiConnectionError;
use super::endpoints::GenerateContentResponse;

/// Strips a surrounding markdown code fence (```json ... ``` or ``` ... ```).
pub fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    if !trimmed.ends_with("```") {
        return trimmed;
    }
    let body = if let Some(rest) = trimmed.strip_prefix("```json") {
        rest
    } else if let Some(rest) = trimmed.strip_prefix("```") {
        rest
    } else {
        return trimmed;
    };
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Parses the JSON payload carried in the first candidate's text.
pub fn parse_candidate_json<T: DeserializeOwned>(
    response: &GenerateContentResponse,
) -> Result<T, ApiConnectionError> {
    let raw = response
        .first_candidate_text()
        .ok_or(ApiConnectionError::EmptyCandidate)?;
    let content = strip_code_fence(raw);
    if content.is_empty() {
        return Err(ApiConnectionError::EmptyCandidate);
    }

    serde_json::from_str(content).map_err(|e| {
        debug!(error = %e, content, "candidate text is not the expected JSON");
        ApiConnectionError::SerializationError(e)
    })
}
