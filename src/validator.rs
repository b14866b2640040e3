use crate::error::{GatewayError, Result};
use crate::types::{generate_request_id, NormalizedRequest, QueryRequest};
use chrono::Utc;

const MIN_QUERY_LEN: usize = 1;
const MAX_QUERY_LEN: usize = 10_000;

/// Substring patterns (case-insensitive) that mark a query as unsafe.
const UNSAFE_PATTERNS: &[&str] = &["exec(", "eval(", "system("];

/// Normalizes a raw request and rejects malformed or unsafe input.
/// `metadata` grows derived `queryLength`/`wordCount` fields on success.
pub fn validate_and_normalize(req: QueryRequest) -> Result<NormalizedRequest> {
    let query_text = req.query;
    let len = query_text.chars().count();

    if len < MIN_QUERY_LEN || len > MAX_QUERY_LEN {
        return Err(GatewayError::InvalidRequest(format!(
            "query must be between {} and {} code points, got {}",
            MIN_QUERY_LEN, MAX_QUERY_LEN, len
        )));
    }

    let lowered = query_text.to_lowercase();
    if UNSAFE_PATTERNS.iter().any(|p| lowered.contains(p)) {
        return Err(GatewayError::InvalidRequest(
            "query contains unsafe content".to_string(),
        ));
    }

    let request_id = req.request_id.unwrap_or_else(generate_request_id);
    let word_count = query_text.split_whitespace().count();

    let mut metadata = req.metadata;
    metadata.insert("queryLength".to_string(), len.to_string());
    metadata.insert("wordCount".to_string(), word_count.to_string());
    metadata.insert("timestamp".to_string(), Utc::now().to_rfc3339());

    Ok(NormalizedRequest {
        request_id,
        query_text,
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn request(query: &str) -> QueryRequest {
        QueryRequest {
            request_id: None,
            query: query.to_string(),
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn assigns_request_id_when_absent() {
        let normalized = validate_and_normalize(request("hello there")).unwrap();
        assert!(!normalized.request_id.is_empty());
    }

    #[test]
    fn rejects_empty_query() {
        let result = validate_and_normalize(request(""));
        assert!(matches!(result, Err(GatewayError::InvalidRequest(_))));
    }

    #[test]
    fn rejects_unsafe_patterns() {
        let result = validate_and_normalize(request("exec(\"rm -rf /\")"));
        match result {
            Err(GatewayError::InvalidRequest(message)) => {
                assert!(message.to_lowercase().contains("unsafe"));
            }
            _ => panic!("expected InvalidRequest"),
        }
    }

    #[test]
    fn derives_query_length_and_word_count() {
        let normalized = validate_and_normalize(request("two words")).unwrap();
        assert_eq!(normalized.metadata.get("wordCount").unwrap(), "2");
        assert_eq!(
            normalized.metadata.get("queryLength").unwrap(),
            &"two words".chars().count().to_string()
        );
    }
}
