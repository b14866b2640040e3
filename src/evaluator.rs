use crate::types::ComplexityResult;

const HIGH_VOCABULARY_THRESHOLD: f64 = 0.6;
const COMPLEX_GRAMMAR_THRESHOLD: f64 = 0.6;
const LONG_QUERY_WORD_COUNT: usize = 100;

/// Computes a deterministic complexity score from the query text alone;
/// metadata is intentionally ignored so identical queries always score
/// identically.
pub fn evaluate(query_text: &str) -> ComplexityResult {
    let words: Vec<&str> = query_text.split_whitespace().collect();
    let word_count = words.len();

    let avg_word_len = if word_count == 0 {
        0.0
    } else {
        words.iter().map(|w| w.chars().count()).sum::<usize>() as f64 / word_count as f64
    };

    let vocabulary_complexity =
        0.5 * (word_count as f64 / 100.0).min(1.0) + 0.5 * (avg_word_len / 10.0).min(1.0);

    let sentence_count = query_text
        .split(|c| c == '.' || c == '!' || c == '?')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .count()
        .max(1);

    let avg_sentence_len = word_count as f64 / sentence_count as f64;
    let grammar_complexity = (avg_sentence_len / 20.0).min(1.0);

    let score = (0.6 * vocabulary_complexity + 0.4 * grammar_complexity).clamp(0.0, 1.0);

    let mut factors = Vec::new();
    if vocabulary_complexity > HIGH_VOCABULARY_THRESHOLD {
        factors.push("high_vocabulary_complexity".to_string());
    }
    if grammar_complexity > COMPLEX_GRAMMAR_THRESHOLD {
        factors.push("complex_grammar".to_string());
    }
    if word_count > LONG_QUERY_WORD_COUNT {
        factors.push("long_query".to_string());
    }

    ComplexityResult { score, factors }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_pure() {
        let a = evaluate("explain quantum mechanics briefly");
        let b = evaluate("explain quantum mechanics briefly");
        assert_eq!(a.score, b.score);
        assert_eq!(a.factors, b.factors);
    }

    #[test]
    fn short_query_scores_low() {
        let result = evaluate("hi");
        assert!(result.score < 0.3);
        assert!(result.factors.is_empty());
    }

    #[test]
    fn long_query_emits_long_query_factor() {
        let text = "word ".repeat(150);
        let result = evaluate(text.trim());
        assert!(result.factors.contains(&"long_query".to_string()));
    }

    #[test]
    fn score_is_within_bounds() {
        let text = "a ".repeat(500);
        let result = evaluate(&text);
        assert!(result.score >= 0.0 && result.score <= 1.0);
        assert!(result.score.is_finite());
    }
}
