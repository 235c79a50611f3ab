//! Token-set similarity used to link related knowledge nodes.

use std::collections::BTreeSet;

/// Words too common to carry meaning.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "is", "it", "of", "on",
    "or", "that", "the", "this", "to", "we", "with",
];

/// Lower-cased alphanumeric tokens, without stopwords.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// Jaccard similarity of two token sets; 0.0 when both are empty.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Jaccard similarity of two texts.
pub fn text_similarity(a: &str, b: &str) -> f64 {
    jaccard(&tokenize(a), &tokenize(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_drops_stopwords_and_punctuation() {
        let tokens = tokenize("Use the 60-day lookback, for noise.");
        let expected: BTreeSet<String> = ["use", "60", "day", "lookback", "noise"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(tokens, expected);
    }

    #[test]
    fn test_jaccard_bounds() {
        assert_eq!(text_similarity("", ""), 0.0);
        assert_eq!(text_similarity("lookback window", "lookback window"), 1.0);
        assert_eq!(text_similarity("alpha", "beta"), 0.0);
    }

    #[test]
    fn test_jaccard_partial() {
        // {lookback, window, noise} vs {lookback, window, signal}: 2 / 4
        let sim = text_similarity("lookback window noise", "lookback window signal");
        assert!((sim - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_symmetric() {
        let a = "longer windows reduce noise";
        let b = "reduce noise with longer lookback";
        assert_eq!(text_similarity(a, b), text_similarity(b, a));
    }
}
