//! Comparison keys for free-text names.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Lowercase, accent-free, alphanumeric-only key: `"Palo Santo - Ñandú"`
/// becomes `"palosantonandu"`. Total; empty input gives an empty key.
#[must_use]
pub fn normalize(text: &str) -> String {
    text.trim()
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Ratcliff/Obershelp similarity in `0.0..=1.0`: twice the matched
/// characters over the combined length.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_chars(&a, &b) as f64 / total as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let (start_a, start_b, len) = longest_common_run(a, b);
    if len == 0 {
        return 0;
    }
    len + matching_chars(&a[..start_a], &b[..start_b])
        + matching_chars(&a[start_a + len..], &b[start_b + len..])
}

// Leftmost longest common substring, as (start in a, start in b, length).
fn longest_common_run(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    let mut prev = vec![0usize; b.len() + 1];
    for i in 0..a.len() {
        let mut row = vec![0usize; b.len() + 1];
        for j in 0..b.len() {
            if a[i] == b[j] {
                row[j + 1] = prev[j] + 1;
                if row[j + 1] > best.2 {
                    best = (i + 1 - row[j + 1], j + 1 - row[j + 1], row[j + 1]);
                }
            }
        }
        prev = row;
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_accents_case_and_punctuation() {
        assert_eq!(normalize("  Palo Santo - Ñandú "), "palosantonandu");
        assert_eq!(normalize("SAHUMERIO Sándalo #3"), "sahumeriosandalo3");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("¡¿...?!"), "");
    }

    #[test]
    fn test_ratio_bounds() {
        assert_eq!(similarity_ratio("canela", "canela"), 1.0);
        assert_eq!(similarity_ratio("abc", "xyz"), 0.0);
        assert_eq!(similarity_ratio("", ""), 1.0);
    }

    #[test]
    fn test_ratio_matches_sequence_matcher() {
        // 2 * 5 / 11
        let r = similarity_ratio("canela", "canel");
        assert!((r - 10.0 / 11.0).abs() < 1e-9);
        // "abcd" vs "bcda": run "bcd" only
        let r = similarity_ratio("abcd", "bcda");
        assert!((r - 0.75).abs() < 1e-9);
    }
}
