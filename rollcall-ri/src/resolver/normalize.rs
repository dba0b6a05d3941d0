//! Person name normalization for identity matching
//!
//! "Sen. José  García-López, Jr." and "garcia lopez, jose" both normalize to
//! "jose garcia lopez".

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Leading titles dropped before comparison
const HONORIFICS: &[&str] = &[
    "the", "hon", "honorable", "honourable", "mr", "mrs", "ms", "miss", "mx", "dr", "rev", "sen",
    "senator", "rep", "representative", "del", "delegate", "gov", "governor", "lt", "mayor",
    "councilmember", "councilman", "councilwoman", "commissioner", "judge", "justice", "atty",
];

/// Trailing generational and professional suffixes
const SUFFIXES: &[&str] = &["jr", "sr", "ii", "iii", "iv", "v", "phd", "md", "esq", "dds", "cpa"];

/// Letters NFD does not decompose into base + mark
fn fold_special(c: char) -> Option<&'static str> {
    Some(match c {
        'ß' => "ss",
        'æ' => "ae",
        'œ' => "oe",
        'ø' => "o",
        'ł' => "l",
        'đ' => "d",
        'ð' => "d",
        'þ' => "th",
        'ı' => "i",
        _ => return None,
    })
}

/// Normalize a full name for equality comparison
pub fn normalize_name(raw: &str) -> String {
    let reordered = reorder_last_first(raw);

    let mut folded = String::with_capacity(reordered.len());
    for c in reordered.nfd().filter(|c| !is_combining_mark(*c)) {
        for lower in c.to_lowercase() {
            match fold_special(lower) {
                Some(replacement) => folded.push_str(replacement),
                None if lower.is_alphanumeric() => folded.push(lower),
                // Apostrophes join ("O'Brien" → "obrien"), other punctuation splits
                None if matches!(lower, '\'' | '\u{2019}' | '.') => {}
                None => folded.push(' '),
            }
        }
    }

    let mut tokens: Vec<&str> = folded.split_whitespace().collect();
    while tokens.len() > 1 && HONORIFICS.contains(&tokens[0]) {
        tokens.remove(0);
    }
    while tokens.len() > 1 && tokens.last().is_some_and(|t| SUFFIXES.contains(t)) {
        tokens.pop();
    }

    tokens.join(" ")
}

/// "Last, First Middle" → "First Middle Last"; "First Last, Jr." is left alone
fn reorder_last_first(raw: &str) -> String {
    let parts: Vec<&str> = raw.split(',').map(str::trim).filter(|p| !p.is_empty()).collect();
    if parts.len() < 2 {
        return raw.to_string();
    }

    let is_suffix = |part: &str| {
        let cleaned: String = part
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect();
        SUFFIXES.contains(&cleaned.as_str())
    };

    let (given, rest): (Vec<&str>, Vec<&str>) = parts[1..].iter().partition(|p| !is_suffix(p));
    if given.is_empty() || parts[0].split_whitespace().count() > 2 {
        return raw.to_string();
    }

    let mut out = given.join(" ");
    out.push(' ');
    out.push_str(parts[0]);
    for suffix in rest {
        out.push(' ');
        out.push_str(suffix);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_whitespace_and_titles() {
        assert_eq!(normalize_name("  Sen.  ELIZABETH   Warren "), "elizabeth warren");
        assert_eq!(normalize_name("The Honorable John Smith"), "john smith");
        assert_eq!(normalize_name("John Smith Jr."), "john smith");
        assert_eq!(normalize_name("John Smith, III"), "john smith");
    }

    #[test]
    fn test_diacritics_are_transliterated() {
        assert_eq!(normalize_name("José García-López"), "jose garcia lopez");
        assert_eq!(normalize_name("Zoë Lofgren"), normalize_name("Zoe Lofgren"));
        assert_eq!(normalize_name("Łukasz Große"), "lukasz grosse");
    }

    #[test]
    fn test_last_first_order() {
        assert_eq!(normalize_name("Smith, John"), "john smith");
        assert_eq!(normalize_name("García-López, José, Jr."), "jose garcia lopez");
    }

    #[test]
    fn test_apostrophes_join() {
        assert_eq!(normalize_name("Beto O'Rourke"), "beto orourke");
        assert_eq!(normalize_name("Beto O\u{2019}Rourke"), "beto orourke");
    }

    #[test]
    fn test_single_token_name_is_kept() {
        assert_eq!(normalize_name("Mayor"), "mayor");
    }
}
