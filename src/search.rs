use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

static CUSTOMS_LIKE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[0-9]{5}[-_ ]?[0-9]{2}[-_ ]?[0-9]{6}M").expect("customs-like regex")
});

static CODE_LIKE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9]{6,20}").expect("code-like regex"));

static SEPARATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-_ ]").expect("separator regex"));

/// Filters for listing merged outputs.
#[derive(Debug, Clone, Default)]
pub struct MergedQuery {
    pub keyword: Option<String>,
    /// `YYMMDD`
    pub date: Option<String>,
    pub tokens: Vec<String>,
}

/// Search tokens from free text, e.g. a pasted list of shipments.
///
/// Customs numbers yield both a compact and an underscored form, since merged
/// file names carry the underscored one.
pub fn extract_search_tokens(text: &str) -> Vec<String> {
    let mut tokens = BTreeSet::new();
    for m in CUSTOMS_LIKE.find_iter(text) {
        tokens.insert(SEPARATOR.replace_all(m.as_str(), "").into_owned());
        tokens.insert(SEPARATOR.replace_all(m.as_str(), "_").into_owned());
    }
    for m in CODE_LIKE.find_iter(text) {
        if m.as_str().chars().any(|c| c.is_ascii_digit()) {
            tokens.insert(m.as_str().to_string());
        }
    }
    tokens.into_iter().collect()
}

/// Names matching every filter of `query`, case-insensitively.
pub fn filter_merged<'a>(names: &'a [String], query: &MergedQuery) -> Vec<&'a str> {
    let keyword = query
        .keyword
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_lowercase);
    let date_key = query
        .date
        .as_deref()
        .filter(|d| !d.is_empty())
        .map(|d| format!("{d}_"));
    let tokens: Vec<String> = query.tokens.iter().map(|t| t.to_lowercase()).collect();

    names
        .iter()
        .map(String::as_str)
        .filter(|name| {
            let lower = name.to_lowercase();
            if keyword.as_ref().is_some_and(|k| !lower.contains(k.as_str())) {
                return false;
            }
            if date_key.as_ref().is_some_and(|d| !lower.contains(d.as_str())) {
                return false;
            }
            tokens.is_empty() || tokens.iter().any(|t| lower.contains(t.as_str()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_from_pasted_text() {
        let tokens = extract_search_tokens("12345-67-890123M HDMU1234567, memo ABCDEFG");
        assert!(tokens.contains(&"1234567890123M".to_string()));
        assert!(tokens.contains(&"12345_67_890123M".to_string()));
        assert!(tokens.contains(&"HDMU1234567".to_string()));
        // no digit, not a code
        assert!(!tokens.contains(&"ABCDEFG".to_string()));
    }

    #[test]
    fn test_filter_merged() {
        let names: Vec<String> = [
            "12345_67_890123M_260305_070809.pdf",
            "55555_66_777777M_260306_101010.pdf",
            "미분류_260305_111111.pdf",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let by_date = MergedQuery {
            date: Some("260305".into()),
            ..Default::default()
        };
        assert_eq!(filter_merged(&names, &by_date).len(), 2);

        let by_token = MergedQuery {
            tokens: extract_search_tokens("55555-66-777777m"),
            ..Default::default()
        };
        assert_eq!(
            filter_merged(&names, &by_token),
            vec!["55555_66_777777M_260306_101010.pdf"]
        );

        let by_keyword = MergedQuery {
            keyword: Some(" 미분류 ".into()),
            date: Some("260305".into()),
            tokens: vec![],
        };
        assert_eq!(filter_merged(&names, &by_keyword), vec!["미분류_260305_111111.pdf"]);

        assert_eq!(filter_merged(&names, &MergedQuery::default()).len(), 3);
    }
}
