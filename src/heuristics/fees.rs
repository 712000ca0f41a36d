use super::FeeLineItem;
use once_cell::sync::Lazy;
use regex::Regex;

static FEE_SECTION_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"통\s*관\s*수\s*수\s*료").expect("start label regex"));

static FEE_SECTION_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"예\s*상\s*비\s*용").expect("end label regex"));

static OUTSTANDING_BALANCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"미\s*수\s*금").expect("exclusion regex"));

static IMPORTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+?)\s*귀하(?:\s|$)").expect("importer regex"));

// <name> <digits/commas> [<vendor>]
static FEE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<name>.+?)\s+(?P<amount>[0-9][0-9,]*)(?:\s+(?P<vendor>.*))?$")
        .expect("fee line regex")
});

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("ws regex"));

// ---------------------------------------------------------------------------
// Line normalisation
// ---------------------------------------------------------------------------

/// Split raw text into trimmed, whitespace-collapsed, non-empty lines.
pub fn normalize_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(collapse_whitespace)
        .filter(|line| !line.is_empty())
        .collect()
}

fn collapse_whitespace(line: &str) -> String {
    WHITESPACE_RUN.replace_all(line, " ").trim().to_string()
}

fn is_hangul(c: char) -> bool {
    matches!(c,
        '\u{AC00}'..='\u{D7A3}'   // syllables
        | '\u{1100}'..='\u{11FF}' // jamo
        | '\u{3130}'..='\u{318F}' // compatibility jamo
        | '\u{A960}'..='\u{A97F}'
        | '\u{D7B0}'..='\u{D7FF}')
}

/// Collapse whitespace, then drop any whitespace sitting between two Hangul
/// characters. `"검 역 료"` becomes `"검역료"`, `"THC 비용"` is left alone.
pub fn normalize_fee_name(name: &str) -> String {
    let collapsed = collapse_whitespace(name);
    let chars: Vec<char> = collapsed.chars().collect();
    let mut out = String::with_capacity(collapsed.len());
    for (i, &c) in chars.iter().enumerate() {
        if c == ' ' {
            let prev = i.checked_sub(1).and_then(|p| chars.get(p));
            let next = chars.get(i + 1);
            if prev.is_some_and(|&p| is_hangul(p)) && next.is_some_and(|&n| is_hangul(n)) {
                continue;
            }
        }
        out.push(c);
    }
    out
}

// ---------------------------------------------------------------------------
// Importer
// ---------------------------------------------------------------------------

/// Name on the first `"<name> 귀하"` line.
pub fn find_importer(lines: &[String]) -> Option<String> {
    lines.iter().find_map(|line| {
        let cap = IMPORTER.captures(line)?;
        let name = cap[1].trim();
        (!name.is_empty()).then(|| name.to_string())
    })
}

// ---------------------------------------------------------------------------
// Section scanning
// ---------------------------------------------------------------------------

/// Where the fee section sits in a line sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeSection {
    /// No start label anywhere.
    Missing,
    /// Start label found, no end label: runs to the last line.
    Open { start: usize },
    /// `start..end`, end exclusive at the end label.
    Closed { start: usize, end: usize },
}

impl FeeSection {
    pub fn bounds(self, line_count: usize) -> Option<(usize, usize)> {
        match self {
            Self::Missing => None,
            Self::Open { start } => Some((start.min(line_count), line_count)),
            Self::Closed { start, end } => Some((start, end)),
        }
    }
}

enum ScanState {
    SeekingStart,
    SeekingEnd { start: usize },
}

/// Walk the lines once: find the start label, then the first end label after it.
pub fn locate_fee_section(lines: &[String]) -> FeeSection {
    let mut state = ScanState::SeekingStart;
    for (idx, line) in lines.iter().enumerate() {
        state = match state {
            ScanState::SeekingStart if FEE_SECTION_START.is_match(line) => {
                ScanState::SeekingEnd { start: idx + 1 }
            }
            ScanState::SeekingEnd { start } if FEE_SECTION_END.is_match(line) => {
                return FeeSection::Closed { start, end: idx };
            }
            other => other,
        };
    }
    match state {
        ScanState::SeekingStart => FeeSection::Missing,
        ScanState::SeekingEnd { start } => FeeSection::Open { start },
    }
}

// ---------------------------------------------------------------------------
// Fee parsing
// ---------------------------------------------------------------------------

/// Parse one fee line. `None` for outstanding-balance lines, which are dropped.
pub fn parse_fee_line(line: &str) -> Option<FeeLineItem> {
    if OUTSTANDING_BALANCE.is_match(line) {
        return None;
    }
    let item = match FEE_LINE.captures(line) {
        Some(cap) => FeeLineItem::Fee {
            name: normalize_fee_name(&cap["name"]),
            amount: cap["amount"].to_string(),
            vendor: cap
                .name("vendor")
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default(),
        },
        None => FeeLineItem::Raw {
            raw_line: collapse_whitespace(line),
        },
    };
    Some(item)
}

/// Fee items between the section labels.
pub fn extract_fees(lines: &[String]) -> Vec<FeeLineItem> {
    let Some((start, end)) = locate_fee_section(lines).bounds(lines.len()) else {
        return Vec::new();
    };
    lines[start..end]
        .iter()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| parse_fee_line(line))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_lines_collapses_and_drops_empty() {
        let text = "  A사   귀하 \n\n\t\n검 역 료   15,000\tA사\r\n";
        assert_eq!(
            normalize_lines(text),
            vec!["A사 귀하".to_string(), "검 역 료 15,000 A사".to_string()]
        );
    }

    #[test]
    fn test_fee_name_hangul_spacing() {
        assert_eq!(normalize_fee_name("검 역 료"), "검역료");
        assert_eq!(normalize_fee_name("  창고   보관료 "), "창고보관료");
        assert_eq!(normalize_fee_name("THC 비용"), "THC 비용");
        assert_eq!(normalize_fee_name("D/O 수 수 료"), "D/O 수수료");
    }

    #[test]
    fn test_importer() {
        let l = lines(&["정산서", "(주)한빛무역 귀하", "다른회사 귀하"]);
        assert_eq!(find_importer(&l).as_deref(), Some("(주)한빛무역"));
        assert_eq!(find_importer(&lines(&["귀하"])), None);
        assert_eq!(find_importer(&lines(&["정산서"])), None);
    }

    #[test]
    fn test_section_closed() {
        let l = lines(&["머리말", "통관수수료", "a 1 b", "예상비용", "꼬리"]);
        assert_eq!(locate_fee_section(&l), FeeSection::Closed { start: 2, end: 3 });
    }

    #[test]
    fn test_section_spaced_labels() {
        let l = lines(&["통 관 수 수 료", "a 1 b", "예 상 비 용"]);
        assert_eq!(locate_fee_section(&l), FeeSection::Closed { start: 1, end: 2 });
    }

    #[test]
    fn test_section_open_runs_to_end() {
        let l = lines(&["통관수수료", "a 1 b", "c 2 d"]);
        assert_eq!(locate_fee_section(&l), FeeSection::Open { start: 1 });
        assert_eq!(FeeSection::Open { start: 1 }.bounds(3), Some((1, 3)));
    }

    #[test]
    fn test_end_label_before_start_is_ignored() {
        let l = lines(&["예상비용", "통관수수료", "a 1 b"]);
        assert_eq!(locate_fee_section(&l), FeeSection::Open { start: 2 });
    }

    #[test]
    fn test_section_missing() {
        let l = lines(&["검역료 15,000 A사"]);
        assert_eq!(locate_fee_section(&l), FeeSection::Missing);
        assert!(extract_fees(&l).is_empty());
    }

    #[test]
    fn test_extract_fees_basic() {
        let l = lines(&["통관수수료", "검역료 15,000 A사", "예상비용"]);
        let fees = extract_fees(&l);
        assert_eq!(
            fees,
            vec![FeeLineItem::Fee {
                name: "검역료".into(),
                amount: "15,000".into(),
                vendor: "A사".into(),
            }]
        );
    }

    #[test]
    fn test_outstanding_balance_dropped() {
        let l = lines(&["통관수수료", "미수금 5,000", "미 수 금 1,000", "검역료 15,000 A사"]);
        let fees = extract_fees(&l);
        assert_eq!(fees.len(), 1);
    }

    #[test]
    fn test_raw_fallback_and_empty_vendor() {
        let l = lines(&["통관수수료", "합계 없음", "운 송 료 120,000", "예상비용", "검역료 1 X"]);
        let fees = extract_fees(&l);
        assert_eq!(
            fees,
            vec![
                FeeLineItem::Raw { raw_line: "합계 없음".into() },
                FeeLineItem::Fee {
                    name: "운송료".into(),
                    amount: "120,000".into(),
                    vendor: String::new(),
                },
            ]
        );
    }

    #[test]
    fn test_name_may_contain_digits() {
        let item = parse_fee_line("2 창고료 33,000 B 물류");
        assert_eq!(
            item,
            Some(FeeLineItem::Fee {
                name: "2 창고료".into(),
                amount: "33,000".into(),
                vendor: "B 물류".into(),
            })
        );
    }
}
