use once_cell::sync::Lazy;
use regex::Regex;

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

// The trailing `(?:[^0-9]|$)` stands in for "not followed by a digit";
// only group 1 is the customs number itself.
static CUSTOMS_HYPHEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(([0-9]{5})-([0-9]{2})-([0-9]{6})M)(?:[^0-9]|$)").expect("customs regex")
});

static CUSTOMS_PLAIN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(([0-9]{13})M)(?:[^0-9]|$)").expect("customs regex"));

static CUSTOMS_ONLY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:[0-9]{5}-[0-9]{2}-[0-9]{6}|[0-9]{13})M$").expect("customs regex")
});

static BL_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[ _-])(?i-u:BL)[ _-]?([A-Za-z0-9]{6,20})(?:$|[ _-])").expect("bl regex")
});

static EXTENSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.[^/.]+$").expect("ext regex"));

static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ _-]+").expect("sep regex"));

static PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([A-Z]{2,3})[ _-]?").expect("prefix regex"));

const MIN_BL_LEN: usize = 6;
const MAX_BL_LEN: usize = 20;

/// Prefix reported for names that do not start with a 2-3 letter code.
pub const OTHER_PREFIX: &str = "기타";

// ---------------------------------------------------------------------------
// Rule chain
// ---------------------------------------------------------------------------

/// One step of a filename heuristic cascade.
pub trait FilenameRule: Sync {
    fn name(&self) -> &'static str;
    fn try_match(&self, filename: &str) -> Option<String>;
}

/// Run `rules` in order and return the first hit.
pub fn first_match(rules: &[&dyn FilenameRule], filename: &str) -> Option<String> {
    rules.iter().find_map(|rule| {
        let hit = rule.try_match(filename);
        if let Some(ref value) = hit {
            tracing::debug!(rule = rule.name(), value = %value, "Filename rule matched");
        }
        hit
    })
}

/// `12345-67-890123M`, returned as written (with an upper-case `M`).
pub struct HyphenatedCustoms;

impl FilenameRule for HyphenatedCustoms {
    fn name(&self) -> &'static str {
        "customs-hyphenated"
    }

    fn try_match(&self, filename: &str) -> Option<String> {
        let cap = CUSTOMS_HYPHEN.captures(filename)?;
        Some(format!("{}-{}-{}M", &cap[2], &cap[3], &cap[4]))
    }
}

/// `1234567890123M`, reformatted into the hyphenated form.
pub struct PlainCustoms;

impl FilenameRule for PlainCustoms {
    fn name(&self) -> &'static str {
        "customs-plain"
    }

    fn try_match(&self, filename: &str) -> Option<String> {
        let cap = CUSTOMS_PLAIN.captures(filename)?;
        Some(canonical_customs(&cap[2]))
    }
}

/// An explicit `BL` marker followed by the code.
pub struct ExplicitBlMarker;

impl FilenameRule for ExplicitBlMarker {
    fn name(&self) -> &'static str {
        "bl-marker"
    }

    fn try_match(&self, filename: &str) -> Option<String> {
        let stem = strip_extension(filename);
        BL_MARKER
            .captures(stem)
            .map(|cap| cap[1].to_uppercase())
    }
}

/// Longest separator-delimited token containing both a letter and a digit.
pub struct MixedToken;

impl FilenameRule for MixedToken {
    fn name(&self) -> &'static str {
        "bl-mixed-token"
    }

    fn try_match(&self, filename: &str) -> Option<String> {
        longest_token(filename, |t| {
            t.chars().any(|c| c.is_ascii_alphabetic()) && t.chars().any(|c| c.is_ascii_digit())
        })
    }
}

/// Longest separator-delimited token made only of digits.
pub struct NumericToken;

impl FilenameRule for NumericToken {
    fn name(&self) -> &'static str {
        "bl-numeric-token"
    }

    fn try_match(&self, filename: &str) -> Option<String> {
        longest_token(filename, |t| t.chars().all(|c| c.is_ascii_digit()))
    }
}

pub static CUSTOMS_RULES: [&dyn FilenameRule; 2] = [&HyphenatedCustoms, &PlainCustoms];

pub static BL_RULES: [&dyn FilenameRule; 3] = [&ExplicitBlMarker, &MixedToken, &NumericToken];

// ---------------------------------------------------------------------------
// Public extractors
// ---------------------------------------------------------------------------

pub fn extract_customs(filename: &str) -> Option<String> {
    first_match(&CUSTOMS_RULES, filename)
}

pub fn extract_bl(filename: &str) -> Option<String> {
    first_match(&BL_RULES, filename)
}

/// Leading 2-3 letter document code, e.g. `IMP` in `IMP_12345.pdf`.
pub fn document_prefix(filename: &str) -> String {
    PREFIX
        .captures(strip_extension(filename))
        .map(|cap| cap[1].to_string())
        .unwrap_or_else(|| OTHER_PREFIX.to_string())
}

/// True when the whole stem is a customs number.
pub fn is_customs_only_name(filename: &str) -> bool {
    let stem = strip_extension(filename).trim();
    !stem.is_empty() && CUSTOMS_ONLY.is_match(stem)
}

/// Payment-confirmation documents carry the `PC_` prefix.
pub fn is_pc_filename(filename: &str) -> bool {
    filename
        .get(..3)
        .is_some_and(|p| p.eq_ignore_ascii_case("PC_"))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn canonical_customs(digits: &str) -> String {
    format!("{}-{}-{}M", &digits[..5], &digits[5..7], &digits[7..13])
}

fn strip_extension(filename: &str) -> &str {
    match EXTENSION.find(filename) {
        Some(m) => &filename[..m.start()],
        None => filename,
    }
}

/// Stem with the first customs number of each form removed, so the
/// customs digits are never picked up as a BL code.
fn without_customs(filename: &str) -> String {
    let mut cleaned = strip_extension(filename).to_string();
    for re in [&*CUSTOMS_HYPHEN, &*CUSTOMS_PLAIN] {
        if let Some(range) = re.captures(&cleaned).and_then(|c| c.get(1)).map(|m| m.range()) {
            cleaned.replace_range(range, "");
        }
    }
    cleaned
}

fn longest_token(filename: &str, accept: impl Fn(&str) -> bool) -> Option<String> {
    let cleaned = without_customs(filename);
    let mut best: Option<&str> = None;
    for token in SEPARATORS.split(&cleaned).filter(|t| !t.is_empty()) {
        let len = token.chars().count();
        if !(MIN_BL_LEN..=MAX_BL_LEN).contains(&len) || !accept(token) {
            continue;
        }
        // strictly longer only: ties keep the first occurrence
        if best.is_none_or(|b| len > b.chars().count()) {
            best = Some(token);
        }
    }
    best.map(str::to_uppercase)
}
