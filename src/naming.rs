// src/naming.rs

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use time::OffsetDateTime;
use time::macros::format_description;

/// Customs value used when a group has no customs number or conflicting ones.
pub const UNCLASSIFIED: &str = "미분류";

/// BL value used when a group has no BL code or conflicting ones.
pub const UNCONFIRMED: &str = "미확인";

/// Fallback stem for labels that sanitise to nothing.
pub const DEFAULT_STEM: &str = "merged";

pub const PDF_EXT: &str = "pdf";

static UNSAFE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[\\/:*?"<>|]"#).expect("valid unsafe-char regex"));

/// Fixed-width `YYMMDD_HHMMSS` capture of a merge start time.
pub fn format_timestamp(at: OffsetDateTime) -> String {
    let fmt = format_description!("[year repr:last_two][month][day]_[hour][minute][second]");
    // The description only contains numeric components, formatting cannot fail
    // for any representable date.
    at.format(&fmt).unwrap_or_else(|_| "000000_000000".to_string())
}

/// Local wall-clock time, or UTC when the local offset is unavailable.
pub fn now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

/// `<customs with '-' replaced by '_'>_<timestamp>.pdf`
pub fn merged_filename(customs: &str, timestamp: &str) -> String {
    format!("{}_{timestamp}.{PDF_EXT}", customs_stem(customs))
}

fn customs_stem(customs: &str) -> String {
    safe_label(&customs.replace('-', "_"))
}

/// Replace characters that are not allowed in file names on common platforms.
pub fn safe_label(name: &str) -> String {
    let cleaned = UNSAFE_CHARS.replace_all(name, "_");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        DEFAULT_STEM.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Split `name.ext` into `("name", Some("ext"))`. Leading dots are part of the stem.
pub fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < name.len() => (&name[..idx], Some(&name[idx + 1..])),
        _ => (name, None),
    }
}

/// Candidate name for the `attempt`-th upload collision: `a.pdf`, `a (1).pdf`, `a (2).pdf`, ...
pub fn upload_candidate(name: &str, attempt: usize) -> String {
    if attempt == 0 {
        return name.to_string();
    }
    match split_extension(name) {
        (stem, Some(ext)) => format!("{stem} ({attempt}).{ext}"),
        (stem, None) => format!("{stem} ({attempt})"),
    }
}

/// Tracks the names already handed out within one batch so no two outputs collide.
#[derive(Debug, Default)]
pub struct BatchNames {
    taken: HashSet<String>,
}

impl BatchNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a unique output name for a group.
    ///
    /// The base is the usual merged name. On collision the confirmed BL code is
    /// tried between the customs stem and the timestamp, then a `_<n>` counter
    /// is appended before the extension.
    pub fn assign(&mut self, customs: &str, bl: &str, timestamp: &str) -> String {
        let base = merged_filename(customs, timestamp);
        if self.taken.insert(base.clone()) {
            return base;
        }

        if bl != UNCONFIRMED && !bl.is_empty() {
            let with_bl = format!(
                "{}_{}_{timestamp}.{PDF_EXT}",
                customs_stem(customs),
                safe_label(bl)
            );
            if self.taken.insert(with_bl.clone()) {
                return with_bl;
            }
        }

        let (stem, _) = split_extension(&base);
        let stem = stem.to_string();
        let mut n = 2;
        loop {
            let candidate = format!("{stem}_{n}.{PDF_EXT}");
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.taken.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_timestamp_is_fixed_width() {
        let ts = format_timestamp(datetime!(2026-03-05 07:08:09 UTC));
        assert_eq!(ts, "260305_070809");
        assert_eq!(ts.len(), 13);
    }

    #[test]
    fn test_merged_filename_replaces_hyphens() {
        assert_eq!(
            merged_filename("12345-67-890123M", "260305_070809"),
            "12345_67_890123M_260305_070809.pdf"
        );
        assert_eq!(
            merged_filename(UNCLASSIFIED, "260305_070809"),
            "미분류_260305_070809.pdf"
        );
    }

    #[test]
    fn test_safe_label() {
        assert_eq!(safe_label("a/b:c*d"), "a_b_c_d");
        assert_eq!(safe_label("   "), DEFAULT_STEM);
        assert_eq!(safe_label(" 수입 "), "수입");
    }

    #[test]
    fn test_upload_candidates() {
        assert_eq!(upload_candidate("IMP_1.pdf", 0), "IMP_1.pdf");
        assert_eq!(upload_candidate("IMP_1.pdf", 1), "IMP_1 (1).pdf");
        assert_eq!(upload_candidate("IMP_1.pdf", 3), "IMP_1 (3).pdf");
        assert_eq!(upload_candidate("README", 2), "README (2)");
        assert_eq!(upload_candidate(".hidden", 1), ".hidden (1)");
    }

    #[test]
    fn test_batch_names_never_collide_within_same_second() {
        let mut names = BatchNames::new();
        let ts = "260305_070809";
        let a = names.assign("12345-67-890123M", "ABC123456", ts);
        let b = names.assign("12345-67-890123M", "ABC123456", ts);
        let c = names.assign("12345-67-890123M", "ABC123456", ts);
        let d = names.assign("12345-67-890123M", UNCONFIRMED, ts);

        assert_eq!(a, "12345_67_890123M_260305_070809.pdf");
        assert_eq!(b, "12345_67_890123M_ABC123456_260305_070809.pdf");
        assert_eq!(c, "12345_67_890123M_260305_070809_2.pdf");
        assert_eq!(d, "12345_67_890123M_260305_070809_3.pdf");
        assert_eq!(names.len(), 4);
    }
}
