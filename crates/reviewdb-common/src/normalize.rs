//! Normalization helpers applied to raw review fields
//!
//! - Review dates arrive as `"M D, YYYY"` (e.g. `"07 9, 2012"`) and are
//!   turned into calendar dates (`2012-07-09`).
//! - The product category of a file is derived from its name: everything
//!   before the last underscore of the file name (`data/Video_Games_5.json`
//!   -> `Video_Games`).

use chrono::NaiveDate;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

use crate::error::{Result, ReviewDbError};

/// Input layout of the raw review date
pub const SOURCE_DATE_FORMAT: &str = "%m %d, %Y";

/// Canonical calendar-date layout
pub const CANONICAL_DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a raw review date.
///
/// `None` and blank input map to `Ok(None)`; text that does not match
/// [`SOURCE_DATE_FORMAT`] is a parse error the caller is expected to
/// recover from.
pub fn normalize_review_date(raw: Option<&str>) -> Result<Option<NaiveDate>> {
    let raw = match raw.map(str::trim) {
        Some(value) if !value.is_empty() => value,
        _ => return Ok(None),
    };

    NaiveDate::parse_from_str(raw, SOURCE_DATE_FORMAT)
        .map(Some)
        .map_err(|e| ReviewDbError::Parse(format!("invalid review date '{}': {}", raw, e)))
}

/// Same as [`normalize_review_date`] but rendered as `YYYY-MM-DD`
pub fn format_review_date(raw: Option<&str>) -> Result<Option<String>> {
    Ok(normalize_review_date(raw)?.map(|date| date.format(CANONICAL_DATE_FORMAT).to_string()))
}

/// `<Category>_<size>.json`: everything before the last underscore
static SIZE_SUFFIX: LazyLock<std::result::Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^(.+)_[^_]*$"));

/// Derive the product category label from a source file path
pub fn extract_product_type(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let display = path.display().to_string();

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| ReviewDbError::invalid_source(&display, "missing UTF-8 file name"))?;

    let pattern = SIZE_SUFFIX
        .as_ref()
        .map_err(|e| ReviewDbError::Parse(e.to_string()))?;

    let label = match pattern.captures(file_name) {
        Some(captures) => captures.get(1).map(|m| m.as_str().to_string()),
        // No size suffix: fall back to the bare stem
        None => path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .map(str::to_string),
    };

    match label {
        Some(label) if !label.trim().is_empty() => Ok(label),
        _ => Err(ReviewDbError::invalid_source(
            display,
            "cannot derive a product category from the file name",
        )),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_single_digit_day() {
        let date = normalize_review_date(Some("07 9, 2012")).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2012, 7, 9));
        assert_eq!(
            format_review_date(Some("07 9, 2012")).unwrap().as_deref(),
            Some("2012-07-09")
        );
    }

    #[test]
    fn test_normalize_two_digit_day() {
        assert_eq!(
            format_review_date(Some("12 31, 1999")).unwrap().as_deref(),
            Some("1999-12-31")
        );
    }

    #[test]
    fn test_normalize_absent_date() {
        assert_eq!(normalize_review_date(None).unwrap(), None);
        assert_eq!(normalize_review_date(Some("   ")).unwrap(), None);
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert!(normalize_review_date(Some("yesterday")).is_err());
        assert!(normalize_review_date(Some("13 1, 2012")).is_err());
        assert!(normalize_review_date(Some("2012-07-09")).is_err());
    }

    #[test]
    fn test_extract_product_type() {
        assert_eq!(
            extract_product_type("data/Video_Games_5.json").unwrap(),
            "Video_Games"
        );
        assert_eq!(
            extract_product_type("/srv/raw/Toys_and_Games_5.json").unwrap(),
            "Toys_and_Games"
        );
        assert_eq!(
            extract_product_type("Digital_Music_5.json").unwrap(),
            "Digital_Music"
        );
    }

    #[test]
    fn test_size_suffix_pattern_is_shared() {
        let first = SIZE_SUFFIX.as_ref().unwrap() as *const Regex;
        for _ in 0..3 {
            extract_product_type("data/Video_Games_5.json").unwrap();
        }
        assert!(std::ptr::eq(first, SIZE_SUFFIX.as_ref().unwrap()));
    }

    #[test]
    fn test_extract_product_type_without_suffix() {
        assert_eq!(extract_product_type("data/Books.json").unwrap(), "Books");
    }

    #[test]
    fn test_extract_product_type_invalid() {
        assert!(extract_product_type("/").is_err());
        assert!(extract_product_type("").is_err());
        assert!(extract_product_type("data/..").is_err());
    }
}
