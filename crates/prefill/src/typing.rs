//! Value type resolution.
//!
//! Classifies a string into one of an ordered set of semantic kinds. The
//! heuristic cache uses the resolved kind to corroborate that a cached
//! position still yields the expected sort of value before trusting it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Semantic kind of an extracted value, ordered by resolution priority.
///
/// `Text` is the universal fallback: every non-empty value resolves to
/// something, and only empty/absent values resolve to nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Number,
    Date,
    Text,
}

/// Day-first formats are tried before month-first so that ambiguous dates
/// such as 05/03/2024 classify consistently; any successful parse counts.
const DATE_FORMATS: &[&str] = &[
    "%d/%m/%Y", "%d/%m/%y", "%d-%m-%Y", "%d-%m-%y", "%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%m/%d/%y",
    "%m-%d-%Y", "%m-%d-%y",
];

/// Resolve the kind of `value`.
///
/// Returns `None` only for values that are empty after trimming. Otherwise
/// the predicates run in fixed priority order: number, date, text.
pub fn resolve(value: &str) -> Option<ValueKind> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if is_number(value) {
        Some(ValueKind::Number)
    } else if is_date(value) {
        Some(ValueKind::Date)
    } else {
        Some(ValueKind::Text)
    }
}

/// A value is numeric when, after removing at most one comma, all spaces and
/// at most one decimal point, only digits remain (and at least one digit).
fn is_number(value: &str) -> bool {
    let mut digits = 0usize;
    let mut commas = 0usize;
    let mut points = 0usize;

    for c in value.chars() {
        match c {
            '0'..='9' => digits += 1,
            ' ' => {}
            ',' => {
                commas += 1;
                if commas > 1 {
                    return false;
                }
            }
            '.' => {
                points += 1;
                if points > 1 {
                    return false;
                }
            }
            _ => return false,
        }
    }

    digits > 0
}

fn is_date(value: &str) -> bool {
    DATE_FORMATS
        .iter()
        .any(|fmt| NaiveDate::parse_from_str(value, fmt).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_empty_is_none() {
        assert_eq!(resolve(""), None);
        assert_eq!(resolve("   "), None);
    }

    #[test]
    fn test_resolve_numbers() {
        assert_eq!(resolve("123"), Some(ValueKind::Number));
        assert_eq!(resolve("123,456.78"), Some(ValueKind::Number));
        assert_eq!(resolve("1 234.50"), Some(ValueKind::Number));
        assert_eq!(resolve(".5"), Some(ValueKind::Number));
    }

    #[test]
    fn test_resolve_number_limits() {
        // Two commas, two points, or a stray character demote to text.
        assert_eq!(resolve("1,234,567"), Some(ValueKind::Text));
        assert_eq!(resolve("1.2.3"), Some(ValueKind::Text));
        assert_eq!(resolve("$100"), Some(ValueKind::Text));
        assert_eq!(resolve(",."), Some(ValueKind::Text));
    }

    #[test]
    fn test_resolve_dates() {
        assert_eq!(resolve("15/03/2024"), Some(ValueKind::Date));
        assert_eq!(resolve("15-03-24"), Some(ValueKind::Date));
        assert_eq!(resolve("2024-03-15"), Some(ValueKind::Date));
        assert_eq!(resolve("03/15/2024"), Some(ValueKind::Date));
    }

    #[test]
    fn test_resolve_text_fallback() {
        assert_eq!(resolve("Invoice #A1"), Some(ValueKind::Text));
        assert_eq!(resolve("n/a"), Some(ValueKind::Text));
        assert_eq!(resolve("2024-13-45"), Some(ValueKind::Text));
    }

    #[test]
    fn test_number_beats_date() {
        // All-digit strings are numbers even when a date parse could succeed.
        assert_eq!(resolve("20240315"), Some(ValueKind::Number));
    }

    #[test]
    fn test_value_kind_serde() {
        assert_eq!(serde_json::to_string(&ValueKind::Number).unwrap(), "\"number\"");
        assert_eq!(
            serde_json::from_str::<ValueKind>("\"date\"").unwrap(),
            ValueKind::Date
        );
    }
}
