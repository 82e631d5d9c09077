//! Document layout matrixization.
//!
//! Converts a document's positioned text boxes into an ordered 2-D grid of
//! normalized strings that approximates visual reading order, and locates a
//! text value's position within that grid.
//!
//! Matrixization policy: boxes that normalize to an empty string are
//! filtered out before row grouping, and each row keeps the anchor `cy` it
//! was created with even as later boxes join it. The anchor drift this
//! allows on slanted layouts is tolerated, not corrected.

use crate::config::LayoutConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

static WHITESPACE_RUNS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("Whitespace run regex pattern is valid and should compile"));

/// Normalize raw box text: collapse whitespace runs to single spaces, trim,
/// lowercase. The same rule is applied to lookup queries so that cached
/// values compare against matrix cells byte-for-byte.
pub fn normalize_text(raw: &str) -> String {
    WHITESPACE_RUNS.replace_all(raw.trim(), " ").to_lowercase()
}

/// A horizontal text box with its bounding rectangle in layout units.
///
/// The document source collaborator produces these; non-horizontal content
/// never reaches this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    pub text: String,
}

impl TextBox {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64, text: impl Into<String>) -> Self {
        Self {
            x0,
            y0,
            x1,
            y1,
            text: text.into(),
        }
    }

    fn center(&self) -> (f64, f64) {
        ((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }

    /// Malformed geometry (NaN/infinite coordinates or inverted rectangles)
    /// excludes the box from matrixization rather than aborting the document.
    fn has_valid_geometry(&self) -> bool {
        [self.x0, self.y0, self.x1, self.y1].iter().all(|c| c.is_finite())
            && self.x1 >= self.x0
            && self.y1 >= self.y0
    }
}

/// Location of a value inside a [`Matrix`].
///
/// `Row` means the value spans an entire row (or was matched by fuzzy
/// whole-row comparison); `Cell` means it occupies exactly one grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Position {
    Row(usize),
    Cell(usize, usize),
}

/// Ordered grid of normalized strings reflecting a document's visual
/// reading order. Built once per document; immutable afterwards. The fuzzy
/// lookup parameters are captured at build time so that every later
/// [`Matrix::locate`] call uses the thresholds the grid was built with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    rows: Vec<Vec<String>>,
    fuzzy_ratio: f64,
    fuzzy_min_row_len: usize,
}

struct RowCluster {
    anchor_cy: f64,
    members: Vec<(f64, String)>,
}

impl Matrix {
    /// Build the grid from positioned text boxes.
    ///
    /// Boxes are normalized, empties and malformed geometry dropped, then
    /// clustered into rows by a greedy single pass over boxes in descending
    /// `cy` order: each box joins the first existing row whose anchor is
    /// within `row_tolerance` of the box's center, otherwise it opens a new
    /// row anchored at its own `cy`. Because input is processed top-down,
    /// row creation order is top-to-bottom. Within a row, members are sorted
    /// left to right.
    pub fn build(boxes: &[TextBox], config: &LayoutConfig) -> Self {
        let mut items: Vec<(f64, f64, String)> = boxes
            .iter()
            .filter(|b| b.has_valid_geometry())
            .filter_map(|b| {
                let text = normalize_text(&b.text);
                if text.is_empty() {
                    return None;
                }
                let (cx, cy) = b.center();
                Some((cx, cy, text))
            })
            .collect();

        // Descending cy: top of the page first.
        items.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        let mut clusters: Vec<RowCluster> = Vec::new();
        for (cx, cy, text) in items {
            match clusters
                .iter_mut()
                .find(|row| (row.anchor_cy - cy).abs() < config.row_tolerance)
            {
                Some(row) => row.members.push((cx, text)),
                None => clusters.push(RowCluster {
                    anchor_cy: cy,
                    members: vec![(cx, text)],
                }),
            }
        }

        let rows = clusters
            .into_iter()
            .map(|mut row| {
                row.members
                    .sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
                row.members.into_iter().map(|(_, text)| text).collect()
            })
            .collect();

        Self {
            rows,
            fuzzy_ratio: config.fuzzy_ratio,
            fuzzy_min_row_len: config.fuzzy_min_row_len,
        }
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Resolve the value stored at `position`, joining cells with spaces for
    /// whole-row positions. `None` when the position falls outside the grid.
    pub fn value_at(&self, position: Position) -> Option<String> {
        match position {
            Position::Row(row) => self.rows.get(row).map(|cells| cells.join(" ")),
            Position::Cell(row, col) => self.rows.get(row)?.get(col).cloned(),
        }
    }

    /// Locate `query` in the grid.
    ///
    /// Rows are scanned top to bottom. For each row the whole-row checks run
    /// before any cell check: exact equality against the space-joined row
    /// text, then, for rows longer than `fuzzy_min_row_len` characters, a
    /// normalized Levenshtein ratio below `fuzzy_ratio`. Only then are the
    /// row's cells compared for exact equality, left to right. The first
    /// match in this order wins; there is no ranking among candidates.
    pub fn locate(&self, query: &str) -> Option<Position> {
        let query = normalize_text(query);
        if query.is_empty() {
            return None;
        }

        for (row_index, cells) in self.rows.iter().enumerate() {
            let row_text = cells.join(" ");

            if row_text == query {
                return Some(Position::Row(row_index));
            }

            if row_text.chars().count() > self.fuzzy_min_row_len
                && edit_ratio(&row_text, &query) < self.fuzzy_ratio
            {
                return Some(Position::Row(row_index));
            }

            for (col_index, cell) in cells.iter().enumerate() {
                if *cell == query {
                    return Some(Position::Cell(row_index, col_index));
                }
            }
        }

        None
    }
}

/// Levenshtein distance normalized by the longer operand's length.
fn edit_ratio(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 0.0;
    }
    strsim::levenshtein(a, b) as f64 / longest as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_config() -> LayoutConfig {
        LayoutConfig::default()
    }

    fn box_at(cx: f64, cy: f64, text: &str) -> TextBox {
        TextBox::new(cx - 5.0, cy - 5.0, cx + 5.0, cy + 5.0, text)
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Total \t Amount\nDue  "), "total amount due");
        assert_eq!(normalize_text(""), "");
        assert_eq!(normalize_text("   "), "");
    }

    #[test]
    fn test_build_single_row() {
        let boxes = vec![box_at(10.0, 100.0, "Total"), box_at(50.0, 100.0, "100.00")];
        let matrix = Matrix::build(&boxes, &default_config());

        assert_eq!(matrix.rows(), &[vec!["total".to_string(), "100.00".to_string()]]);
    }

    #[test]
    fn test_build_rows_top_to_bottom() {
        // Larger cy is higher on the page.
        let boxes = vec![
            box_at(10.0, 50.0, "footer"),
            box_at(10.0, 200.0, "header"),
            box_at(10.0, 120.0, "body"),
        ];
        let matrix = Matrix::build(&boxes, &default_config());

        assert_eq!(
            matrix.rows(),
            &[
                vec!["header".to_string()],
                vec!["body".to_string()],
                vec!["footer".to_string()]
            ]
        );
    }

    #[test]
    fn test_build_clusters_within_tolerance() {
        let boxes = vec![
            box_at(10.0, 100.0, "left"),
            box_at(80.0, 110.0, "right"),
            box_at(10.0, 60.0, "below"),
        ];
        let matrix = Matrix::build(&boxes, &default_config());

        assert_eq!(matrix.row_count(), 2);
        assert_eq!(matrix.rows()[0], vec!["left".to_string(), "right".to_string()]);
        assert_eq!(matrix.rows()[1], vec!["below".to_string()]);
    }

    #[test]
    fn test_build_anchor_not_recomputed() {
        // 110 anchors the first row; 95 joins it (|110-95| < 20) and does not
        // move the anchor, so 78 (|110-78| >= 20) opens a second row even
        // though it is within 20 of the late member at 95.
        let boxes = vec![
            box_at(10.0, 110.0, "a"),
            box_at(40.0, 95.0, "b"),
            box_at(70.0, 78.0, "c"),
        ];
        let matrix = Matrix::build(&boxes, &default_config());

        assert_eq!(matrix.row_count(), 2);
        assert_eq!(matrix.rows()[0], vec!["a".to_string(), "b".to_string()]);
        assert_eq!(matrix.rows()[1], vec!["c".to_string()]);
    }

    #[test]
    fn test_build_sorts_members_left_to_right() {
        let boxes = vec![
            box_at(90.0, 100.0, "third"),
            box_at(10.0, 100.0, "first"),
            box_at(50.0, 100.0, "second"),
        ];
        let matrix = Matrix::build(&boxes, &default_config());

        assert_eq!(
            matrix.rows()[0],
            vec!["first".to_string(), "second".to_string(), "third".to_string()]
        );
    }

    #[test]
    fn test_build_filters_empty_and_malformed() {
        let boxes = vec![
            box_at(10.0, 100.0, "kept"),
            box_at(50.0, 100.0, "   "),
            TextBox::new(f64::NAN, 95.0, 20.0, 105.0, "bad geometry"),
            TextBox::new(30.0, 105.0, 20.0, 95.0, "inverted"),
        ];
        let matrix = Matrix::build(&boxes, &default_config());

        assert_eq!(matrix.rows(), &[vec!["kept".to_string()]]);
    }

    #[test]
    fn test_build_empty_input() {
        let matrix = Matrix::build(&[], &default_config());
        assert!(matrix.is_empty());
    }

    #[test]
    fn test_locate_exact_cell() {
        let boxes = vec![box_at(10.0, 100.0, "total"), box_at(50.0, 100.0, "100.00")];
        let matrix = Matrix::build(&boxes, &default_config());

        assert_eq!(matrix.locate("100.00"), Some(Position::Cell(0, 1)));
        assert_eq!(matrix.locate("Total"), Some(Position::Cell(0, 0)));
    }

    #[test]
    fn test_locate_exact_row() {
        let boxes = vec![box_at(10.0, 100.0, "due")];
        let matrix = Matrix::build(&boxes, &default_config());

        // A single-cell row matches the whole-row check first.
        assert_eq!(matrix.locate("due"), Some(Position::Row(0)));
    }

    #[test]
    fn test_locate_row_match_wins_over_cell() {
        let boxes = vec![box_at(10.0, 100.0, "total amount"), box_at(60.0, 100.0, "due")];
        let matrix = Matrix::build(&boxes, &default_config());

        assert_eq!(
            matrix.locate("total amount due"),
            Some(Position::Row(0))
        );
        assert_eq!(matrix.locate("due"), Some(Position::Cell(0, 1)));
    }

    #[test]
    fn test_locate_fuzzy_row() {
        let boxes = vec![
            box_at(10.0, 100.0, "total amount due"),
            box_at(80.0, 100.0, "100.00"),
        ];
        let matrix = Matrix::build(&boxes, &default_config());

        // Joined row is "total amount due 100.00" (23 chars); 2 edits is
        // under the 15% ratio, 6 edits is over it.
        assert_eq!(
            matrix.locate("total amount dve 100.0"),
            Some(Position::Row(0))
        );
        assert_eq!(matrix.locate("total amount xxxxxx 100.00"), None);
    }

    #[test]
    fn test_locate_fuzzy_skipped_for_short_rows() {
        let boxes = vec![box_at(10.0, 100.0, "total")];
        let matrix = Matrix::build(&boxes, &default_config());

        // One edit away but the row is only 5 chars, below the fuzzy floor.
        assert_eq!(matrix.locate("totol"), None);
    }

    #[test]
    fn test_locate_not_found_and_empty_query() {
        let boxes = vec![box_at(10.0, 100.0, "total")];
        let matrix = Matrix::build(&boxes, &default_config());

        assert_eq!(matrix.locate("missing"), None);
        assert_eq!(matrix.locate(""), None);
        assert_eq!(matrix.locate("  "), None);
    }

    #[test]
    fn test_value_at() {
        let boxes = vec![box_at(10.0, 100.0, "total"), box_at(50.0, 100.0, "100.00")];
        let matrix = Matrix::build(&boxes, &default_config());

        assert_eq!(matrix.value_at(Position::Cell(0, 1)), Some("100.00".to_string()));
        assert_eq!(matrix.value_at(Position::Row(0)), Some("total 100.00".to_string()));
        assert_eq!(matrix.value_at(Position::Cell(0, 9)), None);
        assert_eq!(matrix.value_at(Position::Row(7)), None);
    }

    #[test]
    fn test_edit_ratio() {
        assert_eq!(edit_ratio("abc", "abc"), 0.0);
        assert_eq!(edit_ratio("", ""), 0.0);
        assert!((edit_ratio("abcd", "abce") - 0.25).abs() < f64::EPSILON);
    }
}
