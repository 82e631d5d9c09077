//! Prompt rendering for the extraction oracle.
//!
//! The matrix is rendered one row per line (`Row N: cell | cell | ...`) so
//! the model sees something close to the document's visual arrangement, and
//! the requested fields are rendered as a YAML document with per-field
//! descriptions and example values.

use super::OracleRequest;
use crate::error::{PrefillError, Result};
use crate::layout::Matrix;

const EXTRACTION_PROMPT: &str = r#"# Task
Return a JSON object, and only a JSON object, filling in the fields requested
by the YAML below, based on the document content. The document content is
given as a structured matrix representation that mirrors its visual layout.

# Extraction instructions
- Extract only information explicitly present in the document.
- Do not infer or invent values that are not present.
- Use the field descriptions in the YAML to guide the extraction; when a
  field lists possible values, do not ignore them.
- Use any example values in the YAML to recognize patterns, but never copy an
  example unless it actually appears in the document.
- Fill a field only if its name, or a clearly corresponding abbreviation, is
  present in the document text. When in doubt, prefer null.
- Use null for absent fields, never empty strings.

# Requested fields (YAML)
{request_yaml}

# Structured document content (matrix)
{document_matrix}

Begin."#;

/// Render the matrix as indexed, pipe-separated rows.
pub(super) fn render_matrix(matrix: &Matrix) -> String {
    matrix
        .rows()
        .iter()
        .enumerate()
        .map(|(i, row)| format!("Row {}: {}", i + 1, row.join(" | ")))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render the full extraction prompt for `request`.
pub fn render_prompt(request: &OracleRequest) -> Result<String> {
    let request_yaml = serde_yaml_ng::to_string(&request.fields)
        .map_err(|e| PrefillError::serialization_with_source("Failed to render request YAML", e))?;

    Ok(EXTRACTION_PROMPT
        .replace("{request_yaml}", request_yaml.trim_end())
        .replace("{document_matrix}", &render_matrix(&request.matrix))
        .trim()
        .to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayoutConfig;
    use crate::layout::TextBox;
    use crate::oracle::FieldSpec;
    use std::collections::BTreeMap;

    fn sample_matrix() -> Matrix {
        let boxes = vec![
            TextBox::new(0.0, 95.0, 10.0, 105.0, "Total"),
            TextBox::new(50.0, 95.0, 60.0, 105.0, "100.00"),
            TextBox::new(0.0, 15.0, 10.0, 25.0, "Thanks"),
        ];
        Matrix::build(&boxes, &LayoutConfig::default())
    }

    #[test]
    fn test_render_matrix_rows() {
        let rendered = render_matrix(&sample_matrix());
        assert_eq!(rendered, "Row 1: total | 100.00\nRow 2: thanks");
    }

    #[test]
    fn test_render_prompt_includes_fields_and_matrix() {
        let mut fields = BTreeMap::new();
        fields.insert(
            "total".to_string(),
            FieldSpec {
                description: "Invoice total amount".to_string(),
                examples: vec!["90.00".to_string()],
            },
        );
        let request = OracleRequest {
            label: "invoice".to_string(),
            fields,
            matrix: sample_matrix(),
        };

        let prompt = render_prompt(&request).unwrap();
        assert!(prompt.contains("total:"));
        assert!(prompt.contains("Invoice total amount"));
        assert!(prompt.contains("90.00"));
        assert!(prompt.contains("Row 1: total | 100.00"));
        assert!(!prompt.contains("{request_yaml}"));
        assert!(!prompt.contains("{document_matrix}"));
    }
}
