//! Plain-text rendering of admin API responses.

use serde_json::Value;

/// How results are written to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    Json,
}

/// String form of a JSON field, `-` when absent or null.
pub fn field(value: &Value, key: &str) -> String {
    match value.get(key) {
        None | Some(Value::Null) => "-".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Render rows as left-aligned columns under a header.
pub fn table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }
    let line = |cells: Vec<&str>| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, &w)| format!("{cell:<w$}"))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };
    let mut out = vec![line(headers.to_vec())];
    for row in rows {
        out.push(line(row.iter().map(String::as_str).collect()));
    }
    out.join("\n")
}

pub fn print(format: Format, value: &Value, text: impl FnOnce(&Value) -> String) {
    match format {
        Format::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            );
        }
        Format::Text => println!("{}", text(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn field_handles_missing_and_numbers() {
        let v = json!({"a": "x", "b": 3, "c": null});
        assert_eq!(field(&v, "a"), "x");
        assert_eq!(field(&v, "b"), "3");
        assert_eq!(field(&v, "c"), "-");
        assert_eq!(field(&v, "d"), "-");
    }

    #[test]
    fn table_aligns_columns() {
        let out = table(
            &["ID", "STATUS"],
            &[vec!["abc".into(), "paid".into()], vec!["a".into(), "failed".into()]],
        );
        assert_eq!(out, "ID   STATUS\nabc  paid\na    failed");
    }
}
