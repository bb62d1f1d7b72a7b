//! CSV rendering of result sets (RFC 4180)

use insights_expr::ResultSet;
use serde_json::Value as JsonValue;

pub fn to_csv(result: &ResultSet) -> String {
    let mut out = String::new();
    write_record(&mut out, result.columns.iter().map(String::as_str));
    for row in &result.rows {
        let cells: Vec<String> = row.iter().map(cell_text).collect();
        write_record(&mut out, cells.iter().map(String::as_str));
    }
    out
}

fn cell_text(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn write_record<'a>(out: &mut String, fields: impl Iterator<Item = &'a str>) {
    for (i, field) in fields.enumerate() {
        if i > 0 {
            out.push(',');
        }
        if field.contains(&[',', '"', '\r', '\n'][..]) {
            out.push('"');
            out.push_str(&field.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(field);
        }
    }
    out.push_str("\r\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_quoting_and_nulls() {
        let result = ResultSet {
            columns: vec!["name".to_string(), "note".to_string(), "n".to_string()],
            rows: vec![
                vec![json!("Ada"), json!("said \"hi\", left"), json!(3)],
                vec![json!("Bob"), JsonValue::Null, json!(1.5)],
                vec![json!("Cy"), json!("two\nlines"), json!(true)],
            ],
        };
        assert_eq!(
            to_csv(&result),
            "name,note,n\r\nAda,\"said \"\"hi\"\", left\",3\r\nBob,,1.5\r\nCy,\"two\nlines\",true\r\n"
        );
    }

    #[test]
    fn test_header_only() {
        let result = ResultSet {
            columns: vec!["a".to_string()],
            rows: vec![],
        };
        assert_eq!(to_csv(&result), "a\r\n");
    }
}
