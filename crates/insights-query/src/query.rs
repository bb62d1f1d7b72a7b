//! The stored query record

use insights_ir::Pipeline;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use crate::{Document, QueryError};

pub const QUERY_DOCTYPE: &str = "Insights Query v3";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: String,
    pub workbook: String,
    /// Inline array or JSON text, as in stored records
    #[serde(default, rename = "operations", deserialize_with = "pipeline_text_or_array")]
    pub pipeline: Pipeline,
    /// Derived from `pipeline`; see [`Query::set_linked_queries`]
    #[serde(default)]
    pub linked_queries: Vec<String>,
    #[serde(default)]
    pub use_live_connection: bool,
}

fn pipeline_text_or_array<'de, D>(deserializer: D) -> Result<Pipeline, D::Error>
where
    D: Deserializer<'de>,
{
    match JsonValue::deserialize(deserializer)? {
        JsonValue::String(text) => Pipeline::parse(&text),
        value => Pipeline::from_value(value),
    }
    .map_err(serde::de::Error::custom)
}

impl Query {
    pub fn new(name: impl Into<String>, workbook: impl Into<String>, pipeline: Pipeline) -> Self {
        let mut query = Self {
            name: name.into(),
            workbook: workbook.into(),
            pipeline,
            ..Default::default()
        };
        query.set_linked_queries();
        query
    }

    pub fn set_linked_queries(&mut self) {
        self.linked_queries = self.pipeline.referenced_queries();
    }

    /// Decode a stored record. `operations` and `linked_queries` may be JSON
    /// text or inline arrays.
    pub fn from_document(doc: &Document) -> Result<Self, QueryError> {
        let invalid = |reason: &str| QueryError::InvalidRecord {
            name: doc.name.clone(),
            reason: reason.to_string(),
        };

        let workbook = doc
            .get_str("workbook")
            .filter(|w| !w.is_empty())
            .ok_or_else(|| invalid("workbook is required"))?;

        let pipeline = match doc.get("operations") {
            None => Ok(Pipeline::default()),
            Some(JsonValue::String(text)) => Pipeline::parse(text),
            Some(value) => Pipeline::from_value(value.clone()),
        }
        .map_err(|e| QueryError::MalformedPipeline {
            reason: e.to_string(),
            query: Some(doc.name.clone()),
            operation_index: None,
        })?;

        let linked_queries = match doc.get("linked_queries") {
            None => Ok(Vec::new()),
            Some(JsonValue::String(text)) if text.trim().is_empty() => Ok(Vec::new()),
            Some(JsonValue::String(text)) => serde_json::from_str(text),
            Some(value) => serde_json::from_value(value.clone()),
        }
        .map_err(|_| invalid("linked_queries must be a list of query names"))?;

        Ok(Self {
            name: doc.name.clone(),
            title: doc.get_str("title").unwrap_or_default().to_string(),
            workbook: workbook.to_string(),
            pipeline,
            linked_queries,
            use_live_connection: doc.get_bool("use_live_connection"),
        })
    }

    pub fn to_document(&self) -> Result<Document, QueryError> {
        let operations = self.pipeline.to_json().map_err(|e| QueryError::MalformedPipeline {
            reason: e.to_string(),
            query: Some(self.name.clone()),
            operation_index: None,
        })?;

        let mut doc = Document::new(QUERY_DOCTYPE, self.name.clone());
        doc.set("title", self.title.clone());
        doc.set("workbook", self.workbook.clone());
        doc.set("operations", operations);
        doc.set("linked_queries", JsonValue::from(self.linked_queries.clone()).to_string());
        doc.set("use_live_connection", self.use_live_connection);
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insights_ir::{Operation, TableRef};
    use serde_json::json;

    #[test]
    fn test_document_round_trip() {
        let query = Query::new(
            "q1",
            "wb",
            Pipeline::new(vec![
                Operation::Source {
                    table: TableRef::query("base"),
                },
                Operation::Limit { limit: 10 },
            ]),
        );
        assert_eq!(query.linked_queries, vec!["base"]);

        let doc = query.to_document().unwrap();
        assert!(doc.get("operations").unwrap().is_string());
        assert_eq!(doc.get_str("linked_queries"), Some("[\"base\"]"));
        assert_eq!(Query::from_document(&doc).unwrap(), query);
    }

    #[test]
    fn test_request_body_accepts_operations_as_text() {
        let inline: Query = serde_json::from_value(json!({
            "workbook": "wb",
            "operations": [{"type": "limit", "limit": 5}]
        }))
        .unwrap();
        let text: Query = serde_json::from_value(json!({
            "workbook": "wb",
            "operations": "[{\"type\": \"limit\", \"limit\": 5}]"
        }))
        .unwrap();
        assert_eq!(inline.pipeline, text.pipeline);
        assert_eq!(text.pipeline.len(), 1);

        let bad = serde_json::from_value::<Query>(json!({"workbook": "wb", "operations": "[{"}));
        assert!(bad.is_err());
    }

    #[test]
    fn test_inline_operations_accepted() {
        let mut doc = Document::new(QUERY_DOCTYPE, "q2");
        doc.set("workbook", "wb");
        doc.set(
            "operations",
            json!([{"type": "source", "table": {"type": "table", "table_name": "orders"}}]),
        );
        doc.set("use_live_connection", 1);
        let query = Query::from_document(&doc).unwrap();
        assert_eq!(query.pipeline.len(), 1);
        assert!(query.use_live_connection);
        assert!(query.linked_queries.is_empty());
    }

    #[test]
    fn test_malformed_operations() {
        let mut doc = Document::new(QUERY_DOCTYPE, "q3");
        doc.set("workbook", "wb");
        doc.set("operations", "[{\"type\": \"teleport\"}]");
        assert!(matches!(
            Query::from_document(&doc),
            Err(QueryError::MalformedPipeline { query: Some(q), .. }) if q == "q3"
        ));
    }

    #[test]
    fn test_workbook_required() {
        let doc = Document::new(QUERY_DOCTYPE, "q4");
        assert!(matches!(Query::from_document(&doc), Err(QueryError::InvalidRecord { .. })));
    }
}
