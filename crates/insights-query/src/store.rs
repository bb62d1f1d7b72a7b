//! Document persistence

use std::collections::BTreeMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{doctype} '{name}' not found")]
    NotFound { doctype: String, name: String },

    #[error("Store lock poisoned")]
    Poisoned,
}

/// A named record with free-form fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub doctype: String,
    pub name: String,
    #[serde(default)]
    pub fields: Map<String, JsonValue>,
}

impl Document {
    pub fn new(doctype: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            doctype: doctype.into(),
            name: name.into(),
            fields: Map::new(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&JsonValue> {
        self.fields.get(field).filter(|v| !v.is_null())
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(JsonValue::as_str)
    }

    /// Check fields are stored as 0/1 as often as booleans
    pub fn get_bool(&self, field: &str) -> bool {
        match self.get(field) {
            Some(JsonValue::Bool(b)) => *b,
            Some(JsonValue::Number(n)) => n.as_i64().is_some_and(|n| n != 0),
            _ => false,
        }
    }

    pub fn set(&mut self, field: &str, value: impl Into<JsonValue>) {
        self.fields.insert(field.to_string(), value.into());
    }
}

pub trait DocumentStore {
    fn get(&self, doctype: &str, name: &str) -> Result<Document, StoreError>;

    /// Insert or replace; returns the stored document
    fn save(&self, document: Document) -> Result<Document, StoreError>;

    /// Blank, unsaved document with a fresh name
    fn new_document(&self, doctype: &str) -> Document {
        Document::new(doctype, Uuid::new_v4().to_string())
    }

    fn list(&self, doctype: &str) -> Result<Vec<Document>, StoreError>;
}

/// Process-local store
#[derive(Debug, Default)]
pub struct InMemoryStore {
    documents: RwLock<BTreeMap<(String, String), Document>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for InMemoryStore {
    fn get(&self, doctype: &str, name: &str) -> Result<Document, StoreError> {
        let documents = self.documents.read().map_err(|_| StoreError::Poisoned)?;
        documents
            .get(&(doctype.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                doctype: doctype.to_string(),
                name: name.to_string(),
            })
    }

    fn save(&self, document: Document) -> Result<Document, StoreError> {
        let mut documents = self.documents.write().map_err(|_| StoreError::Poisoned)?;
        documents.insert((document.doctype.clone(), document.name.clone()), document.clone());
        Ok(document)
    }

    fn list(&self, doctype: &str) -> Result<Vec<Document>, StoreError> {
        let documents = self.documents.read().map_err(|_| StoreError::Poisoned)?;
        Ok(documents
            .values()
            .filter(|doc| doc.doctype == doctype)
            .cloned()
            .collect())
    }
}
