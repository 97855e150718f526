//! Client-side view of a server schema
//!
//! Only what validation needs: the root operation types and the field
//! names of each named type. Built from an introspection result or by hand.

use super::document::OperationKind;
use crate::traits::{GraphSocketError, Result};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A named type and its field names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaType {
    pub name: String,
    pub kind: String,
    pub fields: Vec<String>,
}

impl SchemaType {
    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    query_type: Option<String>,
    mutation_type: Option<String>,
    subscription_type: Option<String>,
    types: HashMap<String, SchemaType>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntrospectionSchema {
    query_type: Option<NamedRef>,
    mutation_type: Option<NamedRef>,
    subscription_type: Option<NamedRef>,
    #[serde(default)]
    types: Vec<IntrospectionType>,
}

#[derive(Deserialize)]
struct NamedRef {
    name: String,
}

#[derive(Deserialize)]
struct IntrospectionType {
    kind: String,
    name: Option<String>,
    #[serde(default)]
    fields: Option<Vec<NamedRef>>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a root operation type together with its fields
    pub fn with_root(mut self, kind: OperationKind, name: &str, fields: &[&str]) -> Self {
        let name = name.to_string();
        match kind {
            OperationKind::Query => self.query_type = Some(name.clone()),
            OperationKind::Mutation => self.mutation_type = Some(name.clone()),
            OperationKind::Subscription => self.subscription_type = Some(name.clone()),
        }
        self.with_type("OBJECT", &name, fields)
    }

    pub fn with_type(mut self, kind: &str, name: &str, fields: &[&str]) -> Self {
        self.types.insert(
            name.to_string(),
            SchemaType {
                name: name.to_string(),
                kind: kind.to_string(),
                fields: fields.iter().map(|f| f.to_string()).collect(),
            },
        );
        self
    }

    /// Build from the `data` of an introspection response
    ///
    /// Accepts either `{"__schema": {...}}` or the inner schema object.
    pub fn from_introspection(data: &Value) -> Result<Self> {
        let inner = data.get("__schema").unwrap_or(data);
        if !inner.is_object() {
            return Err(GraphSocketError::Introspection(
                "introspection result has no __schema object".into(),
            ));
        }

        let raw: IntrospectionSchema = serde_json::from_value(inner.clone())
            .map_err(|e| GraphSocketError::Introspection(e.to_string()))?;
        let Some(query_type) = raw.query_type else {
            return Err(GraphSocketError::Introspection(
                "introspection result has no query type".into(),
            ));
        };

        let types = raw
            .types
            .into_iter()
            .filter_map(|t| {
                let name = t.name?;
                let fields = t
                    .fields
                    .unwrap_or_default()
                    .into_iter()
                    .map(|f| f.name)
                    .collect();
                Some((
                    name.clone(),
                    SchemaType {
                        name,
                        kind: t.kind,
                        fields,
                    },
                ))
            })
            .collect();

        Ok(Self {
            query_type: Some(query_type.name),
            mutation_type: raw.mutation_type.map(|t| t.name),
            subscription_type: raw.subscription_type.map(|t| t.name),
            types,
        })
    }

    /// Root type for an operation kind, if the schema defines one
    pub fn root_type(&self, kind: OperationKind) -> Option<&SchemaType> {
        let name = match kind {
            OperationKind::Query => self.query_type.as_deref(),
            OperationKind::Mutation => self.mutation_type.as_deref(),
            OperationKind::Subscription => self.subscription_type.as_deref(),
        }?;
        self.types.get(name)
    }

    pub fn get_type(&self, name: &str) -> Option<&SchemaType> {
        self.types.get(name)
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }
}

/// Process-lifetime cache of introspected schemas
#[derive(Default)]
pub struct SchemaCache {
    schemas: RwLock<HashMap<String, Arc<Schema>>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Arc<Schema>> {
        self.schemas.read().get(key).cloned()
    }

    pub fn insert(&self, key: String, schema: Schema) -> Arc<Schema> {
        let schema = Arc::new(schema);
        self.schemas.write().insert(key, Arc::clone(&schema));
        schema
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.schemas.write().remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.schemas.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
