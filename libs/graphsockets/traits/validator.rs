use crate::graphql::document::Document;
use crate::graphql::response::Location;
use crate::graphql::schema::Schema;
use std::fmt;

/// Parsing and validation collaborator
///
/// Invoked synchronously before a subscription or plain query is dispatched,
/// unless the request has validation disabled. `parse` failures and a
/// non-empty `validate` result both surface to the caller as
/// [`ValidationErrors`]; no frame is sent in that case.
pub trait QueryValidator: Send + Sync {
    /// Parse query text into a document
    fn parse(&self, query: &str) -> Result<Document, ValidationError>;

    /// Validate a parsed document against a schema; empty means valid
    fn validate(&self, schema: &Schema, document: &Document) -> Vec<ValidationError>;
}

/// A single client-side validation failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub message: String,
    pub locations: Vec<Location>,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: Vec::new(),
        }
    }

    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.locations.push(Location { line, column });
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(location) = self.locations.first() {
            write!(f, "\n\nGraphQL request:{}:{}", location.line, location.column)?;
        }
        Ok(())
    }
}

/// All validation failures for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl ValidationErrors {
    pub fn errors(&self) -> &[ValidationError] {
        &self.0
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Query validation failed")?;
        for error in &self.0 {
            write!(f, "\n{}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}
