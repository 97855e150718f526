//! Query documents and the default validator
//!
//! The parser is structural: it reads operations, fragments and selection
//! sets, and skips over argument values, variable definitions and
//! directives without interpreting them. That is enough to check root
//! fields against a [`Schema`] before anything goes on the wire.

use super::response::Location;
use super::schema::Schema;
use crate::traits::{QueryValidator, ValidationError};
use std::collections::{HashMap, HashSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
            OperationKind::Subscription => "subscription",
        }
    }

    fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "query" => Some(OperationKind::Query),
            "mutation" => Some(OperationKind::Mutation),
            "subscription" => Some(OperationKind::Subscription),
            _ => None,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub alias: Option<String>,
    pub name: String,
    pub selections: Vec<Selection>,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Field(Field),
    FragmentSpread {
        name: String,
        location: Location,
    },
    InlineFragment {
        type_condition: Option<String>,
        selections: Vec<Selection>,
        location: Location,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationDefinition {
    pub kind: OperationKind,
    pub name: Option<String>,
    pub selections: Vec<Selection>,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FragmentDefinition {
    pub name: String,
    pub type_condition: String,
    pub selections: Vec<Selection>,
    pub location: Location,
}

/// A parsed query document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub operations: Vec<OperationDefinition>,
    pub fragments: Vec<FragmentDefinition>,
}

impl Document {
    /// Parse query text
    pub fn parse(source: &str) -> Result<Self, ValidationError> {
        Parser::new(source)?.document()
    }

    /// Operation by name, or the only operation when `name` is `None`
    pub fn operation(&self, name: Option<&str>) -> Option<&OperationDefinition> {
        match name {
            Some(name) => self
                .operations
                .iter()
                .find(|op| op.name.as_deref() == Some(name)),
            None if self.operations.len() == 1 => self.operations.first(),
            None => None,
        }
    }

    pub fn fragment(&self, name: &str) -> Option<&FragmentDefinition> {
        self.fragments.iter().find(|f| f.name == name)
    }
}

// ============================================================================
// Lexer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Name(String),
    Punct(char),
    Spread,
    Literal,
    End,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Name(name) => write!(f, "Name \"{}\"", name),
            Token::Punct(c) => write!(f, "\"{}\"", c),
            Token::Spread => f.write_str("\"...\""),
            Token::Literal => f.write_str("literal"),
            Token::End => f.write_str("<EOF>"),
        }
    }
}

fn syntax_error(message: impl fmt::Display, location: Location) -> ValidationError {
    ValidationError::new(format!("Syntax Error: {}", message)).at(location.line, location.column)
}

fn tokenize(source: &str) -> Result<Vec<(Token, Location)>, ValidationError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let (mut i, mut line, mut line_start) = (0usize, 1u32, 0usize);

    while i < chars.len() {
        let c = chars[i];
        let location = Location {
            line,
            column: (i - line_start + 1) as u32,
        };

        match c {
            '\n' => {
                i += 1;
                line += 1;
                line_start = i;
            }
            ' ' | '\t' | '\r' | ',' | '\u{feff}' => i += 1,
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '{' | '}' | '(' | ')' | '[' | ']' | ':' | '=' | '@' | '$' | '!' | '&' | '|' => {
                tokens.push((Token::Punct(c), location));
                i += 1;
            }
            '.' => {
                if chars.get(i + 1) == Some(&'.') && chars.get(i + 2) == Some(&'.') {
                    tokens.push((Token::Spread, location));
                    i += 3;
                } else {
                    return Err(syntax_error("Unexpected \".\".", location));
                }
            }
            '"' => {
                let block = chars.get(i + 1) == Some(&'"') && chars.get(i + 2) == Some(&'"');
                if block {
                    i += 3;
                    loop {
                        match chars.get(i) {
                            None => return Err(syntax_error("Unterminated string.", location)),
                            Some('"') if chars.get(i + 1) == Some(&'"') && chars.get(i + 2) == Some(&'"') => {
                                i += 3;
                                break;
                            }
                            Some('\n') => {
                                i += 1;
                                line += 1;
                                line_start = i;
                            }
                            Some(_) => i += 1,
                        }
                    }
                } else {
                    i += 1;
                    loop {
                        match chars.get(i) {
                            None | Some('\n') => return Err(syntax_error("Unterminated string.", location)),
                            Some('\\') => i += 2,
                            Some('"') => {
                                i += 1;
                                break;
                            }
                            Some(_) => i += 1,
                        }
                    }
                }
                tokens.push((Token::Literal, location));
            }
            c if c == '-' || c.is_ascii_digit() => {
                i += 1;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || matches!(chars[i], '.' | '+' | '-'))
                {
                    i += 1;
                }
                tokens.push((Token::Literal, location));
            }
            c if c == '_' || c.is_ascii_alphabetic() => {
                let start = i;
                while i < chars.len() && (chars[i] == '_' || chars[i].is_ascii_alphanumeric()) {
                    i += 1;
                }
                tokens.push((Token::Name(chars[start..i].iter().collect()), location));
            }
            other => {
                return Err(syntax_error(format!("Unexpected character \"{}\".", other), location));
            }
        }
    }

    let end = Location {
        line,
        column: (chars.len() - line_start + 1) as u32,
    };
    tokens.push((Token::End, end));
    Ok(tokens)
}

// ============================================================================
// Parser
// ============================================================================

struct Parser {
    tokens: Vec<(Token, Location)>,
    pos: usize,
}

impl Parser {
    fn new(source: &str) -> Result<Self, ValidationError> {
        Ok(Self {
            tokens: tokenize(source)?,
            pos: 0,
        })
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].0
    }

    fn location(&self) -> Location {
        self.tokens[self.pos.min(self.tokens.len() - 1)].1
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn unexpected(&self) -> ValidationError {
        syntax_error(format!("Unexpected {}.", self.peek()), self.location())
    }

    fn at_punct(&self, c: char) -> bool {
        *self.peek() == Token::Punct(c)
    }

    fn expect_punct(&mut self, c: char) -> Result<(), ValidationError> {
        if self.at_punct(c) {
            self.advance();
            Ok(())
        } else {
            Err(syntax_error(
                format!("Expected \"{}\", found {}.", c, self.peek()),
                self.location(),
            ))
        }
    }

    fn name(&mut self) -> Result<String, ValidationError> {
        match self.peek().clone() {
            Token::Name(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(syntax_error(
                format!("Expected Name, found {}.", other),
                self.location(),
            )),
        }
    }

    fn keyword(&mut self, word: &str) -> Result<(), ValidationError> {
        match self.peek() {
            Token::Name(name) if name == word => {
                self.advance();
                Ok(())
            }
            other => Err(syntax_error(
                format!("Expected \"{}\", found {}.", word, other),
                self.location(),
            )),
        }
    }

    /// Skip a bracketed group without interpreting it
    fn skip_group(&mut self, open: char, close: char) -> Result<(), ValidationError> {
        let start = self.location();
        self.expect_punct(open)?;
        let mut depth = 1usize;
        while depth > 0 {
            match self.advance() {
                Token::Punct(c) if c == open => depth += 1,
                Token::Punct(c) if c == close => depth -= 1,
                Token::End => return Err(syntax_error(format!("Unclosed \"{}\".", open), start)),
                _ => {}
            }
        }
        Ok(())
    }

    fn directives(&mut self) -> Result<(), ValidationError> {
        while self.at_punct('@') {
            self.advance();
            self.name()?;
            if self.at_punct('(') {
                self.skip_group('(', ')')?;
            }
        }
        Ok(())
    }

    fn document(mut self) -> Result<Document, ValidationError> {
        let mut document = Document::default();
        if *self.peek() == Token::End {
            return Err(self.unexpected());
        }

        while *self.peek() != Token::End {
            let location = self.location();
            match self.peek().clone() {
                Token::Punct('{') => document.operations.push(OperationDefinition {
                    kind: OperationKind::Query,
                    name: None,
                    selections: self.selection_set()?,
                    location,
                }),
                Token::Name(word) if word == "fragment" => {
                    document.fragments.push(self.fragment_definition()?);
                }
                Token::Name(word) => match OperationKind::from_keyword(&word) {
                    Some(kind) => document.operations.push(self.operation_definition(kind)?),
                    None => return Err(self.unexpected()),
                },
                _ => return Err(self.unexpected()),
            }
        }

        Ok(document)
    }

    fn operation_definition(&mut self, kind: OperationKind) -> Result<OperationDefinition, ValidationError> {
        let location = self.location();
        self.advance();
        let name = match self.peek() {
            Token::Name(_) => Some(self.name()?),
            _ => None,
        };
        if self.at_punct('(') {
            self.skip_group('(', ')')?;
        }
        self.directives()?;
        Ok(OperationDefinition {
            kind,
            name,
            selections: self.selection_set()?,
            location,
        })
    }

    fn fragment_definition(&mut self) -> Result<FragmentDefinition, ValidationError> {
        let location = self.location();
        self.keyword("fragment")?;
        let name = self.name()?;
        if name == "on" {
            return Err(syntax_error("Unexpected Name \"on\".", location));
        }
        self.keyword("on")?;
        let type_condition = self.name()?;
        self.directives()?;
        Ok(FragmentDefinition {
            name,
            type_condition,
            selections: self.selection_set()?,
            location,
        })
    }

    fn selection_set(&mut self) -> Result<Vec<Selection>, ValidationError> {
        self.expect_punct('{')?;
        let mut selections = Vec::new();
        while !self.at_punct('}') {
            selections.push(self.selection()?);
        }
        self.advance();
        if selections.is_empty() {
            return Err(syntax_error("Expected Name, found \"}\".", self.location()));
        }
        Ok(selections)
    }

    fn selection(&mut self) -> Result<Selection, ValidationError> {
        let location = self.location();
        if *self.peek() == Token::Spread {
            self.advance();
            return match self.peek().clone() {
                Token::Name(name) if name != "on" => {
                    self.advance();
                    self.directives()?;
                    Ok(Selection::FragmentSpread { name, location })
                }
                _ => {
                    let type_condition = if matches!(self.peek(), Token::Name(n) if n == "on") {
                        self.advance();
                        Some(self.name()?)
                    } else {
                        None
                    };
                    self.directives()?;
                    Ok(Selection::InlineFragment {
                        type_condition,
                        selections: self.selection_set()?,
                        location,
                    })
                }
            };
        }

        let first = self.name()?;
        let (alias, name) = if self.at_punct(':') {
            self.advance();
            (Some(first), self.name()?)
        } else {
            (None, first)
        };
        if self.at_punct('(') {
            self.skip_group('(', ')')?;
        }
        self.directives()?;
        let selections = if self.at_punct('{') {
            self.selection_set()?
        } else {
            Vec::new()
        };

        Ok(Selection::Field(Field {
            alias,
            name,
            selections,
            location,
        }))
    }
}

// ============================================================================
// Validator
// ============================================================================

/// Default [`QueryValidator`]
///
/// Checks operation naming, fragment references, that the schema defines
/// the root type of every operation, that each root field exists on it, and
/// that subscriptions select exactly one root field.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentValidator;

impl DocumentValidator {
    pub fn new() -> Self {
        Self
    }

    /// Root fields of a selection set, with fragments expanded
    fn root_fields<'a>(
        document: &'a Document,
        selections: &'a [Selection],
        visited: &mut HashSet<&'a str>,
        errors: &mut Vec<ValidationError>,
        out: &mut Vec<&'a Field>,
    ) {
        for selection in selections {
            match selection {
                Selection::Field(field) => out.push(field),
                Selection::InlineFragment { selections, .. } => {
                    Self::root_fields(document, selections, visited, errors, out)
                }
                Selection::FragmentSpread { name, location } => match document.fragment(name) {
                    Some(fragment) => {
                        if visited.insert(fragment.name.as_str()) {
                            Self::root_fields(document, &fragment.selections, visited, errors, out);
                        }
                    }
                    None => errors.push(
                        ValidationError::new(format!("Unknown fragment '{}'.", name))
                            .at(location.line, location.column),
                    ),
                },
            }
        }
    }
}

impl QueryValidator for DocumentValidator {
    fn parse(&self, query: &str) -> Result<Document, ValidationError> {
        Document::parse(query)
    }

    fn validate(&self, schema: &Schema, document: &Document) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if document.operations.is_empty() {
            errors.push(ValidationError::new("Document contains no operation."));
        }

        let anonymous = document.operations.iter().filter(|op| op.name.is_none()).count();
        if anonymous > 0 && document.operations.len() > 1 {
            for op in document.operations.iter().filter(|op| op.name.is_none()) {
                errors.push(
                    ValidationError::new("This anonymous operation must be the only defined operation.")
                        .at(op.location.line, op.location.column),
                );
            }
        }

        let mut seen: HashMap<&str, Location> = HashMap::new();
        for op in &document.operations {
            if let Some(ref name) = op.name {
                if let Some(first) = seen.insert(name.as_str(), op.location) {
                    errors.push(
                        ValidationError::new(format!("There can be only one operation named '{}'.", name))
                            .at(first.line, first.column)
                            .at(op.location.line, op.location.column),
                    );
                }
            }
        }

        for op in &document.operations {
            let Some(root) = schema.root_type(op.kind) else {
                errors.push(
                    ValidationError::new(format!("Schema is not configured for {}s.", op.kind))
                        .at(op.location.line, op.location.column),
                );
                continue;
            };

            let mut fields = Vec::new();
            Self::root_fields(document, &op.selections, &mut HashSet::new(), &mut errors, &mut fields);

            if op.kind == OperationKind::Subscription {
                let distinct: HashSet<&str> = fields
                    .iter()
                    .map(|f| f.alias.as_deref().unwrap_or(&f.name))
                    .collect();
                if distinct.len() != 1 {
                    let message = match op.name {
                        Some(ref name) => format!("Subscription '{}' must select only one top level field.", name),
                        None => "Anonymous Subscription must select only one top level field.".to_string(),
                    };
                    errors.push(ValidationError::new(message).at(op.location.line, op.location.column));
                }
            }

            for field in fields {
                if field.name == "__typename" {
                    continue;
                }
                if op.kind == OperationKind::Query && (field.name == "__schema" || field.name == "__type") {
                    continue;
                }
                if !root.has_field(&field.name) {
                    errors.push(
                        ValidationError::new(format!(
                            "Cannot query field '{}' on type '{}'.",
                            field.name, root.name
                        ))
                        .at(field.location.line, field.location.column),
                    );
                }
            }
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::new()
            .with_root(OperationKind::Query, "Query", &["pokemon", "pokemons"])
            .with_root(OperationKind::Subscription, "Subscription", &["messageAdded", "ticks"])
    }

    fn validate(query: &str) -> Vec<ValidationError> {
        let validator = DocumentValidator::new();
        let document = validator.parse(query).unwrap();
        validator.validate(&schema(), &document)
    }

    #[test]
    fn test_parse_operations_and_fragments() {
        let document = Document::parse(
            r#"
            # leading comment
            query Pokemons($first: Int = 10) @cached(ttl: 5) {
              all: pokemons(first: $first, filter: {name: "pika\"chu", tags: ["a", "b"]}) {
                ...Basic
                ... on Pokemon { weight { minimum } }
              }
            }
            fragment Basic on Pokemon { id name }
            "#,
        )
        .unwrap();

        assert_eq!(document.operations.len(), 1);
        assert_eq!(document.fragments.len(), 1);

        let op = document.operation(Some("Pokemons")).unwrap();
        assert_eq!(op.kind, OperationKind::Query);
        assert_eq!(op.location, Location { line: 3, column: 13 });

        let Selection::Field(ref field) = op.selections[0] else {
            panic!("expected field");
        };
        assert_eq!(field.alias.as_deref(), Some("all"));
        assert_eq!(field.name, "pokemons");
        assert!(matches!(field.selections[0], Selection::FragmentSpread { ref name, .. } if name == "Basic"));
        assert!(matches!(
            field.selections[1],
            Selection::InlineFragment { type_condition: Some(ref t), .. } if t == "Pokemon"
        ));
        assert_eq!(document.fragment("Basic").unwrap().type_condition, "Pokemon");
    }

    #[test]
    fn test_shorthand_query() {
        let document = Document::parse("{ pokemon(name: \"Pikachu\") { id } }").unwrap();
        assert_eq!(document.operations[0].kind, OperationKind::Query);
        assert!(document.operation(None).is_some());
    }

    #[test]
    fn test_syntax_errors_carry_location() {
        let error = Document::parse("query {\n  pokemon(\n").unwrap_err();
        assert!(error.message.starts_with("Syntax Error"));
        assert_eq!(error.locations[0], Location { line: 2, column: 10 });

        assert!(Document::parse("").is_err());
        assert!(Document::parse("{ }").is_err());
        assert!(Document::parse("query { a } }").is_err());
        assert!(Document::parse("{ a(b: \"open) }").is_err());
    }

    #[test]
    fn test_valid_documents() {
        assert!(validate("{ pokemons { id } }").is_empty());
        assert!(validate("subscription { messageAdded { id } }").is_empty());
        assert!(validate("query { __typename __schema { types { name } } }").is_empty());
        assert!(validate("subscription S { ...F } fragment F on Subscription { ticks }").is_empty());
    }

    #[test]
    fn test_unknown_root_field() {
        let errors = validate("query {\n  pokemon { id }\n  digimon { id }\n}");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "Cannot query field 'digimon' on type 'Query'.");
        assert_eq!(errors[0].locations, vec![Location { line: 3, column: 3 }]);
    }

    #[test]
    fn test_missing_root_type() {
        let errors = validate("mutation { addPokemon { id } }");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "Schema is not configured for mutations.");
    }

    #[test]
    fn test_subscription_single_root_field() {
        let errors = validate("subscription { messageAdded { id } ticks }");
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].message,
            "Anonymous Subscription must select only one top level field."
        );

        let errors = validate("subscription Both { ...F ticks } fragment F on Subscription { messageAdded }");
        assert_eq!(errors[0].message, "Subscription 'Both' must select only one top level field.");
    }

    #[test]
    fn test_operation_naming_and_fragments() {
        let errors = validate("query A { pokemon { id } } query A { pokemons { id } }");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].locations.len(), 2);

        let errors = validate("{ pokemon { id } } query B { pokemons { id } }");
        assert_eq!(errors.len(), 1);

        let errors = validate("{ ...Missing }");
        assert_eq!(errors[0].message, "Unknown fragment 'Missing'.");
    }
}
