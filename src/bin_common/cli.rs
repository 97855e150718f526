//! CLI utilities for binaries
//!
//! Handles configuration path lookup and the small argument grammar shared
//! by `gql-query` and `gql-subscribe`.

use anyhow::{anyhow, bail, Context, Result};
use graphsockets::{GraphQLRequest, QueryMethod};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Environment variable naming the settings file
pub const CONFIG_ENV_VAR: &str = "GRAPHWIRE_CONFIG";

pub const DEFAULT_CONFIG_PATH: &str = "config/client.yaml";

/// Load configuration path from environment or use default
pub fn load_config_from_env() -> PathBuf {
    std::env::var(CONFIG_ENV_VAR)
        .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
        .into()
}

/// Parse command line arguments for a binary
///
/// Returns a vector of arguments (excluding the program name)
pub fn parse_args() -> Vec<String> {
    std::env::args().skip(1).collect()
}

/// Arguments shared by the binaries
///
/// ```text
/// <query | @file> [--config PATH] [--var NAME=VALUE]... [--operation NAME]
///                 [--method post|get] [--header NAME=VALUE]... [--no-validate]
/// ```
///
/// Variable values are parsed as JSON and fall back to plain strings.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub query: String,
    pub config: Option<PathBuf>,
    pub variables: Map<String, Value>,
    pub operation: Option<String>,
    pub method: Option<QueryMethod>,
    pub headers: Vec<(String, String)>,
    pub validate: bool,
}

impl CliArgs {
    pub fn parse(args: &[String]) -> Result<Self> {
        let mut parsed = CliArgs {
            validate: true,
            ..Default::default()
        };
        let mut query = None;
        let mut iter = args.iter();

        while let Some(arg) = iter.next() {
            let mut value = |flag: &str| {
                iter.next()
                    .cloned()
                    .ok_or_else(|| anyhow!("{} expects a value", flag))
            };
            match arg.as_str() {
                "--config" => parsed.config = Some(value("--config")?.into()),
                "--operation" => parsed.operation = Some(value("--operation")?),
                "--method" => parsed.method = Some(value("--method")?.parse()?),
                "--var" => {
                    let (name, raw) = split_pair(&value("--var")?)?;
                    let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
                    parsed.variables.insert(name, value);
                }
                "--header" => parsed.headers.push(split_pair(&value("--header")?)?),
                "--no-validate" => parsed.validate = false,
                flag if flag.starts_with("--") => bail!("unknown option {}", flag),
                positional => {
                    if query.is_some() {
                        bail!("unexpected argument {}", positional);
                    }
                    query = Some(positional.to_string());
                }
            }
        }

        let query = query.ok_or_else(|| anyhow!("missing query (text or @file)"))?;
        parsed.query = match query.strip_prefix('@') {
            Some(path) => std::fs::read_to_string(path).with_context(|| format!("reading query from {}", path))?,
            None => query,
        };
        Ok(parsed)
    }

    /// Request described by these arguments
    pub fn request(&self) -> GraphQLRequest {
        let mut request = GraphQLRequest::new(self.query.clone())
            .with_variables(self.variables.clone())
            .with_validate(self.validate);
        if let Some(operation) = &self.operation {
            request = request.with_operation(operation.clone());
        }
        for (name, value) in &self.headers {
            request = request.with_header(name.clone(), value.clone());
        }
        request
    }

    /// Settings file: `--config` first, then the environment
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(load_config_from_env)
    }
}

fn split_pair(raw: &str) -> Result<(String, String)> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected NAME=VALUE, got '{}'", raw))?;
    if name.is_empty() {
        bail!("expected NAME=VALUE, got '{}'", raw);
    }
    Ok((name.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_full() {
        let parsed = CliArgs::parse(&args(&[
            "query Find($id: Int) { pokemon(id: $id) { name } }",
            "--var",
            "id=25",
            "--var",
            "name=Pikachu",
            "--operation",
            "Find",
            "--method",
            "GET",
            "--header",
            "X-Trace=abc",
            "--no-validate",
        ]))
        .unwrap();

        assert_eq!(parsed.variables["id"], json!(25));
        assert_eq!(parsed.variables["name"], json!("Pikachu"));
        assert_eq!(parsed.method, Some(QueryMethod::Get));
        assert_eq!(parsed.headers, vec![("X-Trace".to_string(), "abc".to_string())]);
        assert!(!parsed.validate);

        let request = parsed.request();
        assert_eq!(request.operation(), Some("Find"));
        assert_eq!(request.headers()["X-Trace"], "abc");
        assert!(!request.validate());
    }

    #[test]
    fn test_parse_errors() {
        assert!(CliArgs::parse(&args(&[])).is_err());
        assert!(CliArgs::parse(&args(&["{ a }", "{ b }"])).is_err());
        assert!(CliArgs::parse(&args(&["{ a }", "--var"])).is_err());
        assert!(CliArgs::parse(&args(&["{ a }", "--var", "novalue"])).is_err());
        assert!(CliArgs::parse(&args(&["{ a }", "--method", "put"])).is_err());
        assert!(CliArgs::parse(&args(&["{ a }", "--verbose"])).is_err());
    }

    #[test]
    fn test_config_flag_wins() {
        let parsed = CliArgs::parse(&args(&["{ a }", "--config", "other.yaml"])).unwrap();
        assert_eq!(parsed.config_path(), PathBuf::from("other.yaml"));
    }
}
