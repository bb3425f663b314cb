//! Metadata line prefixed to every rendered output
//!
//! ```text
//! # cairn: nodes=["10.0.0.1"], endpoints=["10.0.0.1"], templates=["templates/controlplane.yaml"]
//! ```

use std::fmt;

use crate::error::{CoreError, Result};

const PREFIX: &str = "# cairn:";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Modeline {
    pub nodes: Vec<String>,
    pub endpoints: Vec<String>,
    pub templates: Vec<String>,
}

impl Modeline {
    pub fn new(nodes: Vec<String>, endpoints: Vec<String>, templates: Vec<String>) -> Self {
        Self {
            nodes,
            endpoints,
            templates,
        }
    }

    /// Parse a line produced by `Display`
    pub fn parse(line: &str) -> Result<Self> {
        let invalid = |message: String| CoreError::Modeline { message };

        let mut rest = line
            .trim()
            .strip_prefix(PREFIX)
            .ok_or_else(|| invalid(format!("line does not start with '{PREFIX}'")))?
            .trim_start();

        let mut modeline = Modeline::default();
        while !rest.is_empty() {
            let eq = rest
                .find('=')
                .ok_or_else(|| invalid(format!("expected key=value near '{rest}'")))?;
            let key = rest[..eq].trim();
            let after = &rest[eq + 1..];

            let mut stream = serde_json::Deserializer::from_str(after).into_iter::<Vec<String>>();
            let items = match stream.next() {
                Some(Ok(items)) => items,
                Some(Err(e)) => return Err(invalid(format!("invalid list for '{key}': {e}"))),
                None => return Err(invalid(format!("missing list for '{key}'"))),
            };
            let consumed = stream.byte_offset();

            match key {
                "nodes" => modeline.nodes = items,
                "endpoints" => modeline.endpoints = items,
                "templates" => modeline.templates = items,
                other => return Err(invalid(format!("unknown key '{other}'"))),
            }

            rest = after[consumed..].trim_start();
            rest = rest.strip_prefix(',').unwrap_or(rest).trim_start();
        }

        Ok(modeline)
    }
}

impl fmt::Display for Modeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let list = |items: &[String]| serde_json::to_string(items).map_err(|_| fmt::Error);
        write!(
            f,
            "{PREFIX} nodes={}, endpoints={}, templates={}",
            list(&self.nodes)?,
            list(&self.endpoints)?,
            list(&self.templates)?
        )
    }
}
