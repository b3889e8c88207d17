//! Query Template Transform
//!
//! Turns templated query text into a serializable `{query, bindings}` pair
//! so that query-shaped calls can cross the RPC boundary without sending
//! executable fragments. Two input shapes are supported:
//!
//! - **Direct interpolation** via [`sql`]: literal fragments joined with
//!   positional placeholders, one `?` and one binding per interpolated value,
//!   in order.
//! - **Named placeholders** via [`NamedTemplate`]: the literal text contains
//!   `{name}` markers; binding a value map produces the same positional
//!   shape, failing with `MissingParameter` when a referenced name is absent.
//!
//! A pre-built [`Statement`] is the third accepted shape and passes through
//! the call path unchanged. The transform never executes or inspects query
//! text beyond placeholder scanning.
//!
//! # Example
//!
//! ```
//! use wirefall_common::sql::sql;
//! use serde_json::json;
//!
//! let statement = sql(&["SELECT * FROM t WHERE id = ", ""], vec![json!(7)]).unwrap();
//! assert_eq!(statement.query, "SELECT * FROM t WHERE id = ?");
//! assert_eq!(statement.bindings, vec![json!(7)]);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::{Result, WirefallError};

/// A parsed query: positional placeholders in `query`, values in `bindings`,
/// placeholder order matching binding order. Never mutated after parsing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Statement {
    pub query: String,
    pub bindings: Vec<Value>,
}

impl Statement {
    pub fn new(query: impl Into<String>, bindings: Vec<Value>) -> Self {
        Self {
            query: query.into(),
            bindings,
        }
    }
}

/// Direct interpolation: the tagged-template shape.
///
/// `fragments` are the literal text segments and `values` the interpolated
/// values between them, so `fragments.len()` must be `values.len() + 1`.
/// Each value becomes one `?` placeholder and one binding, in order.
pub fn sql(fragments: &[&str], values: Vec<Value>) -> Result<Statement> {
    if fragments.len() != values.len() + 1 {
        return Err(WirefallError::Template(format!(
            "expected {} fragments for {} values, got {}",
            values.len() + 1,
            values.len(),
            fragments.len()
        )));
    }

    let mut query = String::new();
    for (i, fragment) in fragments.iter().enumerate() {
        query.push_str(fragment);
        if i < values.len() {
            query.push('?');
        }
    }

    Ok(Statement::new(query, values))
}

/// A query template with `{name}` markers, parsed once and bindable many
/// times with different value maps.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedTemplate {
    text: String,
    names: Vec<String>,
}

impl NamedTemplate {
    /// Scans the text for `{name}` markers, recording names in occurrence
    /// order. A marker name is a run of alphanumerics and underscores;
    /// braces around anything else are left as literal text.
    pub fn parse(text: impl Into<String>) -> Self {
        let text = text.into();
        let mut names = Vec::new();
        scan_markers(&text, |segment| match segment {
            Segment::Name(name) => names.push(name.to_string()),
            Segment::Literal(_) => {}
        });
        Self { text, names }
    }

    /// The referenced names, in occurrence order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Substitutes every marker with a `?` placeholder and collects bindings
    /// in occurrence order. Fails with `MissingParameter` naming the first
    /// marker absent from the supplied map; no network attempt is made.
    pub fn bind(&self, params: &HashMap<String, Value>) -> Result<Statement> {
        let mut query = String::with_capacity(self.text.len());
        let mut bindings = Vec::with_capacity(self.names.len());
        let mut missing = None;

        scan_markers(&self.text, |segment| match segment {
            Segment::Literal(literal) => query.push_str(literal),
            Segment::Name(name) => match params.get(name) {
                Some(value) => {
                    query.push('?');
                    bindings.push(value.clone());
                }
                None => {
                    if missing.is_none() {
                        missing = Some(name.to_string());
                    }
                }
            },
        });

        if let Some(name) = missing {
            return Err(WirefallError::MissingParameter(name));
        }
        Ok(Statement::new(query, bindings))
    }
}

enum Segment<'a> {
    Literal(&'a str),
    Name(&'a str),
}

/// Walks the template once, emitting literal runs and `{name}` markers.
/// Braces that do not enclose a plain identifier are emitted as literal text.
fn scan_markers<'a>(text: &'a str, mut emit: impl FnMut(Segment<'a>)) {
    let mut rest = text;
    while let Some(open) = rest.find('{') {
        if let Some(close) = rest[open + 1..].find('}') {
            let name = &rest[open + 1..open + 1 + close];
            if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                emit(Segment::Literal(&rest[..open]));
                emit(Segment::Name(name));
                rest = &rest[open + close + 2..];
                continue;
            }
        }
        emit(Segment::Literal(&rest[..open + 1]));
        rest = &rest[open + 1..];
    }
    emit(Segment::Literal(rest));
}
