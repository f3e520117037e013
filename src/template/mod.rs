//! Safe string templates.
//!
//! Two constructs are recognised:
//!
//! - `{{include path}}` pastes the file at `path` into the source before
//!   parsing. Included text is not scanned for further includes. A file that
//!   cannot be read leaves the text `<path> Read Error` in its place.
//! - `${data.path}` substitutes a value from the render data. Only property
//!   paths rooted at `data` are accepted (`data.user.name`, `data.items[0]`,
//!   `data["key"]`, `data.items.length`); nothing is ever evaluated.
//!
//! `\${` produces a literal `${`.

mod cache;

pub use cache::{TemplateCache, TemplateConfig};

use serde_json::Value;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name every expression must start from.
const ROOT: &str = "data";

/// Template errors.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to read template {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("template parse error at byte {offset}: {message}")]
    Parse { offset: usize, message: String },
}

impl TemplateError {
    fn parse(offset: usize, message: impl Into<String>) -> Self {
        TemplateError::Parse {
            offset,
            message: message.into(),
        }
    }
}

/// One step of a property path.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Field(String),
    Index(usize),
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Node {
    Text(String),
    Value(Vec<Segment>),
}

/// A parsed template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Template {
    nodes: Vec<Node>,
}

impl Template {
    /// Parse template source. Includes are not expanded.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut nodes = Vec::new();
        let mut text = String::new();
        let mut rest = source;
        let mut offset = 0;

        while let Some(pos) = rest.find("${") {
            if rest[..pos].ends_with('\\') {
                text.push_str(&rest[..pos - 1]);
                text.push_str("${");
                rest = &rest[pos + 2..];
                offset += pos + 2;
                continue;
            }

            text.push_str(&rest[..pos]);
            let expr_start = offset + pos + 2;
            let after = &rest[pos + 2..];
            let close = after
                .find('}')
                .ok_or_else(|| TemplateError::parse(offset + pos, "unterminated `${`"))?;

            if !text.is_empty() {
                nodes.push(Node::Text(std::mem::take(&mut text)));
            }
            nodes.push(Node::Value(parse_path(&after[..close], expr_start)?));

            rest = &after[close + 1..];
            offset = expr_start + close + 1;
        }

        text.push_str(rest);
        if !text.is_empty() {
            nodes.push(Node::Text(text));
        }
        Ok(Self { nodes })
    }

    /// Read, expand includes and parse the template at `path`.
    ///
    /// Relative include paths resolve against `include_root` when given,
    /// otherwise against the working directory.
    pub fn load(path: &Path, include_root: Option<&Path>) -> Result<Self, TemplateError> {
        let source = fs::read_to_string(path).map_err(|source| TemplateError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&expand_includes(&source, include_root))
    }

    /// Render against `data`.
    pub fn render(&self, data: &Value) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Value(path) => {
                    if let Some(value) = resolve(data, path) {
                        write_value(&mut out, &value);
                    }
                }
            }
        }
        out
    }
}

/// Replace every `{{include path}}` with the contents of `path`.
pub fn expand_includes(source: &str, include_root: Option<&Path>) -> String {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;

    while let Some(pos) = rest.find("{{") {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 2..];

        match parse_include(after) {
            Some((target, consumed)) => {
                let path = match include_root {
                    Some(root) => root.join(target),
                    None => PathBuf::from(target),
                };
                match fs::read_to_string(&path) {
                    Ok(contents) => out.push_str(&contents),
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "template include failed"
                        );
                        out.push_str(target);
                        out.push_str(" Read Error");
                    }
                }
                rest = &after[consumed..];
            }
            None => {
                out.push_str("{{");
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

/// Match `include <path>}}` at the start of `s`, returning the path and the
/// number of bytes consumed.
fn parse_include(s: &str) -> Option<(&str, usize)> {
    const DIRECTIVE: &str = "include ";
    let head = s.get(..DIRECTIVE.len())?;
    if !head.eq_ignore_ascii_case(DIRECTIVE) {
        return None;
    }

    let body = &s[DIRECTIVE.len()..];
    let close = body.find("}}")?;
    let target = &body[..close];
    if target.is_empty() || target.chars().any(char::is_whitespace) {
        return None;
    }
    Some((target, DIRECTIVE.len() + close + 2))
}

/// Parse `data(.field|[n]|["key"])*`.
fn parse_path(expr: &str, offset: usize) -> Result<Vec<Segment>, TemplateError> {
    let trimmed = expr.trim_start();
    let base = offset + (expr.len() - trimmed.len());
    let s = trimmed.trim_end();

    let (root, mut pos) = identifier(s, 0)
        .ok_or_else(|| TemplateError::parse(base, "expected a property path"))?;
    if root != ROOT {
        return Err(TemplateError::parse(
            base,
            format!("unknown name `{root}`, expressions must start with `{ROOT}`"),
        ));
    }

    let bytes = s.as_bytes();
    let mut segments = Vec::new();
    while pos < s.len() {
        match bytes[pos] {
            b'.' => {
                let (name, next) = identifier(s, pos + 1)
                    .ok_or_else(|| TemplateError::parse(base + pos + 1, "expected a field name"))?;
                segments.push(Segment::Field(name.to_string()));
                pos = next;
            }
            b'[' => {
                let close = s[pos..]
                    .find(']')
                    .map(|i| pos + i)
                    .ok_or_else(|| TemplateError::parse(base + pos, "unterminated `[`"))?;
                segments.push(subscript(&s[pos + 1..close], base + pos + 1)?);
                pos = close + 1;
            }
            _ => {
                return Err(TemplateError::parse(
                    base + pos,
                    "only property paths are supported",
                ))
            }
        }
    }
    Ok(segments)
}

/// Read an identifier starting at `start`, returning it and the end offset.
fn identifier(s: &str, start: usize) -> Option<(&str, usize)> {
    let rest = s.get(start..)?;
    let mut end = 0;
    for (i, c) in rest.char_indices() {
        let ok = if i == 0 {
            c.is_ascii_alphabetic() || c == '_' || c == '$'
        } else {
            c.is_ascii_alphanumeric() || c == '_' || c == '$'
        };
        if !ok {
            break;
        }
        end = i + c.len_utf8();
    }
    (end > 0).then(|| (&rest[..end], start + end))
}

fn subscript(inner: &str, offset: usize) -> Result<Segment, TemplateError> {
    let inner = inner.trim();
    let quoted = inner.len() >= 2
        && ((inner.starts_with('"') && inner.ends_with('"'))
            || (inner.starts_with('\'') && inner.ends_with('\'')));
    if quoted {
        return Ok(Segment::Field(inner[1..inner.len() - 1].to_string()));
    }
    inner
        .parse::<usize>()
        .map(Segment::Index)
        .map_err(|_| TemplateError::parse(offset, "subscript must be an index or a quoted key"))
}

fn resolve(data: &Value, path: &[Segment]) -> Option<Value> {
    let mut current = data;
    for (i, segment) in path.iter().enumerate() {
        let last = i + 1 == path.len();
        current = match (segment, current) {
            (Segment::Field(name), Value::Object(map)) => map.get(name)?,
            (Segment::Index(n), Value::Array(items)) => items.get(*n)?,
            (Segment::Index(n), Value::Object(map)) => map.get(&n.to_string())?,
            (Segment::Field(name), Value::Array(items)) if name == "length" && last => {
                return Some(Value::from(items.len()));
            }
            (Segment::Field(name), Value::String(s)) if name == "length" && last => {
                return Some(Value::from(s.chars().count()));
            }
            _ => return None,
        };
    }
    Some(current.clone())
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => {}
        Value::String(s) => out.push_str(s),
        Value::Bool(_) | Value::Number(_) | Value::Array(_) | Value::Object(_) => {
            out.push_str(&value.to_string())
        }
    }
}
