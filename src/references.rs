// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reference tokens: `{{name[:modifier]#path[#default]}}`.
//!
//! A resource template may read values from the live objects of the resources it
//! depends on. Tokens are found in every string leaf of the template, at any depth
//! of nested objects and arrays.
//!
//! # Token grammar
//!
//! | Part       | Meaning                                                           |
//! |------------|-------------------------------------------------------------------|
//! | `name`     | Resource in the same Bundle; must be listed in `dependsOn`         |
//! | `modifier` | Optional facet of the dependency, e.g. `bindsecret`               |
//! | `path`     | Field path: `spec.ports[0].port`, `$.data['tls.crt']`, `items[*]` |
//! | `default`  | Optional value used when rendering examples; JSON or plain text   |
//!
//! `\{{` escapes a token; the backslash is dropped and the braces are kept.
//!
//! # Substitution
//!
//! A string that is exactly one token is replaced by the resolved JSON value, so
//! numbers, booleans and objects keep their type:
//!
//! ```rust
//! use conductor::references::{Dependency, Resolver};
//! use serde_json::json;
//! use std::collections::BTreeMap;
//!
//! let mut deps = BTreeMap::new();
//! deps.insert("svc".to_string(), Dependency::new(json!({"spec": {"ports": [{"port": 8080}]}})));
//! let declared = vec!["svc".to_string()];
//!
//! let mut resolver = Resolver::new("app", &declared, &deps);
//! let out = resolver
//!     .resolve(&json!({"port": "{{svc#spec.ports[0].port}}", "url": "http://svc:{{svc#spec.ports[0].port}}"}))
//!     .unwrap();
//! assert_eq!(out, json!({"port": 8080, "url": "http://svc:8080"}));
//! ```

use crate::constants::{CORE_API_VERSION, KIND_SECRET};
use crate::errors::ReferenceError;
use base64::Engine;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

/// `name[:modifier]#path[#default]`, the text between `{{` and `}}`.
static TOKEN_BODY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<name>[^{}:#\s]+)(?::(?P<modifier>[^{}:#\s]+))?#(?P<path>[^#]+)(?:#(?P<default>.*))?$")
        .expect("token regex is valid")
});

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// A parsed reference token.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    /// Token text including braces, used in error messages and as memo key
    pub raw: String,
    /// Referenced resource
    pub target: String,
    /// Requested facet, if any
    pub modifier: Option<String>,
    /// Field path
    pub path: String,
    /// Example value
    pub default: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Token(Reference),
}

fn parse_token(raw: &str, body: &str) -> Result<Reference, ReferenceError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(ReferenceError::InvalidSyntax {
            token: raw.to_string(),
            reason: "empty reference".to_string(),
        });
    }
    if !body.contains('#') {
        return Err(ReferenceError::WholeObjectNotAllowed {
            token: raw.to_string(),
        });
    }
    let caps = TOKEN_BODY
        .captures(body)
        .ok_or_else(|| ReferenceError::InvalidSyntax {
            token: raw.to_string(),
            reason: "expected name[:modifier]#path[#default]".to_string(),
        })?;

    let default = caps.name("default").map(|d| {
        serde_json::from_str::<Value>(d.as_str())
            .unwrap_or_else(|_| Value::String(d.as_str().to_string()))
    });

    Ok(Reference {
        raw: raw.to_string(),
        target: caps["name"].to_string(),
        modifier: caps.name("modifier").map(|m| m.as_str().to_string()),
        path: caps["path"].trim().to_string(),
        default,
    })
}

fn scan(s: &str) -> Result<Vec<Segment>, ReferenceError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = s;

    while let Some(pos) = rest.find(OPEN) {
        let (before, after) = rest.split_at(pos);
        if let Some(kept) = before.strip_suffix('\\') {
            literal.push_str(kept);
            literal.push_str(OPEN);
            rest = &after[OPEN.len()..];
            continue;
        }
        literal.push_str(before);

        let body_and_rest = &after[OPEN.len()..];
        let end = find_close(body_and_rest).ok_or_else(|| ReferenceError::InvalidSyntax {
            token: after.to_string(),
            reason: "missing closing }}".to_string(),
        })?;
        let raw = &after[..OPEN.len() + end + CLOSE.len()];
        let reference = parse_token(raw, &body_and_rest[..end])?;

        if !literal.is_empty() {
            segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }
        segments.push(Segment::Token(reference));
        rest = &body_and_rest[end + CLOSE.len()..];
    }

    literal.push_str(rest);
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

/// Offset of the `}}` closing a token body. Braces inside the body (object defaults) must balance first.
fn find_close(body: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in body.char_indices() {
        match c {
            '}' if depth == 0 && body[i..].starts_with(CLOSE) => return Some(i),
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    None
}

/// Whether `s` contains an unescaped token opener.
#[must_use]
pub fn contains_reference(s: &str) -> bool {
    let mut rest = s;
    while let Some(pos) = rest.find(OPEN) {
        if !rest[..pos].ends_with('\\') {
            return true;
        }
        rest = &rest[pos + OPEN.len()..];
    }
    false
}

/// Every token in `value`, in document order.
///
/// # Errors
///
/// Returns the first syntax error found.
pub fn collect_references(value: &Value) -> Result<Vec<Reference>, ReferenceError> {
    let mut found = Vec::new();
    collect_into(value, &mut found)?;
    Ok(found)
}

fn collect_into(value: &Value, found: &mut Vec<Reference>) -> Result<(), ReferenceError> {
    match value {
        Value::String(s) => {
            for segment in scan(s)? {
                if let Segment::Token(r) = segment {
                    found.push(r);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_into(item, found)?;
            }
        }
        Value::Object(map) => {
            for v in map.values() {
                collect_into(v, found)?;
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
    Ok(())
}

/// Check that every token in `value` is well formed and points at a declared dependency.
///
/// Returns the tokens so callers can tell whether all of them carry defaults.
///
/// # Errors
///
/// Returns the first syntax, self-reference or undeclared-reference error.
pub fn check_references(
    resource: &str,
    declared: &[String],
    value: &Value,
) -> Result<Vec<Reference>, ReferenceError> {
    let references = collect_references(value)?;
    for r in &references {
        check_target(resource, declared, r)?;
    }
    Ok(references)
}

fn check_target(resource: &str, declared: &[String], r: &Reference) -> Result<(), ReferenceError> {
    if r.target == resource {
        return Err(ReferenceError::SelfReferenceNotAllowed {
            token: r.raw.clone(),
        });
    }
    if !declared.iter().any(|d| d == &r.target) {
        return Err(ReferenceError::UndeclaredReference {
            resource: resource.to_string(),
            target: r.target.clone(),
        });
    }
    Ok(())
}

/// What a processed dependency exposes to references.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dependency {
    /// Live object
    pub object: Value,
    /// Auxiliary objects keyed by modifier, e.g. `bindsecret`
    pub facets: BTreeMap<String, Value>,
}

impl Dependency {
    /// A dependency with no facets.
    #[must_use]
    pub fn new(object: Value) -> Self {
        Self {
            object,
            facets: BTreeMap::new(),
        }
    }

    /// Add a facet.
    #[must_use]
    pub fn with_facet(mut self, modifier: &str, object: Value) -> Self {
        self.facets.insert(modifier.to_string(), object);
        self
    }
}

/// Where resolved values come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    /// Query live dependency objects.
    Live,
    /// Use every token's default; used to validate templates before dependencies exist.
    Examples,
}

/// Substitutes tokens in one resource's template.
///
/// One resolver is used per resource evaluation; each distinct token is resolved once.
pub struct Resolver<'a> {
    resource: &'a str,
    declared: &'a [String],
    dependencies: Option<&'a BTreeMap<String, Dependency>>,
    mode: ResolveMode,
    cache: HashMap<String, Value>,
}

impl<'a> Resolver<'a> {
    /// Resolve against live dependency objects.
    #[must_use]
    pub fn new(
        resource: &'a str,
        declared: &'a [String],
        dependencies: &'a BTreeMap<String, Dependency>,
    ) -> Self {
        Self {
            resource,
            declared,
            dependencies: Some(dependencies),
            mode: ResolveMode::Live,
            cache: HashMap::new(),
        }
    }

    /// Resolve every token to its default.
    #[must_use]
    pub fn examples(resource: &'a str, declared: &'a [String]) -> Self {
        Self {
            resource,
            declared,
            dependencies: None,
            mode: ResolveMode::Examples,
            cache: HashMap::new(),
        }
    }

    /// Mode this resolver runs in.
    #[must_use]
    pub fn mode(&self) -> ResolveMode {
        self.mode
    }

    /// Return a copy of `template` with every token substituted.
    ///
    /// # Errors
    ///
    /// Returns the first resolution failure; no partial result is returned.
    pub fn resolve(&mut self, template: &Value) -> Result<Value, ReferenceError> {
        match template {
            Value::String(s) => self.resolve_string(s),
            Value::Array(items) => items
                .iter()
                .map(|item| self.resolve(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k.clone(), self.resolve(v)?);
                }
                Ok(Value::Object(out))
            }
            Value::Null | Value::Bool(_) | Value::Number(_) => Ok(template.clone()),
        }
    }

    /// Resolve tokens in a plugin spec map.
    ///
    /// # Errors
    ///
    /// See [`Resolver::resolve`].
    pub fn resolve_map(&mut self, spec: &Map<String, Value>) -> Result<Map<String, Value>, ReferenceError> {
        match self.resolve(&Value::Object(spec.clone()))? {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }

    fn resolve_string(&mut self, s: &str) -> Result<Value, ReferenceError> {
        let segments = scan(s)?;

        if let [Segment::Token(r)] = segments.as_slice() {
            return self.resolve_reference(r);
        }

        let mut out = String::new();
        for segment in segments {
            match segment {
                Segment::Literal(text) => out.push_str(&text),
                Segment::Token(r) => match self.resolve_reference(&r)? {
                    Value::String(text) => out.push_str(&text),
                    v @ (Value::Number(_) | Value::Bool(_)) => out.push_str(&v.to_string()),
                    Value::Null | Value::Array(_) | Value::Object(_) => {
                        return Err(ReferenceError::NonScalarInterpolation { token: r.raw })
                    }
                },
            }
        }
        Ok(Value::String(out))
    }

    fn resolve_reference(&mut self, r: &Reference) -> Result<Value, ReferenceError> {
        check_target(self.resource, self.declared, r)?;
        if let Some(hit) = self.cache.get(&r.raw) {
            return Ok(hit.clone());
        }

        let value = match self.mode {
            ResolveMode::Examples => {
                r.default
                    .clone()
                    .ok_or_else(|| ReferenceError::MissingExample {
                        token: r.raw.clone(),
                    })?
            }
            ResolveMode::Live => self.lookup(r)?,
        };

        self.cache.insert(r.raw.clone(), value.clone());
        Ok(value)
    }

    fn lookup(&self, r: &Reference) -> Result<Value, ReferenceError> {
        let dependency = self
            .dependencies
            .and_then(|deps| deps.get(&r.target))
            .ok_or_else(|| ReferenceError::DependencyNotProcessed {
                target: r.target.clone(),
            })?;

        let source = match &r.modifier {
            None => &dependency.object,
            Some(modifier) => dependency.facets.get(modifier).ok_or_else(|| {
                ReferenceError::UnsupportedModifier {
                    target: r.target.clone(),
                    modifier: modifier.clone(),
                }
            })?,
        };

        let steps = parse_path(&r.path).map_err(|reason| ReferenceError::InvalidPath {
            token: r.raw.clone(),
            reason,
        })?;
        if steps.is_empty() {
            return Err(ReferenceError::WholeObjectNotAllowed {
                token: r.raw.clone(),
            });
        }

        let matches = query(source, &steps);
        let value = match matches.as_slice() {
            [] => {
                return Err(ReferenceError::PathNotFound {
                    token: r.raw.clone(),
                })
            }
            [single] => (*single).clone(),
            many => {
                return Err(ReferenceError::AmbiguousPath {
                    token: r.raw.clone(),
                    matches: many.len(),
                })
            }
        };

        if is_secret(source) && matches!(steps.first(), Some(Step::Key(k)) if k == "data") {
            return decode_payload(&r.raw, value);
        }
        Ok(value)
    }
}

fn is_secret(obj: &Value) -> bool {
    obj.get("apiVersion").and_then(Value::as_str) == Some(CORE_API_VERSION)
        && obj.get("kind").and_then(Value::as_str) == Some(KIND_SECRET)
}

/// Decode base64 Secret payloads to UTF-8 text. Maps decode every entry.
fn decode_payload(token: &str, value: Value) -> Result<Value, ReferenceError> {
    match value {
        Value::String(encoded) => {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|e| ReferenceError::InvalidBase64Payload {
                    token: token.to_string(),
                    reason: e.to_string(),
                })?;
            String::from_utf8(bytes)
                .map(Value::String)
                .map_err(|_| ReferenceError::NonUtf8Payload {
                    token: token.to_string(),
                })
        }
        Value::Object(map) => {
            let mut decoded = Map::with_capacity(map.len());
            for (k, v) in map {
                decoded.insert(k, decode_payload(token, v)?);
            }
            Ok(Value::Object(decoded))
        }
        other => Ok(other),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Step {
    Key(String),
    Index(usize),
    Wildcard,
}

/// Parse `$.a.b[0]['c.d'][*]`; the `$` and the first `.` are optional.
fn parse_path(path: &str) -> Result<Vec<Step>, String> {
    let chars: Vec<char> = path.trim().chars().collect();
    let mut i = usize::from(chars.first() == Some(&'$'));
    let bare_start = i == 0;
    let mut steps = Vec::new();

    let read_key = |i: &mut usize| -> String {
        let start = *i;
        while *i < chars.len() && chars[*i] != '.' && chars[*i] != '[' {
            *i += 1;
        }
        chars[start..*i].iter().collect()
    };

    while i < chars.len() {
        match chars[i] {
            '.' => {
                i += 1;
                let key = read_key(&mut i);
                if key.is_empty() {
                    return Err(format!("empty key at position {i}"));
                }
                steps.push(if key == "*" { Step::Wildcard } else { Step::Key(key) });
            }
            '[' => {
                i += 1;
                match chars.get(i) {
                    Some(&quote) if quote == '\'' || quote == '"' => {
                        let start = i + 1;
                        let len = chars[start..]
                            .iter()
                            .position(|c| *c == quote)
                            .ok_or_else(|| "unterminated quoted key".to_string())?;
                        let key: String = chars[start..start + len].iter().collect();
                        i = start + len + 1;
                        if chars.get(i) != Some(&']') {
                            return Err(format!("expected ] at position {i}"));
                        }
                        i += 1;
                        steps.push(Step::Key(key));
                    }
                    _ => {
                        let len = chars[i..]
                            .iter()
                            .position(|c| *c == ']')
                            .ok_or_else(|| "unterminated [".to_string())?;
                        let inner: String = chars[i..i + len].iter().collect();
                        i += len + 1;
                        let inner = inner.trim();
                        if inner == "*" {
                            steps.push(Step::Wildcard);
                        } else {
                            let index = inner
                                .parse::<usize>()
                                .map_err(|_| format!("invalid index '{inner}'"))?;
                            steps.push(Step::Index(index));
                        }
                    }
                }
            }
            _ if bare_start && steps.is_empty() => {
                let key = read_key(&mut i);
                steps.push(if key == "*" { Step::Wildcard } else { Step::Key(key) });
            }
            c => return Err(format!("unexpected '{c}' at position {i}")),
        }
    }
    Ok(steps)
}

fn query<'v>(root: &'v Value, steps: &[Step]) -> Vec<&'v Value> {
    let mut current = vec![root];
    for step in steps {
        let mut next = Vec::new();
        for value in current {
            match (step, value) {
                (Step::Key(k), Value::Object(map)) => next.extend(map.get(k)),
                (Step::Index(idx), Value::Array(items)) => next.extend(items.get(*idx)),
                (Step::Wildcard, Value::Object(map)) => next.extend(map.values()),
                (Step::Wildcard, Value::Array(items)) => next.extend(items.iter()),
                _ => {}
            }
        }
        current = next;
    }
    current
}

#[cfg(test)]
#[path = "references_tests.rs"]
mod references_tests;
