//! Label and field selectors used by list calls

use crate::{
    errors::{Error, Result},
    unstructured::Unstructured,
};
use std::{collections::BTreeMap, str::FromStr};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Requirement {
    Equals(String, String),
    NotEquals(String, String),
    In(String, Vec<String>),
    NotIn(String, Vec<String>),
    Exists(String),
    DoesNotExist(String),
}

impl Requirement {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            Requirement::Equals(k, v) => labels.get(k) == Some(v),
            Requirement::NotEquals(k, v) => labels.get(k) != Some(v),
            Requirement::In(k, vs) => labels.get(k).map_or(false, |v| vs.contains(v)),
            Requirement::NotIn(k, vs) => labels.get(k).map_or(true, |v| !vs.contains(v)),
            Requirement::Exists(k) => labels.contains_key(k),
            Requirement::DoesNotExist(k) => !labels.contains_key(k),
        }
    }
}

/// Parsed label selector, e.g. `app=web,tier in (frontend,backend),!canary`.
/// Empty selector matches everything.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LabelSelector(Vec<Requirement>);

impl LabelSelector {
    pub fn everything() -> Self {
        LabelSelector::default()
    }

    pub fn parse(s: &str) -> Result<Self> {
        split_top_level(s)
            .into_iter()
            .map(|term| parse_requirement(term.trim()))
            .collect::<Result<Vec<_>>>()
            .map(LabelSelector)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.0.iter().all(|req| req.matches(labels))
    }
}

impl FromStr for LabelSelector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        LabelSelector::parse(s)
    }
}

// splits on commas which are not inside parentheses
fn split_top_level(s: &str) -> Vec<&str> {
    if s.trim().is_empty() {
        return Vec::new();
    }
    let mut terms = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                terms.push(&s[start..i]);
                start = i + 1;
            }
            _ => (),
        }
    }
    terms.push(&s[start..]);
    terms
}

fn bad_selector(term: &str, what: &str) -> Error {
    Error::BadRequest(format!("unable to parse requirement '{}': {}", term, what))
}

fn parse_key(term: &str, key: &str) -> Result<String> {
    let key = key.trim();
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'));
    if !valid {
        return Err(bad_selector(term, "invalid label key"));
    }
    Ok(key.to_string())
}

fn parse_set(term: &str, rest: &str) -> Result<Vec<String>> {
    let inner = rest
        .trim()
        .strip_prefix('(')
        .and_then(|r| r.strip_suffix(')'))
        .ok_or_else(|| bad_selector(term, "expected parenthesized set"))?;
    let values: Vec<String> = inner
        .split(',')
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect();
    if values.is_empty() {
        return Err(bad_selector(term, "set must not be empty"));
    }
    Ok(values)
}

fn parse_requirement(term: &str) -> Result<Requirement> {
    if term.is_empty() {
        return Err(bad_selector(term, "empty requirement"));
    }
    if let Some(key) = term.strip_prefix('!') {
        return Ok(Requirement::DoesNotExist(parse_key(term, key)?));
    }
    if let Some((key, value)) = term.split_once("!=") {
        return Ok(Requirement::NotEquals(
            parse_key(term, key)?,
            value.trim().to_string(),
        ));
    }
    if let Some((key, value)) = term.split_once("==").or_else(|| term.split_once('=')) {
        return Ok(Requirement::Equals(
            parse_key(term, key)?,
            value.trim().to_string(),
        ));
    }
    if let Some((key, rest)) = term.split_once(" notin ") {
        return Ok(Requirement::NotIn(
            parse_key(term, key)?,
            parse_set(term, rest)?,
        ));
    }
    if let Some((key, rest)) = term.split_once(" in ") {
        return Ok(Requirement::In(parse_key(term, key)?, parse_set(term, rest)?));
    }
    Ok(Requirement::Exists(parse_key(term, term)?))
}

/// Field selector. Only `metadata.name` and `metadata.namespace` are supported,
/// matching what the API server allows for arbitrary resources.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldSelector(Vec<(String, bool, String)>);

impl FieldSelector {
    pub fn parse(s: &str) -> Result<Self> {
        let mut reqs = Vec::new();
        for term in split_top_level(s) {
            let term = term.trim();
            let (field, negate, value) = if let Some((f, v)) = term.split_once("!=") {
                (f, true, v)
            } else if let Some((f, v)) = term.split_once("==").or_else(|| term.split_once('=')) {
                (f, false, v)
            } else {
                return Err(bad_selector(term, "field selector must use = or !="));
            };
            let field = field.trim();
            if field != "metadata.name" && field != "metadata.namespace" {
                return Err(Error::BadRequest(format!(
                    "field label not supported: {}",
                    field
                )));
            }
            reqs.push((field.to_string(), negate, value.trim().to_string()));
        }
        Ok(FieldSelector(reqs))
    }

    pub fn matches(&self, obj: &Unstructured) -> bool {
        self.0.iter().all(|(field, negate, value)| {
            let actual = if field == "metadata.name" {
                obj.name()
            } else {
                obj.namespace()
            };
            (actual == value) != *negate
        })
    }
}
