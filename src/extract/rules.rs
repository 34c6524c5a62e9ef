//! Selector-table driven extraction
//!
//! A field is described by a [`FieldRule`]: an ordered chain of selectors
//! (the first one that yields a non-empty value wins), where to read the value
//! from, and optional cleanup applied to the text.

use crate::extract::Extractor;
use crate::ConfigError;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};
use url::Url;

/// Where a rule reads its value from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSource {
    /// Text of every matched element, joined
    Text,

    /// Text of the first matched element only
    FirstText,

    /// Attribute of the first matched element (namespace prefix ignored)
    Attr(String),

    /// Text of the elements following the matched element's parent
    SiblingText,

    /// Query parameter of the first link following the matched element's parent
    SiblingLinkParam(String),
}

/// Extraction rule for one named field
#[derive(Debug, Clone)]
pub struct FieldRule {
    name: String,
    selectors: Vec<Selector>,
    source: FieldSource,
    remove: Option<Regex>,
    capture: Option<Regex>,
}

impl FieldRule {
    /// Creates a rule from a selector fallback chain
    ///
    /// # Returns
    ///
    /// * `Ok(FieldRule)` - All selectors parsed
    /// * `Err(ConfigError::InvalidSelector)` - A selector is not valid CSS
    pub fn new(name: &str, selectors: &[&str], source: FieldSource) -> Result<Self, ConfigError> {
        let selectors = selectors
            .iter()
            .map(|s| {
                Selector::parse(s)
                    .map_err(|e| ConfigError::InvalidSelector(format!("'{}': {:?}", s, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: name.to_string(),
            selectors,
            source,
            remove: None,
            capture: None,
        })
    }

    /// Strips every match of `pattern` from the extracted text
    pub fn removing(mut self, pattern: &str) -> Result<Self, ConfigError> {
        self.remove = Some(compile(pattern)?);
        Ok(self)
    }

    /// Keeps only the first match of `pattern` (or its first group)
    pub fn capturing(mut self, pattern: &str) -> Result<Self, ConfigError> {
        self.capture = Some(compile(pattern)?);
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Applies the rule to a parsed document
    pub fn apply(&self, document: &Html) -> String {
        for selector in &self.selectors {
            let raw = match &self.source {
                FieldSource::Text => join_text(document.select(selector).flat_map(|e| e.text())),
                FieldSource::FirstText => document
                    .select(selector)
                    .next()
                    .map(|e| join_text(e.text()))
                    .unwrap_or_default(),
                FieldSource::Attr(name) => document
                    .select(selector)
                    .next()
                    .and_then(|e| attribute(e, name))
                    .unwrap_or_default(),
                FieldSource::SiblingText => join_text(
                    document
                        .select(selector)
                        .flat_map(following_parent_siblings)
                        .flat_map(|e| e.text()),
                ),
                FieldSource::SiblingLinkParam(param) => document
                    .select(selector)
                    .flat_map(following_parent_siblings)
                    .find_map(|sibling| sibling_link_param(sibling, param))
                    .unwrap_or_default(),
            };

            let value = self.clean(raw);
            if !value.is_empty() {
                return value;
            }
        }

        String::new()
    }

    fn clean(&self, raw: String) -> String {
        let mut text = raw;

        if let Some(remove) = &self.remove {
            text = remove.replace_all(&text, "").into_owned();
        }

        if let Some(capture) = &self.capture {
            text = capture
                .captures(&text)
                .and_then(|c| c.get(1).or_else(|| c.get(0)))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
        }

        text.trim().to_string()
    }
}

fn compile(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern)
        .map_err(|e| ConfigError::Validation(format!("Invalid pattern '{}': {}", pattern, e)))
}

/// Trims each text piece and joins the non-empty ones with a space
fn join_text<'a>(pieces: impl IntoIterator<Item = &'a str>) -> String {
    pieces
        .into_iter()
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn attribute(element: ElementRef<'_>, name: &str) -> Option<String> {
    let local = name.rsplit(':').next().unwrap_or(name);
    element
        .value()
        .attrs()
        .find(|(attr, _)| *attr == local)
        .map(|(_, value)| value.trim().to_string())
}

fn following_parent_siblings(element: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    element
        .parent()
        .map(|parent| parent.next_siblings().filter_map(ElementRef::wrap).collect())
        .unwrap_or_default()
}

fn sibling_link_param(sibling: ElementRef<'_>, param: &str) -> Option<String> {
    let links = Selector::parse("a[href]").ok()?;
    sibling
        .select(&links)
        .filter_map(|a| a.value().attr("href"))
        .find_map(|href| query_param(href, param))
}

/// Reads a query parameter from an absolute or site-relative link
fn query_param(href: &str, param: &str) -> Option<String> {
    let url = Url::parse(href)
        .or_else(|_| Url::parse("http://localhost/").and_then(|base| base.join(href)))
        .ok()?;
    url.query_pairs()
        .find(|(key, _)| key == param)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

/// Extractor parameterized by a field table
#[derive(Debug, Clone)]
pub struct SelectorExtractor {
    rules: Vec<FieldRule>,
}

impl SelectorExtractor {
    pub fn new(rules: Vec<FieldRule>) -> Self {
        Self { rules }
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(FieldRule::name)
    }
}

impl Extractor for SelectorExtractor {
    fn extract(&self, html: &str) -> Map<String, Value> {
        let document = Html::parse_document(html);
        self.rules
            .iter()
            .map(|rule| (rule.name.clone(), Value::String(rule.apply(&document))))
            .collect()
    }
}
