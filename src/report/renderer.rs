//! Template rendering with a renderer-owned compilation cache.
//!
//! ## Cache keys
//!
//! Compiled templates are registered in a private [`Environment`] and looked
//! up through a [`TemplateCacheKey`]. With [`CacheKeyPolicy::IdentifierAndContent`]
//! (the default) the key includes a hash of the source, so changing a
//! template's text under the same identifier compiles a fresh entry.
//! [`CacheKeyPolicy::IdentifierOnly`] keys on the identifier alone: the first
//! source registered under an identifier keeps being used even if later calls
//! pass different text.
//!
//! ## Variable bags
//!
//! A [`VariableBag`] carries named values tagged [`BagValue::Plain`] or
//! [`BagValue::Verbatim`]. Strings inside plain values are themselves
//! expanded as templates against the bag before the main render; verbatim
//! values are handed to the template untouched.
//!
//! ## Undefined values
//!
//! Templates are evaluated strictly. Under [`UndefinedMode::PassThrough`] an
//! undefined reference inside `{{ ... }}` is re-rendered as the literal
//! expression text, e.g. `[{{ missing }}]` stays `[{{ missing }}]`. Undefined
//! values inside block tags (`{% if missing %}`) render as empty instead.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use indexmap::IndexMap;
use minijinja::{AutoEscape, Environment, ErrorKind, UndefinedBehavior, Value};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::recorder::status::glyph_for;

// ============================================================================
// Policies
// ============================================================================

/// How compiled templates are keyed in the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKeyPolicy {
    /// Identifier plus a hash of the template source
    #[default]
    IdentifierAndContent,
    /// Identifier only; later source changes are not picked up
    IdentifierOnly,
}

/// What happens when a template references an undefined variable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndefinedMode {
    /// Undefined expressions render as their literal source text
    #[default]
    PassThrough,
    /// Any undefined reference fails the render with [`Error::UndefinedVariable`]
    Strict,
}

// ============================================================================
// Template Cache Key
// ============================================================================

/// A cache key for compiled templates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TemplateCacheKey {
    /// Logical template identifier
    pub name: String,
    /// Hash of the template source, absent under `IdentifierOnly`
    pub content_hash: Option<u64>,
}

impl TemplateCacheKey {
    /// Builds the key for `name`/`source` under `policy`.
    pub fn new(policy: CacheKeyPolicy, name: &str, source: &str) -> Self {
        let content_hash = match policy {
            CacheKeyPolicy::IdentifierAndContent => Some(hash_content(source)),
            CacheKeyPolicy::IdentifierOnly => None,
        };
        Self {
            name: name.to_string(),
            content_hash,
        }
    }

    /// Name under which the compiled template is registered.
    fn registered_name(&self) -> String {
        match self.content_hash {
            Some(hash) => format!("{}@{hash:016x}", self.name),
            None => self.name.clone(),
        }
    }
}

fn hash_content(content: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    hasher.finish()
}

// ============================================================================
// Template Cache Metrics
// ============================================================================

/// Counters for the template cache.
#[derive(Debug, Default)]
pub struct TemplateCacheMetrics {
    /// Number of cache hits
    pub hits: AtomicU64,
    /// Number of cache misses
    pub misses: AtomicU64,
    /// Number of successful compilations
    pub compilations: AtomicU64,
    /// Number of renders attempted
    pub renders: AtomicU64,
}

impl TemplateCacheMetrics {
    /// Get hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed) as f64;
        let misses = self.misses.load(Ordering::Relaxed) as f64;
        let total = hits + misses;
        if total > 0.0 {
            hits / total
        } else {
            0.0
        }
    }

    /// Snapshot as plain numbers.
    pub fn snapshot(&self) -> CacheSnapshot {
        CacheSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            compilations: self.compilations.load(Ordering::Relaxed),
            renders: self.renders.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`TemplateCacheMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub compilations: u64,
    pub renders: u64,
}

// ============================================================================
// Variable Bag
// ============================================================================

/// A value passed to a template.
#[derive(Debug, Clone, PartialEq)]
pub enum BagValue {
    /// Strings inside are expanded as templates before rendering
    Plain(JsonValue),
    /// Passed through as-is, never parsed as template syntax
    Verbatim(JsonValue),
}

impl BagValue {
    fn raw(&self) -> &JsonValue {
        match self {
            BagValue::Plain(v) | BagValue::Verbatim(v) => v,
        }
    }
}

/// Named values for one render call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableBag {
    values: IndexMap<String, BagValue>,
}

impl VariableBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a value whose strings may contain template syntax.
    pub fn plain(mut self, name: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.values.insert(name.into(), BagValue::Plain(value.into()));
        self
    }

    /// Adds a value that is never re-parsed.
    pub fn verbatim(mut self, name: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.values
            .insert(name.into(), BagValue::Verbatim(value.into()));
        self
    }

    /// Serializes `value` and adds it verbatim.
    pub fn verbatim_serialize<T: Serialize>(self, name: impl Into<String>, value: &T) -> Result<Self> {
        let json = serde_json::to_value(value)?;
        Ok(self.verbatim(name, json))
    }

    pub fn get(&self, name: &str) -> Option<&BagValue> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The bag with every value as-is, used as context for embedded templates.
    fn raw_context(&self) -> Value {
        let map: IndexMap<&str, Value> = self
            .values
            .iter()
            .map(|(k, v)| (k.as_str(), Value::from_serialize(v.raw())))
            .collect();
        Value::from_serialize(&map)
    }
}

// ============================================================================
// Renderer
// ============================================================================

/// Upper bound on undefined expressions literalized in one render.
const MAX_PASS_THROUGH: usize = 64;

/// Renders templates against variable bags, caching compiled sources.
pub struct ReportRenderer {
    /// Strict environment holding the compiled templates
    env: RwLock<Environment<'static>>,
    /// Strict environment for plain values and pass-through re-renders
    embedded: Environment<'static>,
    /// Chainable environment, last resort for undefined values in block tags
    lenient: Environment<'static>,
    compiled: DashMap<TemplateCacheKey, String>,
    metrics: TemplateCacheMetrics,
    policy: CacheKeyPolicy,
    undefined: UndefinedMode,
}

impl std::fmt::Debug for ReportRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportRenderer")
            .field("policy", &self.policy)
            .field("undefined", &self.undefined)
            .field("cached", &self.compiled.len())
            .finish()
    }
}

impl Default for ReportRenderer {
    fn default() -> Self {
        Self::new(CacheKeyPolicy::default(), UndefinedMode::default())
    }
}

impl ReportRenderer {
    /// Creates a renderer with its own empty cache.
    pub fn new(policy: CacheKeyPolicy, undefined: UndefinedMode) -> Self {
        let mut env = base_environment();
        env.set_undefined_behavior(UndefinedBehavior::Strict);

        let mut embedded = base_environment();
        embedded.set_undefined_behavior(UndefinedBehavior::Strict);

        let mut lenient = base_environment();
        lenient.set_undefined_behavior(UndefinedBehavior::Chainable);

        Self {
            env: RwLock::new(env),
            embedded,
            lenient,
            compiled: DashMap::new(),
            metrics: TemplateCacheMetrics::default(),
            policy,
            undefined,
        }
    }

    pub fn policy(&self) -> CacheKeyPolicy {
        self.policy
    }

    pub fn undefined_mode(&self) -> UndefinedMode {
        self.undefined
    }

    pub fn metrics(&self) -> &TemplateCacheMetrics {
        &self.metrics
    }

    /// Number of compiled templates held.
    pub fn cached_templates(&self) -> usize {
        self.compiled.len()
    }

    /// Renders `source` (identified by `template_id`) against `bag`.
    ///
    /// Compile or evaluation errors fail this call only.
    pub fn render(&self, template_id: &str, source: &str, bag: &VariableBag) -> Result<String> {
        self.metrics.renders.fetch_add(1, Ordering::Relaxed);
        let name = self.compile(template_id, source)?;
        let context = self.expand(template_id, bag)?;

        let env = self.env.read();
        let template = env
            .get_template(&name)
            .map_err(|e| Error::from_template(template_id, &e))?;
        match template.render(&context) {
            Ok(rendered) => Ok(rendered),
            Err(e)
                if e.kind() == ErrorKind::UndefinedError
                    && self.undefined == UndefinedMode::PassThrough =>
            {
                trace!(template = template_id, error = %e, "undefined value passed through");
                self.render_pass_through(template_id, template.source(), &context)
            }
            Err(e) => Err(Error::from_template(template_id, &e)),
        }
    }

    /// Re-renders `source`, turning each undefined `{{ ... }}` expression into
    /// its literal text until the render succeeds.
    fn render_pass_through(&self, template_id: &str, source: &str, context: &Value) -> Result<String> {
        let mut patched = source.to_string();
        for _ in 0..MAX_PASS_THROUGH {
            match self.embedded.render_str(&patched, context) {
                Ok(rendered) => return Ok(rendered),
                Err(e) if e.kind() == ErrorKind::UndefinedError => {
                    match e.range().and_then(|range| literalize(&patched, range)) {
                        Some(next) => patched = next,
                        None => break,
                    }
                }
                Err(e) => return Err(Error::from_template(template_id, &e)),
            }
        }
        debug!(template = template_id, "undefined value outside an expression, rendering it empty");
        self.lenient
            .render_str(source, context)
            .map_err(|e| Error::from_template(template_id, &e))
    }

    /// Ensures the template is compiled, returning its registered name.
    fn compile(&self, template_id: &str, source: &str) -> Result<String> {
        let key = TemplateCacheKey::new(self.policy, template_id, source);
        if let Some(name) = self.compiled.get(&key) {
            self.metrics.hits.fetch_add(1, Ordering::Relaxed);
            trace!(template = template_id, "template cache hit");
            return Ok(name.clone());
        }

        self.metrics.misses.fetch_add(1, Ordering::Relaxed);
        let name = key.registered_name();
        self.env
            .write()
            .add_template_owned(name.clone(), source.to_string())
            .map_err(|e| Error::from_template(template_id, &e))?;
        self.metrics.compilations.fetch_add(1, Ordering::Relaxed);
        debug!(template = template_id, registered = %name, "template compiled");

        self.compiled.insert(key, name.clone());
        Ok(name)
    }

    /// Builds the render context, expanding strings in plain values.
    fn expand(&self, template_id: &str, bag: &VariableBag) -> Result<Value> {
        let raw = bag.raw_context();
        let mut context = IndexMap::with_capacity(bag.len());
        for (name, value) in &bag.values {
            let value = match value {
                BagValue::Plain(json) => self.expand_json(template_id, json, &raw)?,
                BagValue::Verbatim(json) => json.clone(),
            };
            context.insert(name.as_str(), Value::from_serialize(&value));
        }
        Ok(Value::from_serialize(&context))
    }

    fn expand_json(&self, template_id: &str, value: &JsonValue, raw: &Value) -> Result<JsonValue> {
        Ok(match value {
            JsonValue::String(s) => JsonValue::String(self.expand_str(template_id, s, raw)?),
            JsonValue::Array(items) => JsonValue::Array(
                items
                    .iter()
                    .map(|v| self.expand_json(template_id, v, raw))
                    .collect::<Result<_>>()?,
            ),
            JsonValue::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k.clone(), self.expand_json(template_id, v, raw)?);
                }
                JsonValue::Object(out)
            }
            other => other.clone(),
        })
    }

    fn expand_str(&self, template_id: &str, text: &str, raw: &Value) -> Result<String> {
        if !has_template_syntax(text) {
            return Ok(text.to_string());
        }
        match self.embedded.render_str(text, raw) {
            Ok(rendered) => Ok(rendered),
            Err(err) if self.undefined == UndefinedMode::PassThrough => {
                trace!(template = template_id, error = %err, "embedded value passed through");
                Ok(text.to_string())
            }
            Err(err) => Err(Error::from_template(template_id, &err)),
        }
    }
}

/// Replaces the `{{ ... }}` expression around `range` with a string literal
/// of its own text. `None` when `range` is not inside an expression.
fn literalize(source: &str, range: Range<usize>) -> Option<String> {
    let before = source.get(..range.start)?;
    let start = if source.get(range.start..)?.starts_with("{{") {
        range.start
    } else {
        let open = before.rfind("{{")?;
        if before[open..].contains("}}") || before.rfind("{%").is_some_and(|tag| tag > open) {
            return None;
        }
        open
    };
    let search_from = range.end.saturating_sub(2).max(start + 2);
    let end = source.get(search_from..)?.find("}}")? + search_from + 2;

    let literal = serde_json::to_string(&source[start..end]).ok()?;
    Some(format!(
        "{}{{{{ {} }}}}{}",
        &source[..start],
        literal,
        &source[end..]
    ))
}

fn has_template_syntax(text: &str) -> bool {
    text.contains("{{") || text.contains("{%") || text.contains("{#")
}

fn base_environment() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.set_keep_trailing_newline(true);
    env.set_auto_escape_callback(|_| AutoEscape::None);
    env.add_filter("to_nice_json", to_nice_json);
    env.add_filter("status_glyph", status_glyph);
    env
}

/// Pretty JSON with four-space indentation.
pub fn pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    String::from_utf8(buf).map_err(|e| Error::Other {
        message: "pretty JSON was not UTF-8".to_string(),
        source: Some(Box::new(e)),
    })
}

fn to_nice_json(value: Value) -> std::result::Result<String, minijinja::Error> {
    pretty_json(&value).map_err(|e| {
        minijinja::Error::new(minijinja::ErrorKind::InvalidOperation, e.to_string())
    })
}

fn status_glyph(status: Value) -> String {
    glyph_for(status.as_str().unwrap_or_default()).to_string()
}
