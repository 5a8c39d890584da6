//! Validation rules and their evaluation.
//!
//! Rules run against a property's coerced value. Every rule of a property is
//! evaluated (no short-circuit) and the names of the failing ones are
//! collected in declaration order. Evaluation is always asynchronous so
//! synchronous and asynchronous custom rules share one interface.

use crate::coerce::encode_stored;
use crate::error::ModelResult;
use futures::future::{join_all, BoxFuture};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
        .expect("email pattern compiles")
});

static URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(https?|ftp)://([A-Za-z0-9\-._~%]+(:[^@\s]*)?@)?[A-Za-z0-9\-.]+(:\d+)?(/[^\s]*)?$")
        .expect("url pattern compiles")
});

static NUMBER_EN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(\d{1,3}(,\d{3})+|\d+)(\.\d+)?$").expect("number pattern compiles")
});

static NUMBER_DE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(\d{1,3}(\.\d{3})+|\d+)(,\d+)?$").expect("number pattern compiles")
});

/// Digit grouping and decimal separator accepted by the number rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberLocale {
    /// `1,234.5`
    #[default]
    En,
    /// `1.234,5`
    De,
}

/// Options handed to custom validators.
#[derive(Debug, Clone, Default)]
pub struct ValidatorOptions {
    /// The rule was declared optional.
    pub optional: bool,
    /// The last persisted value of the property, if any.
    pub previous: Option<Value>,
}

type SyncCheck = dyn Fn(&Value, &ValidatorOptions) -> bool + Send + Sync;
type AsyncCheck = dyn Fn(Value, ValidatorOptions) -> BoxFuture<'static, bool> + Send + Sync;

#[derive(Clone)]
enum Check {
    NotEmpty,
    Min(f64),
    Max(f64),
    MinLength(usize),
    MaxLength(usize),
    Pattern(Regex),
    Email,
    Number(NumberLocale),
    Url,
    Custom(Arc<SyncCheck>),
    CustomAsync(Arc<AsyncCheck>),
}

/// One validation rule of a property.
#[derive(Clone)]
pub struct Validation {
    name: String,
    check: Check,
    optional: bool,
}

impl fmt::Debug for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validation")
            .field("name", &self.name)
            .field("optional", &self.optional)
            .finish()
    }
}

impl Validation {
    fn builtin(name: &str, check: Check) -> Self {
        Self {
            name: name.into(),
            check,
            optional: false,
        }
    }

    pub fn not_empty() -> Self {
        Self::builtin("notEmpty", Check::NotEmpty)
    }

    pub fn min(min: f64) -> Self {
        Self::builtin("min", Check::Min(min))
    }

    pub fn max(max: f64) -> Self {
        Self::builtin("max", Check::Max(max))
    }

    pub fn min_length(len: usize) -> Self {
        Self::builtin("minLength", Check::MinLength(len))
    }

    pub fn max_length(len: usize) -> Self {
        Self::builtin("maxLength", Check::MaxLength(len))
    }

    /// Value must match the regular expression.
    pub fn pattern(pattern: &str) -> ModelResult<Self> {
        Ok(Self::builtin("pattern", Check::Pattern(Regex::new(pattern)?)))
    }

    pub fn email() -> Self {
        Self::builtin("email", Check::Email)
    }

    /// Value must be a numeric string in the given locale's notation.
    pub fn number(locale: NumberLocale) -> Self {
        Self::builtin("number", Check::Number(locale))
    }

    pub fn url() -> Self {
        Self::builtin("url", Check::Url)
    }

    /// A synchronous custom rule reported under `name` when it fails.
    pub fn custom<F>(name: &str, f: F) -> Self
    where
        F: Fn(&Value, &ValidatorOptions) -> bool + Send + Sync + 'static,
    {
        Self::builtin(name, Check::Custom(Arc::new(f)))
    }

    /// An asynchronous custom rule reported under `name` when it fails.
    pub fn custom_async<F, Fut>(name: &str, f: F) -> Self
    where
        F: Fn(Value, ValidatorOptions) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = bool> + Send + 'static,
    {
        let check: Arc<AsyncCheck> = Arc::new(move |value, options| Box::pin(f(value, options)));
        Self::builtin(name, Check::CustomAsync(check))
    }

    /// Skip this rule when the value is empty or the property default.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Name reported when this rule fails.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Evaluates the rule. Returns true when the value passes.
    pub async fn check(&self, value: &Value, default: &Value, previous: Option<&Value>) -> bool {
        if self.optional && is_blank(value, default) {
            return true;
        }
        let options = ValidatorOptions {
            optional: self.optional,
            previous: previous.cloned(),
        };
        match &self.check {
            Check::NotEmpty => not_empty(value),
            Check::Min(min) => numeric(value).is_some_and(|n| n >= *min),
            Check::Max(max) => numeric(value).is_some_and(|n| n <= *max),
            Check::MinLength(len) => encode_stored(value).chars().count() >= *len,
            Check::MaxLength(len) => encode_stored(value).chars().count() <= *len,
            Check::Pattern(re) => re.is_match(&encode_stored(value)),
            Check::Email => EMAIL.is_match(&encode_stored(value)),
            Check::Number(locale) => match value {
                Value::Number(_) => true,
                _ => {
                    let text = encode_stored(value);
                    match locale {
                        NumberLocale::En => NUMBER_EN.is_match(text.trim()),
                        NumberLocale::De => NUMBER_DE.is_match(text.trim()),
                    }
                }
            },
            Check::Url => URL.is_match(&encode_stored(value)),
            Check::Custom(f) => (**f)(value, &options),
            Check::CustomAsync(f) => (**f)(value.clone(), options).await,
        }
    }
}

/// Runs every rule in `rules` and returns the failing rule names in order.
pub(crate) async fn failing_rules(
    rules: &[Validation],
    value: &Value,
    default: &Value,
    previous: Option<&Value>,
) -> Vec<String> {
    let outcomes = join_all(rules.iter().map(|rule| rule.check(value, default, previous))).await;
    rules
        .iter()
        .zip(outcomes)
        .filter(|(_, passed)| !passed)
        .map(|(rule, _)| rule.name.clone())
        .collect()
}

fn is_blank(value: &Value, default: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) if s.is_empty() => true,
        _ => value == default,
    }
}

fn not_empty(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Failing rule names per property.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the failing rules of one property. Empty lists are ignored.
    pub fn insert(&mut self, property: &str, failed: Vec<String>) {
        if !failed.is_empty() {
            self.0.insert(property.to_string(), failed);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Failing rule names of one property.
    pub fn get(&self, property: &str) -> Option<&[String]> {
        self.0.get(property).map(Vec::as_slice)
    }

    pub fn properties(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Merges another set of errors into this one.
    pub fn extend(&mut self, other: ValidationErrors) {
        self.0.extend(other.0);
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (property, rules) in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            write!(f, "{property}: {}", rules.join(", "))?;
        }
        Ok(())
    }
}

/// Outcome of validating an entity or a single property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    Invalid(ValidationErrors),
}

impl ValidationResult {
    pub(crate) fn from_errors(errors: ValidationErrors) -> Self {
        if errors.is_empty() {
            ValidationResult::Valid
        } else {
            ValidationResult::Invalid(errors)
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }

    /// Failing rules, if any.
    pub fn errors(&self) -> Option<&ValidationErrors> {
        match self {
            ValidationResult::Valid => None,
            ValidationResult::Invalid(errors) => Some(errors),
        }
    }

    pub fn into_result(self) -> Result<(), ValidationErrors> {
        match self {
            ValidationResult::Valid => Ok(()),
            ValidationResult::Invalid(errors) => Err(errors),
        }
    }
}
