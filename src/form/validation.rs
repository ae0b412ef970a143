use std::collections::BTreeMap;
use std::fmt::{Debug, Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures_timer::Delay;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::Serialize;
use serde_json::{Number, Value};

use super::controller::{
    FormController, FormError, FormResult, ValidationTicket, read_lock, write_lock,
};
use super::value::{FieldKey, ValueMap, is_empty_value};
use crate::i18n::I18nManager;

pub type BoxedValidationFuture = Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;

pub(super) type CustomRuleFn = Arc<dyn Fn(&Value, &ValueMap) -> Result<(), String> + Send + Sync>;
pub(super) type AsyncRuleFn = Arc<dyn Fn(Value, ValueMap) -> BoxedValidationFuture + Send + Sync>;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl ValueKind {
    pub fn matches(self, value: &Value) -> bool {
        match self {
            ValueKind::String => value.is_string(),
            ValueKind::Number => value.is_number(),
            ValueKind::Boolean => value.is_boolean(),
            ValueKind::Array => value.is_array(),
            ValueKind::Object => value.is_object(),
        }
    }

    fn catalog_key(self) -> &'static str {
        match self {
            ValueKind::String => "kind.string",
            ValueKind::Number => "kind.number",
            ValueKind::Boolean => "kind.boolean",
            ValueKind::Array => "kind.array",
            ValueKind::Object => "kind.object",
        }
    }
}

#[derive(Clone)]
pub enum RuleKind {
    Required,
    Type(ValueKind),
    MinLength(usize),
    MaxLength(usize),
    Length(usize),
    Min(Decimal),
    Max(Decimal),
    Equal(Value),
    OneOf(Vec<Value>),
    Custom(CustomRuleFn),
    Async {
        validator: AsyncRuleFn,
        debounce: Duration,
    },
}

impl RuleKind {
    pub fn name(&self) -> &'static str {
        match self {
            RuleKind::Required => "required",
            RuleKind::Type(_) => "type",
            RuleKind::MinLength(_) => "min_length",
            RuleKind::MaxLength(_) => "max_length",
            RuleKind::Length(_) => "length",
            RuleKind::Min(_) => "min",
            RuleKind::Max(_) => "max",
            RuleKind::Equal(_) => "equal",
            RuleKind::OneOf(_) => "one_of",
            RuleKind::Custom(_) => "custom",
            RuleKind::Async { .. } => "async",
        }
    }

    // Custom rules decide for themselves what an empty value means.
    fn skips_empty(&self) -> bool {
        !matches!(
            self,
            RuleKind::Required | RuleKind::Custom(_) | RuleKind::Async { .. }
        )
    }
}

impl Debug for RuleKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleKind::Required => f.write_str("Required"),
            RuleKind::Type(kind) => f.debug_tuple("Type").field(kind).finish(),
            RuleKind::MinLength(n) => f.debug_tuple("MinLength").field(n).finish(),
            RuleKind::MaxLength(n) => f.debug_tuple("MaxLength").field(n).finish(),
            RuleKind::Length(n) => f.debug_tuple("Length").field(n).finish(),
            RuleKind::Min(n) => f.debug_tuple("Min").field(n).finish(),
            RuleKind::Max(n) => f.debug_tuple("Max").field(n).finish(),
            RuleKind::Equal(value) => f.debug_tuple("Equal").field(value).finish(),
            RuleKind::OneOf(values) => f.debug_tuple("OneOf").field(values).finish(),
            RuleKind::Custom(_) => f.write_str("Custom(..)"),
            RuleKind::Async { debounce, .. } => f
                .debug_struct("Async")
                .field("debounce", debounce)
                .finish_non_exhaustive(),
        }
    }
}

/// One validation constraint plus an optional message that replaces the catalog text.
#[derive(Clone, Debug)]
pub struct Rule {
    kind: RuleKind,
    message: Option<String>,
}

impl Rule {
    pub fn new(kind: RuleKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }

    pub fn required() -> Self {
        Self::new(RuleKind::Required)
    }

    pub fn kind_of(kind: ValueKind) -> Self {
        Self::new(RuleKind::Type(kind))
    }

    pub fn min_length(length: usize) -> Self {
        Self::new(RuleKind::MinLength(length))
    }

    pub fn max_length(length: usize) -> Self {
        Self::new(RuleKind::MaxLength(length))
    }

    pub fn length(length: usize) -> Self {
        Self::new(RuleKind::Length(length))
    }

    pub fn min(bound: impl Into<Decimal>) -> Self {
        Self::new(RuleKind::Min(bound.into()))
    }

    pub fn max(bound: impl Into<Decimal>) -> Self {
        Self::new(RuleKind::Max(bound.into()))
    }

    pub fn equal(expected: impl Into<Value>) -> Self {
        Self::new(RuleKind::Equal(expected.into()))
    }

    pub fn one_of(options: impl IntoIterator<Item = Value>) -> Self {
        Self::new(RuleKind::OneOf(options.into_iter().collect()))
    }

    pub fn custom(
        validator: impl Fn(&Value, &ValueMap) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        Self::new(RuleKind::Custom(Arc::new(validator)))
    }

    pub fn async_fn<F, Fut>(validator: F) -> Self
    where
        F: Fn(Value, ValueMap) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        let wrapped: AsyncRuleFn =
            Arc::new(move |value: Value, values: ValueMap| -> BoxedValidationFuture {
                Box::pin(validator(value, values))
            });
        Self::new(RuleKind::Async {
            validator: wrapped,
            debounce: Duration::ZERO,
        })
    }

    /// Only meaningful for async rules; other kinds ignore it.
    pub fn debounce(mut self, debounce_ms: u64) -> Self {
        if let RuleKind::Async { debounce, .. } = &mut self.kind {
            *debounce = Duration::from_millis(debounce_ms);
        }
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn rule_kind(&self) -> &RuleKind {
        &self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    fn check_sync(&self, value: Option<&Value>, values: &ValueMap) -> Check {
        if self.kind.skips_empty() && is_empty_value(value) {
            return Check::Pass;
        }
        let passed = match &self.kind {
            RuleKind::Required => !is_empty_value(value) && !is_empty_collection(value),
            RuleKind::Type(kind) => value.is_some_and(|value| kind.matches(value)),
            RuleKind::MinLength(min) => measure(value).is_some_and(|len| len >= *min),
            RuleKind::MaxLength(max) => measure(value).is_some_and(|len| len <= *max),
            RuleKind::Length(length) => measure(value).is_some_and(|len| len == *length),
            RuleKind::Min(bound) => decimal_of(value).is_some_and(|number| number >= *bound),
            RuleKind::Max(bound) => decimal_of(value).is_some_and(|number| number <= *bound),
            RuleKind::Equal(expected) => value == Some(expected),
            RuleKind::OneOf(options) => value.is_some_and(|value| options.contains(value)),
            RuleKind::Custom(validator) => {
                let value = value.cloned().unwrap_or(Value::Null);
                return match validator(&value, values) {
                    Ok(()) => Check::Pass,
                    Err(reason) => Check::Fail(Some(reason)),
                };
            }
            RuleKind::Async { .. } => return Check::Deferred,
        };
        if passed {
            Check::Pass
        } else {
            Check::Fail(None)
        }
    }

    fn failure_message(&self, field: &str, reason: Option<String>, i18n: &I18nManager) -> String {
        if let Some(message) = &self.message {
            return message.clone();
        }
        if let Some(reason) = reason.filter(|reason| !reason.is_empty()) {
            return reason;
        }
        match &self.kind {
            RuleKind::Required => i18n.t_with("validate.required", &[("field", field)]),
            RuleKind::Type(kind) => {
                let expected = i18n.t(kind.catalog_key());
                i18n.t_with(
                    "validate.type",
                    &[("field", field), ("expected", expected.as_str())],
                )
            }
            RuleKind::MinLength(min) => i18n.t_with(
                "validate.min_length",
                &[("field", field), ("min", min.to_string().as_str())],
            ),
            RuleKind::MaxLength(max) => i18n.t_with(
                "validate.max_length",
                &[("field", field), ("max", max.to_string().as_str())],
            ),
            RuleKind::Length(length) => i18n.t_with(
                "validate.length",
                &[("field", field), ("length", length.to_string().as_str())],
            ),
            RuleKind::Min(min) => i18n.t_with(
                "validate.min",
                &[("field", field), ("min", min.to_string().as_str())],
            ),
            RuleKind::Max(max) => i18n.t_with(
                "validate.max",
                &[("field", field), ("max", max.to_string().as_str())],
            ),
            RuleKind::Equal(expected) => i18n.t_with(
                "validate.equal",
                &[("field", field), ("expected", expected.to_string().as_str())],
            ),
            RuleKind::OneOf(options) => {
                let expected = Value::Array(options.clone()).to_string();
                i18n.t_with(
                    "validate.one_of",
                    &[("field", field), ("expected", expected.as_str())],
                )
            }
            RuleKind::Custom(_) | RuleKind::Async { .. } => {
                i18n.t_with("validate.custom", &[("field", field)])
            }
        }
    }
}

enum Check {
    Pass,
    Fail(Option<String>),
    Deferred,
}

/// Ordered constraints attached to one field; the first failing rule reports the error.
#[derive(Clone, Debug, Default)]
pub struct RuleSet(Vec<Rule>);

impl RuleSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.0.push(rule);
        self
    }

    pub fn push(&mut self, rule: Rule) {
        self.0.push(rule);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.0.iter()
    }
}

impl From<Vec<Rule>> for RuleSet {
    fn from(value: Vec<Rule>) -> Self {
        Self(value)
    }
}

impl From<Rule> for RuleSet {
    fn from(value: Rule) -> Self {
        Self(vec![value])
    }
}

impl FromIterator<Rule> for RuleSet {
    fn from_iter<I: IntoIterator<Item = Rule>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
    pub rule: &'static str,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ValidationErrors(BTreeMap<String, FieldError>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, error: FieldError) {
        self.0.insert(error.field.clone(), error);
    }

    pub fn get(&self, field: &str) -> Option<&FieldError> {
        self.0.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.values()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl Display for ValidationErrors {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for error in self.0.values() {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            write!(f, "{}: {}", error.field, error.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Validator built from one snapshot of the registered rule sets.
#[derive(Clone, Debug)]
pub struct Schema {
    rules: Vec<(FieldKey, RuleSet)>,
    i18n: I18nManager,
}

impl Schema {
    pub fn new(rules: impl IntoIterator<Item = (FieldKey, RuleSet)>, i18n: I18nManager) -> Self {
        Self {
            rules: rules.into_iter().collect(),
            i18n,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.iter().all(|(_, rules)| rules.is_empty())
    }

    /// Every rule runs to completion; debounced async rules only start later.
    pub async fn validate(&self, values: &ValueMap) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        for (field, rules) in &self.rules {
            let value = values.get(field.as_str());
            if let Some(error) = self.check_field(field, rules, value, values).await {
                errors.insert(error);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    async fn check_field(
        &self,
        field: &FieldKey,
        rules: &RuleSet,
        value: Option<&Value>,
        values: &ValueMap,
    ) -> Option<FieldError> {
        for rule in rules.iter() {
            let reason = match rule.check_sync(value, values) {
                Check::Pass => continue,
                Check::Fail(reason) => reason,
                Check::Deferred => {
                    let RuleKind::Async {
                        validator,
                        debounce,
                    } = &rule.kind
                    else {
                        continue;
                    };
                    if !debounce.is_zero() {
                        Delay::new(*debounce).await;
                    }
                    let owned = value.cloned().unwrap_or(Value::Null);
                    match validator(owned, values.clone()).await {
                        Ok(()) => continue,
                        Err(reason) => Some(reason),
                    }
                }
            };
            return Some(FieldError {
                field: field.to_string(),
                message: rule.failure_message(field.as_str(), reason, &self.i18n),
                rule: rule.name(),
            });
        }
        None
    }
}

fn is_empty_collection(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Array(items)) => items.is_empty(),
        _ => false,
    }
}

fn measure(value: Option<&Value>) -> Option<usize> {
    match value? {
        Value::String(text) => Some(text.chars().count()),
        Value::Array(items) => Some(items.len()),
        Value::Object(map) => Some(map.len()),
        _ => None,
    }
}

fn decimal_of(value: Option<&Value>) -> Option<Decimal> {
    match value? {
        Value::Number(number) => number_to_decimal(number),
        _ => None,
    }
}

fn number_to_decimal(number: &Number) -> Option<Decimal> {
    if let Some(integer) = number.as_i64() {
        return Some(Decimal::from(integer));
    }
    if let Some(integer) = number.as_u64() {
        return Some(Decimal::from(integer));
    }
    Decimal::from_str(&number.to_string())
        .ok()
        .or_else(|| number.as_f64().and_then(Decimal::from_f64))
}

impl FormController {
    /// Validates the latest `values` against every registered rule set.
    ///
    /// `validate_errors` is written on success and failure alike; only the most recently
    /// started validation may write it. The returned outcome always belongs to this run.
    pub async fn validate(&self) -> FormResult<()> {
        let (ticket, values) = {
            let mut state = write_lock(&self.state, "starting validation")?;
            let next = ValidationTicket(state.validation_ticket.0 + 1);
            state.validation_ticket = next;
            (next, state.values.clone())
        };
        let schema = self.schema()?;

        let outcome = schema.validate(&values).await;
        if !self.finish_validation(ticket, &outcome)? {
            tracing::trace!(ticket = ticket.0, "newer validation owns the stored errors");
        }

        match outcome {
            Ok(()) => Ok(()),
            Err(errors) => {
                tracing::debug!(
                    form = self.form_id()?.0,
                    fields = errors.len(),
                    "form validation failed"
                );
                Err(FormError::Validation(errors))
            }
        }
    }

    pub fn schema(&self) -> FormResult<Schema> {
        let rules = read_lock(&self.registry, "reading rule sets for validation")?.active_rules();
        Ok(Schema::new(rules, self.i18n.clone()))
    }

    pub fn validate_errors(&self) -> FormResult<Option<ValidationErrors>> {
        Ok(read_lock(&self.state, "reading validation errors")?
            .validate_errors
            .clone())
    }

    pub fn field_error(&self, field: &str) -> FormResult<Option<FieldError>> {
        Ok(read_lock(&self.state, "reading field error")?
            .validate_errors
            .as_ref()
            .and_then(|errors| errors.get(field).cloned()))
    }

    fn finish_validation(
        &self,
        ticket: ValidationTicket,
        outcome: &Result<(), ValidationErrors>,
    ) -> FormResult<bool> {
        let mut state = write_lock(&self.state, "applying validation result")?;
        if state.validation_ticket != ticket {
            return Ok(false);
        }
        state.validate_errors = outcome.as_ref().err().cloned();
        Ok(true)
    }
}
