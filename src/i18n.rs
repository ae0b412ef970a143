use std::sync::{Arc, PoisonError, RwLock};

use serde::Deserialize;

const DEFAULT_LOCALE: &str = "en-US";

const LOCALES: &[(&str, &[(&str, &str)])] = &[
    (
        "en-US",
        &[
            ("validate.required", "{field} is required"),
            ("validate.type", "{field} is not a {expected}"),
            (
                "validate.min_length",
                "{field} must be at least {min} characters long",
            ),
            (
                "validate.max_length",
                "{field} cannot be longer than {max} characters",
            ),
            ("validate.length", "{field} must be exactly {length} long"),
            ("validate.min", "{field} must be greater than or equal to {min}"),
            ("validate.max", "{field} must be less than or equal to {max}"),
            ("validate.equal", "{field} must be equal to {expected}"),
            ("validate.one_of", "{field} must be one of {expected}"),
            ("validate.custom", "{field} is invalid"),
            ("kind.string", "string"),
            ("kind.number", "number"),
            ("kind.boolean", "boolean"),
            ("kind.array", "array"),
            ("kind.object", "object"),
        ],
    ),
    (
        "zh-CN",
        &[
            ("validate.required", "{field} 是必填项"),
            ("validate.type", "{field} 不是 {expected} 类型"),
            ("validate.min_length", "{field} 长度不能小于 {min}"),
            ("validate.max_length", "{field} 长度不能大于 {max}"),
            ("validate.length", "{field} 长度必须是 {length}"),
            ("validate.min", "{field} 不能小于 {min}"),
            ("validate.max", "{field} 不能大于 {max}"),
            ("validate.equal", "{field} 必须等于 {expected}"),
            ("validate.one_of", "{field} 必须是 {expected} 之一"),
            ("validate.custom", "{field} 校验未通过"),
            ("kind.string", "字符串"),
            ("kind.number", "数字"),
            ("kind.boolean", "布尔"),
            ("kind.array", "数组"),
            ("kind.object", "对象"),
        ],
    ),
];

#[derive(Clone, Debug, Eq, PartialEq, Default, Deserialize)]
#[serde(from = "String")]
pub enum Locale {
    #[default]
    System,
    Tag(String),
}

impl From<String> for Locale {
    fn from(value: String) -> Self {
        if value.trim().eq_ignore_ascii_case("system") {
            return Self::System;
        }
        Self::Tag(value.trim().to_string())
    }
}

impl From<&str> for Locale {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

/// Resolves catalog messages for the form's locale.
///
/// Clones share the locale, so switching it on one handle affects every validator built from it.
#[derive(Clone, Debug, Default)]
pub struct I18nManager {
    locale: Arc<RwLock<Locale>>,
}

impl I18nManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_locale(locale: impl Into<Locale>) -> Self {
        Self {
            locale: Arc::new(RwLock::new(locale.into())),
        }
    }

    pub fn locale(&self) -> Locale {
        self.locale
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_locale(&self, locale: impl Into<Locale>) {
        *self.locale.write().unwrap_or_else(PoisonError::into_inner) = locale.into();
    }

    /// Catalog locale actually used: exact tag, then language only, then `en-US`.
    pub fn resolved_locale(&self) -> &'static str {
        let requested = match self.locale() {
            Locale::System => system_locale(),
            Locale::Tag(tag) => Some(tag),
        };
        requested
            .as_deref()
            .and_then(match_locale)
            .unwrap_or(DEFAULT_LOCALE)
    }

    /// Message for `key`, or the key itself when no locale defines it.
    pub fn t(&self, key: &str) -> String {
        self.t_with(key, &[])
    }

    pub fn t_with(&self, key: &str, params: &[(&str, &str)]) -> String {
        let message = entries(self.resolved_locale())
            .and_then(|entries| find(entries, key))
            .or_else(|| entries(DEFAULT_LOCALE).and_then(|entries| find(entries, key)))
            .unwrap_or(key);
        format_template(message, params)
    }
}

#[cfg(feature = "i18n")]
fn system_locale() -> Option<String> {
    sys_locale::get_locale()
}

#[cfg(not(feature = "i18n"))]
fn system_locale() -> Option<String> {
    None
}

fn entries(locale: &str) -> Option<&'static [(&'static str, &'static str)]> {
    LOCALES
        .iter()
        .find(|(tag, _)| *tag == locale)
        .map(|(_, entries)| *entries)
}

fn find(entries: &[(&'static str, &'static str)], key: &str) -> Option<&'static str> {
    entries
        .iter()
        .find(|(entry, _)| *entry == key)
        .map(|(_, message)| *message)
}

fn match_locale(requested: &str) -> Option<&'static str> {
    let requested = normalize_tag(requested);
    let language = requested.split('-').next().unwrap_or_default();
    let exact = LOCALES
        .iter()
        .map(|(tag, _)| *tag)
        .find(|tag| normalize_tag(tag) == requested);
    exact.or_else(|| {
        LOCALES
            .iter()
            .map(|(tag, _)| *tag)
            .find(|tag| normalize_tag(tag).split('-').next() == Some(language))
    })
}

/// `zh_CN.UTF-8@euro` and `ZH-cn` both become `zh-cn`.
fn normalize_tag(tag: &str) -> String {
    let tag = tag.trim();
    let end = tag.find(['.', '@']).unwrap_or(tag.len());
    tag[..end]
        .split(['-', '_'])
        .filter(|part| !part.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// Replaces `{name}` placeholders; unknown or unclosed ones are kept as written.
pub(crate) fn format_template(template: &str, params: &[(&str, &str)]) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        output.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            output.push_str(&rest[open..]);
            return output;
        };
        let name = &after[..close];
        match params.iter().find(|(key, _)| *key == name) {
            Some((_, value)) => output.push_str(value),
            None => output.push_str(&rest[open..open + close + 2]),
        }
        rest = &after[close + 1..];
    }
    output.push_str(rest);
    output
}
