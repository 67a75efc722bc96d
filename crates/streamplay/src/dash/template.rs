use regex::{Captures, Regex, Replacer};
use std::{collections::HashMap, sync::LazyLock};

// Identifiers are wrapped in `$`. `$$` is a literal dollar sign, and only `%0[width]d` is a
// permitted format tag.
//
// Example template: "$RepresentationID$/$Number%06d$.m4s"
static TEMPLATE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$([A-Za-z]*)(?:%0(\d+)d)?\$").unwrap());

/// Values substituted into `SegmentTemplate@media` and `@initialization`.
#[derive(Debug, Clone, Default)]
pub struct Template<'a> {
    args: HashMap<&'a str, String>,
}

impl<'a> Template<'a> {
    pub const REPRESENTATION_ID: &'static str = "RepresentationID";
    pub const NUMBER: &'static str = "Number";
    pub const TIME: &'static str = "Time";
    pub const BANDWIDTH: &'static str = "Bandwidth";

    pub fn new() -> Self {
        Self {
            args: HashMap::with_capacity(4),
        }
    }

    pub fn insert(&mut self, key: &'a str, value: String) -> &mut Self {
        self.args.insert(key, value);
        self
    }

    pub fn insert_optional(&mut self, key: &'a str, value: Option<String>) -> &mut Self {
        if let Some(value) = value {
            self.args.insert(key, value);
        }
        self
    }

    pub fn resolve(&self, template: &str) -> String {
        TEMPLATE_REGEX
            .replace_all(template, TemplateReplacer(&self.args))
            .into_owned()
    }
}

struct TemplateReplacer<'a, 'b>(&'a HashMap<&'b str, String>);

impl Replacer for TemplateReplacer<'_, '_> {
    fn replace_append(&mut self, caps: &Captures<'_>, dst: &mut String) {
        let whole = caps.get(0).map_or("", |m| m.as_str());
        let key = caps.get(1).map_or("", |m| m.as_str());
        if key.is_empty() {
            // `$$`, or a bare format tag which is left as is
            dst.push_str(if whole == "$$" { "$" } else { whole });
            return;
        }

        let Some(value) = self.0.get(key) else {
            dst.push_str(whole);
            return;
        };

        match caps.get(2).and_then(|m| m.as_str().parse::<usize>().ok()) {
            Some(width) => dst.push_str(&format!("{value:0>width$}")),
            None => dst.push_str(value),
        }
    }
}
