//! Template-driven event formatting for console and file sinks.

use std::{borrow::Cow, fmt};

use chrono::{
    format::{Item, StrftimeItems},
    Local,
};
use tracing::{
    field::{Field, Visit},
    Event, Level, Subscriber,
};
use tracing_subscriber::{
    fmt::{format::Writer, FmtContext, FormatEvent, FormatFields},
    registry::LookupSpan,
};

use crate::error::CommandError;

/// Renders events through a `{placeholder}` template.
///
/// Recognised placeholders are `{asctime}`, `{levelname}`, `{name}`,
/// `{message}` and `{process}`. Unknown placeholders are left untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateFormat {
    template: String,
    datefmt: String,
}

impl TemplateFormat {
    /// Build a formatter, rejecting date formats chrono cannot render.
    pub fn new(template: &str, datefmt: &str) -> Result<Self, CommandError> {
        if StrftimeItems::new(datefmt).any(|item| matches!(item, Item::Error)) {
            return Err(CommandError::invalid_value(datefmt, "unsupported date format"));
        }
        Ok(Self {
            template: template.to_string(),
            datefmt: datefmt.to_string(),
        })
    }

    pub(crate) fn render_line(&self, level: &Level, target: &str, fields: &EventFields) -> String {
        let mut message = fields.message.clone();
        for (name, value) in &fields.extra {
            if !message.is_empty() {
                message.push(' ');
            }
            message.push_str(&format!("{name}={value}"));
        }
        render(&self.template, |key| match key {
            "asctime" => Some(Cow::Owned(Local::now().format(&self.datefmt).to_string())),
            "levelname" => Some(Cow::Borrowed(level_name(level))),
            "name" => Some(Cow::Borrowed(target)),
            "message" => Some(Cow::Borrowed(message.as_str())),
            "process" => Some(Cow::Owned(std::process::id().to_string())),
            _ => None,
        })
    }
}

impl<S, N> FormatEvent<S, N> for TemplateFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut fields = EventFields::default();
        event.record(&mut fields);
        let meta = event.metadata();
        writeln!(writer, "{}", self.render_line(meta.level(), meta.target(), &fields))
    }
}

/// Level names as written in configuration files.
pub fn level_name(level: &Level) -> &'static str {
    match level.as_str() {
        "WARN" => "WARNING",
        other => other,
    }
}

#[derive(Debug, Default)]
pub(crate) struct EventFields {
    message: String,
    extra: Vec<(&'static str, String)>,
}

impl Visit for EventFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.extra.push((field.name(), value.to_string()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.extra.push((field.name(), format!("{value:?}")));
        }
    }
}

fn render<'a, F>(template: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<Cow<'a, str>>,
{
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let key = &after[..close];
                match lookup(key) {
                    Some(value) => out.push_str(&value),
                    None => {
                        out.push('{');
                        out.push_str(key);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_substituted() {
        let fmt = TemplateFormat::new("[{levelname}] ({name}) {message}", "%H:%M").unwrap();
        let fields = EventFields {
            message: "node started".into(),
            extra: vec![("workers", "4".into())],
        };
        assert_eq!(
            fmt.render_line(&Level::WARN, "nodectl::cli", &fields),
            "[WARNING] (nodectl::cli) node started workers=4"
        );
    }

    #[test]
    fn unknown_and_unterminated_placeholders_survive() {
        let out = render("{known} {other} {tail", |key| {
            (key == "known").then(|| Cow::Borrowed("yes"))
        });
        assert_eq!(out, "yes {other} {tail");
    }

    #[test]
    fn process_placeholder_is_pid() {
        let fmt = TemplateFormat::new("{process}", "%Y").unwrap();
        let line = fmt.render_line(&Level::INFO, "t", &EventFields::default());
        assert_eq!(line, std::process::id().to_string());
    }

    #[test]
    fn bad_date_format_is_rejected() {
        assert!(matches!(
            TemplateFormat::new("{asctime}", "%Y %"),
            Err(CommandError::InvalidValue { .. })
        ));
    }
}
