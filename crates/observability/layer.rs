use super::config::ServiceContext;
use super::alert_queue::{AlertEvent, AlertQueue, SpanContext};
use chrono::Utc;
use std::collections::BTreeMap;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;

const SENSITIVE_MARKERS: [&str; 7] = [
    "secret",
    "password",
    "token",
    "authorization",
    "api_key",
    "webhook_url",
    "credential",
];

/// Turns events at or above `min_level` into alert notifications, carrying span fields along.
#[derive(Clone)]
pub(crate) struct AlertLayer {
    alerts: AlertQueue,
    service_context: ServiceContext,
    min_level: Level,
}

impl AlertLayer {
    pub(crate) fn new(alerts: AlertQueue, service_context: ServiceContext, min_level: Level) -> Self {
        Self {
            alerts,
            service_context,
            min_level,
        }
    }
}

#[derive(Default)]
struct RedactingVisitor {
    values: BTreeMap<String, String>,
}

impl RedactingVisitor {
    fn insert(&mut self, field: &Field, value: String) {
        let name = field.name();
        let value = if is_sensitive_key(name) {
            "[REDACTED]".to_string()
        } else {
            value
        };
        self.values.insert(name.to_string(), value);
    }
}

impl Visit for RedactingVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.insert(field, format!("{value:?}"));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, value.to_string());
    }
}

struct SpanFields(BTreeMap<String, String>);

impl<S> Layer<S> for AlertLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut visitor = RedactingVisitor::default();
        attrs.record(&mut visitor);

        if let (false, Some(span)) = (visitor.values.is_empty(), ctx.span(id)) {
            span.extensions_mut().insert(SpanFields(visitor.values));
        }
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };

        let mut visitor = RedactingVisitor::default();
        values.record(&mut visitor);
        if visitor.values.is_empty() {
            return;
        }

        let mut extensions = span.extensions_mut();
        if let Some(existing) = extensions.get_mut::<SpanFields>() {
            existing.0.extend(visitor.values);
        } else {
            extensions.insert(SpanFields(visitor.values));
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if *metadata.level() > self.min_level {
            return;
        }

        let mut visitor = RedactingVisitor::default();
        event.record(&mut visitor);
        let message = visitor
            .values
            .remove("message")
            .map(|raw| unquote_debug_string(&raw));

        let spans = ctx
            .event_span(event)
            .map(|span| {
                span.scope()
                    .from_root()
                    .map(|s| SpanContext {
                        name: s.metadata().name().to_string(),
                        fields: s
                            .extensions()
                            .get::<SpanFields>()
                            .map(|fields| fields.0.clone())
                            .unwrap_or_default(),
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        self.alerts.enqueue(AlertEvent {
            level: *metadata.level(),
            timestamp: Utc::now(),
            service_name: self.service_context.service_name.clone(),
            environment: self.service_context.environment.clone(),
            component: self.service_context.component.clone(),
            target: metadata.target().to_string(),
            file: metadata.file().map(str::to_string),
            line: metadata.line(),
            message,
            fields: visitor.values,
            spans,
        });
    }
}

fn unquote_debug_string(input: &str) -> String {
    let trimmed = input.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(trimmed)
        .to_string()
}

fn is_sensitive_key(field_name: &str) -> bool {
    let field = field_name.to_ascii_lowercase();
    SENSITIVE_MARKERS.iter().any(|marker| field.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_are_recognised_by_field_name() {
        assert!(is_sensitive_key("secret_key"));
        assert!(is_sensitive_key("Bot_Token"));
        assert!(is_sensitive_key("authorization_header"));
        assert!(!is_sensitive_key("payment_id"));
        assert!(!is_sensitive_key("shop_id"));
    }

    #[test]
    fn debug_strings_lose_their_quotes() {
        assert_eq!(unquote_debug_string("\"sweep failed\""), "sweep failed");
        assert_eq!(unquote_debug_string("plain"), "plain");
        assert_eq!(unquote_debug_string("\""), "\"");
    }
}
