use std::env;
use tracing::Level;

#[derive(Clone, Debug)]
pub(crate) struct ServiceContext {
    pub(crate) service_name: String,
    pub(crate) environment: String,
    pub(crate) component: String,
}

#[derive(Clone)]
pub(crate) struct TelegramAlertConfig {
    pub(crate) api_url: String,
    pub(crate) bot_token: String,
    pub(crate) chat_id: String,
    pub(crate) min_level: Level,
}

#[derive(Clone)]
pub(crate) struct ObservabilityConfig {
    pub(crate) service_context: ServiceContext,
    pub(crate) telegram: Option<TelegramAlertConfig>,
    /// Logged once tracing is up; parsing happens before a subscriber exists.
    pub(crate) warnings: Vec<String>,
}

impl ObservabilityConfig {
    pub(crate) fn from_env(component: &str) -> Self {
        Self::from_lookup(component, |key| env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(component: &str, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let component = component.trim().to_string();
        let service_context = ServiceContext {
            service_name: non_empty("SERVICE_NAME").unwrap_or_else(|| component.clone()),
            environment: non_empty("STAGE").unwrap_or_else(|| "unknown".to_string()),
            component,
        };

        let mut warnings = Vec::new();
        let telegram = telegram_from_lookup(&non_empty, &mut warnings);

        Self {
            service_context,
            telegram,
            warnings,
        }
    }
}

fn telegram_from_lookup<F>(lookup: &F, warnings: &mut Vec<String>) -> Option<TelegramAlertConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let enabled = match lookup("TELEGRAM_ALERTS_ENABLED") {
        None => false,
        Some(raw) => match parse_bool(&raw) {
            Some(value) => value,
            None => {
                warnings.push(format!(
                    "TELEGRAM_ALERTS_ENABLED is invalid (value: {raw}); alerts disabled"
                ));
                false
            }
        },
    };

    if !enabled {
        return None;
    }

    let (Some(bot_token), Some(chat_id)) = (
        lookup("TELEGRAM_ALERT_BOT_TOKEN"),
        lookup("TELEGRAM_ALERT_CHAT_ID"),
    ) else {
        warnings.push(
            "TELEGRAM_ALERTS_ENABLED is set but TELEGRAM_ALERT_BOT_TOKEN or TELEGRAM_ALERT_CHAT_ID is missing; alerts disabled"
                .to_string(),
        );
        return None;
    };

    let min_level = match lookup("TELEGRAM_ALERT_LEVEL") {
        None => Level::ERROR,
        Some(raw) => parse_level(&raw).unwrap_or_else(|| {
            warnings.push(format!(
                "TELEGRAM_ALERT_LEVEL is invalid (value: {raw}); defaulting to ERROR"
            ));
            Level::ERROR
        }),
    };

    Some(TelegramAlertConfig {
        api_url: lookup("TELEGRAM_API_URL")
            .unwrap_or_else(|| "https://api.telegram.org".to_string()),
        bot_token,
        chat_id,
        min_level,
    })
}

fn parse_level(input: &str) -> Option<Level> {
    match input.trim().to_ascii_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        _ => None,
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> ObservabilityConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ObservabilityConfig::from_lookup("backend", |key| vars.get(key).cloned())
    }

    #[test]
    fn alerts_are_off_by_default() {
        let config = config_from(&[]);
        assert!(config.telegram.is_none());
        assert!(config.warnings.is_empty());
        assert_eq!(config.service_context.service_name, "backend");
        assert_eq!(config.service_context.environment, "unknown");
    }

    #[test]
    fn enabled_without_credentials_warns() {
        let config = config_from(&[("TELEGRAM_ALERTS_ENABLED", "true")]);
        assert!(config.telegram.is_none());
        assert_eq!(config.warnings.len(), 1);
    }

    #[test]
    fn bad_level_falls_back_to_error() {
        let config = config_from(&[
            ("TELEGRAM_ALERTS_ENABLED", "yes"),
            ("TELEGRAM_ALERT_BOT_TOKEN", "123:abc"),
            ("TELEGRAM_ALERT_CHAT_ID", "-100"),
            ("TELEGRAM_ALERT_LEVEL", "loud"),
        ]);
        let telegram = config.telegram.expect("alerts configured");
        assert_eq!(telegram.min_level, Level::ERROR);
        assert_eq!(telegram.api_url, "https://api.telegram.org");
        assert_eq!(config.warnings.len(), 1);
    }
}
