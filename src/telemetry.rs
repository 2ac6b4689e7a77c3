//! Logging and metrics bootstrap for the Lightlog binary.

use crate::{Error, Result};

use opentelemetry::global;
use opentelemetry::KeyValue;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::Resource;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

const ATTR_SERVICE_NAME: &str = "service.name";
const ATTR_SERVICE_NAMESPACE: &str = "service.namespace";
const ATTR_SERVICE_VERSION: &str = "service.version";
const ATTR_STORE_ROOT: &str = "lightlog.store_root";

/// Log line encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" | "pretty" => Ok(Self::Text),
            other => Err(format!("unknown log format '{}'; expected json or text", other)),
        }
    }
}

/// Parsed telemetry configuration from environment.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub resource_attributes: Vec<KeyValue>,
}

impl TelemetryConfig {
    /// Read `OTEL_SERVICE_NAME` and `OTEL_RESOURCE_ATTRIBUTES`, then add the
    /// store root so metrics from several stores on one host stay apart.
    pub fn from_env(default_service_name: &str, store_root: &Path) -> Result<Self> {
        let attrs = std::env::var("OTEL_RESOURCE_ATTRIBUTES").ok();
        Self::from_parts(
            std::env::var("OTEL_SERVICE_NAME").ok().as_deref(),
            attrs.as_deref(),
            default_service_name,
            store_root,
        )
    }

    fn from_parts(
        service_name: Option<&str>,
        resource_attributes: Option<&str>,
        default_service_name: &str,
        store_root: &Path,
    ) -> Result<Self> {
        let service_name = service_name.unwrap_or(default_service_name).trim();
        if service_name.is_empty() {
            return Err(Error::Config(
                "OTEL_SERVICE_NAME cannot be empty".to_string(),
            ));
        }

        let mut attr_map: BTreeMap<String, String> = BTreeMap::new();
        if let Some(attr_str) = resource_attributes {
            for (key, value) in parse_resource_attributes(attr_str)? {
                attr_map.insert(key, value);
            }
        }
        attr_map.insert(ATTR_SERVICE_NAME.to_string(), service_name.to_string());
        attr_map
            .entry(ATTR_SERVICE_NAMESPACE.to_string())
            .or_insert_with(|| "lightlog".to_string());
        attr_map
            .entry(ATTR_SERVICE_VERSION.to_string())
            .or_insert_with(|| env!("CARGO_PKG_VERSION").to_string());
        attr_map.insert(
            ATTR_STORE_ROOT.to_string(),
            store_root.display().to_string(),
        );

        Ok(Self {
            service_name: service_name.to_string(),
            resource_attributes: attr_map
                .into_iter()
                .map(|(k, v)| KeyValue::new(k, v))
                .collect(),
        })
    }
}

/// Handle that keeps the meter provider alive for process lifetime.
pub struct Telemetry {
    config: TelemetryConfig,
    meter_provider: SdkMeterProvider,
}

impl Telemetry {
    /// Install the tracing subscriber and the global meter provider.
    pub fn init(
        default_service_name: &str,
        store_root: &Path,
        log_level: &str,
        format: LogFormat,
    ) -> Result<Self> {
        let config = TelemetryConfig::from_env(default_service_name, store_root)?;
        let level = parse_log_level(log_level)?;

        let builder = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .with_thread_ids(true);
        let installed = match format {
            LogFormat::Json => builder.json().try_init(),
            LogFormat::Text => builder.try_init(),
        };
        installed.map_err(|e| {
            Error::Config(format!("failed to initialize telemetry subscriber: {e}"))
        })?;

        let resource =
            Resource::default().merge(&Resource::new(config.resource_attributes.clone()));
        let meter_provider = SdkMeterProvider::builder().with_resource(resource).build();
        global::set_meter_provider(meter_provider.clone());

        info!(
            service_name = %config.service_name,
            log_level = %level,
            "Telemetry bootstrap initialized"
        );

        Ok(Self {
            config,
            meter_provider,
        })
    }

    pub fn service_name(&self) -> &str {
        &self.config.service_name
    }
}

impl Drop for Telemetry {
    fn drop(&mut self) {
        let _ = self.meter_provider.shutdown();
    }
}

fn parse_log_level(raw: &str) -> Result<Level> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => Err(Error::Config(format!(
            "invalid log level '{other}', expected one of [trace, debug, info, warn, error]"
        ))),
    }
}

fn parse_resource_attributes(raw: &str) -> Result<Vec<(String, String)>> {
    let mut attrs = Vec::new();
    for pair in raw.split(',') {
        let trimmed = pair.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Some((key, value)) = trimmed.split_once('=') else {
            return Err(Error::Config(format!(
                "OTEL_RESOURCE_ATTRIBUTES entry '{trimmed}' is invalid, expected key=value"
            )));
        };

        let key = key.trim();
        if key.is_empty() {
            return Err(Error::Config(
                "OTEL_RESOURCE_ATTRIBUTES contains an empty attribute key".to_string(),
            ));
        }

        attrs.push((key.to_string(), value.trim().to_string()));
    }
    Ok(attrs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_resource_attributes_accepts_valid_input() {
        let attrs = parse_resource_attributes("host.name=pi,deployment=home").unwrap();
        assert_eq!(
            attrs,
            vec![
                ("host.name".to_string(), "pi".to_string()),
                ("deployment".to_string(), "home".to_string())
            ]
        );
    }

    #[test]
    fn parse_resource_attributes_rejects_invalid_pairs() {
        let err = parse_resource_attributes("broken").unwrap_err();
        assert!(format!("{err}").contains("key=value"));
    }

    #[test]
    fn parse_log_level_is_case_insensitive() {
        assert_eq!(parse_log_level(" WARN ").unwrap(), Level::WARN);
        assert!(parse_log_level("loud").is_err());
    }

    #[test]
    fn log_format_parses() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn resource_carries_store_root_and_version() {
        let config = TelemetryConfig::from_parts(
            None,
            Some("deployment=home,service.version=custom"),
            "lightlog",
            Path::new("/var/lib/lightlog"),
        )
        .unwrap();
        let attr = |key: &str| {
            config
                .resource_attributes
                .iter()
                .find(|kv| kv.key.as_str() == key)
                .map(|kv| kv.value.as_str().into_owned())
        };

        assert_eq!(config.service_name, "lightlog");
        assert_eq!(attr("lightlog.store_root").as_deref(), Some("/var/lib/lightlog"));
        assert_eq!(attr("service.version").as_deref(), Some("custom"));
        assert_eq!(attr("deployment").as_deref(), Some("home"));
        assert!(TelemetryConfig::from_parts(Some("  "), None, "lightlog", Path::new("/s")).is_err());
    }
}
