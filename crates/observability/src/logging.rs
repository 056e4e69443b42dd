//! Subscriber setup.

use eyre::WrapErr;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::LoggingConfig;

const CRATE_TARGETS: [&str; 4] = [
    "aster_net_primitives",
    "aster_net_handshake",
    "aster_net_peers",
    "aster_observability",
];

/// Filter for `config`: `RUST_LOG` when set, else info with aster crates at the configured
/// level. Configured directives apply on top; unparsable ones are skipped.
pub fn build_filter(config: &LoggingConfig) -> EnvFilter {
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = config.level;
        let crates = CRATE_TARGETS
            .iter()
            .map(|target| format!("{target}={level}"))
            .collect::<Vec<_>>()
            .join(",");
        EnvFilter::new(format!("info,{crates}"))
    });

    for directive in &config.directives {
        if let Ok(d) = directive.parse() {
            filter = filter.add_directive(d);
        }
    }
    filter
}

/// Install the global subscriber. Fails if one is already set.
pub fn init_logging(config: &LoggingConfig) -> eyre::Result<()> {
    if !config.enabled {
        return Ok(());
    }

    let layer = fmt::Layer::new().with_target(true);
    let layer = if config.json {
        layer.json().boxed()
    } else {
        layer.with_ansi(config.ansi).boxed()
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(build_filter(config))
        .try_init()
        .wrap_err("failed to install tracing subscriber")?;

    tracing::debug!(level = %config.level, json = config.json, "logging initialised");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LogLevel;

    #[test]
    fn test_config_from_toml() {
        let config: LoggingConfig = toml::from_str(
            r#"
            level = "debug"
            json = true
            directives = ["aster_net_handshake=trace"]
            "#,
        )
        .unwrap();
        assert!(config.enabled);
        assert_eq!(config.level, LogLevel::Debug);
        assert!(config.json);
        assert_eq!(config.directives.len(), 1);

        let empty: LoggingConfig = toml::from_str("").unwrap();
        assert_eq!(empty, LoggingConfig::default());
    }

    #[test]
    fn test_filter_skips_bad_directives() {
        let config = LoggingConfig {
            directives: vec!["aster_net_peers=trace".into(), "=[=".into()],
            ..Default::default()
        };
        let rendered = build_filter(&config).to_string();
        assert!(rendered.contains("aster_net_peers=trace"));
    }

    #[test]
    fn test_disabled_installs_nothing() {
        let config = LoggingConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(init_logging(&config).is_ok());
    }

    #[test]
    fn test_second_init_fails() {
        let config = LoggingConfig {
            ansi: false,
            ..Default::default()
        };
        // The first call may lose to another test in this binary; the second never wins.
        let _ = init_logging(&config);
        assert!(init_logging(&config).is_err());
    }
}
