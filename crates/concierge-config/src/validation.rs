// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks semantic constraints serde attributes cannot express: positive
//! limits, parseable channel names, well-formed URLs.

use std::str::FromStr;

use concierge_core::Channel;

use crate::diagnostic::ConfigError;
use crate::model::ConciergeConfig;

/// Validate a deserialized configuration.
///
/// Collects every failure instead of stopping at the first one.
pub fn validate_config(config: &ConciergeConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    let messaging = &config.messaging;
    if messaging.max_content_chars == 0 {
        fail("messaging.max_content_chars must be greater than 0".to_string());
    }
    if messaging.max_content_chars_with_image < messaging.max_content_chars {
        fail(format!(
            "messaging.max_content_chars_with_image ({}) must be at least messaging.max_content_chars ({})",
            messaging.max_content_chars_with_image, messaging.max_content_chars
        ));
    }
    if messaging.preview_chars < 4 {
        fail(format!(
            "messaging.preview_chars must be at least 4, got {}",
            messaging.preview_chars
        ));
    }
    if messaging.send_timeout_secs == 0 {
        fail("messaging.send_timeout_secs must be greater than 0".to_string());
    }

    if config.echo.window_minutes <= 0 {
        fail(format!(
            "echo.window_minutes must be positive, got {}",
            config.echo.window_minutes
        ));
    }

    if config.unsend.window_minutes < 0 {
        fail(format!(
            "unsend.window_minutes must be non-negative, got {}",
            config.unsend.window_minutes
        ));
    }
    for name in &config.unsend.allowed_channels {
        if Channel::from_str(name).is_err() {
            fail(format!("unsend.allowed_channels contains unknown channel `{name}`"));
        }
    }

    let scheduler = &config.scheduler;
    if scheduler.batch_size == 0 {
        fail("scheduler.batch_size must be greater than 0".to_string());
    }
    if scheduler.poll_interval_secs == 0 {
        fail("scheduler.poll_interval_secs must be greater than 0".to_string());
    }
    if scheduler.lease_secs == 0 {
        fail("scheduler.lease_secs must be greater than 0".to_string());
    }
    // A whole batch must finish inside one lease even if every send times out.
    let worst_batch_secs = u64::try_from(scheduler.batch_size)
        .unwrap_or(u64::MAX)
        .saturating_mul(messaging.send_timeout_secs);
    if scheduler.batch_size > 0 && scheduler.lease_secs <= worst_batch_secs {
        fail(format!(
            "scheduler.lease_secs ({}) must exceed scheduler.batch_size ({}) x \
             messaging.send_timeout_secs ({}) = {worst_batch_secs}",
            scheduler.lease_secs, scheduler.batch_size, messaging.send_timeout_secs
        ));
    }

    for (section, base_url) in [
        ("gateway", config.gateway.base_url.as_deref()),
        ("relay", config.relay.base_url.as_deref()),
    ] {
        if let Some(url) = base_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                fail(format!(
                    "{section}.base_url must start with http:// or https://, got `{url}`"
                ));
            }
        }
    }

    for (id, text) in &config.templates {
        if text.trim().is_empty() {
            fail(format!("templates.{id} must not be empty"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_error(errors: &[ConfigError], needle: &str) -> bool {
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains(needle)))
    }

    #[test]
    fn default_config_validates() {
        let config = ConciergeConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = ConciergeConfig::default();
        config.storage.database_path = "".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "database_path"));
    }

    #[test]
    fn image_limit_below_text_limit_fails() {
        let mut config = ConciergeConfig::default();
        config.messaging.max_content_chars_with_image = 10;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "max_content_chars_with_image"));
    }

    #[test]
    fn unknown_unsend_channel_fails() {
        let mut config = ConciergeConfig::default();
        config.unsend.allowed_channels = vec!["inapp".into(), "pigeon".into()];
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "pigeon"));
    }

    #[test]
    fn non_http_gateway_url_fails() {
        let mut config = ConciergeConfig::default();
        config.gateway.base_url = Some("ftp://gateway".into());
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "gateway.base_url"));
    }

    #[test]
    fn parsed_toml_with_bad_unsend_channel_fails() {
        let toml_str = r#"
            [unsend]
            window_minutes = 5
            allowed_channels = ["inapp", "fax"]

            [templates]
            checkin = "Hi {{guest}}"
        "#;
        let config: ConciergeConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.templates.len(), 1);
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "fax"));
    }

    #[test]
    fn unknown_section_is_rejected_at_parse_time() {
        let result = toml::from_str::<ConciergeConfig>("[webhooks]\nsecret = \"x\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn lease_shorter_than_worst_case_batch_fails() {
        let mut config = ConciergeConfig::default();
        config.scheduler.batch_size = 25;
        config.messaging.send_timeout_secs = 15;
        config.scheduler.lease_secs = 375;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "scheduler.lease_secs (375)"));

        config.scheduler.lease_secs = 376;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn collects_all_errors() {
        let mut config = ConciergeConfig::default();
        config.echo.window_minutes = 0;
        config.scheduler.batch_size = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}
