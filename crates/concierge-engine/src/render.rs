// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Default content collaborators.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use concierge_core::{ConciergeError, ContentSanitizer, TemplateRenderer};
use regex::{Captures, Regex};
use serde_json::Value;

/// `{{key}}` or `{{ nested.key }}`.
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_]+(?:\.[A-Za-z0-9_]+)*)\s*\}\}")
        .expect("placeholder pattern compiles")
});

/// Renders configured templates by substituting `{{key}}` placeholders
/// with values from the JSON payload. Dotted keys walk nested objects.
#[derive(Debug, Clone, Default)]
pub struct PlaceholderRenderer {
    templates: BTreeMap<String, String>,
}

impl PlaceholderRenderer {
    pub fn new(templates: BTreeMap<String, String>) -> Self {
        Self { templates }
    }

    fn render_text(
        template_id: &str,
        text: &str,
        payload: &Value,
    ) -> Result<String, ConciergeError> {
        let mut missing = Vec::new();
        let rendered = PLACEHOLDER.replace_all(text, |caps: &Captures<'_>| {
            let key = &caps[1];
            match lookup(payload, key) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => {
                    missing.push(key.to_string());
                    String::new()
                }
                Some(other) => other.to_string(),
            }
        });
        if !missing.is_empty() {
            return Err(ConciergeError::Validation(format!(
                "template `{template_id}` needs payload keys: {}",
                missing.join(", ")
            )));
        }
        Ok(rendered.into_owned())
    }
}

fn lookup<'a>(payload: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.').try_fold(payload, |value, part| value.get(part))
}

#[async_trait]
impl TemplateRenderer for PlaceholderRenderer {
    async fn render(&self, template_id: &str, payload: &Value) -> Result<String, ConciergeError> {
        let text = self
            .templates
            .get(template_id)
            .ok_or_else(|| ConciergeError::not_found("template", template_id))?;
        Self::render_text(template_id, text, payload)
    }
}

/// Stores inbound content unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughSanitizer;

#[async_trait]
impl ContentSanitizer for PassthroughSanitizer {
    async fn process(&self, content: &str, _message_id: &str) -> Result<String, ConciergeError> {
        Ok(content.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn renderer() -> PlaceholderRenderer {
        PlaceholderRenderer::new(BTreeMap::from([
            (
                "checkin".to_string(),
                "Hi {{guest.first_name}}, your door code is {{ code }}.".to_string(),
            ),
            ("plain".to_string(), "See you soon!".to_string()),
        ]))
    }

    #[tokio::test]
    async fn substitutes_nested_and_scalar_values() {
        let out = renderer()
            .render(
                "checkin",
                &json!({ "guest": { "first_name": "Ada" }, "code": 4821 }),
            )
            .await
            .unwrap();
        assert_eq!(out, "Hi Ada, your door code is 4821.");
    }

    #[tokio::test]
    async fn template_without_placeholders_ignores_payload() {
        let out = renderer().render("plain", &json!(null)).await.unwrap();
        assert_eq!(out, "See you soon!");
    }

    #[tokio::test]
    async fn missing_keys_are_reported() {
        let err = renderer()
            .render("checkin", &json!({ "guest": {} }))
            .await
            .unwrap_err();
        match err {
            ConciergeError::Validation(msg) => {
                assert!(msg.contains("guest.first_name"));
                assert!(msg.contains("code"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unknown_template_is_not_found() {
        let err = renderer().render("nope", &json!({})).await.unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn passthrough_keeps_content() {
        let out = PassthroughSanitizer.process("hello", "m1").await.unwrap();
        assert_eq!(out, "hello");
    }
}
