//! Proxy configuration.

use crate::error::{ProxyError, Result};
use crate::types::{RecordKind, RecordSchema};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Application credentials handed to the backend on initialization.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Credentials {
    pub server_url: String,
    pub app_id: String,
    pub javascript_key: String,
    pub master_key: Option<String>,
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:1337/parse".to_string(),
            app_id: String::new(),
            javascript_key: String::new(),
            master_key: None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("server_url", &self.server_url)
            .field("app_id", &self.app_id)
            .field("javascript_key", &"***")
            .field("master_key", &self.master_key.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Proxy configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProxyConfig {
    #[serde(flatten)]
    pub credentials: Credentials,

    /// Schema applied to inbound messages.
    /// Default: `MessageInbound` requiring `fromUserId` and `channel`.
    pub inbound: RecordSchema,

    /// Schema applied to outbound messages.
    /// Default: `MessageOutbound` requiring `toUserId` and `channel`.
    pub outbound: RecordSchema,

    /// Max buffered live events per subscription, read by
    /// `MemoryBackend::from_config`.
    /// Default: 1000
    pub subscription_buffer_size: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            inbound: RecordKind::Inbound.default_schema(),
            outbound: RecordKind::Outbound.default_schema(),
            subscription_buffer_size: 1000,
        }
    }
}

impl ProxyConfig {
    pub fn new(
        server_url: impl Into<String>,
        app_id: impl Into<String>,
        javascript_key: impl Into<String>,
    ) -> Self {
        Self {
            credentials: Credentials {
                server_url: server_url.into(),
                app_id: app_id.into(),
                javascript_key: javascript_key.into(),
                master_key: None,
            },
            ..Default::default()
        }
    }

    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: ProxyConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_master_key(mut self, master_key: impl Into<String>) -> Self {
        self.credentials.master_key = Some(master_key.into());
        self
    }

    /// Replace the schema used for one direction.
    pub fn with_schema(mut self, kind: RecordKind, schema: RecordSchema) -> Self {
        match kind {
            RecordKind::Inbound => self.inbound = schema,
            RecordKind::Outbound => self.outbound = schema,
        }
        self
    }

    /// Use the earlier `type`-based schemas for both directions.
    pub fn with_legacy_schemas(self) -> Self {
        self.with_schema(RecordKind::Inbound, RecordKind::Inbound.legacy_schema())
            .with_schema(RecordKind::Outbound, RecordKind::Outbound.legacy_schema())
    }

    pub fn schema(&self, kind: RecordKind) -> &RecordSchema {
        match kind {
            RecordKind::Inbound => &self.inbound,
            RecordKind::Outbound => &self.outbound,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.credentials.server_url.is_empty() {
            return Err(ProxyError::Config("serverUrl is empty".to_string()));
        }
        if self.credentials.app_id.is_empty() {
            return Err(ProxyError::Config("appId is empty".to_string()));
        }
        for schema in [&self.inbound, &self.outbound] {
            if schema.class_name.is_empty() {
                return Err(ProxyError::Config("schema class name is empty".to_string()));
            }
            if schema.required_keys.is_empty() {
                return Err(ProxyError::Config(format!(
                    "{} has no required keys",
                    schema.class_name
                )));
            }
        }
        if self.subscription_buffer_size == 0 {
            return Err(ProxyError::Config(
                "subscriptionBufferSize must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_defaults() {
        let config = ProxyConfig::from_json(
            r#"{"serverUrl": "http://parse.local/parse", "appId": "app", "javascriptKey": "js"}"#,
        )
        .unwrap();

        assert_eq!(config.credentials.server_url, "http://parse.local/parse");
        assert_eq!(config.credentials.master_key, None);
        assert_eq!(config.inbound, RecordKind::Inbound.default_schema());
        assert_eq!(config.outbound, RecordKind::Outbound.default_schema());
        assert_eq!(config.subscription_buffer_size, 1000);
    }

    #[test]
    fn test_from_json_custom_schema() {
        let config = ProxyConfig::from_json(
            r#"{
                "serverUrl": "http://parse.local/parse",
                "appId": "app",
                "javascriptKey": "js",
                "masterKey": "master",
                "outbound": {"className": "MessageOutbound", "requiredKeys": ["toUserId", "type"]}
            }"#,
        )
        .unwrap();

        assert_eq!(config.credentials.master_key.as_deref(), Some("master"));
        assert_eq!(config.outbound.required_keys, vec!["toUserId", "type"]);
        assert_eq!(config.inbound, RecordKind::Inbound.default_schema());
    }

    #[test]
    fn test_validate_rejects_empty_app_id() {
        let result = ProxyConfig::from_json(r#"{"serverUrl": "http://x", "javascriptKey": "js"}"#);
        assert!(matches!(result, Err(ProxyError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_empty_required_keys() {
        let config = ProxyConfig::new("http://x", "app", "js")
            .with_schema(RecordKind::Inbound, RecordSchema::new("MessageInbound", Vec::<String>::new()));
        assert!(matches!(config.validate(), Err(ProxyError::Config(_))));
    }

    #[test]
    fn test_legacy_schemas() {
        let config = ProxyConfig::new("http://x", "app", "js").with_legacy_schemas();
        assert_eq!(config.schema(RecordKind::Inbound).required_keys, vec!["fromUserId", "type"]);
        assert_eq!(config.schema(RecordKind::Outbound).required_keys, vec!["toUserId", "type"]);
    }

    #[test]
    fn test_debug_hides_keys() {
        let config = ProxyConfig::new("http://x", "app", "secret-js").with_master_key("secret-master");
        let debug = format!("{:?}", config.credentials);
        assert!(!debug.contains("secret"));
    }
}
