//! Adapter configuration schemas, exposed as data.
//!
//! Every adapter describes its configuration fields so token-scoped config
//! editors can be generated without hard-coding per-adapter forms.
//! Validation runs before `search` is invoked; a failure surfaces as a
//! `config_error` outcome, never as a panic.

use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Integer,
    Boolean,
}

impl FieldKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Boolean => value.is_boolean(),
        }
    }

    fn label(self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::Boolean => "boolean",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigField {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    pub title: &'static str,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub description: &'static str,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ConfigField {
    pub fn required(name: &'static str, kind: FieldKind, title: &'static str) -> Self {
        Self {
            name,
            kind,
            title,
            description: "",
            required: true,
            default: None,
        }
    }

    pub fn optional(name: &'static str, kind: FieldKind, title: &'static str) -> Self {
        Self {
            name,
            kind,
            title,
            description: "",
            required: false,
            default: None,
        }
    }

    pub fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }
}

/// An ordered list of field descriptors. Empty for adapters that take no
/// configuration (the local cache).
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ConfigSchema {
    fields: Vec<ConfigField>,
}

impl ConfigSchema {
    pub fn new(fields: Vec<ConfigField>) -> Self {
        Self { fields }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn fields(&self) -> &[ConfigField] {
        &self.fields
    }

    /// Check required fields and field types. Unknown keys are ignored so
    /// stored configurations survive schema evolution.
    pub fn validate(&self, config: &Map<String, Value>) -> std::result::Result<(), String> {
        for field in &self.fields {
            match config.get(field.name) {
                None | Some(Value::Null) => {
                    if field.required && field.default.is_none() {
                        return Err(format!("缺少必填配置项: {}", field.name));
                    }
                }
                Some(value) => {
                    if !field.kind.matches(value) {
                        return Err(format!(
                            "配置项 {} 类型错误，应为 {}",
                            field.name,
                            field.kind.label()
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> ConfigSchema {
        ConfigSchema::new(vec![
            ConfigField::required("token", FieldKind::String, "用户凭证"),
            ConfigField::optional("search", FieldKind::Boolean, "联网搜索"),
            ConfigField::optional("query_type", FieldKind::Integer, "接口类型")
                .default_value(json!(1)),
        ])
    }

    fn config(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let err = schema().validate(&config(json!({"search": true}))).unwrap_err();
        assert!(err.contains("token"));
    }

    #[test]
    fn wrong_type_is_rejected() {
        let err = schema()
            .validate(&config(json!({"token": 42})))
            .unwrap_err();
        assert!(err.contains("token"));
    }

    #[test]
    fn defaults_satisfy_missing_optionals() {
        schema()
            .validate(&config(json!({"token": "abc"})))
            .unwrap();
    }

    #[test]
    fn unknown_keys_are_ignored() {
        schema()
            .validate(&config(json!({"token": "abc", "extra": [1, 2]})))
            .unwrap();
    }

    #[test]
    fn schema_serializes_for_config_editors() {
        let value = serde_json::to_value(schema()).unwrap();
        assert_eq!(value[0]["name"], "token");
        assert_eq!(value[0]["type"], "string");
        assert_eq!(value[0]["required"], true);
        assert_eq!(value[2]["default"], 1);
    }
}
