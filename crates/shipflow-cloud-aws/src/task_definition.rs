//! タスク定義ファイルの変換
//!
//! リポジトリのタスク定義ファイル (YAML / JSON, snake_case でも camelCase でも可)
//! を `aws ecs register-task-definition --cli-input-json` の入力に変換する。

use crate::error::{AwsError, Result};
use serde_json::{Map, Value, json};

/// デプロイIDに置換されるプレースホルダ
pub const TAG_PLACEHOLDER: &str = "{{TAG}}";

/// 値が自由形式のマップになっているキー (子のキーは変換しない)
const FREE_FORM_KEYS: &[&str] = &["dockerLabels", "options", "labels", "driverOpts"];

/// タスク定義ファイルを登録用の JSON に変換
pub fn to_register_input(content: &str, deploy_id: &str, tag_key: &str) -> Result<Value> {
    let rendered = content.replace(TAG_PLACEHOLDER, deploy_id);
    let parsed: Value = serde_yaml::from_str(&rendered)?;

    let Value::Object(map) = camelize_keys(parsed) else {
        return Err(AwsError::InvalidTaskDefinition(
            "task definition must be a mapping".to_string(),
        ));
    };
    let mut map = map;

    if !map.get("family").is_some_and(Value::is_string) {
        return Err(AwsError::InvalidTaskDefinition(
            "\"family\" is required".to_string(),
        ));
    }

    let mut tags = match map.remove("tags") {
        Some(Value::Array(tags)) => tags,
        Some(Value::Null) | None => Vec::new(),
        Some(_) => {
            return Err(AwsError::InvalidTaskDefinition(
                "\"tags\" must be a list".to_string(),
            ));
        }
    };
    tags.retain(|tag| tag.get("key").and_then(Value::as_str) != Some(tag_key));
    tags.push(json!({ "key": tag_key, "value": deploy_id }));
    map.insert("tags".to_string(), Value::Array(tags));

    Ok(Value::Object(map))
}

fn camelize_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let converted: Map<String, Value> = map
                .into_iter()
                .map(|(key, value)| {
                    let key = to_camel_case(&key);
                    let value = if FREE_FORM_KEYS.contains(&key.as_str()) {
                        value
                    } else {
                        camelize_keys(value)
                    };
                    (key, value)
                })
                .collect();
            Value::Object(converted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(camelize_keys).collect()),
        other => other,
    }
}

fn to_camel_case(key: &str) -> String {
    let mut result = String::with_capacity(key.len());
    let mut upper_next = false;
    for c in key.chars() {
        if c == '_' && !result.is_empty() {
            upper_next = true;
        } else if upper_next {
            result.extend(c.to_uppercase());
            upper_next = false;
        } else {
            result.push(c);
        }
    }
    result
}
