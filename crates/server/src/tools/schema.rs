//! JSON Schema builders for tool input definitions.

use serde_json::{json, Map, Value};

pub fn object(properties: Map<String, Value>, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

pub fn string(description: &str) -> Value {
    json!({ "type": "string", "description": description })
}

pub fn string_enum(description: &str, values: &[&str]) -> Value {
    json!({ "type": "string", "description": description, "enum": values })
}

pub fn string_array(description: &str) -> Value {
    json!({ "type": "array", "description": description, "items": { "type": "string" } })
}

pub fn integer(description: &str) -> Value {
    json!({ "type": "integer", "description": description })
}

pub fn integer_range(description: &str, min: u32, max: u32) -> Value {
    json!({ "type": "integer", "description": description, "minimum": min, "maximum": max })
}

pub fn number(description: &str) -> Value {
    json!({ "type": "number", "description": description })
}

pub fn number_range(description: &str, min: f64, max: f64) -> Value {
    json!({ "type": "number", "description": description, "minimum": min, "maximum": max })
}

pub fn boolean(description: &str, default: bool) -> Value {
    json!({ "type": "boolean", "description": description, "default": default })
}

/// Either a JSON object or a string holding one.
pub fn workflow_json(description: &str) -> Value {
    json!({
        "description": description,
        "anyOf": [{ "type": "object" }, { "type": "string" }],
    })
}

pub fn lora_list() -> Value {
    json!({
        "type": "array",
        "description": "LoRAs to chain between the model loader and its consumers, in order",
        "items": {
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "LoRA filename" },
                "strength_model": { "type": "number", "default": 1.0 },
                "strength_clip": { "type": "number", "default": 1.0 },
            },
            "required": ["name"],
        },
    })
}

/// Build a property map from `(name, schema)` pairs.
pub fn properties<const N: usize>(entries: [(&str, Value); N]) -> Map<String, Value> {
    entries
        .into_iter()
        .map(|(name, schema)| (name.to_string(), schema))
        .collect()
}
