//! Reduce generated JSON schemas to the subset remote planners accept.
//!
//! Planner function declarations and response schemas understand a small
//! OpenAPI-like dialect: no `$ref`, no `$schema`/`title`/`default`, no
//! `additionalProperties`, and optionality expressed as `nullable`.

use serde_json::{Map, Value};

const KEPT_KEYS: &[&str] = &[
    "type",
    "description",
    "enum",
    "items",
    "properties",
    "required",
    "nullable",
    "anyOf",
];

/// Inline `#/definitions/*` references and strip unsupported keywords.
pub fn clean_schema(schema: &Value) -> Value {
    let definitions = schema
        .get("definitions")
        .or_else(|| schema.get("$defs"))
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    inline(schema, &definitions, 0)
}

// Recursive types would otherwise never terminate.
const MAX_DEPTH: usize = 32;

fn inline(value: &Value, definitions: &Map<String, Value>, depth: usize) -> Value {
    let Value::Object(object) = value else {
        return value.clone();
    };
    if depth > MAX_DEPTH {
        return Value::Object(Map::new());
    }

    if let Some(target) = object.get("$ref").and_then(Value::as_str) {
        let mut resolved = match resolve_ref(target, definitions) {
            Some(found) => inline(found, definitions, depth + 1),
            None => Value::Object(Map::new()),
        };
        if let (Value::Object(map), Some(description)) = (&mut resolved, object.get("description"))
        {
            map.insert("description".to_string(), description.clone());
        }
        return resolved;
    }

    // schemars wraps a described `$ref` as `allOf: [ { $ref } ]`.
    if let Some(Value::Array(parts)) = object.get("allOf")
        && parts.len() == 1
    {
        let mut merged = inline(&parts[0], definitions, depth + 1);
        if let (Value::Object(map), Some(description)) = (&mut merged, object.get("description")) {
            map.insert("description".to_string(), description.clone());
        }
        return merged;
    }

    let mut out = Map::new();
    for (key, child) in object {
        if !KEPT_KEYS.contains(&key.as_str()) {
            continue;
        }

        match key.as_str() {
            "properties" => {
                let mut props = Map::new();
                if let Value::Object(entries) = child {
                    for (name, schema) in entries {
                        props.insert(name.clone(), inline(schema, definitions, depth + 1));
                    }
                }
                out.insert(key.clone(), Value::Object(props));
            }
            "items" => {
                out.insert(key.clone(), inline(child, definitions, depth + 1));
            }
            "anyOf" => {
                let variants = child.as_array().cloned().unwrap_or_default();
                let nullable = variants.iter().any(is_null_type);
                let mut rest: Vec<Value> = variants
                    .iter()
                    .filter(|variant| !is_null_type(variant))
                    .map(|variant| inline(variant, definitions, depth + 1))
                    .collect();
                if rest.len() == 1 {
                    if let Value::Object(single) = rest.remove(0) {
                        for (k, v) in single {
                            out.insert(k, v);
                        }
                    }
                } else {
                    out.insert(key.clone(), Value::Array(rest));
                }
                if nullable {
                    out.insert("nullable".to_string(), Value::Bool(true));
                }
            }
            "type" => match child {
                Value::Array(types) => {
                    let non_null: Vec<&Value> =
                        types.iter().filter(|t| t.as_str() != Some("null")).collect();
                    if non_null.len() != types.len() {
                        out.insert("nullable".to_string(), Value::Bool(true));
                    }
                    if let Some(first) = non_null.first() {
                        out.insert(key.clone(), (*first).clone());
                    }
                }
                other => {
                    out.insert(key.clone(), other.clone());
                }
            },
            _ => {
                out.insert(key.clone(), child.clone());
            }
        }
    }

    Value::Object(out)
}

fn resolve_ref<'a>(target: &str, definitions: &'a Map<String, Value>) -> Option<&'a Value> {
    let name = target
        .strip_prefix("#/definitions/")
        .or_else(|| target.strip_prefix("#/$defs/"))?;
    definitions.get(name)
}

fn is_null_type(value: &Value) -> bool {
    value.get("type").and_then(Value::as_str) == Some("null")
}
