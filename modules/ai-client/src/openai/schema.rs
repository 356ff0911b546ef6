use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;

/// Types usable as a constrained structured-output response.
///
/// Automatically implemented for any `JsonSchema + DeserializeOwned` type.
pub trait StructuredOutput: JsonSchema + DeserializeOwned {
    /// Generate a provider-ready JSON schema for this type.
    ///
    /// Strict structured-output endpoints require:
    /// 1. `additionalProperties: false` on object schemas with fixed properties
    /// 2. every property listed in `required`, nullable ones included
    /// 3. fully inlined schemas (no `$ref`)
    fn response_schema() -> serde_json::Value {
        let schema = schema_for!(Self);
        let mut value = serde_json::to_value(schema).unwrap_or_default();

        let definitions = value.get("definitions").cloned();
        tighten(&mut value, definitions.as_ref());

        if let serde_json::Value::Object(map) = &mut value {
            map.remove("definitions");
            map.remove("$schema");
        }

        value
    }

    fn type_name() -> String {
        <Self as JsonSchema>::schema_name()
    }
}

impl<T: JsonSchema + DeserializeOwned> StructuredOutput for T {}

/// Recursively inline `$ref`s, collapse single-entry `allOf` wrappers, and
/// close object schemas that declare fixed properties. Map-style objects
/// (`additionalProperties` schemas with no `properties`) are left open.
fn tighten(value: &mut serde_json::Value, definitions: Option<&serde_json::Value>) {
    match value {
        serde_json::Value::Object(map) => {
            if let Some(serde_json::Value::String(ref_path)) = map.get("$ref").cloned() {
                if let Some(name) = ref_path.strip_prefix("#/definitions/") {
                    if let Some(def) = definitions.and_then(|d| d.get(name)) {
                        *value = def.clone();
                        tighten(value, definitions);
                        return;
                    }
                }
            }

            if let Some(serde_json::Value::Array(all_of)) = map.get("allOf").cloned() {
                if all_of.len() == 1 {
                    *value = all_of.into_iter().next().unwrap();
                    tighten(value, definitions);
                    return;
                }
            }

            let is_object = map.get("type") == Some(&serde_json::Value::String("object".into()));
            if is_object {
                if let Some(serde_json::Value::Object(props)) = map.get("properties") {
                    let all_keys: Vec<serde_json::Value> = props
                        .keys()
                        .map(|k| serde_json::Value::String(k.clone()))
                        .collect();
                    map.insert("required".to_string(), serde_json::Value::Array(all_keys));
                    map.insert(
                        "additionalProperties".to_string(),
                        serde_json::Value::Bool(false),
                    );
                }
            }

            for (_, v) in map.iter_mut() {
                tighten(v, definitions);
            }
        }
        serde_json::Value::Array(arr) => {
            for item in arr.iter_mut() {
                tighten(item, definitions);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::Deserialize;
    use std::collections::BTreeMap;

    #[derive(Deserialize, JsonSchema)]
    struct Inner {
        label: Option<String>,
        count: u32,
    }

    #[derive(Deserialize, JsonSchema)]
    struct Outer {
        items: Vec<Inner>,
        name: String,
    }

    #[test]
    fn test_all_properties_required_and_closed() {
        let schema = Outer::response_schema();
        let obj = schema.as_object().unwrap();

        assert!(!obj.contains_key("definitions"));
        assert!(!obj.contains_key("$schema"));
        assert_eq!(obj["additionalProperties"], serde_json::json!(false));

        let required: Vec<&str> = obj["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_str())
            .collect();
        assert!(required.contains(&"items"));
        assert!(required.contains(&"name"));
    }

    #[test]
    fn test_nested_refs_are_inlined() {
        let schema = Outer::response_schema();
        let text = serde_json::to_string(&schema).unwrap();
        assert!(!text.contains("$ref"));

        let inner = &schema["properties"]["items"]["items"];
        assert_eq!(inner["type"], serde_json::json!("object"));
        assert_eq!(inner["additionalProperties"], serde_json::json!(false));
        let required = inner["required"].as_array().unwrap();
        assert_eq!(required.len(), 2);
    }

    #[test]
    fn test_map_schemas_stay_open() {
        #[derive(Deserialize, JsonSchema)]
        struct WithMap {
            attributes: BTreeMap<String, String>,
        }

        let schema = WithMap::response_schema();
        let attrs = &schema["properties"]["attributes"];
        // A string-valued map keeps its additionalProperties schema.
        assert!(attrs["additionalProperties"].is_object());
    }
}
