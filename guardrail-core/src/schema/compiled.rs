//! JSON Schema validation backed by the `jsonschema` crate

use jsonschema::error::ValidationErrorKind;
use jsonschema::paths::{JSONPointer, PathChunk};
use jsonschema::JSONSchema;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{SchemaValidator, SchemaViolation, ValidationReport};

/// Compiles each distinct schema once and validates against the cached
/// compiled form.
///
/// Schemas are keyed by their serialized text, so the per-operation input
/// and output schemas of a document compile on first use and are reused for
/// every later call. A schema that fails to compile rejects every value with
/// a single violation at `$`.
#[derive(Default)]
pub struct CompiledValidator {
    cache: Mutex<HashMap<String, Arc<JSONSchema>>>,
}

impl std::fmt::Debug for CompiledValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledValidator")
            .field("cached", &self.cached())
            .finish()
    }
}

impl CompiledValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of compiled schemas held
    pub fn cached(&self) -> usize {
        self.cache.lock().map(|cache| cache.len()).unwrap_or(0)
    }

    fn compiled(&self, schema: &Value) -> std::result::Result<Arc<JSONSchema>, String> {
        let key = schema.to_string();
        let mut cache = self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(compiled) = cache.get(&key) {
            return Ok(compiled.clone());
        }

        let compiled = JSONSchema::compile(schema)
            .map(Arc::new)
            .map_err(|err| format!("invalid schema: {}", err))?;
        tracing::debug!(cached = cache.len() + 1, "Compiled schema");
        cache.insert(key, compiled.clone());
        Ok(compiled)
    }
}

impl SchemaValidator for CompiledValidator {
    fn validate(&self, schema: &Value, value: &Value) -> ValidationReport {
        let compiled = match self.compiled(schema) {
            Ok(compiled) => compiled,
            Err(message) => {
                return ValidationReport::from_errors(vec![SchemaViolation::new("$", message)]);
            }
        };

        let violations = match compiled.validate(value) {
            Ok(()) => Vec::new(),
            Err(errors) => errors
                .map(|err| {
                    let mut path = json_path(&err.instance_path);
                    // report a missing property at the property, not its parent
                    if let ValidationErrorKind::Required { property } = &err.kind {
                        if let Some(name) = property.as_str() {
                            path = format!("{}.{}", path, name);
                        }
                    }
                    SchemaViolation::new(path, err.to_string())
                })
                .collect(),
        };
        ValidationReport::from_errors(violations)
    }
}

/// `/tags/1` → `$.tags[1]`
fn json_path(pointer: &JSONPointer) -> String {
    let mut path = String::from("$");
    for chunk in pointer.iter() {
        match chunk {
            PathChunk::Property(name) => {
                path.push('.');
                path.push_str(name);
            }
            PathChunk::Index(index) => path.push_str(&format!("[{}]", index)),
            PathChunk::Keyword(keyword) => {
                path.push('.');
                path.push_str(keyword);
            }
        }
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item_schema() -> Value {
        json!({
            "type": "object",
            "required": ["name", "qty"],
            "properties": {
                "name": {"type": "string", "minLength": 1},
                "qty": {"type": "integer", "minimum": 0},
                "tags": {"type": "array", "items": {"type": "string"}, "maxItems": 2},
                "status": {"enum": ["open", "closed"]}
            },
            "additionalProperties": false
        })
    }

    fn paths(report: &ValidationReport) -> Vec<&str> {
        report.errors.iter().map(|e| e.path.as_str()).collect()
    }

    #[test]
    fn test_valid_value() {
        let report = CompiledValidator::new()
            .validate(&item_schema(), &json!({"name": "bolt", "qty": 3, "tags": ["m4"]}));
        assert!(report.valid, "{:?}", report.errors);
    }

    #[test]
    fn test_missing_required_and_wrong_type() {
        let report = CompiledValidator::new().validate(&item_schema(), &json!({"qty": "three"}));
        assert!(!report.valid);
        let paths = paths(&report);
        assert!(paths.contains(&"$.name"), "{:?}", paths);
        assert!(paths.contains(&"$.qty"), "{:?}", paths);
    }

    #[test]
    fn test_nested_array_paths() {
        let report = CompiledValidator::new().validate(
            &item_schema(),
            &json!({"name": "bolt", "qty": 1, "tags": ["a", 2, "c"]}),
        );
        let paths = paths(&report);
        assert!(paths.contains(&"$.tags[1]"), "{:?}", paths);
        assert!(paths.contains(&"$.tags"), "{:?}", paths);
    }

    #[test]
    fn test_additional_properties_and_enum() {
        let report = CompiledValidator::new().validate(
            &item_schema(),
            &json!({"name": "bolt", "qty": 1, "status": "lost", "color": "red"}),
        );
        assert!(!report.valid);
        assert!(paths(&report).contains(&"$.status"));
        assert!(report.errors.iter().any(|e| e.message.contains("color")));
    }

    #[test]
    fn test_pattern_combinators_and_exclusive_bounds() {
        let schema = json!({
            "type": "object",
            "properties": {
                "email": {"type": "string", "pattern": "^[^@]+@[^@]+$"},
                "role": {"anyOf": [{"const": "admin"}, {"const": "user"}]},
                "age": {"type": "integer", "exclusiveMinimum": 0},
                "step": {"type": "number", "multipleOf": 5}
            }
        });
        let validator = CompiledValidator::new();

        let good = json!({"email": "a@b", "role": "user", "age": 1, "step": 10});
        assert!(validator.validate(&schema, &good).valid);

        let bad = json!({"email": "not-an-email", "role": "root", "age": 0, "step": 7});
        let report = validator.validate(&schema, &bad);
        let paths = paths(&report);
        for expected in ["$.email", "$.role", "$.age", "$.step"] {
            assert!(paths.contains(&expected), "missing {} in {:?}", expected, paths);
        }
    }

    #[test]
    fn test_local_refs() {
        let schema = json!({
            "definitions": {"id": {"type": "integer", "minimum": 1}},
            "type": "object",
            "properties": {"id": {"$ref": "#/definitions/id"}}
        });
        let validator = CompiledValidator::new();
        assert!(validator.validate(&schema, &json!({"id": 3})).valid);
        assert!(!validator.validate(&schema, &json!({"id": 0})).valid);
    }

    #[test]
    fn test_schemas_compile_once() {
        let validator = CompiledValidator::new();
        for qty in 0..5 {
            validator.validate(&item_schema(), &json!({"name": "bolt", "qty": qty}));
        }
        assert_eq!(validator.cached(), 1);

        validator.validate(&json!({"type": "string"}), &json!("x"));
        assert_eq!(validator.cached(), 2);
    }

    #[test]
    fn test_invalid_schema_rejects() {
        let report = CompiledValidator::new().validate(&json!({"type": 12}), &json!(1));
        assert!(!report.valid);
        assert_eq!(report.errors[0].path, "$");
        assert!(report.errors[0].message.starts_with("invalid schema"));
    }

    #[test]
    fn test_empty_schema_accepts_anything() {
        let validator = CompiledValidator::new();
        assert!(validator.validate(&json!({}), &json!([1, "two"])).valid);
        assert!(!validator.validate(&json!(false), &json!(1)).valid);
    }
}
