//! # stepwise-schema
//!
//! The schema/type bridge of the stepwise runtime.
//!
//! A `Schema` describes the shape of UDF inputs and outputs. From one tree it
//! produces:
//!
//! - a prompt-facing **type string** (`Schema::type_string`) and full
//!   **function signature** (`function_signature`);
//! - a **validator** backed by the `jsonschema` crate (`Schema::validate`);
//! - a **default instance** (`Schema::default_instance`);
//! - the reverse direction, **schema from instance** (`Schema::from_instance`).

pub mod instance;
pub mod render;
pub mod schema;
pub mod validate;

pub use render::function_signature;
pub use schema::{Property, Schema, SchemaError, SchemaKind};

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn search_schema() -> Schema {
        Schema::object(vec![
            Property::required("query", Schema::string().describe("What to search for")),
            Property::optional("limit", Schema::integer()),
        ])
    }

    // ── type_string ──────────────────────────────────────────────────────────

    #[test]
    fn primitives_render_with_terminator_and_comment() {
        assert_eq!(Schema::string().type_string(), "string;");
        assert_eq!(Schema::integer().type_string(), "number;");
        assert_eq!(Schema::boolean().describe("flag").type_string(), "boolean; // flag");
        assert_eq!(Schema::null().type_string(), "null;");
        assert_eq!(Schema::any().type_string(), "any;");
        assert_eq!(Schema::unknown().type_string(), "unknown;");
    }

    #[test]
    fn object_renders_optional_keys_with_question_mark() {
        assert_eq!(
            search_schema().type_string(),
            "{\n  query: string; // What to search for\n  limit?: number;\n}"
        );
    }

    #[test]
    fn array_wraps_item_type() {
        let schema = Schema::array(Schema::string()).describe("urls");
        assert_eq!(schema.type_string(), "Array<string;> // urls");
    }

    #[test]
    fn union_of_literals_renders_as_comment() {
        let schema = Schema::union(vec![
            Schema::literal("asc"),
            Schema::literal("desc"),
        ])
        .describe("sort order");
        assert_eq!(schema.type_string(), "// asc | desc; // sort order");
    }

    #[test]
    fn enum_renders_like_union() {
        let schema = Schema::enumeration(vec![json!(1), json!(2), json!("three")]);
        assert_eq!(schema.type_string(), "// 1 | 2 | three;");
    }

    #[test]
    fn literal_renders_as_json() {
        assert_eq!(Schema::literal("ok").type_string(), "\"ok\"");
        assert_eq!(Schema::literal(3).type_string(), "3");
    }

    // ── function_signature ───────────────────────────────────────────────────

    #[test]
    fn signature_prefixes_every_description_line() {
        let sig = function_signature(
            "webSearch",
            "Search the web.\nReturns links.",
            &search_schema(),
            Some(&Schema::array(Schema::string())),
        );
        assert_eq!(
            sig,
            "// Search the web.\n// Returns links.\nasync function webSearch(params: {\n  query: string; // What to search for\n  limit?: number;\n}): Promise<Array<string;>>"
        );
    }

    #[test]
    fn signature_without_output_schema_promises_any() {
        let sig = function_signature("noop", "Does nothing", &Schema::any(), None);
        assert!(sig.ends_with("async function noop(params: any;): Promise<any>"));
    }

    // ── validate ─────────────────────────────────────────────────────────────

    #[test]
    fn validate_accepts_conforming_input() {
        assert!(search_schema().validate(&json!({ "query": "rust" })).is_ok());
        assert!(search_schema()
            .validate(&json!({ "query": "rust", "limit": 3 }))
            .is_ok());
    }

    #[test]
    fn validate_reports_every_violation() {
        let err = search_schema()
            .validate(&json!({ "limit": "three" }))
            .unwrap_err();
        match err {
            SchemaError::Invalid { violations } => {
                assert_eq!(violations.len(), 2);
                assert!(violations.iter().all(|v| v.starts_with("JSON Schema violation at")));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn closed_object_rejects_extra_keys() {
        let schema = search_schema().closed();
        assert!(!schema.is_valid(&json!({ "query": "q", "extra": true })));
    }

    #[test]
    fn any_accepts_everything() {
        assert!(Schema::any().is_valid(&json!(null)));
        assert!(Schema::any().is_valid(&json!([1, "a"])));
    }

    // ── default_instance ─────────────────────────────────────────────────────

    #[test]
    fn default_instance_builds_minimal_skeleton() {
        let schema = Schema::object(vec![
            Property::required("name", Schema::string()),
            Property::required("age", Schema::number()),
            Property::required("tags", Schema::array(Schema::string())),
            Property::optional("active", Schema::boolean()),
            Property::required(
                "status",
                Schema::union(vec![Schema::literal("open"), Schema::literal("closed")]),
            ),
        ]);
        assert_eq!(
            schema.default_instance(),
            json!({ "name": "", "age": 0, "tags": [""], "active": false, "status": "open" })
        );
    }

    #[test]
    fn explicit_default_wins() {
        let schema = Schema::string().with_default(json!("The task is complete"));
        assert_eq!(schema.default_instance(), json!("The task is complete"));
    }

    // ── from_instance ────────────────────────────────────────────────────────

    #[test]
    fn from_instance_rejects_empty_arrays() {
        assert_eq!(
            Schema::from_instance(&json!({ "items": [] })),
            Err(SchemaError::EmptyArray)
        );
    }

    #[test]
    fn from_instance_rejects_mixed_arrays() {
        let err = Schema::from_instance(&json!([1, "two"])).unwrap_err();
        assert!(err.to_string().contains("number, string"));
    }

    #[test]
    fn from_instance_then_default_is_structural_skeleton() {
        let instance = json!({
            "title": "Dune",
            "year": 1965,
            "authors": [{ "name": "Frank Herbert" }],
            "inPrint": true
        });
        let schema = Schema::from_instance(&instance).unwrap();

        assert!(schema.validate(&instance).is_ok());
        assert_eq!(
            schema.default_instance(),
            json!({
                "title": "",
                "year": 0,
                "authors": [{ "name": "" }],
                "inPrint": false
            })
        );
    }

    #[test]
    fn inferred_objects_are_closed() {
        let schema = Schema::from_instance(&json!({ "a": 1 })).unwrap();
        assert!(!schema.is_valid(&json!({ "a": 1, "b": 2 })));
    }

    // ── from_json_schema / nullable / walk ───────────────────────────────────

    #[test]
    fn from_json_schema_imports_string_enums_as_literal_unions() {
        let schema = Schema::from_json_schema(&json!({
            "type": "object",
            "properties": {
                "color": { "type": "string", "enum": ["red", "blue"] },
                "count": { "type": "integer", "description": "how many" }
            },
            "required": ["color"],
            "additionalProperties": false
        }));
        assert_eq!(
            schema.type_string(),
            "{\n  color: // red | blue;\n  count?: number; // how many\n}"
        );
        assert!(!schema.is_valid(&json!({ "color": "green" })));
    }

    #[test]
    fn nullable_fields_accept_null() {
        let schema = search_schema().with_nullable_fields();
        assert!(schema.is_valid(&json!({ "query": null })));
        assert!(!schema.is_valid(&json!({ "query": null, "other": 1 })));
    }

    #[test]
    fn walk_primitives_reports_dotted_paths() {
        let schema = Schema::object(vec![
            Property::required(
                "user",
                Schema::object(vec![Property::required("name", Schema::string())]),
            ),
            Property::required("ids", Schema::array(Schema::number())),
        ]);
        let mut paths = Vec::new();
        schema.walk_primitives(&mut |_, path| paths.push(path.to_string()));
        assert_eq!(paths, vec![".user.name".to_string(), ".ids".to_string()]);
    }
}
