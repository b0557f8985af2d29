use std::{
    collections::HashSet,
    sync::{Mutex, PoisonError},
};

use async_trait::async_trait;
use serde_json::{json, Value};

use stepwise_contracts::error::UdfError;
use stepwise_sandbox::format::stable_stringify;
use stepwise_schema::{Property, Schema};

use crate::{context::AgentContext, traits::Udf};

#[derive(Default)]
struct Sheet {
    keys: HashSet<String>,
    entries: Vec<Value>,
}

/// Collects structured records, dropping exact duplicates.
///
/// Two entries are duplicates when their key-sorted JSON is identical, so
/// key order does not matter. `example` seeds the input schema's default to
/// show the model the expected record shape.
pub struct DatasheetWriteUdf {
    input: Schema,
    output: Schema,
    sheet: Mutex<Sheet>,
}

impl DatasheetWriteUdf {
    pub fn new(example: Value) -> Self {
        Self {
            input: Schema::array(Schema::any()).with_default(json!([example])),
            output: Schema::object(vec![
                Property::required("successCount", Schema::number()),
                Property::required("totalSuccessCount", Schema::number()),
            ]),
            sheet: Mutex::new(Sheet::default()),
        }
    }

    /// Unique entries in insertion order.
    pub fn entries(&self) -> Vec<Value> {
        self.sheet
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .clone()
    }
}

#[async_trait]
impl Udf for DatasheetWriteUdf {
    fn name(&self) -> &str {
        "datasheetWrite"
    }

    fn description(&self) -> &str {
        "Write data entries to the notebook"
    }

    fn input_schema(&self) -> &Schema {
        &self.input
    }

    fn output_schema(&self) -> Option<&Schema> {
        Some(&self.output)
    }

    async fn call(&self, input: Value, _ctx: &AgentContext) -> Result<Value, UdfError> {
        let Value::Array(items) = input else {
            return Err(UdfError::with_kind("TypeError", "expected an array of entries"));
        };

        let mut sheet = self.sheet.lock().unwrap_or_else(PoisonError::into_inner);
        let mut success_count = 0;
        for item in items {
            if sheet.keys.insert(stable_stringify(&item)) {
                sheet.entries.push(item);
                success_count += 1;
            }
        }
        Ok(json!({
            "successCount": success_count,
            "totalSuccessCount": sheet.entries.len(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::udf::test_support::context;

    #[tokio::test]
    async fn duplicates_are_dropped_regardless_of_key_order() {
        let udf = Arc::new(DatasheetWriteUdf::new(json!({"name": "", "price": 0})));
        let ctx = context(vec![udf.clone()]);

        let first = ctx
            .call_udf(
                "datasheetWrite",
                json!([{"name": "a", "price": 1}, {"name": "b", "price": 2}]),
            )
            .await
            .unwrap();
        assert_eq!(first, json!({"successCount": 2, "totalSuccessCount": 2}));

        let second = ctx
            .call_udf(
                "datasheetWrite",
                json!([{"price": 1, "name": "a"}, {"name": "c", "price": 3}]),
            )
            .await
            .unwrap();
        assert_eq!(second, json!({"successCount": 1, "totalSuccessCount": 3}));

        let names: Vec<Value> = udf.entries().iter().map(|e| e["name"].clone()).collect();
        assert_eq!(names, vec![json!("a"), json!("b"), json!("c")]);
    }

    #[tokio::test]
    async fn non_array_input_is_rejected() {
        let ctx = context(vec![Arc::new(DatasheetWriteUdf::new(json!({})))]);
        let err = ctx
            .call_udf("datasheetWrite", json!({"name": "a"}))
            .await
            .unwrap_err();
        assert!(err.message.contains("ValidationError"));
    }

    #[test]
    fn example_seeds_the_schema_default() {
        let udf = DatasheetWriteUdf::new(json!({"title": "Dune"}));
        assert_eq!(udf.input_schema().default_instance(), json!([{"title": "Dune"}]));
    }
}
