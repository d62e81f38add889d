use crate::support::{
    block_on, fail, load_workspace_or_exit, open_backend_or_exit, print_json, print_record,
    record_json,
};
use serde_json::json;

pub fn run(config: String, key: String, json_output: bool) {
    let workspace = load_workspace_or_exit(&config);
    let backend = open_backend_or_exit(&workspace);
    let lookup = key.clone();
    let record = block_on(|_cancel| async move { backend.get(&lookup).await })
        .unwrap_or_else(|e| fail(e))
        .unwrap_or_else(|| fail(format!("record not found: {key}")));

    if json_output {
        print_json(&json!({
            "action": "get",
            "record": record_json(&record)
        }));
    } else {
        print_record(&record);
    }
}
