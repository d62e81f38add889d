use crate::support::{
    block_on, fail, load_workspace_or_exit, open_backend_or_exit, print_json, record_json,
};
use serde_json::json;

pub fn run(config: String, key: String, json_output: bool) {
    let workspace = load_workspace_or_exit(&config);
    let backend = open_backend_or_exit(&workspace);
    let removed = block_on(|cancel| async move { backend.delete(&key, &cancel).await })
        .unwrap_or_else(|e| fail(e));

    if json_output {
        print_json(&json!({
            "action": "delete",
            "record": record_json(&removed)
        }));
    } else {
        println!("Deleted {}", removed.key);
    }
}
