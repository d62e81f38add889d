use crate::parse::parse_assignment;
use crate::support::{
    block_on, fail, load_workspace_or_exit, open_backend_or_exit, print_json, record_json,
};
use serde_json::json;
use trackql_kernel::RecordPatch;

pub struct Args {
    pub record_type: String,
    pub key: String,
    pub sets: Vec<String>,
    pub unsets: Vec<String>,
    pub parent: Option<String>,
    pub detach: bool,
    pub json: bool,
}

pub fn run(config: String, args: Args) {
    let workspace = load_workspace_or_exit(&config);
    let mut patch = RecordPatch::new();
    for raw in &args.sets {
        let (name, value) = parse_assignment(&workspace.registry, &args.record_type, raw)
            .unwrap_or_else(|e| fail(e));
        patch = patch.set(name, value);
    }
    for name in &args.unsets {
        patch = patch.unset(name.trim());
    }
    if args.detach {
        patch = patch.reparent(None);
    } else if let Some(parent) = args.parent {
        patch = patch.reparent(Some(parent));
    }
    if patch.is_empty() {
        fail("nothing to update: pass --set, --unset, --parent, or --detach");
    }

    let backend = open_backend_or_exit(&workspace);
    let record_type = args.record_type.as_str();
    let key = args.key.as_str();
    let updated = block_on(|cancel| async move {
        backend.update(record_type, key, &patch, &cancel).await
    })
    .unwrap_or_else(|e| fail(e));

    if args.json {
        print_json(&json!({
            "action": "update",
            "recordType": record_type,
            "record": record_json(&updated)
        }));
    } else {
        println!("Updated {}", updated.key);
    }
}
