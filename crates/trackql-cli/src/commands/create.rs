use crate::parse::parse_assignment;
use crate::support::{
    block_on, fail, load_workspace_or_exit, open_backend_or_exit, print_json, record_json,
};
use serde_json::json;
use trackql_kernel::RecordHandle;

pub struct Args {
    pub record_type: String,
    pub sets: Vec<String>,
    pub key: Option<String>,
    pub parent: Option<String>,
    pub json: bool,
}

pub fn run(config: String, args: Args) {
    let workspace = load_workspace_or_exit(&config);
    let mut record = RecordHandle::new(args.key.unwrap_or_default());
    record.parent_key = args.parent;
    for raw in &args.sets {
        let (name, value) = parse_assignment(&workspace.registry, &args.record_type, raw)
            .unwrap_or_else(|e| fail(e));
        record.set_field(name, value);
    }

    let backend = open_backend_or_exit(&workspace);
    let record_type = args.record_type.as_str();
    let created = block_on(|cancel| async move {
        backend.create(record_type, record, &cancel).await
    })
    .unwrap_or_else(|e| fail(e));

    if args.json {
        print_json(&json!({
            "action": "create",
            "recordType": record_type,
            "record": record_json(&created)
        }));
    } else {
        println!("Created {} (id {})", created.key, created.id);
    }
}
