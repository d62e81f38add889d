use crate::cli::QueryArgs;
use crate::parse::build_search;
use crate::support::{
    block_on, fail, load_workspace_or_exit, open_backend_or_exit, print_json, print_record,
    record_json,
};
use serde_json::json;
use trackql_transport::SearchBackend;

pub fn run(config: String, query: QueryArgs, count_only: bool, json_output: bool) {
    let workspace = load_workspace_or_exit(&config);
    let search = build_search(&workspace.registry, &query.record_type, &query)
        .unwrap_or_else(|e| fail(e));
    let backend = open_backend_or_exit(&workspace);
    let record_type = query.record_type.as_str();

    if count_only {
        let total = block_on(|cancel| async move {
            backend.count(record_type, &search, &cancel).await
        })
        .unwrap_or_else(|e| fail(e));
        if json_output {
            print_json(&json!({
                "action": "search.count",
                "recordType": record_type,
                "total": total
            }));
        } else {
            println!("{total}");
        }
        return;
    }

    let result = block_on(|cancel| async move {
        backend.search(record_type, &search, &cancel).await
    })
    .unwrap_or_else(|e| fail(e));

    if json_output {
        let matched: Vec<_> = result.matched.iter().map(record_json).collect();
        print_json(&json!({
            "action": "search",
            "recordType": record_type,
            "startAt": query.start_at,
            "maxResults": query.max_results,
            "total": result.total,
            "matched": matched
        }));
        return;
    }

    println!(
        "{} of {} {record_type} record(s)",
        result.matched.len(),
        result.total
    );
    for record in &result.matched {
        print_record(record);
    }
}
