use crate::cli::QueryArgs;
use crate::parse::build_search;
use crate::support::{fail, load_workspace_or_exit, print_json};
use serde_json::json;
use trackql_query::{Compiler, render};

/// Compile and render only; the store is never opened.
pub fn run(config: String, query: QueryArgs, json_output: bool) {
    let workspace = load_workspace_or_exit(&config);
    let search = build_search(&workspace.registry, &query.record_type, &query)
        .unwrap_or_else(|e| fail(e));
    let request = Compiler::new(&workspace.registry)
        .compile(&query.record_type, &search)
        .unwrap_or_else(|e| fail(e));
    let rendered = render(&request);

    if json_output {
        print_json(&json!({
            "action": "render",
            "recordType": query.record_type,
            "request": rendered
        }));
        return;
    }

    println!("{}", rendered.jql);
    if !rendered.fields.is_empty() {
        println!("fields: {}", rendered.fields.join(", "));
    }
    println!(
        "page: startAt={} maxResults={}",
        rendered.start_at, rendered.max_results
    );
}
