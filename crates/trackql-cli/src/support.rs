use serde_json::{Value, json};
use std::fmt::Display;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use trackql_kernel::{FieldRegistry, Literal, RecordHandle, StoreSettings, TrackqlConfig};
use trackql_query::render::render_literal;
use trackql_store::FsStore;
use trackql_transport::FakeBackend;

/// Loaded configuration: registry plus resolved store settings.
pub struct Workspace {
    pub config_path: PathBuf,
    pub registry: Arc<FieldRegistry>,
    pub settings: StoreSettings,
}

pub fn fail(message: impl Display) -> ! {
    eprintln!("error: {message}");
    std::process::exit(1);
}

pub fn load_workspace_or_exit(config_arg: &str) -> Workspace {
    let config_path = PathBuf::from(config_arg);
    if !config_path.exists() {
        fail(format!("config not found: {}", config_path.display()));
    }
    let config = TrackqlConfig::load(&config_path).unwrap_or_else(|e| fail(e));
    let registry = config.build_registry().unwrap_or_else(|e| fail(e));

    let mut settings = config.store;
    settings.root = resolve_store_root(&config_path, &settings.root);
    Workspace {
        config_path,
        registry: Arc::new(registry),
        settings,
    }
}

/// Relative store roots are taken relative to the config file.
fn resolve_store_root(config_path: &Path, root: &Path) -> PathBuf {
    if root.is_absolute() {
        return root.to_path_buf();
    }
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(root),
        _ => root.to_path_buf(),
    }
}

pub fn open_backend_or_exit(workspace: &Workspace) -> FakeBackend<FsStore> {
    let store = FsStore::open(&workspace.settings).unwrap_or_else(|e| {
        fail(format!(
            "failed to open store {}: {e}",
            workspace.settings.root.display()
        ))
    });
    FakeBackend::new(Arc::clone(&workspace.registry), store)
}

/// Drive one async command to completion; Ctrl-C cancels it.
pub fn block_on<F, Fut, T>(task: F) -> T
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = T>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| fail(format!("failed to create tokio runtime: {e}")));

    runtime.block_on(async move {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling");
                trigger.cancel();
            }
        });
        task(cancel).await
    })
}

pub fn print_json(payload: &Value) {
    match serde_json::to_string_pretty(payload) {
        Ok(text) => println!("{text}"),
        Err(e) => fail(format!("json serialization: {e}")),
    }
}

pub fn literal_json(value: &Literal) -> Value {
    match value {
        Literal::Text(text) | Literal::UserRef(text) | Literal::RecordRef(text) => json!(text),
        Literal::Integer(number) => json!(number),
        Literal::Date(date) => json!(date.to_rfc3339()),
        Literal::Collection(items) => Value::Array(items.iter().map(literal_json).collect()),
    }
}

pub fn record_json(record: &RecordHandle) -> Value {
    let fields: serde_json::Map<String, Value> = record
        .fields
        .iter()
        .map(|(name, value)| (name.clone(), literal_json(value)))
        .collect();
    json!({
        "id": record.id,
        "key": record.key,
        "parentKey": record.parent_key,
        "fields": fields
    })
}

pub fn print_record(record: &RecordHandle) {
    match &record.parent_key {
        Some(parent) => println!("  {} (id {}, parent {parent})", record.key, record.id),
        None => println!("  {} (id {})", record.key, record.id),
    }
    for (name, value) in &record.fields {
        println!("    {name}: {}", render_literal(value));
    }
}
