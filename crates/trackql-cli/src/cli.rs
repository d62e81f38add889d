use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "trackql",
    about = "trackql: compile, render, and evaluate issue-tracker queries",
    version
)]
pub struct Cli {
    /// Path to trackql.toml
    #[arg(long, global = true, default_value = "trackql.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

/// Predicate, projection, ordering, and page window of one search.
#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    /// Record type to search
    pub record_type: String,

    /// Predicate clause: field=value, field!=value, field>=value, field~text,
    /// field:in:a,b (repeat to AND clauses)
    #[arg(long = "where", short = 'w')]
    pub predicates: Vec<String>,

    /// Field to return (repeatable; default all fields)
    #[arg(long = "field", short = 'f')]
    pub fields: Vec<String>,

    /// Ordering key: field or field:desc (repeatable)
    #[arg(long = "order")]
    pub order: Vec<String>,

    /// Index of the first result
    #[arg(long, default_value_t = 0)]
    pub start_at: usize,

    /// Page size
    #[arg(long, default_value_t = trackql_query::DEFAULT_MAX_RESULTS)]
    pub max_results: usize,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the query text and request body a search would send
    Render {
        #[command(flatten)]
        query: QueryArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Evaluate a search against the local record store
    Search {
        #[command(flatten)]
        query: QueryArgs,

        /// Print only the match count
        #[arg(long)]
        count: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create a record of a type (its scope is applied)
    Create {
        /// Record type
        record_type: String,

        /// Field assignment: field=value (repeatable)
        #[arg(long = "set", short = 's')]
        sets: Vec<String>,

        /// Explicit record key (default: assigned)
        #[arg(long)]
        key: Option<String>,

        /// Parent record key
        #[arg(long)]
        parent: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Update fields of an existing record
    Update {
        /// Record type
        record_type: String,

        /// Record key
        key: String,

        /// Field assignment: field=value (repeatable)
        #[arg(long = "set", short = 's')]
        sets: Vec<String>,

        /// Field to remove (repeatable)
        #[arg(long = "unset")]
        unsets: Vec<String>,

        /// New parent record key
        #[arg(long, conflicts_with = "detach")]
        parent: Option<String>,

        /// Remove the parent link
        #[arg(long)]
        detach: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete a record
    Delete {
        /// Record key
        key: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one record
    Get {
        /// Record key
        key: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
