pub mod cli;
pub mod codec;
pub mod condition;
pub mod config;
pub mod decode;
pub mod resolver;
pub mod serializer;
pub mod storage;
pub mod store;

use anyhow::Context;
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

pub use cli::{ColorMode, Commands, OutputFormat, cli_parse};
pub use codec::{ContainsOperator, UiOperator, hydrate, to_api, to_api_condition, to_ui};
pub use condition::{Condition, FieldInfo, Relation, SearchMode};
pub use config::{ConfigError, EngineConfig, default_config, load_config, load_config_from_path};
pub use resolver::{QueryResolver, ResolveError, ResolvedQuery, UrlField, UrlQuery};
pub use serializer::{SerializedQuery, build_query_string, query_string, serialize};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage, PersistedDefaults, StorageError};
pub use store::{
    CompileResponse, DrillDown, DrillOperator, LocalCompiler, MergeError, MergeOutcome,
    QueryCompiler, QueryState, QueryStore, RetrieveParams,
};

fn init_tracing(cli: &cli::Cli) {
    // RUST_LOG applies unless -v or -q asked for something explicit.
    let explicit = cli.quiet || cli.verbose > 0;
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) if !explicit => filter,
        _ => EnvFilter::new(cli.log_level()),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn open_storage(path: Option<&Path>) -> anyhow::Result<Box<dyn KeyValueStorage>> {
    match path {
        Some(path) => {
            let storage = FileStorage::open(path)
                .with_context(|| format!("Failed to open storage '{}'", path.display()))?;
            Ok(Box::new(storage))
        }
        None => Ok(Box::new(MemoryStorage::new())),
    }
}

fn load_fields(path: Option<&Path>) -> anyhow::Result<Vec<FieldInfo>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read field list '{}'", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Field list '{}' is not a JSON array of fields", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn describe_condition(condition: &Condition) -> String {
    let mut line = format!(
        "{} {} {:?}",
        condition.field.bold(),
        condition.operator.cyan(),
        condition.value
    );
    if let Some(relation) = condition.relation {
        line.push_str(&format!(" [{relation}]"));
    }
    if condition.is_include == Some(true) {
        line.push_str(" [wildcard]");
    }
    if condition.is_disabled() {
        line.push_str(&format!(" {}", "(disabled)".dimmed()));
    }
    line
}

fn print_state(state: &QueryState, query_string: &str) {
    println!("{}", "Query state".bold().underline());
    println!("  search mode: {}", state.search_mode.as_str().green());
    println!("  keyword:     {}", state.keyword);
    println!(
        "  time range:  {} .. {} ({} .. {})",
        state.time_range.picker.start,
        state.time_range.picker.end,
        state.time_range.start,
        state.time_range.end
    );
    println!(
        "  page:        begin {} size {}",
        state.pagination.begin, state.pagination.size
    );
    if state.is_union_search {
        println!("  union:       {}", state.union_index_ids.join(", "));
    }
    if state.conditions.is_empty() {
        println!("  conditions:  {}", "none".dimmed());
    } else {
        println!("  conditions:");
        for (idx, condition) in state.conditions.iter().enumerate() {
            println!("    {}. {}", idx + 1, describe_condition(condition));
        }
    }
    for pair in &state.extra {
        println!("  {} {}", "passthrough".dimmed(), pair.text);
    }
    println!("\n{}", "Canonical link".bold().underline());
    println!("  ?{query_string}");
}

#[derive(Serialize)]
struct ResolveOutput<'a> {
    state: &'a QueryState,
    url_params: SerializedQuery,
    query_string: String,
}

#[derive(Serialize)]
struct CompileOutput<'a> {
    outcome: &'static str,
    keyword: &'a str,
    query_string: String,
}

fn outcome_name(outcome: MergeOutcome) -> &'static str {
    match outcome {
        MergeOutcome::NotNeeded => "not_needed",
        MergeOutcome::InFlight => "in_flight",
        MergeOutcome::Applied => "applied",
        MergeOutcome::Stale => "stale",
    }
}

pub fn run() -> anyhow::Result<()> {
    let cli = cli_parse();
    init_tracing(&cli);
    cli.color.apply();

    let config = load_config(cli.config.as_deref()).context("Failed to load config")?;
    debug!(profile = %config.profile_name, "config loaded");
    let now: DateTime<Utc> = cli.now.unwrap_or_else(Utc::now);
    let format = cli.format;

    match &cli.command {
        Commands::Resolve { query, persist } => {
            let mut storage = open_storage(cli.storage.as_deref())?;
            let store = QueryStore::load(&UrlQuery::parse(query), storage.as_mut(), config, now);
            if *persist {
                store
                    .persist_defaults(storage.as_mut())
                    .context("Failed to persist search defaults")?;
            }

            let query_string = store.url_query_string();
            match format {
                OutputFormat::Text => print_state(store.state(), &query_string),
                OutputFormat::Json => print_json(&ResolveOutput {
                    state: store.state(),
                    url_params: store.url_params(),
                    query_string,
                })?,
            }
        }
        Commands::Params { query, fields } => {
            let mut storage = open_storage(cli.storage.as_deref())?;
            let mut store =
                QueryStore::load(&UrlQuery::parse(query), storage.as_mut(), config, now);
            store.set_fields(load_fields(fields.as_deref())?);
            let params = store.query_params();
            match format {
                OutputFormat::Text => {
                    println!("{}", "Search request".bold().underline());
                    println!("{}", serde_json::to_string_pretty(&params)?);
                }
                OutputFormat::Json => print_json(&params)?,
            }
        }
        Commands::Translate {
            operator,
            field,
            field_type,
            relation,
            include,
            to_ui: reverse,
            initializing,
        } => {
            if *reverse {
                let ui = to_ui(operator, *relation, *initializing);
                match format {
                    OutputFormat::Text => println!(
                        "{} (relation {}, wildcard {})",
                        ui.operator.cyan(),
                        ui.relation,
                        ui.is_include
                    ),
                    OutputFormat::Json => print_json(&ui)?,
                }
            } else {
                let mut condition = Condition::new(field.as_str(), operator.as_str(), &[]);
                condition.relation = *relation;
                condition.is_include = *include;
                let api = to_api(&condition, Some(field_type.as_str()));
                match format {
                    OutputFormat::Text => println!("{}", api.cyan()),
                    OutputFormat::Json => print_json(&serde_json::json!({ "operator": api }))?,
                }
            }
        }
        Commands::Compile { query } => {
            let mut storage = open_storage(cli.storage.as_deref())?;
            let mut store =
                QueryStore::load(&UrlQuery::parse(query), storage.as_mut(), config, now);
            let outcome = store
                .merge_with(&LocalCompiler)
                .context("Failed to fold conditions into the keyword")?;

            let query_string = store.url_query_string();
            match format {
                OutputFormat::Text => {
                    println!("{} {}", "merge:".bold(), outcome_name(outcome));
                    println!("{} {}", "keyword:".bold(), store.state().keyword);
                    println!("{} ?{query_string}", "link:".bold());
                }
                OutputFormat::Json => print_json(&CompileOutput {
                    outcome: outcome_name(outcome),
                    keyword: &store.state().keyword,
                    query_string,
                })?,
            }
        }
        Commands::Drill {
            query,
            field,
            values,
            not,
            fields,
        } => {
            let mut storage = open_storage(cli.storage.as_deref())?;
            let mut store =
                QueryStore::load(&UrlQuery::parse(query), storage.as_mut(), config, now);
            store.set_fields(load_fields(fields.as_deref())?);

            let operator = if *not {
                DrillOperator::IsNot
            } else {
                DrillOperator::Is
            };
            let values: Vec<&str> = values.iter().map(String::as_str).collect();
            let changed = store.drill_down(&[DrillDown::new(field.as_str(), operator, &values)]);
            if !changed {
                info!(field = %field, "value already part of the query");
            }

            let query_string = store.url_query_string();
            match format {
                OutputFormat::Text => print_state(store.state(), &query_string),
                OutputFormat::Json => print_json(&ResolveOutput {
                    state: store.state(),
                    url_params: store.url_params(),
                    query_string,
                })?,
            }
        }
    }

    Ok(())
}
