use clap::{Parser, Subcommand, ValueEnum};
use shelfdb::{parse_schema, Collection, Schema, ShelfDbError};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

/// ShelfDB CLI: work with JSON document collections from the command line
#[derive(Parser, Debug)]
#[command(name = "shelfdb", version, about)]
struct Cli {
    /// Directory holding the collection files
    #[arg(long, env = "SHELFDB_DATA_DIR", default_value = ".")]
    data_dir: PathBuf,

    /// Schema file (default: <data-dir>/schema.yaml)
    #[arg(long, env = "SHELFDB_SCHEMA")]
    schema: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "yaml")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, PartialEq, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a single document
    Create {
        /// Collection name
        collection: String,
        /// Document as JSON (e.g. --doc '{"name": "Ann"}')
        #[arg(long, value_parser = parse_json)]
        doc: serde_json::Value,
    },

    /// Insert a batch of documents, all or nothing
    Insert {
        /// Collection name
        collection: String,
        /// JSON array of documents
        #[arg(long, value_parser = parse_json)]
        docs: serde_json::Value,
    },

    /// Find documents and shape the result
    Find {
        /// Collection name
        collection: String,
        #[command(flatten)]
        filter: Filter,
        /// Sort spec, e.g. '{"age": -1}'
        #[arg(long, value_parser = parse_json)]
        sort: Option<serde_json::Value>,
        /// Number of documents to skip
        #[arg(long)]
        skip: Option<usize>,
        /// Maximum number of documents
        #[arg(long)]
        limit: Option<usize>,
        /// Projection, e.g. '{"name": 1}'
        #[arg(long, value_parser = parse_json)]
        select: Option<serde_json::Value>,
        /// Return the distinct values of a field instead of documents
        #[arg(long)]
        distinct: Option<String>,
        /// Return only the number of results
        #[arg(long)]
        count: bool,
        /// Validate every result against the schema
        #[arg(long)]
        validate: bool,
    },

    /// Show the first matching document
    FindOne {
        /// Collection name
        collection: String,
        #[command(flatten)]
        filter: Filter,
    },

    /// Update the first matching document
    UpdateOne {
        /// Collection name
        collection: String,
        #[command(flatten)]
        filter: Filter,
        /// Fields to merge, as JSON
        #[arg(long, value_parser = parse_json)]
        set: serde_json::Value,
    },

    /// Update every matching document
    UpdateMany {
        /// Collection name
        collection: String,
        #[command(flatten)]
        filter: Filter,
        /// Fields to merge, as JSON
        #[arg(long, value_parser = parse_json)]
        set: serde_json::Value,
    },

    /// Delete the first matching document
    DeleteOne {
        /// Collection name
        collection: String,
        #[command(flatten)]
        filter: Filter,
    },

    /// Delete every matching document
    DeleteMany {
        /// Collection name
        collection: String,
        #[command(flatten)]
        filter: Filter,
    },

    /// Check all stored documents against the schema
    Validate {
        /// Collection name
        collection: String,
    },
}

#[derive(clap::Args, Debug)]
struct Filter {
    /// Query object, e.g. '{"age": {"$gte": 18}}'
    #[arg(long, value_parser = parse_json, default_value = "{}")]
    query: serde_json::Value,
}

fn parse_json(s: &str) -> Result<serde_json::Value, String> {
    serde_json::from_str(s).map_err(|e| format!("invalid JSON '{s}': {e}"))
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("ERROR:{e}");
        let validation = e
            .downcast_ref::<ShelfDbError>()
            .is_some_and(ShelfDbError::is_validation);
        process::exit(if validation { 2 } else { 1 });
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let schema = Arc::new(load_schema(&cli.data_dir, cli.schema.as_deref())?);

    let open = |name: &str| Collection::open(name, &cli.data_dir, schema.clone());

    let output = match cli.command {
        Command::Create { collection, doc } => {
            let created = open(&collection)?.create_one(doc)?;
            serde_json::Value::Object(created)
        }

        Command::Insert { collection, docs } => {
            let docs = match docs {
                serde_json::Value::Array(items) => items,
                other => {
                    return Err(ShelfDbError::InvalidDocument(format!(
                        "--docs must be a JSON array, got {other}"
                    ))
                    .into())
                }
            };
            let inserted = open(&collection)?.insert_many(docs)?;
            serde_json::to_value(inserted)?
        }

        Command::Find {
            collection,
            filter,
            sort,
            skip,
            limit,
            select,
            distinct,
            count,
            validate,
        } => {
            let mut cursor = open(&collection)?.find(&filter.query)?;
            if validate {
                cursor.validate()?;
            }
            if let Some(spec) = &sort {
                cursor.sort(spec)?;
            }
            if let Some(n) = skip {
                cursor.skip(n);
            }
            if let Some(n) = limit {
                cursor.limit(n);
            }
            if let Some(spec) = &select {
                cursor.select(spec)?;
            }
            if let Some(field) = &distinct {
                cursor.distinct(field);
            }
            if count {
                cursor.count();
            }
            serde_json::to_value(cursor.exec())?
        }

        Command::FindOne { collection, filter } => {
            match open(&collection)?.find_one(&filter.query)? {
                Some(doc) => serde_json::Value::Object(doc),
                None => serde_json::Value::Null,
            }
        }

        Command::UpdateOne { collection, filter, set } => {
            let updated = open(&collection)?.find_one_and_update(&filter.query, &set)?;
            serde_json::Value::Object(updated)
        }

        Command::UpdateMany { collection, filter, set } => {
            let all = open(&collection)?.update_many(&filter.query, &set)?;
            serde_json::json!({ "ok": true, "total": all.len() })
        }

        Command::DeleteOne { collection, filter } => {
            let removed = open(&collection)?.find_and_delete_one(&filter.query)?;
            serde_json::json!({ "ok": true, "deleted": removed })
        }

        Command::DeleteMany { collection, filter } => {
            let remaining = open(&collection)?.delete_many(&filter.query)?;
            serde_json::json!({ "ok": true, "remaining": remaining.len() })
        }

        Command::Validate { collection } => {
            let col = open(&collection)?;
            let total = col.count(&serde_json::json!({}))?;
            let issues: Vec<_> = col
                .validate_all()?
                .into_iter()
                .map(|(id, errors)| serde_json::json!({ "id": id, "errors": errors }))
                .collect();
            serde_json::json!({ "total": total, "issues": issues })
        }
    };

    print_output(&output, &cli.format)?;
    Ok(())
}

/// Read the schema file, falling back to `<data_dir>/schema.yaml`. A missing
/// default schema file means an empty schema.
fn load_schema(data_dir: &Path, explicit: Option<&Path>) -> shelfdb::Result<Schema> {
    match explicit {
        Some(path) => parse_schema(path),
        None => {
            let default_path = data_dir.join("schema.yaml");
            if default_path.exists() {
                parse_schema(&default_path)
            } else {
                log::warn!(
                    "no schema at {}; documents are stored unvalidated",
                    default_path.display()
                );
                Ok(Schema::new())
            }
        }
    }
}

fn print_output(
    value: &serde_json::Value,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}
