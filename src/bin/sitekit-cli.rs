use clap::{Parser, Subcommand};
use serde_json::Value;

use sitekit::sql::{ConnectOptions, Db, Ident, Raw};
use sitekit::store::{DocStore, KvStore};

#[derive(Parser)]
#[command(name = "sitekit-cli")]
#[command(about = "Inspect and edit a sitekit database", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "sqlite:site.db")]
    dsn: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Key-value store operations
    Kv {
        #[arg(short, long, default_value = "kv")]
        table: String,
        #[command(subcommand)]
        command: KvCommand,
    },
    /// Document store operations
    Doc {
        #[arg(short, long, default_value = "docs")]
        table: String,
        #[command(subcommand)]
        command: DocCommand,
    },
}

#[derive(Subcommand)]
enum KvCommand {
    /// Print a value
    Get { key: String },
    /// Store a value (parsed as JSON when possible)
    Set { key: String, value: String },
    /// Delete keys
    Del { keys: Vec<String> },
    /// Add to numeric values
    Incr {
        keys: Vec<String>,
        #[arg(short, long, default_value_t = 1, allow_negative_numbers = true)]
        by: i64,
    },
    /// Append values to a list
    Push { key: String, values: Vec<String> },
}

#[derive(Subcommand)]
enum DocCommand {
    /// Store a JSON document and print its id
    Put { json: String },
    /// Print a document
    Get { id: String },
    /// Delete documents
    Delete { ids: Vec<String> },
    /// Create an index table for a field
    Index {
        name: String,
        #[arg(long, default_value = "TEXT")]
        sql_type: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let db = std::sync::Arc::new(Db::connect(&cli.dsn, None, None, &ConnectOptions::default())?);

    match cli.command {
        Commands::Kv { table, command } => {
            let kv = KvStore::new(db, Ident::new(table)?);
            kv.create()?;
            match command {
                KvCommand::Get { key } => match kv.get_json(&key)? {
                    Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                    None => eprintln!("{key}: not found"),
                },
                KvCommand::Set { key, value } => report(kv.set(&key, &parse_value(&value))?),
                KvCommand::Del { keys } => report(kv.del(&as_strs(&keys))?),
                KvCommand::Incr { keys, by } => report(kv.increment(&as_strs(&keys), by)?),
                KvCommand::Push { key, values } => {
                    report(kv.push(&key, values.iter().map(|v| parse_value(v)).collect())?)
                }
            }
        }
        Commands::Doc { table, command } => {
            let docs = DocStore::new(db, Ident::new(table)?);
            docs.create()?;
            match command {
                DocCommand::Put { json } => match docs.put(serde_json::from_str(&json)?)? {
                    Some(id) => println!("{id}"),
                    None => eprintln!("document was not stored"),
                },
                DocCommand::Get { id } => match docs.find(&id)? {
                    Some(record) => println!("{}", serde_json::to_string_pretty(&record.body)?),
                    None => eprintln!("{id}: not found"),
                },
                DocCommand::Delete { ids } => report(docs.delete(&as_strs(&ids))?),
                DocCommand::Index { name, sql_type } => {
                    report(docs.index(&name, &Raw::new(sql_type))?)
                }
            }
        }
    }
    Ok(())
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn as_strs(items: &[String]) -> Vec<&str> {
    items.iter().map(String::as_str).collect()
}

fn report(ok: bool) {
    if ok {
        println!("ok");
    } else {
        eprintln!("failed");
        std::process::exit(1);
    }
}
