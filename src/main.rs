use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use insight_pilot::agent_prompts::{DATASET_URL, DEFAULT_TABLE};
use insight_pilot::athena::{QueryClient, QueryOptions, QueryResult};
use insight_pilot::conversation::{ChatMessage, Conversation, TurnObserver, TurnOptions, TurnStage};
use insight_pilot::render::{render_csv, render_message, render_table};
use insight_pilot::settings::{AthenaSettings, LlmSettings, SettingsOverrides};
use std::io::{self, BufRead, Write};
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "insight-pilot")]
#[command(about = "Ask questions about the Superstore dataset in plain language, answered from Athena")]
struct Cli {
    /// AWS region (or set AWS_REGION)
    #[arg(long, global = true)]
    region: Option<String>,

    /// Athena database (or set ATHENA_DATABASE)
    #[arg(long, global = true)]
    database: Option<String>,

    /// Athena workgroup; pass an empty value to clear ATHENA_WORKGROUP
    #[arg(long, global = true)]
    workgroup: Option<String>,

    /// Data catalog (or set ATHENA_CATALOG)
    #[arg(long, global = true)]
    catalog: Option<String>,

    /// S3 output location for query results (or set ATHENA_OUTPUT)
    #[arg(long, global = true)]
    output: Option<String>,

    /// Model name (or set INSIGHT_MODEL)
    #[arg(long, global = true)]
    model: Option<String>,

    /// Maximum rows fetched per query
    #[arg(long, global = true, default_value_t = 100)]
    max_rows: usize,

    /// Ask the model for a short written answer after the query runs
    #[arg(long, global = true)]
    explain: bool,

    /// Hide the estimated LLM cost
    #[arg(long, global = true)]
    no_cost: bool,

    /// Let the model call the schema-discovery tools before writing SQL
    #[arg(long, global = true)]
    allow_discovery: bool,

    /// Output format for tabular results
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a single question and print the answer
    Ask {
        /// The question in natural language
        question: String,
    },
    /// Interactive session (/reset, /history, /schema, /quit)
    Chat,
    /// List the tables of the database
    Tables,
    /// Show the columns and types of a table
    Schema {
        table: String,
    },
    /// Run SQL directly against Athena
    Sql {
        sql: String,
    },
    /// Print the resolved settings
    Settings,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

/// Spinner on stderr that follows the turn stages.
struct SpinnerObserver {
    bar: ProgressBar,
}

impl SpinnerObserver {
    fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(80));
        Self { bar }
    }
}

impl TurnObserver for SpinnerObserver {
    fn on_stage(&self, stage: TurnStage) {
        match stage {
            TurnStage::Done | TurnStage::Error => self.bar.finish_and_clear(),
            other => self.bar.set_message(other.label()),
        }
    }

    fn on_sql(&self, sql: &str) {
        debug!("Executing SQL: {}", sql);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("insight_pilot=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    let mut athena = AthenaSettings::from_env();
    let mut llm = LlmSettings::from_env();
    SettingsOverrides {
        region: cli.region.clone(),
        database: cli.database.clone(),
        workgroup: cli.workgroup.clone(),
        catalog: cli.catalog.clone(),
        output: cli.output.clone(),
        model: cli.model.clone(),
    }
    .apply(&mut athena, &mut llm);

    let options = TurnOptions {
        max_rows: cli.max_rows,
        fast_mode: !cli.allow_discovery,
        display_cost: !cli.no_cost,
        explain: cli.explain,
    };

    match &cli.command {
        Commands::Ask { question } => {
            let mut conversation = Conversation::with_aws(athena, &llm, options)?;
            let reply = conversation.submit(question, &SpinnerObserver::new()).await;
            print_reply(&reply, cli.format)?;
        }
        Commands::Chat => {
            let conversation = Conversation::with_aws(athena, &llm, options)?;
            chat_loop(conversation, cli.format).await?;
        }
        Commands::Tables => {
            let client = QueryClient::aws(athena);
            for table in client.list_tables(None, None, None).await? {
                println!("{}", table);
            }
        }
        Commands::Schema { table } => {
            let client = QueryClient::aws(athena);
            let schema = client.get_table_schema(table, None, None, None).await?;
            print_schema(&schema, cli.format)?;
        }
        Commands::Sql { sql } => {
            let client = QueryClient::aws(athena);
            let query_options = QueryOptions::from_settings(client.settings(), cli.max_rows);
            let result = client.run_query(sql, &query_options).await?;
            print_result(&result, cli.format)?;
        }
        Commands::Settings => {
            for (key, value) in athena.to_env_pairs() {
                println!("{}={}", key, value.unwrap_or_default());
            }
            println!("OPENAI_BASE_URL={}", llm.base_url);
            println!("INSIGHT_MODEL={}", llm.model);
            println!(
                "OPENAI_API_KEY={}",
                if llm.api_key.is_some() { "(set)" } else { "" }
            );
        }
    }

    Ok(())
}

fn chat_banner() -> String {
    format!(
        "Ask a question about the Superstore data ({}).\nCommands: /reset, /history, /schema, /quit",
        DATASET_URL
    )
}

async fn chat_loop(mut conversation: Conversation, format: OutputFormat) -> Result<()> {
    println!("{}", chat_banner());
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("> ");
        io::stdout().flush().context("Failed to flush stdout")?;

        let Some(line) = lines.next() else {
            break;
        };
        let line = line.context("Failed to read from stdin")?;
        let prompt = line.trim();

        match prompt {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                conversation.reset();
                println!("Conversation cleared.");
            }
            "/history" => {
                for message in conversation.history() {
                    println!("[{}]", serde_json::to_value(message.role)?.as_str().unwrap_or_default());
                    println!("{}\n", render_message(message));
                }
            }
            "/schema" => {
                let schema = conversation.client().get_table_schema(DEFAULT_TABLE, None, None, None).await;
                match schema {
                    Ok(schema) => print_schema(&schema, format)?,
                    Err(e) => eprintln!("Error: {}", e),
                }
            }
            question => {
                let reply = conversation.submit(question, &SpinnerObserver::new()).await;
                print_reply(&reply, format)?;
            }
        }
    }

    info!("Chat session ended");
    Ok(())
}

fn print_reply(reply: &ChatMessage, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_message(reply)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(reply)?),
        OutputFormat::Csv => match &reply.table {
            Some(table) => print!("{}", render_csv(&table.columns, &table.rows)?),
            None => println!("{}", reply.content),
        },
    }
    Ok(())
}

fn print_result(result: &QueryResult, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            println!("{}", render_table(&result.columns, &result.rows));
            println!("{} row(s), query {}", result.rows.len(), result.query_execution_id);
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result.records())?),
        OutputFormat::Csv => print!("{}", render_csv(&result.columns, &result.rows)?),
    }
    Ok(())
}

fn print_schema(schema: &serde_json::Map<String, serde_json::Value>, format: OutputFormat) -> Result<()> {
    let columns = vec!["column".to_string(), "type".to_string()];
    let rows: Vec<Vec<String>> = schema
        .iter()
        .map(|(name, column_type)| {
            vec![name.clone(), column_type.as_str().unwrap_or_default().to_string()]
        })
        .collect();

    match format {
        OutputFormat::Table => println!("{}", render_table(&columns, &rows)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(schema)?),
        OutputFormat::Csv => print!("{}", render_csv(&columns, &rows)?),
    }
    Ok(())
}
