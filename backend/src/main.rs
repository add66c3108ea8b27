//! SurveyQuant CLI - turn survey exports into analysis-ready variables
//!
//! # Main Commands
//!
//! ```bash
//! surveyquant transform responses.csv --example -o out/   # Derived dataset
//! surveyquant summarize responses.csv -r registry.json    # Summary only
//! surveyquant registry list                               # Stored registries
//! surveyquant serve                                       # HTTP server
//! ```
//!
//! # Debug Commands
//!
//! ```bash
//! surveyquant parse responses.csv          # Parse CSV to JSON
//! surveyquant registry example             # Print the built-in registry
//! surveyquant registry validate file.json  # Check a registry file
//! ```

use clap::{Args, Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use surveyquant::{
    example_registry, format_delimiter, read_table, transform_csv, write_output_dir, AppConfig, FilterPolicy,
    MappingRegistry, ParseOptions, PipelineOutput, RegistrySource, RegistryStore,
    TransformOptions,
};

#[derive(Parser)]
#[command(name = "surveyquant")]
#[command(about = "Transform survey exports into ordinal, midpoint and indicator variables", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a CSV file and output JSON
    Parse {
        /// Input CSV file
        input: PathBuf,

        #[command(flatten)]
        read: ReadArgs,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Full pipeline: export → filter → derived dataset
    Transform {
        /// Input CSV (or JSON array) file
        input: PathBuf,

        #[command(flatten)]
        read: ReadArgs,

        #[command(flatten)]
        run: RunArgs,

        /// Output directory for data.csv, dictionary.csv, summary.json, warnings.csv
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Print derived records as JSON on stdout instead of writing files
        #[arg(long)]
        json: bool,
    },

    /// Run the pipeline and print only the summary statistics
    Summarize {
        /// Input CSV (or JSON array) file
        input: PathBuf,

        #[command(flatten)]
        read: ReadArgs,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Manage mapping registries
    Registry {
        #[command(subcommand)]
        action: RegistryAction,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on (default: SURVEYQUANT_PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[derive(Args)]
struct ReadArgs {
    /// CSV delimiter (auto-detect if not specified)
    #[arg(short, long)]
    delimiter: Option<char>,

    /// Rows to skip after the header (e.g. question text rows)
    #[arg(long, default_value = "0")]
    skip_rows: usize,
}

impl ReadArgs {
    fn options(&self) -> ParseOptions {
        ParseOptions {
            delimiter: self.delimiter,
            skip_rows: self.skip_rows,
        }
    }
}

#[derive(Args)]
struct RunArgs {
    /// Registry JSON file
    #[arg(short, long, conflicts_with_all = ["registry_id", "example"])]
    registry: Option<PathBuf>,

    /// Stored registry id
    #[arg(long, conflicts_with = "example")]
    registry_id: Option<String>,

    /// Use the built-in example registry
    #[arg(long)]
    example: bool,

    /// Keep every record, ignoring the registry's filter
    #[arg(long, conflicts_with = "completed")]
    all: bool,

    /// Completion gate COLUMN=VALUE, replacing the registry's filter
    #[arg(long, value_name = "COLUMN=VALUE")]
    completed: Option<String>,
}

impl RunArgs {
    fn source(&self) -> RegistrySource {
        if let Some(path) = &self.registry {
            RegistrySource::File(path.clone())
        } else if let Some(id) = &self.registry_id {
            RegistrySource::Stored(id.clone())
        } else if self.example {
            RegistrySource::Example
        } else {
            RegistrySource::Auto
        }
    }

    fn filter(&self) -> Result<Option<FilterPolicy>, Box<dyn std::error::Error>> {
        if self.all {
            return Ok(Some(FilterPolicy::All));
        }
        match &self.completed {
            None => Ok(None),
            Some(spec) => {
                let (column, value) = spec
                    .split_once('=')
                    .ok_or_else(|| format!("--completed expects COLUMN=VALUE, got '{}'", spec))?;
                Ok(Some(FilterPolicy::completed(column.trim(), value.trim())))
            }
        }
    }
}

#[derive(Subcommand)]
enum RegistryAction {
    /// Print the built-in example registry
    Example,

    /// Validate a registry JSON file
    Validate {
        file: PathBuf,
    },

    /// List stored registries
    List,

    /// Import a registry JSON file into the store
    Import {
        file: PathBuf,
        /// Name for the registry (default: file stem)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Show a stored registry
    Show {
        id: String,
    },

    /// Delete a stored registry
    Delete {
        id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Error: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Parse { input, read, output } => cmd_parse(&input, &read, output.as_deref()),

        Commands::Transform {
            input,
            read,
            run,
            output_dir,
            json,
        } => cmd_transform(&config, &input, &read, &run, output_dir, json),

        Commands::Summarize { input, read, run } => cmd_summarize(&config, &input, &read, &run),

        Commands::Registry { action } => cmd_registry(&config, action),

        Commands::Serve { port } => cmd_serve(config, port).await,
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_parse(input: &Path, read: &ReadArgs, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Parsing: {}", input.display());

    let result = read_table(input, read.options())?;

    eprintln!("   Encoding: {}", result.encoding);
    eprintln!(
        "   Delimiter: '{}'{}",
        format_delimiter(result.delimiter),
        if read.delimiter.is_none() { " (auto-detected)" } else { "" }
    );
    eprintln!("   Columns: {}", result.headers.join(", "));
    eprintln!("✅ Parsed {} records", result.records.len());

    let json = serde_json::to_string_pretty(&result.records)?;
    write_output(&json, output)
}

fn run_pipeline(
    config: &AppConfig,
    input: &Path,
    read: &ReadArgs,
    run: &RunArgs,
) -> Result<PipelineOutput, Box<dyn std::error::Error>> {
    eprintln!("📄 Processing: {}", input.display());

    let options = TransformOptions {
        registry: run.source(),
        store_dir: config.registry_dir.clone(),
        parse: read.options(),
        filter: run.filter()?,
        record_stats: true,
    };

    Ok(transform_csv(input, &options)?)
}

fn cmd_transform(
    config: &AppConfig,
    input: &Path,
    read: &ReadArgs,
    run: &RunArgs,
    output_dir: Option<PathBuf>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let output = run_pipeline(config, input, read, run)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&output.records)?);
    } else {
        let dir = output_dir.unwrap_or_else(|| config.output_dir.clone());
        let paths = write_output_dir(&dir, &output)?;
        eprintln!("\n💾 Written:");
        eprintln!("   {}", paths.data.display());
        eprintln!("   {}", paths.dictionary.display());
        eprintln!("   {}", paths.summary.display());
        eprintln!("   {}", paths.warnings.display());
    }

    print_summary(&output);
    eprintln!("\n✨ Done!");
    Ok(())
}

fn cmd_summarize(
    config: &AppConfig,
    input: &Path,
    read: &ReadArgs,
    run: &RunArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let output = run_pipeline(config, input, read, run)?;
    println!("{}", serde_json::to_string_pretty(&output.summary)?);
    Ok(())
}

fn print_summary(output: &PipelineOutput) {
    let summary = &output.summary;
    eprintln!("\n📊 Summary");
    eprintln!("   Respondents:  {}", summary.raw_total);
    eprintln!(
        "   Eligible:     {} ({:.1}%)",
        summary.eligible_total,
        summary.completion_rate * 100.0
    );
    eprintln!("   Excluded:     {}", summary.excluded_total);
    eprintln!("   Fields:       {}", output.dictionary.len());
    eprintln!("   Unexpected:   {}", summary.unexpected_total());
    for (table, quality) in &summary.unexpected_values {
        let values: Vec<&str> = quality.values.keys().map(String::as_str).take(3).collect();
        eprintln!("      {}: {} ({})", table, quality.count, values.join(", "));
    }
    eprintln!("   Warnings:     {}", summary.warning_count);
}

fn cmd_registry(config: &AppConfig, action: RegistryAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = RegistryStore::with_dir(&config.registry_dir);

    match action {
        RegistryAction::Example => {
            println!("{}", example_registry().to_json()?);
        }

        RegistryAction::Validate { file } => {
            eprintln!("✔️  Validating: {}", file.display());
            let registry = MappingRegistry::from_file(&file)?;
            eprintln!("✅ Registry is valid (version {})", registry.version());
            eprintln!("   Tables: {}", registry.table_keys().collect::<Vec<_>>().join(", "));
            eprintln!("   Fields: {}", registry.fields().len());
            eprintln!("   Filter: {}", registry.filter_policy().describe());
        }

        RegistryAction::List => {
            let registries = store.list();
            if registries.is_empty() {
                eprintln!("📋 No registries stored yet.");
                eprintln!("   Use 'surveyquant registry import <file>' to add one.");
                return Ok(());
            }

            eprintln!("📋 Stored registries ({}):\n", registries.len());
            for r in registries {
                println!("  📄 {} ({})", r.name, r.id);
                println!("     Version: {}", r.registry.version);
                println!("     Columns: {}", r.columns.join(", "));
                println!("     Success rate: {:.0}%", r.success_rate * 100.0);
                println!("     Uses: {}", r.use_count);
                if let Some(ref last) = r.last_used {
                    println!("     Last used: {}", last);
                }
                println!();
            }
        }

        RegistryAction::Import { file, name } => {
            eprintln!("📥 Importing registry from: {}", file.display());
            let id = store.import(&file, name.as_deref())?;
            eprintln!("✅ Registry saved with ID: {}", id);
        }

        RegistryAction::Show { id } => {
            let r = store.get(&id)?;
            println!("📄 Registry: {} ({})\n", r.name, r.id);
            println!("Columns: {}", r.columns.join(", "));
            println!("Created: {}", r.created_at);
            println!("Success rate: {:.0}%", r.success_rate * 100.0);
            println!("Uses: {}", r.use_count);
            println!("\n{}", r.registry.to_json()?);
        }

        RegistryAction::Delete { id } => {
            store.delete(&id)?;
            eprintln!("🗑️  Registry deleted: {}", id);
        }
    }

    Ok(())
}

async fn cmd_serve(mut config: AppConfig, port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(port) = port {
        config.port = port;
    }
    surveyquant::server::start_server(config).await?;
    Ok(())
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
