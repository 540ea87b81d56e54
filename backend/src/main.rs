//! IATI Generator CLI - Convert CSV resources to IATI XML
//!
//! # Main Commands
//!
//! ```bash
//! iati-generator serve                                  # Start HTTP server (port 3000)
//! iati-generator convert activities.csv sectors.csv     # CSV resources → iati-activities XML
//! iati-generator convert activity-budgets=budgets.csv   # Explicit file type
//! ```
//!
//! # Debug Commands
//!
//! ```bash
//! iati-generator activities activities.csv              # Stage 1 only, JSON outcome
//! iati-generator validate transactions.csv              # Row report for one resource
//! iati-generator file-types                             # Known file types and columns
//! ```

use clap::{Args, Parser, Subcommand};
use iati_generator::{
    ruleset, ActivitiesResponse, ConversionConfig, ConversionRequest, ConvertResponse, CsvResource, FileType,
    InputError, Namespace, Pipeline, RowValidator, UNSUPPORTED_FILE_TYPES,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

#[derive(Parser)]
#[command(name = "iati-generator")]
#[command(about = "Convert tabular IATI CSV resources into IATI XML files", long_about = None)]
struct Cli {
    /// Verbose process logs (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct RunArgs {
    /// CSV resources, as FILE (type from the file name) or TYPE=FILE
    #[arg(required = true)]
    resources: Vec<String>,

    /// Namespace of the generated file
    #[arg(short, long)]
    namespace: Option<String>,

    /// Name reported in the outcome (default: the namespace)
    #[arg(long)]
    resource_name: Option<String>,

    /// Maximum rows read across all resources [env: IATI_ROWS_LIMIT]
    #[arg(long)]
    rows_limit: Option<usize>,

    /// Abort once row failures exceed this [env: IATI_MAX_ALLOWED_FAILURES]
    #[arg(long)]
    max_allowed_failures: Option<usize>,

    /// Currency of values that declare none [env: IATI_DEFAULT_CURRENCY]
    #[arg(long)]
    default_currency: Option<String>,

    /// Report values without a currency instead of using a fallback
    #[arg(long, conflicts_with = "default_currency")]
    no_default_currency: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Full pipeline: CSV resources → IATI XML
    Convert {
        #[command(flatten)]
        run: RunArgs,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the JSON response envelope instead of the XML
        #[arg(long)]
        json: bool,
    },

    /// Validate and assemble only, printing activities as JSON
    Activities {
        #[command(flatten)]
        run: RunArgs,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Report row-level problems of a single resource
    Validate {
        /// Input CSV file
        input: PathBuf,

        /// File type (default: inferred from the file name)
        #[arg(short = 't', long)]
        file_type: Option<String>,
    },

    /// List the known file types and their columns
    FileTypes,

    /// Start HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Run logs are printed by the commands themselves; process logs are
    // for the server or on request.
    let default_level = match (&cli.command, cli.verbose) {
        (_, true) => LevelFilter::DEBUG,
        (Commands::Serve { .. }, false) => LevelFilter::INFO,
        _ => LevelFilter::OFF,
    };
    init_tracing(default_level);

    let result = match cli.command {
        Commands::Convert { run, output, json } => cmd_convert(&run, output.as_deref(), json),

        Commands::Activities { run, output } => cmd_activities(&run, output.as_deref()),

        Commands::Validate { input, file_type } => cmd_validate(&input, file_type.as_deref()),

        Commands::FileTypes => cmd_file_types(),

        Commands::Serve { port } => cmd_serve(port).await,
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing(level: LevelFilter) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

// =============================================================================
// Request building
// =============================================================================

/// `TYPE=FILE` when the prefix names a file type, plain `FILE` otherwise.
fn parse_resource_arg(arg: &str) -> Result<(FileType, PathBuf), Box<dyn std::error::Error>> {
    if let Some((prefix, path)) = arg.split_once('=') {
        if let Ok(file_type) = prefix.parse::<FileType>() {
            return Ok((file_type, PathBuf::from(path)));
        }
    }
    let path = PathBuf::from(arg);
    let file_type = file_type_of(&path, None)?;
    Ok((file_type, path))
}

fn file_type_of(path: &Path, explicit: Option<&str>) -> Result<FileType, Box<dyn std::error::Error>> {
    if let Some(raw) = explicit {
        return Ok(raw.parse()?);
    }
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    match file_name.parse::<FileType>() {
        Ok(file_type) => Ok(file_type),
        Err(e @ InputError::UnsupportedFileType { .. }) => Err(e.into()),
        Err(_) => Err(format!(
            "Cannot infer the file type of '{}'; use TYPE=FILE (see `iati-generator file-types`)",
            path.display()
        )
        .into()),
    }
}

fn build_request(run: &RunArgs) -> Result<(ConversionRequest, ConversionConfig), Box<dyn std::error::Error>> {
    let mut config = ConversionConfig::from_env()?;
    if let Some(limit) = run.rows_limit {
        config = config.with_rows_limit(limit);
    }
    if let Some(max) = run.max_allowed_failures {
        config = config.with_max_allowed_failures(max);
    }
    if let Some(currency) = &run.default_currency {
        config = config.with_default_currency(Some(currency.trim().to_uppercase()));
    }
    if run.no_default_currency {
        config = config.with_default_currency(None);
    }

    let namespace = match run.namespace.as_deref() {
        Some(raw) => Namespace::parse(raw)?,
        None => Namespace::default(),
    };
    let resource_name = run.resource_name.clone().unwrap_or_else(|| {
        if namespace.is_default() {
            "default".to_string()
        } else {
            namespace.as_str().to_string()
        }
    });

    // One row past the limit, so truncation is still reported.
    let max_rows = config.rows_limit.saturating_add(1);
    let mut request = ConversionRequest::new(resource_name);
    for arg in &run.resources {
        let (file_type, path) = parse_resource_arg(arg)?;
        let bytes = fs::read(&path)?;
        let resource = CsvResource::from_bytes_limited(path.display().to_string(), file_type, &bytes, max_rows)?
            .with_namespace(namespace.clone());

        eprintln!(
            "📄 {} ({}, {} rows, encoding {}, delimiter '{}')",
            path.display(),
            file_type,
            resource.table.len(),
            resource.table.encoding,
            format_delimiter(resource.table.delimiter)
        );
        request = request.with_resource(resource);
    }

    Ok((request, config))
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

fn print_logs(lines: &[String]) {
    for line in lines {
        eprintln!("   {}", line);
    }
}

// =============================================================================
// Commands
// =============================================================================

fn cmd_convert(run: &RunArgs, output: Option<&Path>, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let (request, config) = build_request(run)?;

    eprintln!(
        "⚙️  Converting '{}' (rows limit {}, max failures {}, default currency {})",
        request.resource_name,
        config.rows_limit,
        config.max_allowed_failures,
        config.default_currency.as_deref().unwrap_or("none")
    );
    let outcome = Pipeline::new(config).convert(&request);
    let response = ConvertResponse::from(outcome);

    if json {
        write_output(&serde_json::to_string_pretty(&response)?, output)?;
    } else {
        print_logs(&response.logs);
        if let Some(xml) = &response.xml {
            write_output(xml, output)?;
        }
    }

    match response.error {
        Some(error) => Err(error.into()),
        None => {
            eprintln!("\n✨ Done! ({})", response.file_name);
            Ok(())
        }
    }
}

fn cmd_activities(run: &RunArgs, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let (request, config) = build_request(run)?;

    let outcome = Pipeline::new(config).activities(&request);
    let response = ActivitiesResponse::from(outcome);

    print_logs(&response.logs);
    eprintln!(
        "\n📦 Assembled: {} activities, {} organisations",
        response.activities.len(),
        response.organisations.len()
    );

    write_output(&serde_json::to_string_pretty(&response)?, output)?;

    if let Some(error) = response.error {
        return Err(error.into());
    }
    Ok(())
}

fn cmd_validate(input: &Path, file_type: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let file_type = file_type_of(input, file_type)?;
    eprintln!("✔️  Validating: {} as {}", input.display(), file_type);

    let resource = input.display().to_string();
    let table = iati_generator::parse_file_auto(input)?;
    let validator = RowValidator::new(resource, file_type, Namespace::default(), &table.headers)?;

    let mut valid = 0;
    let mut blank = 0;
    let mut invalid = 0;

    for row in &table.rows {
        match validator.validate(row) {
            Ok(Some(record)) => {
                valid += 1;
                for issue in &record.issues {
                    println!(
                        "⚠️  Row {}, column '{}': ignored value '{}' ({})",
                        record.row, issue.column, issue.value, issue.reason
                    );
                }
            }
            Ok(None) => blank += 1,
            Err(error) => {
                invalid += 1;
                println!("❌ {}", error);
            }
        }
    }

    eprintln!("\n📊 Results: {} valid, {} invalid, {} blank", valid, invalid, blank);

    if invalid > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_file_types() -> Result<(), Box<dyn std::error::Error>> {
    for file_type in FileType::ALL {
        let rules = ruleset(file_type);
        println!("  📄 {} (code {}, {})", file_type, file_type.code(), file_type.document());
        println!("     File: {}", file_type.csv_file_name());

        let columns: Vec<String> = rules
            .all_columns()
            .map(|c| if c.required { format!("{}*", c.name) } else { c.name.to_string() })
            .collect();
        println!("     Columns: {}", columns.join(", "));
        println!();
    }
    println!("  * required");
    println!();
    println!("  Not supported:");
    for (code, file_name) in UNSUPPORTED_FILE_TYPES {
        println!("     {} (code {})", file_name, code);
    }
    Ok(())
}

async fn cmd_serve(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let config = ConversionConfig::from_env()?;
    iati_generator::server::start_server(port, config).await
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
