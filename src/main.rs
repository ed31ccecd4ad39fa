use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use invoice_compare_lib::config::{
    self, GenerationSettings, DEFAULT_API_BASE, DEFAULT_OPENAI_API_BASE, DEFAULT_TRUTH_MODEL, HISTORY_FILE,
};
use invoice_compare_lib::db::Db;
use invoice_compare_lib::normalize::Strictness;
use invoice_compare_lib::inference::providers_for;
use invoice_compare_lib::{batch, BatchRunner, Config, ExtractionProfile, FixedDelay, ProfileKind, ProviderRouter};

#[derive(Parser, Debug)]
#[command(name = "invoice-compare")]
#[command(version, about = "Extract invoice fields with several hosted models and score them against a reference model", long_about = None)]
struct Cli {
    /// Debug-level logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract every PDF with every model, then compare against the truth model
    Run(RunArgs),

    /// Re-score an existing extraction_results.json without calling any model
    Compare(ScoringArgs),

    /// List the recorded extraction history of one file
    History {
        /// File name as it appears in the results (e.g. invoice.pdf)
        file: String,

        #[arg(short, long, env = "INVOICE_OUTPUT_DIR", default_value = "output")]
        output: PathBuf,

        /// History database (default: <output>/extractions.db)
        #[arg(long)]
        history_db: Option<PathBuf>,
    },

    /// Print the extraction prompt of a profile
    Prompt {
        #[arg(long, value_enum, env = "INVOICE_PROFILE", default_value_t = ProfileKind::Supplier)]
        profile: ProfileKind,
    },
}

#[derive(Args, Debug)]
struct ScoringArgs {
    /// Directory for results, comparison and report
    #[arg(short, long, env = "INVOICE_OUTPUT_DIR", default_value = "output")]
    output: PathBuf,

    /// Comma-separated model identifiers
    #[arg(long, env = "INVOICE_MODELS", default_value = "gemini-1.5-pro,gemini-1.5-flash,gemini-2.0-flash")]
    models: String,

    /// Model whose output is treated as ground truth
    #[arg(long, env = "INVOICE_TRUTH_MODEL", default_value = DEFAULT_TRUTH_MODEL)]
    truth_model: String,

    /// Extraction profile (prompt, exclusions, normalization)
    #[arg(long, value_enum, env = "INVOICE_PROFILE", default_value_t = ProfileKind::Supplier)]
    profile: ProfileKind,

    /// Extra dotted field path to leave out of scoring (repeatable)
    #[arg(long = "exclude", value_name = "PATH")]
    exclude: Vec<String>,

    /// Override the profile's string normalization
    #[arg(long, value_enum)]
    normalization: Option<Strictness>,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    scoring: ScoringArgs,

    /// Directory containing the invoice PDFs
    #[arg(short, long, env = "INVOICE_INPUT_DIR", default_value = "invoices")]
    input: PathBuf,

    /// Pause between consecutive model calls, in milliseconds
    #[arg(long, env = "INVOICE_DELAY_MS", default_value_t = 2000)]
    delay_ms: u64,

    #[arg(long, env = "INVOICE_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: u32,

    #[arg(long, env = "INVOICE_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    #[arg(long, env = "INVOICE_API_BASE", default_value = DEFAULT_API_BASE)]
    api_base: String,

    #[arg(long, env = "INVOICE_OPENAI_API_BASE", default_value = DEFAULT_OPENAI_API_BASE)]
    openai_api_base: String,

    /// HTTP timeout per request, in seconds
    #[arg(long, env = "INVOICE_TIMEOUT_SECS", default_value_t = 120)]
    timeout_secs: u64,

    /// Extraction history database (default: <output>/extractions.db)
    #[arg(long)]
    history_db: Option<PathBuf>,

    /// Do not record extraction history
    #[arg(long, conflicts_with = "resume")]
    no_history: bool,

    /// Reuse successful extractions from the history database
    #[arg(long)]
    resume: bool,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    config::load_env();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run(args) => run(args),
        Commands::Compare(args) => compare(args),
        Commands::History {
            file,
            output,
            history_db,
        } => history(&file, history_db.unwrap_or_else(|| output.join(HISTORY_FILE))),
        Commands::Prompt { profile } => {
            println!("{}", ExtractionProfile::builtin(profile).prompt);
            Ok(())
        }
    }
}

fn scoring_config(args: &ScoringArgs) -> Config {
    let profile = ExtractionProfile::builtin(args.profile)
        .with_exclusions(&args.exclude)
        .with_strictness(args.normalization);
    Config {
        input_dir: PathBuf::new(),
        output_dir: args.output.clone(),
        models: Config::parse_models(&args.models),
        truth_model: args.truth_model.trim().to_string(),
        profile,
        generation: GenerationSettings::default(),
        call_delay: Duration::ZERO,
        request_timeout: Duration::from_secs(120),
        api_base: DEFAULT_API_BASE.to_string(),
        openai_api_base: DEFAULT_OPENAI_API_BASE.to_string(),
        history_db: None,
        resume: false,
    }
}

fn run(args: RunArgs) -> Result<()> {
    let mut config = scoring_config(&args.scoring);
    config.input_dir = args.input;
    config.generation = GenerationSettings {
        temperature: args.temperature,
        max_output_tokens: args.max_tokens,
    };
    config.call_delay = Duration::from_millis(args.delay_ms);
    config.request_timeout = Duration::from_secs(args.timeout_secs);
    config.api_base = args.api_base;
    config.openai_api_base = args.openai_api_base;
    config.history_db = if args.no_history {
        None
    } else {
        Some(args.history_db.unwrap_or_else(|| config.output_dir.join(HISTORY_FILE)))
    };
    config.resume = args.resume;
    config.validate().context("Invalid configuration")?;

    let backend = ProviderRouter::from_config(&config, config::api_key_from_env)?;

    println!("[*] Input: {}", config.input_dir.display());
    println!("[*] Output: {}", config.output_dir.display());
    println!("[*] Models: {} (truth: {})", config.models.join(", "), config.truth_model);
    let providers: Vec<String> = providers_for(&config.models).iter().map(|p| p.to_string()).collect();
    println!("[*] Providers: {}", providers.join(", "));
    println!("[*] Profile: {}", config.profile.kind);

    let pacer = FixedDelay(config.call_delay);
    let mut runner = BatchRunner::new(&config, &backend, &pacer);
    if let Some(path) = &config.history_db {
        let db = Db::new(path).with_context(|| format!("Failed to open history: {}", path.display()))?;
        runner = runner.with_history(db);
    }

    let outcome = runner.run().context("Batch run failed")?;

    println!(
        "\n[✓] Done: {} file(s), {} model call(s). Report: {}",
        outcome.results.file_count(),
        outcome.calls_made,
        config.report_path().display()
    );
    print_summary(&outcome.comparison);
    Ok(())
}

fn compare(args: ScoringArgs) -> Result<()> {
    let mut config = scoring_config(&args);
    let results_path = config.results_path();
    if !results_path.exists() {
        anyhow::bail!("Results file does not exist: {}", results_path.display());
    }
    if config.models.is_empty() {
        let saved = invoice_compare_lib::report::read_results(&results_path)
            .with_context(|| format!("Failed to read: {}", results_path.display()))?;
        config.models = saved.model_names();
    }
    config.validate().context("Invalid configuration")?;

    let (comparison, _) = batch::rescore(&config)
        .with_context(|| format!("Failed to re-score: {}", results_path.display()))?;
    println!("[✓] Report: {}", config.report_path().display());
    print_summary(&comparison);
    Ok(())
}

fn history(file: &str, db_path: PathBuf) -> Result<()> {
    if !db_path.exists() {
        anyhow::bail!("History database does not exist: {}", db_path.display());
    }
    let db = Db::new(&db_path).with_context(|| format!("Failed to open history: {}", db_path.display()))?;
    let records = db.get_history(file)?;
    if records.is_empty() {
        println!("[*] No extractions recorded for {}", file);
        return Ok(());
    }
    println!("[*] {} extraction(s) recorded for {}:", records.len(), file);
    for r in &records {
        match &r.error_message {
            Some(e) => println!("    {}  {:<24} {:<6} {}", r.created_at, r.model, r.status, e),
            None => println!("    {}  {:<24} {}", r.created_at, r.model, r.status),
        }
    }
    Ok(())
}

fn print_summary(comparison: &invoice_compare_lib::ComparisonReport) {
    println!("\n[*] Accuracy vs {}:", comparison.truth_model);
    for m in &comparison.summary.models {
        match m.average_accuracy {
            Some(avg) => println!(
                "    {:<28} {:>7.2}%  ({} compared, {} errors)",
                m.model, avg, m.files_compared, m.error_count
            ),
            None => println!(
                "    {:<28} {:>8}  ({} compared, {} errors)",
                m.model, "n/a", m.files_compared, m.error_count
            ),
        }
    }
    if !comparison.summary.skipped_files.is_empty() {
        println!("    {} file(s) skipped from scoring", comparison.summary.skipped_files.len());
    }
}
