mod logging;
mod shell;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::info;

use logging::{LogConfig, LogFormat, init_logging};
use shell::{OutputFormat, ShellPresenter, Verbosity, run_shell};
use survey_session::{
    PersistedState, PersistenceGateway, Session, SessionConfig, StateStore, VersionDirGateway,
    resume_point,
};
use survey_spec::{
    Questionnaire, ValidationResult, compute_progress, questionnaire_schema, responses_schema,
    step_counts,
};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(
    name = "survey",
    version,
    about = "Questionnaire shell",
    long_about = "Fill multi-page questionnaires in a text shell, check saved answers and emit JSON schemas"
)]
struct Cli {
    /// Raise log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Compact, global = true)]
    log_format: LogFormat,
    /// Write logs to a file instead of stderr.
    #[arg(long, value_name = "PATH", global = true)]
    log_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fill a questionnaire interactively, resuming the saved draft.
    Run {
        /// Questionnaire JSON: an array of pages.
        #[arg(long, value_name = "SCHEMA")]
        schema: PathBuf,
        /// Versions directory holding the draft and archived submissions.
        #[arg(long, value_name = "DIR", env = "SURVEY_STORE_DIR", default_value = "versions")]
        store: PathBuf,
        /// Render mode for the current section.
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Override the debounced save window.
        #[arg(long, value_name = "MS")]
        debounce_ms: Option<u64>,
    },
    /// Validate a saved response file against a questionnaire.
    Validate {
        #[arg(long, value_name = "SCHEMA")]
        schema: PathBuf,
        /// Response JSON, optionally carrying the exclude/skip maps.
        #[arg(long, value_name = "RESPONSES")]
        responses: PathBuf,
    },
    /// Report completion of a saved response file.
    Progress {
        #[arg(long, value_name = "SCHEMA")]
        schema: PathBuf,
        #[arg(long, value_name = "RESPONSES")]
        responses: PathBuf,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Print the questionnaire JSON Schema, or the response schema of one questionnaire.
    Schema {
        #[arg(long, value_name = "SCHEMA")]
        questionnaire: Option<PathBuf>,
    },
    /// Delete the saved draft.
    Reset {
        #[arg(long, value_name = "DIR", env = "SURVEY_STORE_DIR", default_value = "versions")]
        store: PathBuf,
    },
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(
        &LogConfig::from_verbosity(cli.verbose)
            .with_format(cli.log_format)
            .with_log_file(cli.log_file),
    )?;
    match cli.command {
        Command::Run {
            schema,
            store,
            format,
            debounce_ms,
        } => run_session(schema, store, format, debounce_ms, cli.verbose > 0),
        Command::Validate { schema, responses } => run_validate(schema, responses),
        Command::Progress {
            schema,
            responses,
            format,
        } => run_progress(schema, responses, format),
        Command::Schema { questionnaire } => run_schema(questionnaire),
        Command::Reset { store } => run_reset(store),
    }
}

fn load_questionnaire(path: &Path) -> CliResult<Questionnaire> {
    let raw = fs::read_to_string(path)?;
    Ok(Questionnaire::from_json(&raw)?)
}

/// Response file with its flag maps applied to the questionnaire.
fn load_store(schema: &Path, responses: &Path) -> CliResult<StateStore> {
    let questionnaire = load_questionnaire(schema)?;
    let state: PersistedState = serde_json::from_str(&fs::read_to_string(responses)?)?;
    let mut store = StateStore::new(questionnaire);
    store.restore(state);
    Ok(store)
}

fn run_session(
    schema: PathBuf,
    store: PathBuf,
    format: OutputFormat,
    debounce_ms: Option<u64>,
    verbose: bool,
) -> CliResult<()> {
    let questionnaire = load_questionnaire(&schema)?;
    let mut config = SessionConfig::from_env()?;
    if let Some(ms) = debounce_ms {
        config.save_debounce_ms = ms;
    }
    let gateway = VersionDirGateway::open(&store)?;
    info!(store = %gateway.dir().display(), "opening session");

    let mut session = Session::start(questionnaire, gateway, &config);
    let presenter = ShellPresenter::new(format, Verbosity::from_verbose(verbose));
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    run_shell(&mut session, &presenter, stdin.lock(), &mut stdout)?;
    Ok(())
}

fn run_validate(schema: PathBuf, responses: PathBuf) -> CliResult<()> {
    let mut store = load_store(&schema, &responses)?;
    let result = store.validate_all();
    println!(
        "Validation result: {}",
        if result.valid { "valid" } else { "invalid" }
    );
    describe_validation(&result);

    if result.valid {
        Ok(())
    } else {
        Err("validation failed".into())
    }
}

fn describe_validation(result: &ValidationResult) {
    if !result.errors.is_empty() {
        println!("Errors:");
        for error in &result.errors {
            println!("  {} - {}", error.path, error.message);
        }
    }
    if !result.missing_required.is_empty() {
        println!(
            "Missing required answers: {}",
            result.missing_required.join(", ")
        );
    }
    if !result.unknown_fields.is_empty() {
        println!(
            "Unknown answer fields: {}",
            result.unknown_fields.join(", ")
        );
    }
    if let Some(section) = result.first_invalid {
        println!("First invalid section: {}", section);
    }
}

fn run_progress(schema: PathBuf, responses: PathBuf, format: OutputFormat) -> CliResult<()> {
    let mut store = load_store(&schema, &responses)?;
    store.validate_all();
    let cursor = resume_point(store.questionnaire(), store.responses());
    let report = compute_progress(
        store.questionnaire(),
        store.responses(),
        store.errors(),
        cursor,
    );

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            let steps = step_counts(store.questionnaire(), cursor);
            println!(
                "Required: {}/{} ({}%)",
                report.required_completed, report.required_total, report.required_percent
            );
            println!(
                "Optional: {}/{} ({}%)",
                report.optional_completed, report.optional_total, report.optional_percent
            );
            println!(
                "Resume at page {} of {}, section {} of {}",
                steps.page_number, steps.page_count, steps.section_number, steps.section_count
            );
            for (page_idx, page) in store.questionnaire().pages().iter().enumerate() {
                let statuses = report.pages.get(page_idx).map(Vec::as_slice).unwrap_or(&[]);
                for (section, status) in page.sections.iter().zip(statuses) {
                    println!("  {}/{}: {}", page.id, section.id, status.as_str());
                }
            }
        }
    }
    Ok(())
}

fn run_schema(questionnaire: Option<PathBuf>) -> CliResult<()> {
    let schema = match questionnaire {
        Some(path) => responses_schema(&load_questionnaire(&path)?),
        None => questionnaire_schema(),
    };
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

fn run_reset(store: PathBuf) -> CliResult<()> {
    let mut gateway = VersionDirGateway::open(&store)?;
    gateway.reset()?;
    println!("Draft cleared in {}", gateway.dir().display());
    Ok(())
}
