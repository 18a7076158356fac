mod config;
mod store;
mod transport;
mod wizard;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use config::{IntakeConfig, load_config, resolve_store_dir};
use intake_spec::{
    EngineOptions, FieldValue, FormController, FormSpec, PHYSIO_FORM, SystemClock,
    ValidationResult, render_html, render_text,
};
use intake_static::{DEFAULT_EXPORT_FILES, DEFAULT_PORT, export_static};
use jiff::tz::TimeZone;
use serde_json::{Map, Value};
use store::FileStore;
use tracing_subscriber::EnvFilter;
use transport::{DEFAULT_TIMEOUT, UreqTransport};
use wizard::{Verbosity, Wizard, WizardPresenter};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Physiotherapy intake questionnaire",
    long_about = "Fills, previews, validates and submits the intake questionnaire, and serves or exports its static front end"
)]
struct Cli {
    /// Form definition JSON (defaults to the built-in physio questionnaire).
    #[arg(long, global = true, value_name = "SPEC")]
    spec: Option<PathBuf>,
    /// Config file (defaults to ./intake.config.json when present).
    #[arg(long, global = true, value_name = "CONFIG")]
    config: Option<PathBuf>,
    /// Directory holding saved drafts.
    #[arg(long, global = true, env = "INTAKE_STORE_DIR", value_name = "DIR")]
    store_dir: Option<PathBuf>,
    /// Submission endpoint URL.
    #[arg(long, global = true, env = "INTAKE_ENDPOINT_URL", value_name = "URL")]
    endpoint: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum PreviewFormat {
    Text,
    Html,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum SchemaTarget {
    Form,
    Config,
}

#[derive(Subcommand)]
enum Command {
    /// Fill in the questionnaire section by section, then submit it.
    Fill {
        /// Show the step list, save notices and error details.
        #[arg(long, alias = "debug")]
        verbose: bool,
        /// Ignore the saved draft and start from an empty form.
        #[arg(long)]
        fresh: bool,
        /// Request timeout in seconds.
        #[arg(long, default_value_t = DEFAULT_TIMEOUT.as_secs())]
        timeout: u64,
    },
    /// Print the confirmation view of the current answers.
    Preview {
        /// JSON file of answers to use instead of the saved draft.
        #[arg(long, value_name = "ANSWERS")]
        answers: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = PreviewFormat::Text)]
        format: PreviewFormat,
    },
    /// Show section progress and when the draft was last saved.
    Status {
        #[arg(long, value_name = "ANSWERS")]
        answers: Option<PathBuf>,
    },
    /// Validate the answers as a submission would.
    Validate {
        #[arg(long, value_name = "ANSWERS")]
        answers: Option<PathBuf>,
    },
    /// Print the JSON body a submission would send.
    Payload {
        #[arg(long, value_name = "ANSWERS")]
        answers: Option<PathBuf>,
    },
    /// Submit the answers to the configured endpoint.
    Submit {
        #[arg(long, value_name = "ANSWERS")]
        answers: Option<PathBuf>,
        /// Request timeout in seconds.
        #[arg(long, default_value_t = DEFAULT_TIMEOUT.as_secs())]
        timeout: u64,
    },
    /// Delete the saved draft.
    Clear,
    /// Print the JSON Schema of the form definition or the config file.
    Schema {
        #[arg(long, value_enum, default_value_t = SchemaTarget::Form)]
        target: SchemaTarget,
    },
    /// Serve the static front end for local development.
    Serve {
        #[arg(long, value_name = "DIR", default_value = ".")]
        root: PathBuf,
        #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
        port: u16,
    },
    /// Copy the deployable front-end files into a clean directory.
    Export {
        #[arg(long, value_name = "DIR", default_value = ".")]
        root: PathBuf,
        #[arg(long, value_name = "DIR", default_value = "dist")]
        out: PathBuf,
        /// Files to copy instead of the default set.
        files: Vec<String>,
    },
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_tracing(match cli.command {
        Command::Serve { .. } => "info",
        _ => "warn",
    });

    let config = load_config(cli.config.as_deref())?;
    let session = Session {
        spec: cli.spec.clone(),
        store_dir: cli.store_dir.clone(),
        options: config.engine_options(cli.endpoint.clone()),
        config,
    };

    match cli.command {
        Command::Fill {
            verbose,
            fresh,
            timeout,
        } => run_fill(&session, verbose, fresh, Duration::from_secs(timeout)),
        Command::Preview { answers, format } => run_preview(&session, answers.as_deref(), format),
        Command::Status { answers } => run_status(&session, answers.as_deref()),
        Command::Validate { answers } => run_validate(&session, answers.as_deref()),
        Command::Payload { answers } => {
            let form = session.open_with(answers.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&form.payload())?);
            Ok(())
        }
        Command::Submit { answers, timeout } => {
            run_submit(&session, answers.as_deref(), Duration::from_secs(timeout))
        }
        Command::Clear => {
            let mut form = session.open()?;
            form.reset();
            println!("{}", form.status().text);
            Ok(())
        }
        Command::Schema { target } => {
            let schema = match target {
                SchemaTarget::Form => schemars::schema_for!(FormSpec),
                SchemaTarget::Config => schemars::schema_for!(IntakeConfig),
            };
            println!("{}", serde_json::to_string_pretty(&schema)?);
            Ok(())
        }
        Command::Serve { root, port } => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(intake_static::serve(root, port))?;
            Ok(())
        }
        Command::Export { root, out, files } => run_export(&root, &out, &files),
    }
}

fn init_tracing(default_filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(io::stderr)
        .init();
}

/// Everything needed to build a controller for one command.
struct Session {
    spec: Option<PathBuf>,
    store_dir: Option<PathBuf>,
    config: IntakeConfig,
    options: EngineOptions,
}

impl Session {
    fn open(&self) -> CliResult<FormController> {
        let spec: FormSpec = match &self.spec {
            Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
            None => serde_json::from_str(PHYSIO_FORM)?,
        };
        let store_dir = resolve_store_dir(self.store_dir.clone(), &self.config)?;
        tracing::debug!(form = %spec.id, store = %store_dir.display(), "opening form");
        let form = FormController::new(
            spec,
            Box::new(FileStore::new(store_dir)),
            Arc::new(SystemClock),
            self.options.clone(),
        )?;
        Ok(form)
    }

    /// Answers from `answers` when given, otherwise the saved draft.
    fn open_with(&self, answers: Option<&Path>) -> CliResult<FormController> {
        let mut form = self.open()?;
        match answers {
            Some(path) => apply_answers(&mut form, path)?,
            None => {
                form.restore();
            }
        }
        Ok(form)
    }
}

/// Applies a flat `{ "name": value }` file in form order so that conditions
/// see their inputs before the fields they reveal.
fn apply_answers(form: &mut FormController, path: &Path) -> CliResult<()> {
    let answers: Map<String, Value> = serde_json::from_str(&fs::read_to_string(path)?)?;
    for name in answers.keys() {
        if form.spec().field(name).is_none() {
            tracing::warn!(field = %name, "ignoring answer for unknown field");
        }
    }
    let names: Vec<String> = form
        .spec()
        .field_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    for name in names {
        let Some(value) = answers.get(&name) else {
            continue;
        };
        let value: FieldValue = serde_json::from_value(value.clone())
            .map_err(|err| format!("answer for '{}': {}", name, err))?;
        form.change(&name, value);
        form.blur(&name);
    }
    Ok(())
}

fn run_fill(session: &Session, verbose: bool, fresh: bool, timeout: Duration) -> CliResult<()> {
    let mut form = session.open()?;
    let mut presenter = WizardPresenter::new(Verbosity::from_verbose(verbose));
    presenter.show_header(form.spec());
    if !fresh && form.restore() {
        presenter.show_restored(form.last_saved_label(TimeZone::system()).as_deref());
    }

    let stdin = io::stdin();
    let mut wizard = Wizard::new(&mut form, stdin.lock(), presenter);
    let result = wizard.run();
    let presenter = wizard.into_presenter();
    form.save_now();
    result?;

    let outcome = form.submit(&UreqTransport::new(timeout));
    presenter.show_status(form.status());
    outcome.map_err(Into::into)
}

fn run_preview(session: &Session, answers: Option<&Path>, format: PreviewFormat) -> CliResult<()> {
    let form = session.open_with(answers)?;
    let preview = form.preview();
    match format {
        PreviewFormat::Text => println!("{}", render_text(&preview)),
        PreviewFormat::Html => println!("{}", render_html(&preview)?),
        PreviewFormat::Json => println!("{}", serde_json::to_string_pretty(&preview)?),
    }
    Ok(())
}

fn run_status(session: &Session, answers: Option<&Path>) -> CliResult<()> {
    let form = session.open_with(answers)?;
    println!("Form: {} (v{})", form.spec().title, form.spec().version);
    for step in form.steps() {
        let marker = if step.complete { '+' } else { ' ' };
        println!(" {} {}. {}", marker, step.index + 1, step.title);
    }
    println!("{}", form.progress().label());
    match form.last_saved_label(TimeZone::system()) {
        Some(label) => println!("{}", label),
        None => println!("No saved draft"),
    }
    Ok(())
}

fn run_validate(session: &Session, answers: Option<&Path>) -> CliResult<()> {
    let form = session.open_with(answers)?;
    let result = form.validate();
    println!(
        "Validation result: {}",
        if result.valid { "valid" } else { "invalid" }
    );
    describe_validation(&form, &result);

    if result.valid {
        Ok(())
    } else {
        Err("validation failed".into())
    }
}

fn describe_validation(form: &FormController, result: &ValidationResult) {
    if result.issues.is_empty() {
        return;
    }
    println!("Errors:");
    for issue in &result.issues {
        let label = form
            .spec()
            .descriptors(&issue.name)
            .next()
            .map(|(_, group, field)| intake_spec::preview::resolve_label(group, field))
            .unwrap_or_else(|| issue.name.clone());
        println!("  {} ({}) - {}", label, issue.name, issue.message);
    }
}

fn run_submit(session: &Session, answers: Option<&Path>, timeout: Duration) -> CliResult<()> {
    let mut form = session.open_with(answers)?;
    let outcome = form.submit(&UreqTransport::new(timeout));
    let status = form.status();
    match &outcome {
        Ok(()) => println!("{}", status.text),
        Err(err) => {
            eprintln!("{}", status.text);
            tracing::debug!(error = %err, "submission failed");
        }
    }
    outcome.map_err(Into::into)
}

fn run_export(root: &Path, out: &Path, files: &[String]) -> CliResult<()> {
    let files: Vec<&str> = if files.is_empty() {
        DEFAULT_EXPORT_FILES.to_vec()
    } else {
        files.iter().map(String::as_str).collect()
    };
    let report = export_static(root, out, &files)?;
    println!(
        "Exported {} file(s) to {}",
        report.copied.len(),
        report.out_dir.display()
    );
    if !report.skipped.is_empty() {
        println!("Skipped missing: {}", report.skipped.join(", "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_cmd::Command;
    use assert_fs::TempDir;
    use assert_fs::prelude::*;
    use intake_spec::submit::MISSING_ENDPOINT_MESSAGE;

    const COMPLETE: &str = r#"{
        "name": "山田 花子",
        "birthdate": "1980-04-15",
        "sex": "女性",
        "sensory_areas": ["肩", "腰"],
        "onset": "けが",
        "injury_date": "2026年3月",
        "fall_history": "いいえ",
        "consent": true
    }"#;

    fn intake(dir: &TempDir) -> Result<Command, Box<dyn std::error::Error>> {
        let mut cmd = Command::cargo_bin("physio-intake")?;
        cmd.current_dir(dir.path())
            .env_remove("INTAKE_ENDPOINT_URL")
            .env_remove("INTAKE_STORE_DIR")
            .env_remove("RUST_LOG")
            .arg("--store-dir")
            .arg(dir.child("drafts").path());
        Ok(cmd)
    }

    #[test]
    fn answers_file_feeds_the_payload() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let answers = dir.child("answers.json");
        answers.write_str(COMPLETE)?;

        let output = intake(&dir)?
            .arg("payload")
            .arg("--answers")
            .arg(answers.path())
            .output()?;
        assert!(output.status.success());
        let payload: Value = serde_json::from_slice(&output.stdout)?;
        assert_eq!(payload["name"], "山田 花子");
        assert_eq!(payload["sensory_areas"], serde_json::json!(["肩", "腰"]));
        assert_eq!(payload["injury_date"], "2026年3月");
        assert!(payload["timestamp"].is_string());
        assert!(payload.get("fall_count").is_none());
        Ok(())
    }

    #[test]
    fn validate_lists_missing_answers() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let answers = dir.child("answers.json");
        answers.write_str(r#"{ "name": "山田 花子" }"#)?;

        let output = intake(&dir)?
            .arg("validate")
            .arg("--answers")
            .arg(answers.path())
            .output()?;
        assert!(!output.status.success());
        let stdout = String::from_utf8(output.stdout)?;
        assert!(stdout.contains("Validation result: invalid"));
        assert!(stdout.contains("生年月日 (birthdate)"));

        answers.write_str(COMPLETE)?;
        intake(&dir)?
            .arg("validate")
            .arg("--answers")
            .arg(answers.path())
            .assert()
            .success();
        Ok(())
    }

    #[test]
    fn preview_renders_sections() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let answers = dir.child("answers.json");
        answers.write_str(COMPLETE)?;

        let output = intake(&dir)?
            .args(["preview", "--format", "text", "--answers"])
            .arg(answers.path())
            .output()?;
        assert!(output.status.success());
        let stdout = String::from_utf8(output.stdout)?;
        assert!(stdout.contains("■ 基本情報"));
        assert!(stdout.contains("  氏名: 山田 花子"));
        assert!(stdout.contains("  気になる部位（人体図）: 肩、腰"));
        Ok(())
    }

    #[test]
    fn submit_without_endpoint_fails_politely() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let answers = dir.child("answers.json");
        answers.write_str(COMPLETE)?;

        let output = intake(&dir)?
            .arg("submit")
            .arg("--answers")
            .arg(answers.path())
            .output()?;
        assert!(!output.status.success());
        let stderr = String::from_utf8(output.stderr)?;
        assert!(stderr.contains(MISSING_ENDPOINT_MESSAGE));
        Ok(())
    }

    #[test]
    fn aborted_fill_keeps_a_draft_until_cleared() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        intake(&dir)?
            .arg("fill")
            .write_stdin("山田 花子\n\n19800415\nexit\n")
            .assert()
            .failure();

        let draft = dir.child("drafts").child("physio-questionnaire-v1.json");
        let saved = fs::read_to_string(draft.path())?;
        assert!(saved.contains("山田 花子"));
        assert!(saved.contains("1980-04-15"));

        let output = intake(&dir)?.arg("status").output()?;
        assert!(output.status.success());
        assert!(String::from_utf8(output.stdout)?.contains("最終保存: "));

        let output = intake(&dir)?.arg("clear").output()?;
        assert!(output.status.success());
        assert!(String::from_utf8(output.stdout)?.contains("保存データを削除しました。"));
        assert!(!draft.path().exists());
        Ok(())
    }

    #[test]
    fn schema_describes_the_form() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let output = intake(&dir)?.arg("schema").output()?;
        assert!(output.status.success());
        let schema: Value = serde_json::from_slice(&output.stdout)?;
        assert_eq!(schema["title"], "FormSpec");
        assert!(schema["properties"]["sections"].is_object());
        Ok(())
    }

    #[test]
    fn export_copies_the_front_end() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        dir.child("site/index.html").write_str("<html></html>")?;
        dir.child("site/script.js").write_str("main()")?;

        let output = intake(&dir)?
            .arg("export")
            .arg("--root")
            .arg(dir.child("site").path())
            .arg("--out")
            .arg(dir.child("dist").path())
            .output()?;
        assert!(output.status.success());
        let stdout = String::from_utf8(output.stdout)?;
        assert!(stdout.contains("Exported 2 file(s)"));
        dir.child("dist/script.js").assert("main()");
        Ok(())
    }
}
