use clap::{Args, Parser, Subcommand};
use contract_overlay::{
    Agreement, ContractEngine, ContractError, ContractSession, ContractSubmitter, DocPoint,
    FileSource, OnboardingData, OptionFlag, PaymentOption, SignatureMode, SourceDocument,
    Submission,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    name = "contract-overlay",
    version,
    about = "Preview and fill onboarding contract PDFs"
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the PDF version and page sizes of a contract.
    Inspect { pdf: PathBuf },
    /// Print the overlay display list for a page as JSON.
    Preview(PreviewArgs),
    /// Bake a session into the contract and write the signed PDF.
    Fill(FillArgs),
}

#[derive(Args, Debug)]
struct EngineArgs {
    #[arg(long = "font-dir")]
    font_dirs: Vec<PathBuf>,
    #[arg(long)]
    signature_font: Option<String>,
    #[arg(long)]
    no_system_fonts: bool,
    /// Write JSONL debug events here.
    #[arg(long)]
    debug_log: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct SessionArgs {
    #[arg(long)]
    session: PathBuf,
    /// Onboarding record JSON; overrides the session file's `onboarding` object.
    #[arg(long)]
    onboarding: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct PreviewArgs {
    pdf: PathBuf,
    #[command(flatten)]
    session: SessionArgs,
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long, default_value_t = 1.0)]
    scale: f64,
    #[command(flatten)]
    engine: EngineArgs,
}

#[derive(Args, Debug)]
struct FillArgs {
    pdf: PathBuf,
    #[command(flatten)]
    session: SessionArgs,
    #[arg(long)]
    out: PathBuf,
    #[command(flatten)]
    engine: EngineArgs,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct SessionInput {
    onboarding: Map<String, Value>,
    fields: BTreeMap<String, String>,
    agreements: Vec<Agreement>,
    options: Vec<OptionFlag>,
    payment: Option<PaymentOption>,
    signature: SignatureInput,
    annotations: Vec<AnnotationInput>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct SignatureInput {
    mode: SignatureMode,
    typed_name: String,
    /// PNG captured from a drawing surface; relative to the session file.
    drawn_png: Option<PathBuf>,
}

#[derive(Deserialize, Debug)]
struct AnnotationInput {
    page: u32,
    x: f64,
    y: f64,
    text: String,
}

/// Writes the signed PDF and its audit record next to each other.
struct FileSubmitter {
    out: PathBuf,
}

impl ContractSubmitter for FileSubmitter {
    fn submit(&self, submission: &Submission) -> Result<(), String> {
        std::fs::write(&self.out, &submission.document.bytes)
            .map_err(|err| format!("write {}: {err}", self.out.display()))?;
        let audit_path = audit_path(&self.out);
        std::fs::write(&audit_path, submission.audit.to_json_pretty())
            .map_err(|err| format!("write {}: {err}", audit_path.display()))?;
        Ok(())
    }
}

fn audit_path(out: &Path) -> PathBuf {
    let mut name = out.as_os_str().to_os_string();
    name.push(".audit.json");
    PathBuf::from(name)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(command: Command) -> Result<(), ContractError> {
    match command {
        Command::Inspect { pdf } => {
            let doc = SourceDocument::from_path(&pdf)?;
            println!("{}", to_json(&doc.report())?);
            Ok(())
        }
        Command::Preview(args) => {
            let engine = build_engine(&args.engine)?;
            let mut session = prepare_session(&engine, &args.pdf, &args.session)?;
            session.set_scale(args.scale);
            let overlays = engine.render_overlay(&session, [args.page]);
            if overlays.is_empty() {
                tracing::warn!(page = args.page, "page is outside the document");
            }
            println!("{}", to_json(&overlays)?);
            Ok(())
        }
        Command::Fill(args) => {
            let engine = build_engine(&args.engine)?;
            let mut session = prepare_session(&engine, &args.pdf, &args.session)?;
            let submitter = FileSubmitter { out: args.out.clone() };
            if let Some(submission) = engine.commit(&mut session, &submitter)? {
                println!(
                    "wrote {} ({} bytes, {} signature), audit {}",
                    args.out.display(),
                    submission.document.bytes.len(),
                    submission.signature_mode.as_str(),
                    audit_path(&args.out).display()
                );
            }
            Ok(())
        }
    }
}

fn build_engine(args: &EngineArgs) -> Result<ContractEngine, ContractError> {
    let mut builder = ContractEngine::builder().system_fonts(!args.no_system_fonts);
    for dir in &args.font_dirs {
        builder = builder.register_font_dir(dir);
    }
    if let Some(name) = &args.signature_font {
        builder = builder.signature_font(name);
    }
    if let Some(path) = &args.debug_log {
        builder = builder.debug_log(path);
    }
    builder.build()
}

fn prepare_session(
    engine: &ContractEngine,
    pdf: &Path,
    args: &SessionArgs,
) -> Result<ContractSession, ContractError> {
    let session_path = args.session.as_path();
    let raw = std::fs::read_to_string(session_path)?;
    let input: SessionInput = serde_json::from_str(&raw).map_err(|err| {
        ContractError::InvalidConfiguration(format!("{}: {err}", session_path.display()))
    })?;
    let onboarding = match &args.onboarding {
        Some(path) => OnboardingData::from_json(&std::fs::read_to_string(path)?).map_err(|err| {
            ContractError::InvalidConfiguration(format!("{}: {err}", path.display()))
        })?,
        None => OnboardingData::new(input.onboarding),
    };

    let mut session = engine.new_session(&onboarding);
    session.load_source(&FileSource::new(pdf))?;
    session.measure_from_source();

    for (name, value) in &input.fields {
        if !session.set_field_value(name, value.as_str()) {
            tracing::warn!(field = %name, "unknown field in session file");
        }
    }
    for agreement in input.agreements {
        session.set_agreement(agreement, true);
    }
    for flag in input.options {
        session.set_option(flag, true);
    }
    if let Some(payment) = input.payment {
        session.select_payment(payment);
    }

    session.set_typed_name(input.signature.typed_name);
    if let Some(png) = input.signature.drawn_png {
        let png = match session_path.parent() {
            Some(dir) if png.is_relative() => dir.join(png),
            _ => png,
        };
        session.capture_signature_stroke(std::fs::read(&png)?)?;
    }
    session.set_signature_mode(input.signature.mode);

    for note in input.annotations {
        session.begin_add_text();
        session.place_annotation(note.page, DocPoint::new(note.x, note.y), &note.text);
    }
    Ok(session)
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, ContractError> {
    serde_json::to_string_pretty(value)
        .map_err(|err| ContractError::InvalidConfiguration(format!("json encode failed: {err}")))
}
