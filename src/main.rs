//! Purpose: `ddbconv` CLI entry point.
//! Role: Binary crate root; parses args, installs logging, dispatches commands.
//! Invariants: stdout carries only command output; logs and diagnostics go to stderr.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `to_exit_code`.
#![allow(clippy::result_large_err)]
use std::error::Error as StdError;
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind};
use ddbconv::core::error::to_exit_code;
use ddbconv::{BinaryFormat, Error, ErrorKind, StringLayout};
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

mod command_dispatch;
mod inspect_json;

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(clap_error_summary(&err))
                        .with_hint("Try `ddbconv --help`."),
                    ColorMode::Auto,
                ));
            }
        },
    };

    init_tracing(cli.verbose);
    let color_mode = cli.color;

    command_dispatch::dispatch_command(cli.command)
        .map_err(|err| (add_hint(err), color_mode))
}

#[derive(Parser)]
#[command(
    name = "ddbconv",
    version,
    about = "Convert KingsIsle DML table files to and from XML",
    help_template = r#"{about-with-newline}
USAGE
  {usage}

COMMANDS
{subcommands}

OPTIONS
{options}

{after-help}
"#,
    long_about = None,
    after_help = r#"EXAMPLES
  $ ddbconv convert LatestFileList.bin          # writes LatestFileList.xml
  $ ddbconv convert LatestFileList.xml          # writes LatestFileList.bin
  $ ddbconv convert a.bin b.bin c.bin           # converts in parallel
  $ ddbconv convert tables.xml --format ddb-pooled -o tables.ddb
  $ ddbconv inspect LatestFileList.bin"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        default_value = "auto",
        value_enum,
        global = true,
        help = "Colorize stderr diagnostics: auto|always|never"
    )]
    color: ColorMode,
    #[arg(
        short,
        long,
        global = true,
        help = "Log per-table detail to stderr (RUST_LOG overrides)"
    )]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum FormatCli {
    Kingsisle,
    DdbInline,
    DdbPooled,
}

impl From<FormatCli> for BinaryFormat {
    fn from(value: FormatCli) -> Self {
        match value {
            FormatCli::Kingsisle => BinaryFormat::KingsIsle,
            FormatCli::DdbInline => BinaryFormat::Container(StringLayout::Inline),
            FormatCli::DdbPooled => BinaryFormat::Container(StringLayout::Pooled),
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(
        about = "Convert binary tables to XML, or XML back to binary",
        long_about = r#"Convert binary tables to XML, or XML back to binary.

Inputs ending in .xml are encoded to binary (next to the input as .bin);
any other input is decoded and written as .xml. Several inputs are
converted in parallel."#
    )]
    Convert {
        #[arg(required = true, value_hint = ValueHint::FilePath, help = "Input files")]
        inputs: Vec<PathBuf>,
        #[arg(
            short,
            long,
            value_hint = ValueHint::FilePath,
            help = "Output path (single input only)"
        )]
        output: Option<PathBuf>,
        #[arg(
            long,
            value_enum,
            help = "Binary format for XML input (default: FORMAT attribute of the root)"
        )]
        format: Option<FormatCli>,
        #[arg(long, help = "Root element name for XML output (default: input file stem)")]
        root: Option<String>,
    },
    #[command(about = "Print a JSON summary of a table file")]
    Inspect {
        #[arg(value_hint = ValueHint::FilePath, help = "Binary or XML table file")]
        input: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn add_hint(err: Error) -> Error {
    if err.hint().is_some() {
        return err;
    }
    let hint = match err.kind() {
        ErrorKind::Io => "Check the path and permissions of the input and output files.",
        ErrorKind::Corrupt | ErrorKind::TruncatedInput | ErrorKind::UnknownType => {
            "The file does not decode as a table file. Check that it is not damaged."
        }
        ErrorKind::Internal => {
            "Unexpected internal failure. Retry with RUST_BACKTRACE=1 and share the input if it persists."
        }
        _ => return err,
    };
    err.with_hint(hint)
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_json(value: Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error",
        ErrorKind::Usage => "usage error",
        ErrorKind::Io => "i/o error",
        ErrorKind::BadMagic => "not a DDB1 container",
        ErrorKind::UnsupportedVersion => "unsupported container version",
        ErrorKind::TruncatedInput => "input ends mid-field",
        ErrorKind::UnknownType => "unknown type tag",
        ErrorKind::DuplicateColumn => "duplicate column",
        ErrorKind::DuplicateTable => "duplicate table",
        ErrorKind::InvalidStringIndex => "string index out of range",
        ErrorKind::InconsistentRowWidth => "row width does not match schema",
        ErrorKind::TypeMismatch => "value does not match column type",
        ErrorKind::InvalidSchema => "invalid schema",
        ErrorKind::InvalidValue => "invalid value",
        ErrorKind::InvalidUtf8 => "invalid text encoding",
        ErrorKind::Corrupt => "corrupt data",
        ErrorKind::Xml => "malformed XML",
    }
    .to_string()
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

/// Optional location and advice fields, in display order.
fn error_fields(err: &Error) -> Vec<(&'static str, Value)> {
    let mut fields = Vec::new();
    if let Some(hint) = err.hint() {
        fields.push(("hint", json!(hint)));
    }
    if let Some(path) = err.path() {
        fields.push(("path", json!(path.display().to_string())));
    }
    if let Some(table) = err.table() {
        fields.push(("table", json!(table)));
    }
    if let Some(column) = err.column() {
        fields.push(("column", json!(column)));
    }
    if let Some(offset) = err.offset() {
        fields.push(("offset", json!(offset)));
    }
    fields
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    for (name, value) in error_fields(err) {
        inner.insert(name.to_string(), value);
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }
    json!({ "error": inner })
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = vec![format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    )];
    for (name, value) in error_fields(err) {
        let value = match value {
            Value::String(text) => text,
            other => other.to_string(),
        };
        let label = format!("{name}:");
        lines.push(format!("{} {value}", colorize_label(&label, use_color, AnsiColor::Yellow)));
    }
    if let Some(cause) = error_causes(err).first() {
        lines.push(format!(
            "{} {cause}",
            colorize_label("caused by:", use_color, AnsiColor::Yellow)
        ));
    }
    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}
