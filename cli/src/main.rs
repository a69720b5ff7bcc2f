use clap::Parser;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use trc_compiler::error::TrcError;
use trc_compiler::{compile, parse_source};

#[derive(Parser)]
#[command(name = "trc")]
#[command(about = "Compile tagged-record schemas to C++ classes", long_about = None)]
struct Cli {
    /// Generated header file
    #[arg(long, value_name = "FILE")]
    header: PathBuf,

    /// Generated source file
    #[arg(long, value_name = "FILE")]
    source: PathBuf,

    /// Input schema (standard input when omitted)
    input: Option<PathBuf>,

    /// Print the parsed schema as JSON instead of generating code
    #[arg(long, hide = true)]
    dump_ast: bool,
}

fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(&cli) {
        eprintln!("trc: {}", err);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), TrcError> {
    let text = match &cli.input {
        Some(path) => fs::read_to_string(path)?,
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    if cli.dump_ast {
        let schema = parse_source(&text)?;
        println!("{}", serde_json::to_string_pretty(&schema).unwrap());
        return Ok(());
    }

    let header_name = cli
        .header
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "records.h".to_string());
    let generated = compile(&text, &header_name)?;

    // Stage both outputs before renaming either, so a failure never leaves a
    // half-written file behind.
    let header_tmp = stage(&cli.header, &generated.header)?;
    let source_tmp = stage(&cli.source, &generated.source)?;
    persist(header_tmp, &cli.header)?;
    persist(source_tmp, &cli.source)?;
    Ok(())
}

fn stage(path: &Path, contents: &str) -> Result<NamedTempFile, TrcError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    Ok(tmp)
}

fn persist(tmp: NamedTempFile, path: &Path) -> Result<(), TrcError> {
    tmp.persist(path).map_err(|err| TrcError::Io(err.error))?;
    Ok(())
}
