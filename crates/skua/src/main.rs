use anyhow::{Context, Result};
use clap::Parser;
use skua_vm_bytecode::Script;
use skua_vm_core::{Runtime, SandBox};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::filter::EnvFilter;

mod config;

/// Extension of serialized scripts written by `--emit`
const BYTECODE_EXTENSION: &str = "skbc";

#[derive(Parser)]
#[command(name = "skua", version, about = "Skua ECMAScript VM")]
struct Cli {
    /// Script to run (source, or bytecode with the .skbc extension)
    #[arg(conflicts_with = "eval")]
    file: Option<PathBuf>,

    /// Evaluate a source string instead of a file
    #[arg(short, long, value_name = "SOURCE")]
    eval: Option<String>,

    /// Configuration file (defaults to the nearest skua.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Compile as strict mode code
    #[arg(long)]
    strict: bool,

    /// Print the bytecode listing instead of running
    #[arg(long)]
    dump_bytecode: bool,

    /// Write the compiled script to PATH instead of running
    #[arg(long, value_name = "PATH", conflicts_with = "dump_bytecode")]
    emit: Option<PathBuf>,

    /// Print the completion value
    #[arg(short, long)]
    print: bool,

    /// More logging (-v debug, -vv trace); RUST_LOG still applies
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

enum Input {
    File(PathBuf),
    Inline(String),
}

impl Input {
    fn name(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Inline(_) => "<eval>".to_string(),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.parse()?))
        .with_writer(std::io::stderr)
        .init();

    let config = config::load_config(cli.config.as_deref())?;
    let input = match (cli.file, cli.eval) {
        (Some(path), _) => Input::File(path),
        (None, Some(source)) => Input::Inline(source),
        (None, None) => anyhow::bail!("nothing to run: pass a file or --eval"),
    };
    let source_name = input.name();

    let mut options = config.compiler.compile_options(&source_name);
    options.strict |= cli.strict;
    let mut runtime = Runtime::with_options(config.vm, options);

    let script = match &input {
        Input::File(path) if is_bytecode(path) => load_bytecode(path)?,
        Input::File(path) => {
            let source =
                std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
            runtime.compile(&source, &source_name)?
        }
        Input::Inline(source) => runtime.compile(source, &source_name)?,
    };

    if cli.dump_bytecode {
        print!("{}", script.dump());
        return Ok(());
    }
    if let Some(out) = &cli.emit {
        let bytes = script.to_bytes()?;
        std::fs::write(out, &bytes).with_context(|| format!("Failed to write {}", out.display()))?;
        tracing::info!(path = %out.display(), bytes = bytes.len(), "bytecode written");
        return Ok(());
    }

    run_script(&mut runtime, script, cli.print)
}

fn run_script(runtime: &mut Runtime, script: Arc<Script>, print_result: bool) -> Result<()> {
    runtime.set_output(|line| println!("{line}"));

    let result = SandBox::new(runtime).run(|rt| {
        let value = rt.execute(script)?;
        rt.run_jobs()?;
        Ok(value)
    });

    if !result.is_successful() {
        return Err(anyhow::anyhow!(result.stack_trace_string()));
    }
    if print_result {
        println!("{}", runtime.display_value(result.result));
    }

    Ok(())
}

fn is_bytecode(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == BYTECODE_EXTENSION)
}

fn load_bytecode(path: &Path) -> Result<Arc<Script>> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let script = Script::from_bytes(&bytes).with_context(|| format!("Invalid bytecode in {}", path.display()))?;
    Ok(Arc::new(script))
}
