//! hebi CLI - Python-flavoured embedded DSL to Arduino C++ transpiler

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

/// hebi - embedded DSL to Arduino C++ transpiler
#[derive(Parser, Debug)]
#[command(name = "hebi")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Transpile embedded DSL scripts to Arduino C++", long_about = None)]
struct Cli {
    /// Input DSL file
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output C++ file (default: <INPUT>.cpp in the current directory)
    #[arg(short, long, value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// Check only (don't generate output)
    #[arg(short, long)]
    check: bool,

    /// Dump the parsed program as JSON and exit
    #[arg(long)]
    dump_ast: bool,

    /// Print the captured target port (build directive) and exit
    #[arg(long)]
    port: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let source = std::fs::read_to_string(&cli.input)?;

    let program = match hebi::parse(&source) {
        Ok(program) => program,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };

    if cli.dump_ast {
        println!("{}", serde_json::to_string_pretty(&program)?);
        return Ok(());
    }

    if cli.port {
        match &program.target_port {
            Some(port) => println!("{port}"),
            None => {
                eprintln!("no target() directive found in {}", cli.input.display());
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let cpp = hebi::emitter::emit(&program);

    if cli.check {
        println!("OK: {}", cli.input.display());
        return Ok(());
    }

    let output_path = cli.output.unwrap_or_else(|| {
        let mut path = cli.input.clone();
        path.set_extension("cpp");
        match path.file_name() {
            Some(filename) => PathBuf::from(filename),
            None => path,
        }
    });

    std::fs::write(&output_path, &cpp)?;
    println!("Transpiled to: {}", output_path.display());

    Ok(())
}
