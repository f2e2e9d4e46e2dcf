use anyhow::{Context, Result};
use clap::Parser;
use libviet_core::code_table::{self, CodeTable};
use std::io::{Read, Write};
use std::path::PathBuf;

/// Re-encode Vietnamese text between code tables.
#[derive(Parser)]
#[command(name = "viet-convert")]
struct Args {
    /// Table the input was typed with.
    #[arg(long, default_value = "unicode")]
    from: CodeTable,

    #[arg(long)]
    to: CodeTable,

    /// Input file; stdin when omitted. Read as UTF-8.
    input: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let text = match &args.input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading stdin")?;
            buf
        }
    };

    let converted = code_table::convert(&text, args.from, args.to);
    std::io::stdout().lock().write_all(converted.as_bytes())?;
    Ok(())
}
