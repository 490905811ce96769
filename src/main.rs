use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use caplan::compile;
use clap::Parser;

/// Compile a Caplan source file into NASM x86-64 assembly.
#[derive(Debug, Parser)]
#[command(name = "caplanc", version, about)]
struct Args {
  /// Source file to compile
  input: PathBuf,

  /// Where to write the assembly; defaults to INPUT with an `.asm` extension
  #[arg(short, long)]
  output: Option<PathBuf>,
}

fn main() {
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
  let args = Args::parse();

  let source = match fs::read_to_string(&args.input) {
    Ok(source) => source,
    Err(err) => {
      eprintln!("cannot read {}: {err}", args.input.display());
      process::exit(1);
    }
  };

  let compilation = match compile(&source) {
    Ok(compilation) => compilation,
    Err(err) => {
      eprintln!("{err}");
      process::exit(1);
    }
  };

  let output = output_path(&args.input, args.output);
  if let Err(err) = fs::write(&output, compilation.assembly) {
    eprintln!("cannot write {}: {err}", output.display());
    process::exit(1);
  }
  log::info!("wrote {}", output.display());
}

/// The explicit `-o` path, or the input with its extension replaced by `.asm`.
fn output_path(input: &Path, output: Option<PathBuf>) -> PathBuf {
  output.unwrap_or_else(|| input.with_extension("asm"))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_output_replaces_the_extension() {
    assert_eq!(output_path(Path::new("dir/prog.cap"), None), PathBuf::from("dir/prog.asm"));
    assert_eq!(output_path(Path::new("prog"), None), PathBuf::from("prog.asm"));
  }

  #[test]
  fn explicit_output_wins() {
    let args = Args::try_parse_from(["caplanc", "prog.cap", "-o", "out/a.s"]).unwrap();
    assert_eq!(output_path(&args.input, args.output), PathBuf::from("out/a.s"));
  }

  #[test]
  fn input_is_required() {
    assert!(Args::try_parse_from(["caplanc"]).is_err());
  }
}
