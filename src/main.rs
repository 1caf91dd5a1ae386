//! CLI driver: one positional argument, the path to the input source
//! file. Assembly goes to stdout, diagnostics to stderr; exit code 0 on
//! success, 1 on any error.

use std::path::PathBuf;
use std::process::ExitCode;

use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};

struct Args {
  path: PathBuf,
  verbose: bool,
}

fn parse_args() -> Result<Args, String> {
  let mut path = None;
  let mut verbose = false;
  for arg in std::env::args().skip(1) {
    match arg.as_str() {
      "-v" | "--verbose" => verbose = true,
      _ if path.is_none() => path = Some(PathBuf::from(arg)),
      other => return Err(format!("unexpected argument: {other}")),
    }
  }
  let path = path.ok_or("usage: subcc [-v] <input.c>")?;
  Ok(Args { path, verbose })
}

fn init_logging(verbose: bool) {
  let level = if verbose || std::env::var_os("SUBCC_LOG").is_some() {
    LevelFilter::Trace
  } else {
    LevelFilter::Warn
  };
  // Log to stderr so assembly output on stdout stays a clean `.s` file.
  let _ = TermLogger::init(level, Config::default(), TerminalMode::Stderr, ColorChoice::Auto);
}

fn main() -> ExitCode {
  let args = match parse_args() {
    Ok(args) => args,
    Err(message) => {
      eprintln!("{message}");
      return ExitCode::FAILURE;
    }
  };
  init_logging(args.verbose);

  let filename = args.path.display().to_string();
  let src = match subcc::driver::read_source(&args.path) {
    Ok(src) => src,
    Err(diag) => {
      eprintln!("{diag}");
      return ExitCode::FAILURE;
    }
  };

  match subcc::compile(&filename, &src) {
    Ok(asm) => {
      print!("{asm}");
      ExitCode::SUCCESS
    }
    Err(diag) => {
      eprintln!("{}", diag.render(&filename, &src));
      ExitCode::FAILURE
    }
  }
}
