mod artifact;
mod cask;
mod commands;
mod core;
mod release;
mod ui;
mod utils;

use clap::{Parser, Subcommand};
use core::context::TapContext;
use core::error::{TapError, TapResult, print_error};
use std::path::PathBuf;

/// Turn a folder of uploaded macOS app archives into a versioned Homebrew tap release
#[derive(Parser)]
#[command(name = "tap-release")]
#[command(version, about, long_about = None)]
#[command(styles = get_styles())]
struct Cli {
  #[command(subcommand)]
  command: Option<Commands>,

  /// Force a major bump of the repository version
  #[arg(long)]
  major: bool,

  /// Do not pause for inspection after repacking an upload
  #[arg(long)]
  non_interactive: bool,

  /// Inspect and plan only: nothing is repacked, written or published
  #[arg(long)]
  dry_run: bool,

  /// Tap repository root (defaults to the current directory)
  #[arg(short = 'C', long = "directory", value_name = "DIR", global = true)]
  directory: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
  /// Show repository version, release history and staged files
  Status {
    /// Output status in JSON format
    #[arg(long)]
    json: bool,
  },
}

fn get_styles() -> clap::builder::Styles {
  clap::builder::Styles::styled()
    .usage(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow))),
    )
    .header(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow))),
    )
    .literal(anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))))
    .invalid(
      anstyle::Style::new()
        .bold()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
    )
    .error(
      anstyle::Style::new()
        .bold()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
    )
    .valid(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))),
    )
    .placeholder(anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::White))))
}

fn main() {
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
    .format_timestamp(None)
    .init();

  let cli = Cli::parse();

  let root = match resolve_root(cli.directory.as_deref()) {
    Ok(root) => root,
    Err(e) => handle_error(e),
  };

  let ctx = match TapContext::build(&root) {
    Ok(ctx) => ctx,
    Err(e) => handle_error(e),
  };

  let result = match cli.command {
    Some(Commands::Status { json }) => commands::run_status(&ctx, json),
    None => commands::run_release(&ctx, cli.major, cli.non_interactive, cli.dry_run),
  };

  if let Err(e) = result {
    handle_error(e);
  }
}

/// Absolute repository root from `-C` or the current directory
fn resolve_root(directory: Option<&std::path::Path>) -> TapResult<PathBuf> {
  let cwd = std::env::current_dir().map_err(|e| TapError::message(format!("Failed to get current directory: {}", e)))?;
  let root = match directory {
    Some(dir) if dir.is_absolute() => dir.to_path_buf(),
    Some(dir) => cwd.join(dir),
    None => cwd,
  };
  if !root.is_dir() {
    return Err(TapError::message(format!("{} is not a directory", root.display())));
  }
  Ok(root)
}

fn handle_error(err: TapError) -> ! {
  print_error(&err);
  std::process::exit(err.exit_code().as_i32());
}
