//! Release command implementation
//!
//! Wires the real collaborators (system tools, system git, `gh`, stdin) into
//! the coordinator and prints the outcome.

use crate::artifact::SystemTools;
use crate::core::context::TapContext;
use crate::core::error::TapResult;
use crate::core::vcs::SystemGit;
use crate::release::{Collaborators, GhCli, ReleaseCoordinator, RunOptions, RunReport};
use crate::ui::prompt::{AutoApprove, Operator, StdinOperator};

/// Run the release pipeline once
pub fn run_release(ctx: &TapContext, major: bool, non_interactive: bool, dry_run: bool) -> TapResult<()> {
  let git = SystemGit::open(&ctx.root)?;
  let gh = GhCli::new(
    ctx.config.publish.gh.clone(),
    ctx.repo_slug.clone(),
    ctx.config.git.branch.clone(),
    &ctx.root,
  );
  let operator: &dyn Operator = if non_interactive || dry_run {
    &AutoApprove
  } else {
    &StdinOperator
  };

  if dry_run {
    println!("🔍 Dry run for {} (nothing will be changed)", ctx.repo_slug);
  } else {
    println!("🚀 Releasing {}", ctx.repo_slug);
  }
  println!();

  let with = Collaborators {
    tools: &SystemTools,
    vcs: &git,
    host: &gh,
    operator,
  };
  let report = ReleaseCoordinator::new(ctx, with).run(RunOptions {
    force_major: major,
    dry_run,
  })?;

  print_summary(&report, dry_run);
  Ok(())
}

fn print_summary(report: &RunReport, dry_run: bool) {
  if report.skipped.is_empty() && report.archived.is_empty() {
    return;
  }

  println!();
  println!("📋 Summary");
  for (file, reason) in &report.skipped {
    println!("   ⏭️  {} (left in place: {})", file, reason);
  }
  for file in &report.archived {
    let verb = if dry_run { "would be archived" } else { "archived" };
    println!("   📦 {} {}", file, verb);
  }
}
