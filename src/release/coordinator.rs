//! Release coordinator: sequences the phases of one run
//!
//! ```text
//! Inspect -> Normalize -> Validate -> Resolve -> Mutate -> Persist -> Publish -> Cleanup
//! ```
//!
//! Nothing outside the staging folder changes until Resolve has produced a
//! validated plan and every new definition text has been computed.
//!
//! Resuming after a crash works from evidence rather than a phase log:
//! - a staged file whose checksum is recorded in the latest history entry
//!   belongs to a release that was persisted but never cleaned up; that release
//!   is published again (idempotently) and its files archived
//! - a staged file recorded in an older release is archived with a warning
//! - a `pending` plan whose assets match the staged files is reused as-is, so a
//!   crash during Mutate keeps its original version decision

use crate::artifact::{ArtifactNormalizer, PlatformTools, UploadArtifact, Verification, sha256_file};
use crate::cask::{CaskDocument, PackageDefinitionMutator, RecordChange, RecordInput, write_changes};
use crate::core::context::TapContext;
use crate::core::error::{ReleaseError, ResultExt, TapError, TapResult};
use crate::core::lock::RunLock;
use crate::core::vcs::Vcs;
use crate::release::docs::write_catalog;
use crate::release::notes::{commit_message, release_notes, release_title};
use crate::release::plan::{PlannedChange, ReleasePlan};
use crate::release::publish::{PublishRequest, ReleaseHost, RetryPolicy, publish_release};
use crate::release::state::{HistoryEntry, RepositoryState, StateStore};
use crate::ui::progress::ArtifactProgress;
use crate::ui::prompt::Operator;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Pipeline phases, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
  Inspect,
  Normalize,
  Validate,
  Resolve,
  Mutate,
  Persist,
  Publish,
  Cleanup,
}

impl fmt::Display for Phase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Phase::Inspect => "inspect",
      Phase::Normalize => "normalize",
      Phase::Validate => "validate",
      Phase::Resolve => "resolve",
      Phase::Mutate => "mutate",
      Phase::Persist => "persist",
      Phase::Publish => "publish",
      Phase::Cleanup => "cleanup",
    };
    write!(f, "{}", name)
  }
}

/// External capabilities a run needs
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
  pub tools: &'a dyn PlatformTools,
  pub vcs: &'a dyn Vcs,
  pub host: &'a dyn ReleaseHost,
  pub operator: &'a dyn Operator,
}

/// Flags for one run
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
  /// `--major`
  pub force_major: bool,
  /// Phases 1-3 only, nothing written
  pub dry_run: bool,
}

/// What a run did
#[derive(Debug, Default)]
pub struct RunReport {
  /// Earlier release that was finished by this run
  pub resumed: Option<semver::Version>,
  /// Release made (or, in a dry run, planned) by this run
  pub plan: Option<ReleasePlan>,
  /// Staged files left out of the run, with the reason
  pub skipped: Vec<(String, String)>,
  /// Staged files archived because they were already released
  pub archived: Vec<String>,
}

/// A validated artifact and where its bytes are
struct Candidate {
  change: PlannedChange,
  path: PathBuf,
}

/// Drives a run from staged uploads to a published release
pub struct ReleaseCoordinator<'a> {
  ctx: &'a TapContext,
  with: Collaborators<'a>,
  store: StateStore,
}

impl<'a> ReleaseCoordinator<'a> {
  pub fn new(ctx: &'a TapContext, with: Collaborators<'a>) -> Self {
    Self {
      ctx,
      with,
      store: StateStore::new(ctx.state_path()),
    }
  }

  /// Run the pipeline once
  pub fn run(&self, options: RunOptions) -> TapResult<RunReport> {
    let _lock = RunLock::acquire(&self.ctx.lock_path())?;
    let mut state = self.store.load()?;
    let mut report = RunReport::default();

    self.enter(Phase::Inspect);
    let uploads = self.scan()?;
    if uploads.is_empty() && state.pending.is_none() {
      println!("✅ Nothing staged in {}", self.ctx.config.paths.upload.display());
      return Ok(report);
    }
    println!("🔍 Inspecting {} staged file(s)...", uploads.len());

    self.enter(Phase::Normalize);
    let artifacts = self.normalize(&uploads, options.dry_run, &mut report)?;

    self.enter(Phase::Validate);
    let (unfinished, fresh) = self.sort_released(&state, artifacts, options.dry_run, &mut report)?;
    if let Some((entry, paths)) = unfinished {
      if options.dry_run {
        println!("🔍 Would finish publishing {} ({} staged file(s))", entry.tag(), paths.len());
      } else {
        self.finish(&state, &entry, &paths)?;
        report.resumed = Some(entry.version.clone());
      }
    }
    let candidates = self.validate(fresh, &mut report)?;

    self.enter(Phase::Resolve);
    let changes: Vec<PlannedChange> = candidates.iter().map(|c| c.change.clone()).collect();
    let plan = match &state.pending {
      Some(pending) if pending.same_inputs(&changes) => {
        println!("🔁 Resuming pending release {}", pending.tag());
        pending.clone()
      }
      Some(pending) => {
        return Err(
          ReleaseError::StateCorruption {
            path: self.store.path().to_path_buf(),
            reason: format!(
              "pending release {} covers [{}], but the staged files are [{}]",
              pending.tag(),
              pending.assets().collect::<Vec<_>>().join(", "),
              changes.iter().map(|c| c.asset.as_str()).collect::<Vec<_>>().join(", ")
            ),
          }
          .into(),
        );
      }
      None if changes.is_empty() => {
        if report.resumed.is_none() {
          println!("✅ Nothing new to release");
        }
        return Ok(report);
      }
      None => ReleasePlan::resolve(&state.current_version, options.force_major, changes),
    };
    print_plan(&plan);

    let paths: BTreeMap<String, PathBuf> = candidates
      .into_iter()
      .map(|c| (c.change.asset, c.path))
      .collect();

    self.enter(Phase::Mutate);
    let records = self.compute_records(&plan, &paths)?;

    if options.dry_run {
      for record in &records {
        print!("{}", record.diff());
      }
      println!("🔍 Dry run: nothing was repacked, written or published");
      report.plan = Some(plan);
      return Ok(report);
    }

    if state.pending.is_none() {
      state = self.store.checkpoint(&state, &plan)?;
    }
    let written = write_changes(&records)?;
    for record in &records {
      let verb = if record.is_new() { "Created" } else { "Updated" };
      let note = if record.quarantine_added { " (quarantine removal added)" } else { "" };
      println!("   ✅ {} {}.rb ({}){}", verb, record.token, record.record.version, note);
    }
    log::info!("wrote {} of {} definition(s)", written, records.len());

    self.enter(Phase::Persist);
    let (_state, _) = self.store.commit(&state, &plan)?;
    write_catalog(&self.ctx.casks_dir(), &self.ctx.docs_path(), &self.ctx.tap_name())?;
    println!("   ✅ Recorded {} in {}", plan.tag(), self.ctx.config.paths.state.display());

    let assets: Vec<PathBuf> = plan.assets().filter_map(|a| paths.get(a).cloned()).collect();
    self.publish(&plan, &assets)?;
    self.cleanup(&assets)?;

    println!("🎉 Released {}", plan.tag());
    report.plan = Some(plan);
    Ok(report)
  }

  fn enter(&self, phase: Phase) {
    log::info!("phase: {}", phase);
  }

  /// Regular, non-hidden files in the staging folder
  fn scan(&self) -> TapResult<Vec<PathBuf>> {
    let dir = self.ctx.upload_dir();
    if !dir.exists() {
      return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(&dir).with_context(|| format!("Failed to read {}", dir.display()))? {
      let entry = entry?;
      let hidden = entry.file_name().to_string_lossy().starts_with('.');
      if hidden || !entry.file_type()?.is_file() {
        log::debug!("ignoring {}", entry.path().display());
        continue;
      }
      files.push(entry.path());
    }
    files.sort();
    Ok(files)
  }

  /// Phase 1: warn-and-skip per file; only an operator cancel aborts
  fn normalize(&self, uploads: &[PathBuf], dry_run: bool, report: &mut RunReport) -> TapResult<Vec<UploadArtifact>> {
    let normalizer = ArtifactNormalizer::new(
      self.with.tools,
      self.with.operator,
      self.ctx.config.release.max_nesting_depth,
      dry_run,
    );
    let mut progress = ArtifactProgress::new(uploads.len(), "Inspecting uploads");

    let mut artifacts = Vec::new();
    for path in uploads {
      match normalizer.normalize(path) {
        Ok(artifact) => {
          if !artifact.canonical {
            log::info!("{} normalized from {}", artifact.canonical_file_name(), artifact.source_name);
          }
          artifacts.push(artifact);
        }
        Err(e) if matches!(e.as_release(), Some(ReleaseError::Cancelled { .. })) => return Err(e),
        Err(e) => skip(report, &file_name(path), &e),
      }
      if let Some(progress) = progress.as_mut() {
        progress.inc();
      }
    }
    Ok(artifacts)
  }

  /// Split off artifacts whose bytes were already released
  ///
  /// Returns the unfinished latest release (with its staged files) and the
  /// artifacts still to be released.
  #[allow(clippy::type_complexity)]
  fn sort_released(
    &self,
    state: &RepositoryState,
    artifacts: Vec<UploadArtifact>,
    dry_run: bool,
    report: &mut RunReport,
  ) -> TapResult<(Option<(HistoryEntry, Vec<PathBuf>)>, Vec<UploadArtifact>)> {
    let mut unfinished: Vec<PathBuf> = Vec::new();
    let mut fresh = Vec::new();

    for artifact in artifacts {
      if !state.is_released(&artifact.checksum) {
        fresh.push(artifact);
        continue;
      }

      let latest = state
        .release_of(&artifact.checksum)
        .filter(|entry| entry.version == state.current_version);
      if latest.is_some() {
        unfinished.push(artifact.path);
        continue;
      }

      let file = artifact.file_name();
      let released_in = state
        .release_of(&artifact.checksum)
        .map(|e| e.tag())
        .unwrap_or_else(|| "an earlier release".to_string());
      println!("   ⚠️  {} was already released in {}; archiving it", file, released_in);
      log::warn!("{} already released in {}", file, released_in);
      if !dry_run {
        self.archive(&artifact.path)?;
      }
      report.archived.push(file);
    }

    let entry = state.history.last().filter(|_| !unfinished.is_empty()).cloned();
    Ok((entry.map(|e| (e, unfinished)), fresh))
  }

  /// Publish and clean up a release that was persisted by an earlier run
  fn finish(&self, state: &RepositoryState, entry: &HistoryEntry, staged: &[PathBuf]) -> TapResult<()> {
    println!("🔁 Finishing {}: recorded but not yet cleaned up", entry.tag());
    let plan = entry.to_plan(state.version_before(&entry.version));

    // The earlier run may have stopped between recording state and the catalog
    if write_catalog(&self.ctx.casks_dir(), &self.ctx.docs_path(), &self.ctx.tap_name())? {
      println!("   ✅ Regenerated {}", self.ctx.config.paths.docs.display());
    }

    // Assets no longer staged were archived, which only happens after a publish
    let mut assets = Vec::new();
    for asset in entry.assets() {
      match staged.iter().find(|p| file_name(p) == asset) {
        Some(path) => assets.push(path.clone()),
        None => log::debug!("{} already archived", asset),
      }
    }

    self.publish(&plan, &assets)?;
    self.cleanup(&assets)?;
    println!("   ✅ Finished {}", entry.tag());
    Ok(())
  }

  /// Phase 2: checksum recheck, one artifact per token, no downgrades
  fn validate(&self, artifacts: Vec<UploadArtifact>, report: &mut RunReport) -> TapResult<Vec<Candidate>> {
    let mut by_token: BTreeMap<String, UploadArtifact> = BTreeMap::new();

    for artifact in artifacts {
      let actual = sha256_file(&artifact.path)?;
      if actual != artifact.checksum {
        let err: TapError = ReleaseError::ChecksumMismatch {
          file: artifact.file_name(),
          expected: artifact.checksum.clone(),
          actual,
        }
        .into();
        skip(report, &artifact.file_name(), &err);
        continue;
      }

      let token = artifact.token();
      match by_token.remove(&token) {
        Some(kept) => {
          let (winner, loser) = if compare_versions(&artifact.version, &kept.version) == Ordering::Greater {
            (artifact, kept)
          } else {
            (kept, artifact)
          };
          let reason = format!("superseded by {} in this run", winner.file_name());
          skip_with(report, &loser.file_name(), &reason);
          by_token.insert(token, winner);
        }
        None => {
          by_token.insert(token, artifact);
        }
      }
    }

    let mut candidates = Vec::new();
    for (token, artifact) in by_token {
      let from_version = self.published_version(&token)?;
      if let Some(published) = &from_version
        && compare_versions(&artifact.version, published) == Ordering::Less
      {
        let reason = format!("older than the published {} {}", artifact.name, published);
        skip_with(report, &artifact.file_name(), &reason);
        continue;
      }

      let asset = artifact.canonical_file_name();
      candidates.push(Candidate {
        change: PlannedChange {
          token,
          name: artifact.name.clone(),
          from_version,
          to_version: artifact.version.clone(),
          checksum: artifact.checksum.clone(),
          asset,
          payload: artifact.payload,
          bundle_name: (artifact.bundle_name != artifact.name).then(|| artifact.bundle_name.clone()),
          identifier: artifact.identifier.clone(),
        },
        path: artifact.path,
      });
    }
    Ok(candidates)
  }

  /// Version in the current definition for `token`, if it exists
  fn published_version(&self, token: &str) -> TapResult<Option<String>> {
    let path = self.ctx.cask_path(token);
    if !path.exists() {
      return Ok(None);
    }
    let source = fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    let doc = CaskDocument::parse(token, &source)?;
    Ok(Some(doc.value("version")?))
  }

  /// Phase 4 texts, computed in full before anything is written
  fn compute_records(&self, plan: &ReleasePlan, paths: &BTreeMap<String, PathBuf>) -> TapResult<Vec<RecordChange>> {
    let homepage = self.ctx.homepage();
    let mutator = PackageDefinitionMutator::new(&homepage);

    let mut records = Vec::with_capacity(plan.changes.len());
    for change in &plan.changes {
      let artifact_path = paths
        .get(&change.asset)
        .ok_or_else(|| TapError::message(format!("{} is not staged", change.asset)))?;
      let verification = self.verify(artifact_path);
      let url = self.ctx.download_url(&plan.version, &change.asset);

      let cask_path = self.ctx.cask_path(&change.token);
      let existing = if cask_path.exists() {
        Some(fs::read_to_string(&cask_path).with_context(|| format!("Failed to read {}", cask_path.display()))?)
      } else {
        None
      };

      let input = RecordInput {
        token: &change.token,
        name: &change.name,
        version: &change.to_version,
        sha256: &change.checksum,
        url: &url,
        payload: change.payload,
        bundle_name: change.bundle(),
        identifier: change.identifier.as_deref(),
        unverified: !verification.is_signed(),
      };
      records.push(mutator.apply(&input, &cask_path, existing.as_deref())?);
    }
    Ok(records)
  }

  /// A verifier that cannot run counts as unsigned
  fn verify(&self, path: &Path) -> Verification {
    match self.with.tools.check_signature(path) {
      Ok(verification) => verification,
      Err(e) => {
        println!("   ⚠️  Could not verify {} ({}); treating it as unsigned", file_name(path), e);
        log::warn!("signature check failed for {}: {}", path.display(), e);
        Verification::Unsigned
      }
    }
  }

  /// Commit, push, then create the release and attach `assets`
  fn publish(&self, plan: &ReleasePlan, assets: &[PathBuf]) -> TapResult<()> {
    self.enter(Phase::Publish);
    let git = &self.ctx.config.git;

    let message = commit_message(plan);
    if self.with.vcs.commit_paths(&self.ctx.tracked_paths(), &message)? {
      println!("   ✅ Committed: {}", message);
    } else {
      println!("   ⏭️  Nothing new to commit");
    }
    if git.push {
      self.with.vcs.push(&git.remote, &git.branch)?;
      println!("   ✅ Pushed to {}/{}", git.remote, git.branch);
    }

    let tag = plan.tag();
    let title = release_title(&tag);
    let notes = release_notes(&plan.changes);
    let publish = &self.ctx.config.publish;
    let retry = RetryPolicy::new(publish.retries, publish.backoff_ms);
    let request = PublishRequest {
      tag: &tag,
      title: &title,
      notes: &notes,
      assets,
    };
    let report = publish_release(self.with.host, &request, &retry)?;
    log::info!(
      "{}: created={} uploaded={} skipped={}",
      tag,
      report.created,
      report.uploaded.len(),
      report.skipped.len()
    );
    Ok(())
  }

  /// Move released files into the archive folder
  fn cleanup(&self, assets: &[PathBuf]) -> TapResult<()> {
    self.enter(Phase::Cleanup);
    for asset in assets {
      self.archive(asset)?;
    }
    if !assets.is_empty() {
      println!(
        "   📦 Archived {} file(s) to {}",
        assets.len(),
        self.ctx.config.paths.uploaded.display()
      );
    }
    Ok(())
  }

  fn archive(&self, file: &Path) -> TapResult<()> {
    let dir = self.ctx.uploaded_dir();
    fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let target = dir.join(file_name(file));
    if target.exists() {
      fs::remove_file(&target).with_context(|| format!("Failed to replace {}", target.display()))?;
    }
    if fs::rename(file, &target).is_err() {
      fs::copy(file, &target).with_context(|| format!("Failed to archive {}", file.display()))?;
      fs::remove_file(file).with_context(|| format!("Failed to remove {}", file.display()))?;
    }
    log::debug!("archived {} -> {}", file.display(), target.display());
    Ok(())
  }
}

fn print_plan(plan: &ReleasePlan) {
  println!(
    "📋 Release plan: v{} -> v{} ({} bump)",
    plan.from_version, plan.version, plan.bump
  );
  for change in &plan.changes {
    match &change.from_version {
      Some(from) => println!("   • {} {} -> {}", change.name, from, change.to_version),
      None => println!("   • {} {} (new)", change.name, change.to_version),
    }
  }
}

fn skip(report: &mut RunReport, file: &str, error: &TapError) {
  if !error.as_release().is_some_and(ReleaseError::is_skippable) {
    log::debug!("{} failed outside the artifact checks: {:?}", file, error);
  }
  skip_with(report, file, &error.to_string());
}

fn skip_with(report: &mut RunReport, file: &str, reason: &str) {
  println!("   ⚠️  Skipping {}: {}", file, reason);
  log::warn!("skipped {}: {}", file, reason);
  report.skipped.push((file.to_string(), reason.to_string()));
}

fn file_name(path: &Path) -> String {
  path
    .file_name()
    .map(|n| n.to_string_lossy().to_string())
    .unwrap_or_default()
}

/// Numeric comparison of dotted versions; `1.2` equals `1.2.0`
///
/// Components are compared as digit strings, so their size is unbounded.
fn compare_versions(a: &str, b: &str) -> Ordering {
  fn key(v: &str) -> Vec<&str> {
    let mut parts: Vec<&str> = v
      .split('.')
      .map(|p| match p.trim_start_matches('0') {
        "" => "0",
        digits => digits,
      })
      .collect();
    while parts.len() > 1 && parts.last() == Some(&"0") {
      parts.pop();
    }
    parts
  }

  let (a, b) = (key(a), key(b));
  for (x, y) in a.iter().zip(&b) {
    let order = x.len().cmp(&y.len()).then_with(|| x.cmp(y));
    if order != Ordering::Equal {
      return order;
    }
  }
  a.len().cmp(&b.len())
}
