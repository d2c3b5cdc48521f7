//! Text for new definitions and the quarantine-removal stanza

/// What a record installs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactStanza {
  /// `app "<bundle>.app"`
  App { bundle: String },

  /// `pkg "<Name>-#{version}.pkg"`, plus `uninstall pkgutil:` when the
  /// package identifier is known
  Pkg { name: String, identifier: Option<String> },
}

/// Everything a new definition is built from
#[derive(Debug, Clone)]
pub struct NewRecord<'a> {
  pub token: &'a str,
  pub name: &'a str,
  pub version: &'a str,
  pub sha256: &'a str,
  pub url: &'a str,
  pub homepage: &'a str,
  pub stanza: ArtifactStanza,
}

/// Render a fresh definition
pub fn render_new(record: &NewRecord<'_>) -> String {
  let stanza = match &record.stanza {
    ArtifactStanza::App { bundle } => format!("  app \"{}.app\"\n", bundle),
    ArtifactStanza::Pkg { name, identifier } => {
      let mut text = format!("  pkg \"{}-#{{version}}.pkg\"\n", name);
      if let Some(id) = identifier {
        text.push_str(&format!("\n  uninstall pkgutil: \"{}\"\n", id));
      }
      text
    }
  };

  format!(
    r#"cask "{token}" do
  version "{version}"
  sha256 "{sha256}"

  url "{url}"
  name "{name}"
  desc "{name} App"
  homepage "{homepage}"

{stanza}end
"#,
    token = record.token,
    version = record.version,
    sha256 = record.sha256,
    url = record.url,
    name = record.name,
    homepage = record.homepage,
    stanza = stanza,
  )
}

/// Post-install step clearing `com.apple.quarantine` from the installed bundle
///
/// Inserted (with a leading blank line) before a record's closing `end`.
pub fn quarantine_stanza(bundle: &str) -> String {
  format!(
    r##"
  postflight do
    system_command "/usr/bin/xattr",
                   args: ["-dr", "com.apple.quarantine", "#{{appdir}}/{bundle}.app"],
                   sudo: true
  end
"##
  )
}
