//! Command line argument parsing.

use std::path::PathBuf;

use clap::Parser;
use regex::Regex;

/// Inspect or copy a container image directly between OCI/Docker v2
/// registries.
#[derive(Parser, Debug)]
#[command(
    name = "imgcopy",
    version,
    about = "Inspect or copy container images directly between OCI/Docker v2 registries"
)]
pub struct Args {
    /// Source image reference, e.g. `alpine`, `gcr.io/foo/bar:1.2`,
    /// `registry.example.com/ns/repo@sha256:...`.
    pub src: String,

    /// Destination image reference. Omit to print the source manifest(s)
    /// as JSON instead of copying.
    pub dst: Option<String>,

    /// Enumerate tags on the source repository via the tags-list
    /// endpoint and apply the operation to every tag matching any
    /// supplied pattern. May be given more than once.
    #[arg(long = "tag-pattern", value_parser = parse_regex)]
    pub tag_pattern: Vec<Regex>,

    /// Credential file in Docker `config.json` format. Defaults to
    /// `~/.docker/config.json`.
    #[arg(long = "auth-config")]
    pub auth_config: Option<PathBuf>,

    /// Disable TLS certificate verification.
    #[arg(long)]
    pub insecure: bool,

    /// Extra trust root, PEM or DER encoded.
    #[arg(long)]
    pub cafile: Option<PathBuf>,

    /// Directory of extra trust roots, one certificate per regular file.
    #[arg(long)]
    pub capath: Option<PathBuf>,

    /// Increase verbosity. Pass twice for trace/debug output.
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

fn parse_regex(s: &str) -> Result<Regex, String> {
    Regex::new(s).map_err(|e| format!("invalid --tag-pattern regex {s:?}: {e}"))
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// `true` when no destination was given — inspect mode.
    pub fn is_inspect(&self) -> bool {
        self.dst.is_none()
    }

    /// `true` if `tag` matches at least one `--tag-pattern`.
    pub fn matches_tag_pattern(&self, tag: &str) -> bool {
        self.tag_pattern.iter().any(|re| re.is_match(tag))
    }
}
