//! Orchestrates a single CLI invocation: build the HTTP client and
//! credential store from flags, parse references, and either print a
//! manifest or run a copy.

use std::io::Read;
use std::sync::Arc;

use crate::cli::Args;
use crate::credentials::{CredentialStore, DockerConfigCredentialStore, EmptyCredentialStore};
use crate::error::{RegistryError, Result};
use crate::output::OutputManager;
use crate::reference::{self, ObjectKind, Reference};
use crate::registry::{self, RegistryClient};

pub struct Runner {
    args: Args,
    output: OutputManager,
}

impl Runner {
    pub fn new(args: Args) -> Self {
        let output = OutputManager::new(args.verbose);
        Self { args, output }
    }

    pub async fn run(self) -> Result<()> {
        let credentials = self.load_credentials()?;
        let http_client = self.build_http_client()?;
        let client = Arc::new(RegistryClient::new(http_client, credentials));

        let src = reference::parse_image_name(&self.args.src, ObjectKind::Manifest)?;

        if self.args.tag_pattern.is_empty() {
            self.run_one(&client, &src).await
        } else {
            self.run_tag_pattern(&client, &src).await
        }
    }

    async fn run_one(&self, client: &Arc<RegistryClient>, src: &Reference) -> Result<()> {
        match &self.args.dst {
            None => self.inspect(client, src).await,
            Some(dst) => {
                let dst = reference::parse_image_name(dst, src.kind)?;
                self.copy_one(client, src, &dst).await
            }
        }
    }

    async fn run_tag_pattern(&self, client: &Arc<RegistryClient>, src: &Reference) -> Result<()> {
        self.output.verbose(&format!(
            "enumerating tags on {} against {} pattern(s)",
            src.repo,
            self.args.tag_pattern.len()
        ));
        let tags = client.registry_repo_tags(src).await?;
        let matching: Vec<&String> = tags.iter().filter(|t| self.args.matches_tag_pattern(t)).collect();
        if matching.is_empty() {
            self.output.warning("no tags matched the supplied --tag-pattern");
        }
        for tag in matching {
            let tag_src = src.with_ref(tag.clone());
            match &self.args.dst {
                None => self.inspect(client, &tag_src).await?,
                Some(dst) => {
                    let dst_ref = reference::parse_image_name(dst, src.kind)?.with_ref(tag.clone());
                    self.copy_one(client, &tag_src, &dst_ref).await?
                }
            }
        }
        Ok(())
    }

    async fn inspect(&self, client: &Arc<RegistryClient>, src: &Reference) -> Result<()> {
        let resolved = client.manifest_resolve_tag(src).await.unwrap_or_else(|_| src.clone());
        let manifest = client.manifest_download(&resolved).await?;
        let canonical = manifest.canonical()?;
        let value: serde_json::Value = serde_json::from_slice(&canonical)?;
        serde_json::to_writer_pretty(std::io::stdout(), &value)
            .map_err(|e| RegistryError::Decode(format!("failed writing manifest to stdout: {e}")))?;
        println!();
        Ok(())
    }

    async fn copy_one(&self, client: &Arc<RegistryClient>, src: &Reference, dst: &Reference) -> Result<()> {
        self.output.step(&format!("copying {src} -> {dst}"));
        let outcome = registry::copy(Arc::clone(client), src.clone(), dst.clone()).await?;
        match outcome {
            registry::CopyOutcome::Copied => self.output.success(&format!("copied {src} -> {dst}")),
            registry::CopyOutcome::AlreadyExisted => {
                self.output.info(&format!("{dst} already present, skipped"))
            }
        }
        Ok(())
    }

    fn load_credentials(&self) -> Result<Arc<dyn CredentialStore>> {
        let path = match &self.args.auth_config {
            Some(p) => Some(p.clone()),
            None => DockerConfigCredentialStore::default_path().ok(),
        };
        match path {
            Some(p) if p.exists() => {
                self.output.detail(&format!("loading credentials from {}", p.display()));
                Ok(Arc::new(DockerConfigCredentialStore::load(&p)?))
            }
            _ => {
                self.output.detail("no credential file found, proceeding unauthenticated except where challenged");
                Ok(Arc::new(EmptyCredentialStore))
            }
        }
    }

    fn build_http_client(&self) -> Result<reqwest::Client> {
        // Bounds only the per-socket connect and read waits, matching the
        // original's sock_connect=10/sock_read=10 with no overall total,
        // since a multi-gigabyte blob transfer must not time out just for being slow.
        let mut builder = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .read_timeout(std::time::Duration::from_secs(10));

        if self.args.insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }

        if let Some(cafile) = &self.args.cafile {
            let cert = load_certificate(cafile)?;
            builder = builder.add_root_certificate(cert);
        }

        if let Some(capath) = &self.args.capath {
            for entry in std::fs::read_dir(capath)? {
                let entry = entry?;
                if entry.file_type()?.is_file() {
                    let cert = load_certificate(&entry.path())?;
                    builder = builder.add_root_certificate(cert);
                }
            }
        }

        builder
            .build()
            .map_err(RegistryError::Network)
    }
}

fn load_certificate(path: &std::path::Path) -> Result<reqwest::Certificate> {
    let mut bytes = Vec::new();
    std::fs::File::open(path)?.read_to_end(&mut bytes)?;
    reqwest::Certificate::from_pem(&bytes)
        .or_else(|_| reqwest::Certificate::from_der(&bytes))
        .map_err(RegistryError::Network)
}
