//! The recursive registry-to-registry copy engine.

use std::sync::Arc;

use futures::future::{try_join_all, BoxFuture};
use reqwest::{Method, StatusCode};

use crate::error::{RegistryError, Result};
use crate::reference::{ObjectKind, Reference};
use crate::registry::client::{require_same_kind, RegistryClient};
use crate::streaming::{self, DEFAULT_BUFFER_DEPTH, DEFAULT_CHUNK_SIZE};

/// Outcome of a single [`copy`] call. A digest-ref copy that finds the
/// object already present at the destination short-circuits to
/// `AlreadyExisted` without copying any bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    Copied,
    AlreadyExisted,
}

/// Copy `src` to `dst`. Recurses through manifest-list/image-manifest
/// dependency trees; streams blob bodies through a bounded buffer.
///
/// Takes owned refs and an `Arc<RegistryClient>` so every recursive call
/// produces a genuinely `'static` future — boxed because async fns
/// cannot recurse unboxed.
pub fn copy(
    client: Arc<RegistryClient>,
    src: Reference,
    dst: Reference,
) -> BoxFuture<'static, Result<CopyOutcome>> {
    Box::pin(copy_inner(client, src, dst))
}

async fn copy_inner(
    client: Arc<RegistryClient>,
    src: Reference,
    dst: Reference,
) -> Result<CopyOutcome> {
    require_same_kind(&src, &dst)?;

    if dst.is_digest_ref() && src.is_digest_ref() && src.ref_str != dst.ref_str {
        return Err(RegistryError::Validation(format!(
            "destination digest {} does not match source digest {}",
            dst.ref_str, src.ref_str
        )));
    }

    if src.is_digest_ref() && client.ref_exists(&dst).await? {
        return Ok(CopyOutcome::AlreadyExisted);
    }

    match src.kind {
        ObjectKind::Manifest => copy_manifest(client, src, dst).await,
        ObjectKind::Blob => copy_blob(client, src, dst).await,
    }
}

async fn copy_manifest(
    client: Arc<RegistryClient>,
    src: Reference,
    dst: Reference,
) -> Result<CopyOutcome> {
    let manifest = client.manifest_download(&src).await?;

    let mut children: Vec<BoxFuture<'static, Result<CopyOutcome>>> = Vec::new();

    for digest in manifest.manifest_dependencies() {
        let child_src = src.as_manifest().with_ref(digest.clone());
        let child_dst = dst.as_manifest().with_ref(digest);
        children.push(copy(Arc::clone(&client), child_src, child_dst));
    }
    for digest in manifest.blob_dependencies() {
        let child_src = src.as_blob().with_ref(digest.clone());
        let child_dst = dst.as_blob().with_ref(digest);
        children.push(copy(Arc::clone(&client), child_src, child_dst));
    }

    try_join_all(children).await?;

    let registry = dst.effective_registry();
    let canonical = manifest.canonical()?;
    let media_type = manifest.media_type().to_string();
    let response = client
        .transport()
        .execute(
            Method::PUT,
            &registry,
            &dst.url_path(),
            &[("Content-Type", media_type)],
            Some(reqwest::Body::from(canonical)),
            false,
        )
        .await?;
    if !response.status().is_success() {
        return Err(RegistryError::UnexpectedStatus {
            phase: "manifest_put",
            status: response.status(),
            body: response.text().await.unwrap_or_default(),
        });
    }
    Ok(CopyOutcome::Copied)
}

async fn copy_blob(
    client: Arc<RegistryClient>,
    src: Reference,
    dst: Reference,
) -> Result<CopyOutcome> {
    // Reachable only with a digest `src` (blob dependencies are always
    // substituted by digest), so `copy_inner`'s existence precheck has
    // already ruled out `AlreadyExisted` before this function runs.
    let src_registry = src.effective_registry();
    let get_response = client
        .transport()
        .execute(Method::GET, &src_registry, &src.url_path(), &[], None, false)
        .await?;
    if get_response.status() != StatusCode::OK {
        return Err(RegistryError::UnexpectedStatus {
            phase: "blob_get",
            status: get_response.status(),
            body: get_response.text().await.unwrap_or_default(),
        });
    }
    let byte_stream = streaming::response_byte_stream(get_response);
    let rechunked = streaming::rechunk(byte_stream, DEFAULT_CHUNK_SIZE);
    let buffered = streaming::buffered(Box::pin(rechunked), DEFAULT_BUFFER_DEPTH);

    let dst_registry = dst.effective_registry();
    let start_response = client
        .transport()
        .execute(
            Method::POST,
            &dst_registry,
            &dst.upload_init_path(),
            &[],
            None,
            false,
        )
        .await?;
    if !start_response.status().is_success() {
        return Err(RegistryError::UnexpectedStatus {
            phase: "blob_upload_start",
            status: start_response.status(),
            body: start_response.text().await.unwrap_or_default(),
        });
    }
    let mut upload_url = location_header(&start_response, "blob_upload_start")?;

    let mut stream = Box::pin(buffered);
    use futures::StreamExt;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        let patch_response = client
            .transport()
            .execute(
                Method::PATCH,
                &dst_registry,
                &upload_url,
                &[("Content-Type", "application/octet-stream".to_string())],
                Some(reqwest::Body::from(chunk)),
                true,
            )
            .await?;
        if !patch_response.status().is_success() {
            return Err(RegistryError::UnexpectedStatus {
                phase: "blob_upload_patch",
                status: patch_response.status(),
                body: patch_response.text().await.unwrap_or_default(),
            });
        }
        upload_url = location_header(&patch_response, "blob_upload_patch")?;
    }

    let separator = if upload_url.contains('?') { "&" } else { "?" };
    let finalize_url = format!("{upload_url}{separator}digest={}", src.ref_str);
    let finalize_response = client
        .transport()
        .execute(Method::PUT, &dst_registry, &finalize_url, &[], None, true)
        .await?;
    if !finalize_response.status().is_success() {
        return Err(RegistryError::UnexpectedStatus {
            phase: "blob_upload_finalize",
            status: finalize_response.status(),
            body: finalize_response.text().await.unwrap_or_default(),
        });
    }
    Ok(CopyOutcome::Copied)
}

fn location_header(response: &reqwest::Response, phase: &'static str) -> Result<String> {
    response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .ok_or_else(|| RegistryError::Decode(format!("{phase} response carried no Location header")))
}
