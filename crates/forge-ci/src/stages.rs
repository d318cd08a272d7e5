//! Pipeline stages for score-server.
//!
//! ```text
//! test     vet (+ staticcheck, + go test -race when enabled)
//! package  test -> go build (linux/amd64, static) -> image
//! publish  commit + repo name -> name/tag -> push       (token only)
//! docker   package -> publish
//! service  docker (no token) -> expose 5800 -> running service
//! ```
//!
//! Every stage awaits its collaborators strictly in order and propagates the
//! first error unchanged.

use std::time::Instant;

use tracing::{info, warn};

use crate::artifact::{BuildOptions, CommitQuery, Image, Platform, PublishPolicy, Secret, Service};
use crate::context::ForgeContext;
use crate::error::{ForgeError, MetadataField, Result};
use crate::source::SourceDir;

/// Container entrypoint of the packaged server.
pub const ENTRYPOINT: &str = "./score-server";

/// Repository path published images are renamed to.
pub const IMAGE_NAME: &str = "playground/score-server";

/// Repository path for signed primary-branch builds.
pub const PRIMARY_IMAGE_NAME: &str = "fastly/score-server";

/// Port score-server listens on.
pub const SERVICE_PORT: u16 = 5800;

/// Verify the sources. Fails with the checker output when it is non-empty.
pub async fn test(ctx: &ForgeContext, src: &SourceDir) -> Result<()> {
    let start = Instant::now();
    info!(stage = "test", src = %src.root().display(), "Verifying sources");

    let vet = ctx.golang().vet(src).await?;
    if !vet.is_empty() {
        return Err(ForgeError::Verification(vet));
    }

    if ctx.config().staticcheck {
        let check = ctx.golang().staticcheck(src).await?;
        if !check.is_empty() {
            return Err(ForgeError::Verification(check));
        }
    }

    if ctx.config().race_tests {
        let output = ctx.golang().test(src, &["-race".to_string()]).await?;
        info!(stage = "test", output = %output, "Test results");
    }

    info!(stage = "test", elapsed_ms = start.elapsed().as_millis() as u64, "Sources verified");
    Ok(())
}

/// Verify, cross-compile and package the server into an image.
pub async fn package(ctx: &ForgeContext, src: &SourceDir) -> Result<Image> {
    test(ctx, src).await?;

    let start = Instant::now();
    let options = BuildOptions::static_linux_amd64();
    let binary = ctx.golang().build(src, &options).await?;

    let entrypoint = vec![ENTRYPOINT.to_string()];
    let image = ctx
        .packager()
        .package(&binary, &entrypoint, &Platform::linux_amd64())
        .await?;

    info!(
        stage = "package",
        image = %image.id,
        platform = %image.platform,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Image packaged"
    );
    Ok(image)
}

/// Name, tag and push `image` when a token is supplied.
///
/// Without a token the image is returned untouched.
pub async fn publish(
    ctx: &ForgeContext,
    src: &SourceDir,
    image: Image,
    token: Option<&Secret>,
) -> Result<Image> {
    let Some(token) = token else {
        warn!(stage = "publish", "No vault token provided - skipping image publishing");
        return Ok(image);
    };

    let git = ctx.git();
    let sha = required(
        MetadataField::Commit,
        git.commit(src, CommitQuery { short: true, ignore_dirty: true }).await,
    )?;
    let repo_name = required(MetadataField::RepoName, git.repo_name(src).await)?;

    let mut image = image
        .with_name(IMAGE_NAME)
        .with_tags([format!("{repo_name}-{sha}")]);
    let mut policy = PublishPolicy::default();

    if ctx.config().promote_primary_branch {
        let branch = required(MetadataField::Branch, git.branch(src).await)?;
        if branch == ctx.config().primary_branch {
            image = image.with_name(PRIMARY_IMAGE_NAME);
            policy.sign = true;
        }
    }

    ctx.registry().publish(&image, token, &policy).await?;
    info!(
        stage = "publish",
        references = ?image.references(),
        signed = policy.sign,
        "Image published"
    );
    Ok(image)
}

/// Collapse a metadata lookup into a value or the fixed metadata error.
fn required(field: MetadataField, value: Result<String>) -> Result<String> {
    match value {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        Ok(_) => Err(ForgeError::Metadata(field)),
        Err(e) => {
            warn!(field = %field, error = %e, "Metadata lookup failed");
            Err(ForgeError::Metadata(field))
        }
    }
}

/// Build the image and publish it when a token is given.
pub async fn docker(ctx: &ForgeContext, src: &SourceDir, token: Option<&Secret>) -> Result<Image> {
    let image = package(ctx, src).await?;
    publish(ctx, src, image, token).await
}

/// Build the image and run it with the server port exposed.
pub async fn service(ctx: &ForgeContext, src: &SourceDir) -> Result<Service> {
    let image = docker(ctx, src, None).await?.with_exposed_port(SERVICE_PORT);
    let service = ctx.services().as_service(&image).await?;
    info!(stage = "service", service = %service.id, endpoints = ?service.endpoints(), "Service running");
    Ok(service)
}
