//! Base image for Stylus compile containers.
//!
//! The image carries the latest stable Rust plus cargo-stylus; contract
//! toolchains are installed at runtime into the cache volumes, so the image
//! itself rarely needs rebuilding.

use tracing::info;

use crate::error::RuntimeError;
use crate::runtime::{ContainerRuntime, Progress};

pub const COMPILE_IMAGE_NAME: &str = "stylus-compile";
pub const COMPILE_IMAGE_TAG: &str = "latest";

pub fn compile_image_ref() -> String {
    format!("{COMPILE_IMAGE_NAME}:{COMPILE_IMAGE_TAG}")
}

fn compile_dockerfile() -> String {
    "FROM rust:slim\n\
     RUN apt-get update && apt-get install -y pkg-config libssl-dev && rm -rf /var/lib/apt/lists/*\n\
     RUN rustup target add wasm32-unknown-unknown\n\
     RUN cargo install cargo-stylus\n\
     WORKDIR /workspace\n"
        .to_string()
}

/// Build the base compile image unless it already exists. Returns whether a
/// build happened. Build output streams to `on_progress` line by line.
pub async fn ensure_compile_image(
    runtime: &dyn ContainerRuntime,
    on_progress: Progress<'_>,
) -> Result<bool, RuntimeError> {
    if runtime
        .image_exists(COMPILE_IMAGE_NAME, COMPILE_IMAGE_TAG)
        .await?
    {
        info!("using cached compile image {}", compile_image_ref());
        return Ok(false);
    }

    info!("building compile image {} (first run may take several minutes)", compile_image_ref());
    runtime
        .build_image(
            COMPILE_IMAGE_NAME,
            COMPILE_IMAGE_TAG,
            &compile_dockerfile(),
            on_progress,
        )
        .await?;

    Ok(true)
}
