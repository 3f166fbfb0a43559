//! Glue shared by the binaries: logging, model loading, signal handling.

use anyhow::{anyhow, Result};

use crate::config::ModelSettings;
use crate::detect::{DetectorAdapter, StubBackend};
use crate::ingest::is_stub;
use crate::stream::CancelToken;

/// `info` unless `RUST_LOG` says otherwise.
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

/// Load the configured model. `stub://` paths select the deterministic
/// built-in detector.
pub fn build_detector(settings: &ModelSettings) -> Result<DetectorAdapter> {
    if is_stub(&settings.path) {
        log::info!("using synthetic detector for {}", settings.path);
        return Ok(DetectorAdapter::new(StubBackend::synthetic()));
    }
    load_onnx(settings)
}

#[cfg(feature = "backend-tract")]
fn load_onnx(settings: &ModelSettings) -> Result<DetectorAdapter> {
    use crate::detect::{ClassNameMap, TractYoloBackend};
    use anyhow::Context;

    let backend = TractYoloBackend::new(&settings.path, settings.input_size, ClassNameMap::coco())
        .with_context(|| format!("failed to load model {}", settings.path))?
        .with_iou_threshold(settings.iou_threshold);
    let mut adapter = DetectorAdapter::new(backend);
    adapter.warm_up().context("model warm-up failed")?;
    Ok(adapter)
}

#[cfg(not(feature = "backend-tract"))]
fn load_onnx(settings: &ModelSettings) -> Result<DetectorAdapter> {
    Err(anyhow!(
        "loading {} requires the backend-tract feature; use stub://coco to run without a model",
        settings.path
    ))
}

/// Cancel `token` on Ctrl-C. A second Ctrl-C exits immediately.
pub fn cancel_on_ctrlc(token: &CancelToken) -> Result<()> {
    let token = token.clone();
    ctrlc::set_handler(move || {
        if token.is_cancelled() {
            std::process::exit(130);
        }
        log::info!("shutdown signal received, finishing current frame...");
        token.cancel();
    })
    .map_err(|err| anyhow!("error setting Ctrl-C handler: {}", err))
}
