//! dcm-transcoder - Streaming DICOM pixel data transcoding.
//!
//! This binary wires the codec registry, the built-in codecs and the
//! transcoder together for one-shot command line use.

use std::process::ExitCode;
use std::sync::Arc;

use bytes::Bytes;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dcm_transcoder::{
    codec::{detect_encoding, register_builtin_codecs, CodecPolicy, CodecRegistry},
    config::{Cli, CodecsConfig, Command, DetectConfig, TranscodeConfig},
    io::ByteWindow,
    pixel::{EncodingParameters, ImagePayload, Representation},
    transcode::Transcoder,
};

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Command::Transcode(config) => run_transcode(config),
        Command::Codecs(config) => run_codecs(config),
        Command::Detect(config) => run_detect(config),
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "dcm_transcoder=debug"
    } else {
        "dcm_transcoder=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_json(value: &serde_json::Value) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to serialize output: {}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Transcode Command
// =============================================================================

fn run_transcode(config: TranscodeConfig) -> ExitCode {
    init_logging(config.pipeline.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let geometry = match config.geometry() {
        Ok(geometry) => geometry,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let data = match std::fs::read(&config.input) {
        Ok(data) => Bytes::from(data),
        Err(e) => {
            error!("Failed to read {}: {}", config.input.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let source = config.source_encoding();
    let payload = if source.is_native() {
        ImagePayload::from_native_buffer(geometry.clone(), data)
    } else {
        let seed = Representation::new(
            &source,
            &EncodingParameters::new(),
            vec![data],
            geometry.color_model,
        );
        ImagePayload::new(geometry.clone(), seed)
    };
    let mut payload = match payload {
        Ok(payload) => payload,
        Err(e) => {
            error!("Invalid input: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let registry = Arc::new(CodecRegistry::new());
    let _tokens = register_builtin_codecs(&registry, config.pipeline.codec_policy());
    let transcoder = Transcoder::with_options(registry, config.pipeline.transcode_options());

    let target = config.target_encoding();
    let params = config.target_params();
    info!("Transcoding {} -> {}", source, target);

    if let Err(e) = transcoder.ensure_representation(&mut payload, &target, &params) {
        error!("Transcoding failed: {}", e);
        return ExitCode::FAILURE;
    }
    let Some(representation) = payload.representation(&target, &params) else {
        error!("Transcoding produced no {} representation", target);
        return ExitCode::FAILURE;
    };

    let output: Vec<u8> = representation.frames().concat();
    if let Err(e) = std::fs::write(&config.output, &output) {
        error!("Failed to write {}: {}", config.output.display(), e);
        return ExitCode::FAILURE;
    }

    let frame_sizes: Vec<usize> = representation.frames().iter().map(Bytes::len).collect();
    let json = serde_json::json!({
        "source": source,
        "target": representation.encoding(),
        "params": params,
        "geometry": geometry,
        "color_model": representation.color_model(),
        "lossy": representation.is_lossy(),
        "frame_sizes": frame_sizes,
        "bytes": output.len(),
        "lossy_history": payload.lossy_history(),
        "output": config.output.display().to_string(),
    });
    print_json(&json)
}

// =============================================================================
// Codecs Command
// =============================================================================

fn run_codecs(config: CodecsConfig) -> ExitCode {
    init_logging(config.pipeline.verbose);

    let registry = CodecRegistry::new();
    let _tokens = register_builtin_codecs(&registry, config.pipeline.codec_policy());

    let json = serde_json::json!({
        "policy": config.pipeline.codec_policy(),
        "codecs": registry.capabilities(),
    });
    print_json(&json)
}

// =============================================================================
// Detect Command
// =============================================================================

fn run_detect(config: DetectConfig) -> ExitCode {
    init_logging(config.verbose);

    let data = match std::fs::read(&config.input) {
        Ok(data) => Bytes::from(data),
        Err(e) => {
            error!("Failed to read {}: {}", config.input.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let mut window = ByteWindow::new();
    let detected = window
        .attach(data)
        .and_then(|()| detect_encoding(&mut window));

    let detected = match detected {
        Ok(detected) => detected,
        Err(e) => {
            error!("Detection failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let registry = CodecRegistry::new();
    let _tokens = register_builtin_codecs(&registry, CodecPolicy::default());

    let json = serde_json::json!({
        "file": config.input.display().to_string(),
        "encoding": detected.as_ref().map(|id| id.uid().to_string()),
        "name": detected.as_ref().map(|id| id.name().to_string()),
        "decodable": detected.as_ref().is_some_and(|id| registry.can_decode(id)),
    });
    print_json(&json)
}
