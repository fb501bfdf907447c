//! End-to-end transcoding tests.
//!
//! Tests verify:
//! - Cached representations are reused without codec work
//! - Lossless round trips reproduce native pixels exactly
//! - Failed transcodes leave no partial cache entry
//! - Decoder-only codecs and missing encoders
//! - Suspend/resume decode loop consumes every byte once
//! - Lossy history tracking through the JPEG Baseline codec

use std::sync::Arc;

use bytes::Bytes;
use proptest::prelude::*;

use dcm_transcoder::codec::{
    register_builtin_codecs, CodecPolicy, CodecRegistry, DecoderFactory, EncoderFactory,
};
use dcm_transcoder::error::{CodecError, TranscodeError};
use dcm_transcoder::pixel::{
    ColorModel, EncodingId, EncodingParameters, FrameGeometry, ImagePayload, PlanarConfiguration,
    Representation,
};
use dcm_transcoder::transcode::{TranscodeOptions, Transcoder};

use super::test_utils::{
    banded_frames, gradient_frames, mono8, native_payload, planar_rgb, smooth_rgb_frame,
    Counters, CopyCodec, FailingEncoderFactory, COPY,
};

fn builtin_transcoder() -> Transcoder {
    let registry = Arc::new(CodecRegistry::new());
    let _tokens = register_builtin_codecs(&registry, CodecPolicy::default());
    Transcoder::new(registry)
}

fn copy_transcoder(options: TranscodeOptions) -> (Transcoder, Arc<Counters>) {
    let codec = CopyCodec::new();
    let counters = codec.counters.clone();
    let registry = Arc::new(CodecRegistry::new());
    let decoder: Arc<dyn DecoderFactory> = Arc::new(codec.clone());
    let encoder: Arc<dyn EncoderFactory> = Arc::new(codec);
    let _token = registry.register(COPY, Some(decoder), Some(encoder), CodecPolicy::default());
    (Transcoder::with_options(registry, options), counters)
}

/// Native frames of `payload`, trimmed to the frame length.
fn native_frames(payload: &ImagePayload) -> Vec<Vec<u8>> {
    let frame_len = payload.geometry().frame_len();
    payload
        .cache()
        .native()
        .expect("native representation cached")
        .frames()
        .iter()
        .map(|frame| frame[..frame_len].to_vec())
        .collect()
}

/// Encode `frames` to RLE, then decode them in a fresh payload seeded with
/// the RLE representation only.
fn rle_round_trip(transcoder: &Transcoder, geometry: FrameGeometry, frames: Vec<Bytes>) {
    let params = EncodingParameters::new();
    let mut original = ImagePayload::from_native_frames(geometry.clone(), frames).unwrap();
    let rle = transcoder
        .transcode(&mut original, &EncodingId::RLE_LOSSLESS, &params)
        .unwrap()
        .clone();
    assert!(!rle.is_lossy());
    assert!(rle.frames().iter().all(|f| f.len() % 2 == 0));

    let mut restored = ImagePayload::new(geometry, rle).unwrap();
    assert!(restored.cache().native().is_none());
    transcoder
        .ensure_representation(&mut restored, &EncodingId::NATIVE, &params)
        .unwrap();

    assert_eq!(native_frames(&restored), native_frames(&original));
    assert!(restored.lossy_history().is_empty());
}

// =============================================================================
// Cache Reuse
// =============================================================================

#[test]
fn test_repeated_requests_do_no_codec_work() {
    let (transcoder, counters) = copy_transcoder(TranscodeOptions::default());
    let geometry = mono8(4, 4, 3);
    let params = EncodingParameters::new();

    let seed = Representation::new(
        &COPY,
        &params,
        gradient_frames(&geometry),
        geometry.color_model,
    );
    let mut payload = ImagePayload::new(geometry, seed).unwrap();

    transcoder
        .ensure_representation(&mut payload, &EncodingId::NATIVE, &params)
        .unwrap();
    assert_eq!(counters.decoders(), 3);
    assert_eq!(counters.encoders(), 0);
    let work = counters.codec_work();

    for target in [&EncodingId::NATIVE, &COPY, &EncodingId::IMPLICIT_VR_LITTLE_ENDIAN] {
        transcoder
            .ensure_representation(&mut payload, target, &params)
            .unwrap();
    }
    assert_eq!(counters.codec_work(), work);
    assert_eq!(payload.cache().len(), 2);

    // Different parameters are a different representation
    let tuned = EncodingParameters::new().with(EncodingParameters::PREDICTOR, 1);
    transcoder
        .ensure_representation(&mut payload, &COPY, &tuned)
        .unwrap();
    assert_eq!(counters.encoders(), 3);
    assert_eq!(counters.decoders(), 3);
    assert_eq!(payload.cache().len(), 3);
}

// =============================================================================
// Lossless Round Trips
// =============================================================================

#[test]
fn test_rle_round_trip_multi_frame_mono8() {
    let geometry = mono8(16, 16, 3);
    let frames = banded_frames(&geometry);
    rle_round_trip(&builtin_transcoder(), geometry, frames);
}

#[test]
fn test_rle_round_trip_signed_16_bit() {
    let geometry = FrameGeometry::monochrome(8, 12, 16).with_signed(true);
    let frames = gradient_frames(&geometry);
    rle_round_trip(&builtin_transcoder(), geometry, frames);
}

#[test]
fn test_rle_round_trip_planar_rgb() {
    let geometry = planar_rgb(10, 6);
    let frames = gradient_frames(&geometry);
    rle_round_trip(&builtin_transcoder(), geometry, frames);
}

#[test]
fn test_rle_round_trip_odd_frame_length() {
    let geometry = mono8(3, 5, 2);
    let frames = banded_frames(&geometry);
    rle_round_trip(&builtin_transcoder(), geometry, frames);
}

#[test]
fn test_rle_round_trip_with_tiny_input_chunks() {
    let registry = Arc::new(CodecRegistry::new());
    let _tokens = register_builtin_codecs(&registry, CodecPolicy::default());
    let options = TranscodeOptions {
        backup_capacity: 8,
        input_chunk_size: 3,
        detect_encoding: false,
    };
    let geometry = FrameGeometry::rgb(12, 7).with_frames(2);
    let frames = gradient_frames(&geometry);
    rle_round_trip(&Transcoder::with_options(registry, options), geometry, frames);
}

fn geometry_strategy() -> impl Strategy<Value = FrameGeometry> {
    (1u16..12, 1u16..12, 1u32..3, 0usize..4).prop_map(|(rows, columns, frames, kind)| {
        match kind {
            0 => FrameGeometry::monochrome(rows, columns, 8),
            1 => FrameGeometry::monochrome(rows, columns, 16).with_signed(true),
            2 => FrameGeometry::rgb(rows, columns),
            _ => FrameGeometry::rgb(rows, columns)
                .with_planar_configuration(PlanarConfiguration::Planar),
        }
        .with_frames(frames)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Any native pixels survive native -> RLE -> native unchanged.
    #[test]
    fn prop_rle_round_trip(
        geometry in geometry_strategy(),
        seed in any::<u64>(),
        chunk in 1usize..64,
    ) {
        let frames: Vec<Bytes> = (0..geometry.number_of_frames as u64)
            .map(|frame| {
                let mut state = seed ^ frame.wrapping_mul(0x9E37_79B9_7F4A_7C15);
                let data: Vec<u8> = (0..geometry.frame_len())
                    .map(|_| {
                        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
                        // Short runs are common in real images
                        if state >> 62 == 0 { 0 } else { (state >> 56) as u8 }
                    })
                    .collect();
                Bytes::from(data)
            })
            .collect();

        let registry = Arc::new(CodecRegistry::new());
        let _tokens = register_builtin_codecs(&registry, CodecPolicy::default());
        let options = TranscodeOptions {
            input_chunk_size: chunk,
            ..TranscodeOptions::default()
        };
        rle_round_trip(&Transcoder::with_options(registry, options), geometry, frames);
    }
}

// =============================================================================
// Failure Atomicity
// =============================================================================

#[test]
fn test_failed_encode_leaves_no_entry() {
    let failing = Arc::new(FailingEncoderFactory::new(1));
    let registry = Arc::new(CodecRegistry::new());
    let encoder: Arc<dyn EncoderFactory> = failing.clone();
    let _token = registry.register(COPY, None, Some(encoder), CodecPolicy::default());
    let transcoder = Transcoder::new(registry);

    let mut payload = native_payload(mono8(4, 4, 3));
    let params = EncodingParameters::new();
    let err = transcoder
        .ensure_representation(&mut payload, &COPY, &params)
        .unwrap_err();

    assert_eq!(
        err,
        TranscodeError::Codec(CodecError::Internal("encoder gave up".to_string()))
    );
    assert_eq!(failing.created(), 2);
    assert!(!payload.cache().has(&COPY, &params));
    assert_eq!(payload.cache().len(), 1);
    assert!(payload.encoded_frames(&COPY, &params).is_none());
}

#[test]
fn test_codec_error_propagates_unchanged() {
    let transcoder = builtin_transcoder();
    let mut payload = native_payload(FrameGeometry::monochrome(8, 8, 16));
    let params = EncodingParameters::new();

    let err = transcoder
        .ensure_representation(&mut payload, &EncodingId::JPEG_BASELINE, &params)
        .unwrap_err();
    assert!(matches!(
        err,
        TranscodeError::Codec(CodecError::FormatMismatch(_))
    ));
    assert!(!payload.cache().has(&EncodingId::JPEG_BASELINE, &params));
}

#[test]
fn test_truncated_rle_fails_decode() {
    let transcoder = builtin_transcoder();
    let geometry = mono8(8, 8, 1);
    let params = EncodingParameters::new();

    let mut original = native_payload(geometry.clone());
    let rle = transcoder
        .transcode(&mut original, &EncodingId::RLE_LOSSLESS, &params)
        .unwrap();
    let frame = rle.frame(0).unwrap();
    let cut = frame.slice(..frame.len() - 10);

    let seed = Representation::new(
        &EncodingId::RLE_LOSSLESS,
        &params,
        vec![cut],
        geometry.color_model,
    );
    let mut payload = ImagePayload::new(geometry, seed).unwrap();
    let err = transcoder
        .ensure_representation(&mut payload, &EncodingId::NATIVE, &params)
        .unwrap_err();

    assert!(matches!(err, TranscodeError::Codec(CodecError::Truncated(_))));
    assert!(payload.cache().native().is_none());
}

#[test]
fn test_failure_on_later_frame_discards_decoded_frames() {
    let transcoder = builtin_transcoder();
    let geometry = mono8(8, 8, 2);
    let params = EncodingParameters::new();

    let mut original = native_payload(geometry.clone());
    let rle = transcoder
        .transcode(&mut original, &EncodingId::RLE_LOSSLESS, &params)
        .unwrap();
    let first = rle.frame(0).unwrap().clone();
    let second = rle.frame(1).unwrap();
    let cut = second.slice(..second.len() - 10);

    let seed = Representation::new(
        &EncodingId::RLE_LOSSLESS,
        &params,
        vec![first, cut],
        geometry.color_model,
    );
    let mut payload = ImagePayload::new(geometry, seed).unwrap();
    let err = transcoder
        .ensure_representation(&mut payload, &EncodingId::NATIVE, &params)
        .unwrap_err();

    assert!(matches!(err, TranscodeError::Codec(CodecError::Truncated(_))));
    assert!(payload.cache().native().is_none());
    assert_eq!(payload.cache().len(), 1);
}

// =============================================================================
// Codec Availability
// =============================================================================

#[test]
fn test_decoder_only_codec_cannot_be_a_target() {
    let transcoder = builtin_transcoder();
    let geometry = mono8(4, 4, 1);
    let params = EncodingParameters::new();

    // Not a real codestream: resolution must fail before any decode work
    let seed = Representation::new(
        &EncodingId::JPEG2000,
        &params,
        vec![Bytes::from_static(&[0xFF, 0x4F, 0xFF, 0x51, 0, 0])],
        geometry.color_model,
    );
    let mut payload = ImagePayload::new(geometry, seed).unwrap();

    assert!(transcoder.can_produce(&payload, &EncodingId::NATIVE, &params));
    assert!(transcoder.can_produce(&payload, &EncodingId::RLE_LOSSLESS, &params));
    assert!(transcoder.can_produce(&payload, &EncodingId::JPEG2000, &params));
    assert!(!transcoder.can_produce(&payload, &EncodingId::JPEG2000_LOSSLESS, &params));

    let err = transcoder
        .ensure_representation(&mut payload, &EncodingId::JPEG2000_LOSSLESS, &params)
        .unwrap_err();
    assert_eq!(
        err,
        TranscodeError::NoCodecAvailable(EncodingId::JPEG2000_LOSSLESS)
    );
    assert_eq!(payload.cache().len(), 1);
}

#[test]
fn test_undecodable_source_reports_its_encoding() {
    let transcoder = builtin_transcoder();
    let geometry = mono8(4, 4, 1);
    let params = EncodingParameters::new();
    let seed = Representation::new(
        &EncodingId::JPEG_LS_LOSSLESS,
        &params,
        vec![Bytes::from_static(&[1, 2, 3, 4])],
        geometry.color_model,
    );
    let mut payload = ImagePayload::new(geometry, seed).unwrap();

    assert!(!transcoder.can_produce(&payload, &EncodingId::NATIVE, &params));
    let err = transcoder
        .ensure_representation(&mut payload, &EncodingId::RLE_LOSSLESS, &params)
        .unwrap_err();
    assert_eq!(
        err,
        TranscodeError::NoCodecAvailable(EncodingId::JPEG_LS_LOSSLESS)
    );
}

#[test]
fn test_detection_rescues_mislabelled_rle() {
    let geometry = mono8(8, 8, 1);
    let params = EncodingParameters::new();

    let transcoder = builtin_transcoder();
    let mut original = native_payload(geometry.clone());
    let rle = transcoder
        .transcode(&mut original, &EncodingId::RLE_LOSSLESS, &params)
        .unwrap();
    let mislabelled = Representation::new(
        &EncodingId::JPEG_LS_LOSSLESS,
        &params,
        rle.frames().to_vec(),
        geometry.color_model,
    );

    let mut payload = ImagePayload::new(geometry.clone(), mislabelled.clone()).unwrap();
    assert!(transcoder
        .ensure_representation(&mut payload, &EncodingId::NATIVE, &params)
        .is_err());

    let detecting = Transcoder::with_options(
        transcoder.registry().clone(),
        TranscodeOptions {
            detect_encoding: true,
            ..TranscodeOptions::default()
        },
    );
    let mut payload = ImagePayload::new(geometry, mislabelled).unwrap();
    detecting
        .ensure_representation(&mut payload, &EncodingId::NATIVE, &params)
        .unwrap();
    assert_eq!(native_frames(&payload), native_frames(&original));
}

// =============================================================================
// Decode Loop
// =============================================================================

#[test]
fn test_suspending_decoder_consumes_input_once() {
    let options = TranscodeOptions {
        backup_capacity: 16,
        input_chunk_size: 4,
        detect_encoding: false,
    };
    let (transcoder, counters) = copy_transcoder(options);

    let geometry = mono8(3, 4, 1);
    let source: Vec<u8> = (1..=12).collect();
    let params = EncodingParameters::new();
    let seed = Representation::new(
        &COPY,
        &params,
        vec![Bytes::from(source.clone())],
        geometry.color_model,
    );
    let mut payload = ImagePayload::new(geometry, seed).unwrap();

    transcoder
        .ensure_representation(&mut payload, &EncodingId::NATIVE, &params)
        .unwrap();

    assert_eq!(Counters::get(&counters.decode_calls), 3);
    assert_eq!(Counters::get(&counters.suspends), 2);
    assert_eq!(Counters::get(&counters.bytes_consumed), 12);
    assert_eq!(Counters::get(&counters.bytes_written), 12);
    assert_eq!(native_frames(&payload), vec![source]);
}

// =============================================================================
// Lossy Tracking
// =============================================================================

#[test]
fn test_jpeg_baseline_records_lossy_history() {
    let transcoder = builtin_transcoder();
    let geometry = FrameGeometry::rgb(16, 16);
    let original = smooth_rgb_frame(&geometry);
    let mut payload =
        ImagePayload::from_native_frames(geometry.clone(), vec![original.clone()]).unwrap();
    assert!(payload.lossy_history().is_empty());

    let params = EncodingParameters::new().with(EncodingParameters::QUALITY, 90);
    let jpeg = transcoder
        .transcode(&mut payload, &EncodingId::JPEG_BASELINE, &params)
        .unwrap()
        .clone();
    assert!(jpeg.is_lossy());
    assert_eq!(jpeg.color_model(), ColorModel::YbrFull422);
    assert_eq!(payload.lossy_history(), vec![EncodingId::JPEG_BASELINE]);

    // Decode the JPEG in small chunks and re-encode losslessly
    let registry = transcoder.registry().clone();
    let chunked = Transcoder::with_options(
        registry,
        TranscodeOptions {
            input_chunk_size: 64,
            ..TranscodeOptions::default()
        },
    );
    let mut derived = ImagePayload::new(geometry.clone(), jpeg).unwrap();
    chunked
        .ensure_representation(&mut derived, &EncodingId::RLE_LOSSLESS, &EncodingParameters::new())
        .unwrap();

    let native = derived.cache().native().unwrap();
    assert_eq!(native.color_model(), ColorModel::Rgb);
    assert!(native.is_lossy());
    let rle = derived
        .representation(&EncodingId::RLE_LOSSLESS, &EncodingParameters::new())
        .unwrap();
    assert!(rle.is_lossy());

    let history = derived.lossy_history();
    assert!(history.contains(&EncodingId::JPEG_BASELINE));
    assert!(history.contains(&EncodingId::RLE_LOSSLESS));

    let decoded = &native.frames()[0][..geometry.frame_len()];
    let max_error = decoded
        .iter()
        .zip(original.iter())
        .map(|(a, b)| (*a as i32 - *b as i32).abs())
        .max()
        .unwrap();
    assert!(max_error <= 24, "max error {}", max_error);
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn test_shared_transcoder_across_threads() {
    let transcoder = builtin_transcoder();

    std::thread::scope(|scope| {
        for rows in 1..=6u16 {
            let transcoder = &transcoder;
            scope.spawn(move || {
                let geometry = mono8(rows * 4, 8, 2);
                let frames = banded_frames(&geometry);
                rle_round_trip(transcoder, geometry, frames);
            });
        }
    });
}
