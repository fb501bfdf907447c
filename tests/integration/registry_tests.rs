//! Codec registry integration tests.
//!
//! Tests verify:
//! - Built-in codec registration and capability listing
//! - Reference-counted registration and release
//! - Partial re-registration keeps existing factories
//! - Resolution from many threads while registrations change

use std::sync::Arc;

use dcm_transcoder::codec::rle::{RleDecoderFactory, RleEncoderFactory};
use dcm_transcoder::codec::{
    register_builtin_codecs, CodecPolicy, CodecRegistry, ColorConversion, DecoderFactory,
    EncoderFactory,
};
use dcm_transcoder::error::{RegistryError, TranscodeError};
use dcm_transcoder::pixel::EncodingId;

use super::test_utils::{CopyCodec, COPY};

fn copy_factories() -> (Arc<dyn DecoderFactory>, Arc<dyn EncoderFactory>) {
    let codec = CopyCodec::new();
    (Arc::new(codec.clone()), Arc::new(codec))
}

#[test]
fn test_builtin_capabilities() {
    let registry = CodecRegistry::new();
    let tokens = register_builtin_codecs(&registry, CodecPolicy::default());
    assert_eq!(tokens.len(), 4);
    assert_eq!(registry.len(), 4);

    assert!(registry.can_decode(&EncodingId::RLE_LOSSLESS));
    assert!(registry.can_encode(&EncodingId::RLE_LOSSLESS));
    assert!(registry.can_encode(&EncodingId::JPEG_BASELINE));
    assert!(registry.can_decode(&EncodingId::JPEG2000));
    assert!(!registry.can_encode(&EncodingId::JPEG2000_LOSSLESS));
    assert!(!registry.can_decode(&EncodingId::JPEG_LS_LOSSLESS));

    let caps = registry.capabilities();
    let uids: Vec<&str> = caps.iter().map(|c| c.encoding.uid()).collect();
    let mut sorted = uids.clone();
    sorted.sort();
    assert_eq!(uids, sorted);

    let j2k = caps
        .iter()
        .find(|c| c.encoding == EncodingId::JPEG2000)
        .unwrap();
    assert_eq!(j2k.decoder.as_deref(), Some("jpeg2000"));
    assert_eq!(j2k.encoder, None);

    let json = serde_json::to_value(&caps).unwrap();
    assert_eq!(json.as_array().unwrap().len(), 4);

    for token in tokens {
        assert!(registry.unregister(token));
    }
    assert!(registry.is_empty());
}

#[test]
fn test_registration_is_reference_counted() {
    let registry = CodecRegistry::new();
    let (decoder, encoder) = copy_factories();

    let first = registry.register(
        COPY,
        Some(decoder.clone()),
        Some(encoder.clone()),
        CodecPolicy::default(),
    );
    let second = registry.register(COPY, Some(decoder), Some(encoder), CodecPolicy::default());
    assert_eq!(registry.registrations(&COPY), 2);

    assert!(registry.unregister(first));
    assert!(registry.can_decode(&COPY));
    assert!(registry.can_encode(&COPY));

    assert!(registry.unregister(second));
    assert!(!registry.can_decode(&COPY));
    assert_eq!(registry.registrations(&COPY), 0);
}

#[test]
fn test_missing_factory_is_reported() {
    let registry = CodecRegistry::new();
    let err = registry.resolve_decoder(&COPY).unwrap_err();
    assert_eq!(err, RegistryError::NotFound(COPY));

    let err: TranscodeError = registry
        .resolve_encoder(&EncodingId::RLE_LOSSLESS)
        .unwrap_err()
        .into();
    assert_eq!(err, TranscodeError::NoCodecAvailable(EncodingId::RLE_LOSSLESS));
}

#[test]
fn test_partial_registration_keeps_existing_factory() {
    let registry = CodecRegistry::new();
    let _rle = registry.register(
        EncodingId::RLE_LOSSLESS,
        Some(Arc::new(RleDecoderFactory)),
        Some(Arc::new(RleEncoderFactory)),
        CodecPolicy::default(),
    );

    let strict = CodecPolicy {
        color_conversion: ColorConversion::Never,
        reverse_byte_order: true,
    };
    let (copy_decoder, _) = copy_factories();
    let _override = registry.register(EncodingId::RLE_LOSSLESS, Some(copy_decoder), None, strict);

    let decoder = registry.resolve_decoder(&EncodingId::RLE_LOSSLESS).unwrap();
    assert_eq!(decoder.factory().name(), "copy");
    assert_eq!(decoder.policy(), &strict);

    let encoder = registry.resolve_encoder(&EncodingId::RLE_LOSSLESS).unwrap();
    assert_eq!(encoder.factory().name(), "rle");
    assert_eq!(encoder.policy(), &strict);
}

#[test]
fn test_native_aliases_share_one_entry() {
    let registry = CodecRegistry::new();
    let (decoder, encoder) = copy_factories();
    let _token = registry.register(
        EncodingId::IMPLICIT_VR_LITTLE_ENDIAN,
        Some(decoder),
        Some(encoder),
        CodecPolicy::default(),
    );

    assert!(registry.can_decode(&EncodingId::NATIVE));
    assert!(registry.can_encode(&EncodingId::EXPLICIT_VR_BIG_ENDIAN));
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_concurrent_resolution_during_registration() {
    let registry = Arc::new(CodecRegistry::new());
    let _tokens = register_builtin_codecs(&registry, CodecPolicy::default());

    std::thread::scope(|scope| {
        for worker in 0..8 {
            let registry = registry.clone();
            scope.spawn(move || {
                let private = EncodingId::new(format!("1.2.826.0.1.3680043.10.100.{}", worker));
                for _ in 0..200 {
                    assert!(registry.resolve_decoder(&EncodingId::RLE_LOSSLESS).is_ok());
                    assert!(registry.resolve_encoder(&EncodingId::JPEG_BASELINE).is_ok());

                    let (decoder, encoder) = copy_factories();
                    let token = registry.register(
                        private.clone(),
                        Some(decoder),
                        Some(encoder),
                        CodecPolicy::default(),
                    );
                    assert!(registry.can_decode(&private));
                    assert!(registry.unregister(token));
                }
            });
        }
    });

    assert_eq!(registry.len(), 4);
}
