//! The transcoder service.

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::codec::{
    detect_encoding, CodecRegistry, DecodeStatus, DecoderFactory, EncoderFactory, ResolvedCodec,
};
use crate::error::{StreamError, TranscodeError};
use crate::io::{ByteWindow, DEFAULT_BACKUP_CAPACITY};
use crate::pixel::{
    check_native_frames, ColorModel, EncodingId, EncodingParameters, FrameGeometry, ImagePayload,
    Representation, RepresentationCache,
};

/// Default size of the compressed chunks handed to a decoder (64 KiB).
pub const DEFAULT_INPUT_CHUNK_SIZE: usize = 64 * 1024;

// =============================================================================
// Options
// =============================================================================

/// Tuning for the decode loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TranscodeOptions {
    /// Backup ring capacity of each decode window
    pub backup_capacity: usize,

    /// Compressed bytes attached per decode step for suspending decoders
    pub input_chunk_size: usize,

    /// Check leading bytes of compressed data and prefer a decoder matching
    /// what is actually there
    pub detect_encoding: bool,
}

impl Default for TranscodeOptions {
    fn default() -> Self {
        Self {
            backup_capacity: DEFAULT_BACKUP_CAPACITY,
            input_chunk_size: DEFAULT_INPUT_CHUNK_SIZE,
            detect_encoding: false,
        }
    }
}

// =============================================================================
// Transcoder
// =============================================================================

/// Produces representations of image payloads on demand.
///
/// The transcoder holds no per-payload state; one instance can serve any
/// number of payloads, on any number of threads, as long as each payload is
/// borrowed mutably by one call at a time.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use bytes::Bytes;
/// use dcm_transcoder::codec::{register_builtin_codecs, CodecPolicy, CodecRegistry};
/// use dcm_transcoder::pixel::{EncodingId, EncodingParameters, FrameGeometry, ImagePayload};
/// use dcm_transcoder::transcode::Transcoder;
///
/// let registry = Arc::new(CodecRegistry::new());
/// let _tokens = register_builtin_codecs(&registry, CodecPolicy::default());
/// let transcoder = Transcoder::new(registry);
///
/// let geometry = FrameGeometry::monochrome(4, 4, 8);
/// let mut payload = ImagePayload::from_native_buffer(geometry, Bytes::from(vec![7u8; 16])).unwrap();
///
/// let params = EncodingParameters::new();
/// transcoder
///     .ensure_representation(&mut payload, &EncodingId::RLE_LOSSLESS, &params)
///     .unwrap();
/// assert!(payload.cache().has(&EncodingId::RLE_LOSSLESS, &params));
/// ```
#[derive(Debug, Clone)]
pub struct Transcoder {
    registry: Arc<CodecRegistry>,
    options: TranscodeOptions,
}

impl Transcoder {
    /// Create a transcoder with default options.
    pub fn new(registry: Arc<CodecRegistry>) -> Self {
        Self::with_options(registry, TranscodeOptions::default())
    }

    pub fn with_options(registry: Arc<CodecRegistry>, options: TranscodeOptions) -> Self {
        Self { registry, options }
    }

    pub fn registry(&self) -> &Arc<CodecRegistry> {
        &self.registry
    }

    pub fn options(&self) -> &TranscodeOptions {
        &self.options
    }

    /// Make sure `payload` holds a representation in `target` encoding.
    ///
    /// Cached representations are reused without invoking any codec. A new
    /// representation is only inserted once every frame succeeded, so on
    /// error the cache holds no entry for `target`. A native intermediate
    /// synthesized on the way to a compressed target stays cached.
    ///
    /// # Errors
    ///
    /// - [`TranscodeError::NoCodecAvailable`] when a decode or encode step has
    ///   no registered codec
    /// - [`TranscodeError::CacheInconsistency`] when the cache holds nothing
    ///   usable as a source
    /// - codec and stream errors, propagated unchanged
    pub fn ensure_representation(
        &self,
        payload: &mut ImagePayload,
        target: &EncodingId,
        params: &EncodingParameters,
    ) -> Result<(), TranscodeError> {
        if payload.cache().has(target, params) {
            debug!(target = %target, params = %params, "Representation already cached");
            return Ok(());
        }

        if target.is_native() {
            let native = self.synthesize_native(payload)?;
            payload.cache_mut().put(native);
            return Ok(());
        }

        // Fail before any decode work if the last step is impossible
        let encoder = self.registry.resolve_encoder(target)?;

        if payload.cache().native().is_none() {
            let native = self.synthesize_native(payload)?;
            payload.cache_mut().put(native);
        }
        let native = payload.cache().native().ok_or_else(|| {
            TranscodeError::CacheInconsistency("native representation missing after decode".into())
        })?;

        let encoded = self.encode_representation(payload.geometry(), native, &encoder, target, params)?;
        info!(
            target = %target,
            params = %params,
            frames = encoded.frame_count(),
            bytes = encoded.encoded_len(),
            lossy = encoded.is_lossy(),
            "Encoded representation"
        );
        payload.cache_mut().put(encoded);
        Ok(())
    }

    /// Like [`ensure_representation`](Self::ensure_representation), returning
    /// the cached representation.
    pub fn transcode<'p>(
        &self,
        payload: &'p mut ImagePayload,
        target: &EncodingId,
        params: &EncodingParameters,
    ) -> Result<&'p Representation, TranscodeError> {
        self.ensure_representation(payload, target, params)?;
        payload.representation(target, params).ok_or_else(|| {
            TranscodeError::CacheInconsistency(format!("{} missing after transcode", target))
        })
    }

    /// Whether [`ensure_representation`](Self::ensure_representation) has
    /// the codecs it needs. Performs no codec work.
    pub fn can_produce(
        &self,
        payload: &ImagePayload,
        target: &EncodingId,
        params: &EncodingParameters,
    ) -> bool {
        let cache = payload.cache();
        if cache.has(target, params) {
            return true;
        }

        let decodable = || {
            cache
                .compressed()
                .any(|r| self.registry.can_decode(&self.decoder_encoding(r)))
        };
        if target.is_native() {
            return decodable();
        }
        self.registry.can_encode(target) && (cache.native().is_some() || decodable())
    }

    // =========================================================================
    // Decode path
    // =========================================================================

    fn synthesize_native(&self, payload: &ImagePayload) -> Result<Representation, TranscodeError> {
        let (source, decode_as) = self.select_compressed_source(payload.cache())?;
        let native = self.decode_representation(payload.geometry(), source, &decode_as)?;
        info!(
            source = %source.encoding(),
            frames = native.frame_count(),
            color_model = native.color_model().as_str(),
            "Decoded to native"
        );
        Ok(native)
    }

    /// First compressed representation with a usable decoder.
    fn select_compressed_source<'c>(
        &self,
        cache: &'c RepresentationCache,
    ) -> Result<(&'c Representation, EncodingId), TranscodeError> {
        let mut first = None;
        for representation in cache.compressed() {
            let decode_as = self.decoder_encoding(representation);
            if self.registry.can_decode(&decode_as) {
                return Ok((representation, decode_as));
            }
            first.get_or_insert(decode_as);
        }
        match first {
            Some(encoding) => Err(TranscodeError::NoCodecAvailable(encoding)),
            None => Err(TranscodeError::CacheInconsistency(
                "payload holds no representation to transcode from".into(),
            )),
        }
    }

    /// Encoding whose decoder should handle `source`.
    fn decoder_encoding(&self, source: &Representation) -> EncodingId {
        let declared = source.encoding().clone();
        if !self.options.detect_encoding {
            return declared;
        }
        let Some(first) = source.frame(0) else {
            return declared;
        };

        let mut window = ByteWindow::with_capacity(0);
        if window.attach(first.clone()).is_err() {
            return declared;
        }
        match detect_encoding(&mut window) {
            Ok(Some(detected)) if detected != declared && self.registry.can_decode(&detected) => {
                warn!(
                    declared = %declared,
                    detected = %detected,
                    "Pixel data does not match its declared encoding"
                );
                detected
            }
            _ => declared,
        }
    }

    fn decode_representation(
        &self,
        geometry: &FrameGeometry,
        source: &Representation,
        decode_as: &EncodingId,
    ) -> Result<Representation, TranscodeError> {
        if source.frame_count() != geometry.number_of_frames as usize {
            return Err(TranscodeError::CacheInconsistency(format!(
                "{} holds {} frames, geometry declares {}",
                source.encoding(),
                source.frame_count(),
                geometry.number_of_frames
            )));
        }

        let codec = self.registry.resolve_decoder(decode_as)?;
        debug!(encoding = %decode_as, codec = codec.factory().name(), "Selected decoder");

        let mut geometry = geometry.clone();
        geometry.color_model = source.color_model();

        let mut frames = Vec::with_capacity(source.frame_count());
        let mut color_model: Option<ColorModel> = None;
        for (index, data) in source.frames().iter().enumerate() {
            let (frame, model) =
                self.decode_frame(&codec, decode_as, &geometry, source.params(), data, index)?;
            match color_model {
                Some(previous) if previous != model => warn!(
                    frame = index,
                    expected = previous.as_str(),
                    actual = model.as_str(),
                    "Decoder reported a different color model"
                ),
                Some(_) => {}
                None => color_model = Some(model),
            }
            frames.push(frame);
        }

        Ok(Representation::new(
            &EncodingId::NATIVE,
            &EncodingParameters::new(),
            frames,
            color_model.unwrap_or(geometry.color_model),
        )
        .with_lossy(source.is_lossy()))
    }

    /// Run one decoder over one compressed frame.
    fn decode_frame(
        &self,
        codec: &ResolvedCodec<dyn DecoderFactory>,
        encoding: &EncodingId,
        geometry: &FrameGeometry,
        params: &EncodingParameters,
        data: &Bytes,
        index: usize,
    ) -> Result<(Bytes, ColorModel), TranscodeError> {
        let mut decoder = codec.create(geometry, params)?;
        let mut output = vec![0u8; geometry.frame_len()];
        let mut window = ByteWindow::try_with_capacity(self.options.backup_capacity)?;

        let chunk = if decoder.supports_suspend() {
            self.options.input_chunk_size.max(1)
        } else {
            data.len().max(1)
        };

        let mut offset = feed(&mut window, data, 0, chunk)?;
        let mut suspends = 0usize;
        loop {
            match decoder.decode(&mut window, &mut output, geometry.signed)? {
                DecodeStatus::Normal => break,
                DecodeStatus::Suspend => {
                    if window.is_ended() {
                        return Err(TranscodeError::StalledDecoder {
                            encoding: encoding.clone(),
                            frame: index,
                        });
                    }
                    suspends += 1;
                    window.detach()?;
                    offset = feed(&mut window, data, offset, chunk)?;
                }
            }
        }

        debug!(frame = index, bytes = data.len(), suspends, "Decoded frame");
        Ok((Bytes::from(output), decoder.color_model()))
    }

    // =========================================================================
    // Encode path
    // =========================================================================

    fn encode_representation(
        &self,
        geometry: &FrameGeometry,
        native: &Representation,
        codec: &ResolvedCodec<dyn EncoderFactory>,
        target: &EncodingId,
        params: &EncodingParameters,
    ) -> Result<Representation, TranscodeError> {
        if native.frame_count() != geometry.number_of_frames as usize {
            return Err(TranscodeError::CacheInconsistency(format!(
                "native representation holds {} frames, geometry declares {}",
                native.frame_count(),
                geometry.number_of_frames
            )));
        }
        check_native_frames(geometry, native.frames())?;
        debug!(encoding = %target, codec = codec.factory().name(), "Selected encoder");

        let mut geometry = geometry.clone();
        geometry.color_model = native.color_model();
        let frame_len = geometry.frame_len();

        let mut frames = Vec::with_capacity(native.frame_count());
        let mut color_model = None;
        let mut lossy = native.is_lossy();
        for (index, frame) in native.frames().iter().enumerate() {
            let mut encoder = codec.create(&geometry, params)?;
            let encoded = encoder.encode(&geometry, native.color_model(), &frame[..frame_len])?;
            debug!(frame = index, bytes = encoded.data.len(), "Encoded frame");

            lossy |= encoded.lossy;
            color_model.get_or_insert(encoded.color_model);
            frames.push(encoded.data);
        }

        Ok(Representation::new(
            target,
            params,
            frames,
            color_model.unwrap_or(native.color_model()),
        )
        .with_lossy(lossy))
    }
}

/// Attach the next chunk of `data` starting at `offset`, marking the window
/// ended once everything was handed over. Returns the new offset.
fn feed(
    window: &mut ByteWindow,
    data: &Bytes,
    offset: usize,
    chunk: usize,
) -> Result<usize, StreamError> {
    let end = (offset + chunk).min(data.len());
    if end > offset {
        window.attach(data.slice(offset..end))?;
    }
    if end == data.len() {
        window.mark_ended();
    }
    Ok(end)
}

// =============================================================================
// Tests
// =============================================================================
