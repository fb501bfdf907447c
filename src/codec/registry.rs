//! Codec registry keyed by encoding.
//!
//! The registry is an explicit service object, typically shared as
//! `Arc<CodecRegistry>` between the plugins that populate it and the worker
//! threads that resolve codecs from it. Registration happens at plugin load
//! and unload; resolution happens for every frame. A read-mostly lock keeps
//! resolution cheap.
//!
//! # Reference counting
//!
//! Independent subsystems may register the same encoding. Each call to
//! [`CodecRegistry::register`] returns a [`RegistrationToken`] and bumps a
//! per-encoding count; factories are only removed when the last token for
//! that encoding is handed back.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use dcm_transcoder::codec::{rle, CodecPolicy, CodecRegistry};
//! use dcm_transcoder::EncodingId;
//!
//! let registry = CodecRegistry::new();
//! let token = registry.register(
//!     EncodingId::RLE_LOSSLESS,
//!     Some(Arc::new(rle::RleDecoderFactory)),
//!     Some(Arc::new(rle::RleEncoderFactory)),
//!     CodecPolicy::default(),
//! );
//! assert!(registry.resolve_decoder(&EncodingId::RLE_LOSSLESS).is_ok());
//!
//! registry.unregister(token);
//! assert!(registry.resolve_decoder(&EncodingId::RLE_LOSSLESS).is_err());
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{CodecError, RegistryError};
use crate::pixel::{EncodingId, EncodingParameters, FrameGeometry};

use super::{CodecPolicy, Decoder, DecoderFactory, Encoder, EncoderFactory};

// =============================================================================
// Registration Token
// =============================================================================

/// Proof of one registration, consumed by [`CodecRegistry::unregister`].
#[derive(Debug, PartialEq, Eq, Hash)]
#[must_use = "dropping the token leaks the registration"]
pub struct RegistrationToken {
    registry: u64,
    encoding: EncodingId,
    serial: u64,
}

impl RegistrationToken {
    pub fn encoding(&self) -> &EncodingId {
        &self.encoding
    }
}

// =============================================================================
// Resolved Codec
// =============================================================================

/// A factory together with the policy it was registered with.
pub struct ResolvedCodec<F: ?Sized> {
    factory: Arc<F>,
    policy: CodecPolicy,
}

impl<F: ?Sized> Clone for ResolvedCodec<F> {
    fn clone(&self) -> Self {
        Self {
            factory: self.factory.clone(),
            policy: self.policy,
        }
    }
}

impl<F: ?Sized> ResolvedCodec<F> {
    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn policy(&self) -> &CodecPolicy {
        &self.policy
    }
}

impl ResolvedCodec<dyn DecoderFactory> {
    /// Create a decoder for one frame.
    pub fn create(
        &self,
        geometry: &FrameGeometry,
        params: &EncodingParameters,
    ) -> Result<Box<dyn Decoder>, CodecError> {
        self.factory.create(geometry, params, &self.policy)
    }
}

impl ResolvedCodec<dyn EncoderFactory> {
    /// Create an encoder for one frame.
    pub fn create(
        &self,
        geometry: &FrameGeometry,
        params: &EncodingParameters,
    ) -> Result<Box<dyn Encoder>, CodecError> {
        self.factory.create(geometry, params, &self.policy)
    }
}

impl<F: ?Sized> fmt::Debug for ResolvedCodec<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedCodec")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Capability summary of one registered encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodecCapability {
    pub encoding: EncodingId,
    pub name: String,
    pub decoder: Option<String>,
    pub encoder: Option<String>,
    pub registrations: usize,
}

// =============================================================================
// Codec Registry
// =============================================================================

struct CodecEntry {
    decoder: Option<Arc<dyn DecoderFactory>>,
    encoder: Option<Arc<dyn EncoderFactory>>,
    policy: CodecPolicy,
    registrations: usize,
}

/// Source of registry ids, so tokens cannot be redeemed at another registry.
static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

/// Table of decoder/encoder factories keyed by encoding.
pub struct CodecRegistry {
    id: u64,
    entries: RwLock<HashMap<EncodingId, CodecEntry>>,
    next_serial: AtomicU64,
}

impl CodecRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
            entries: RwLock::new(HashMap::new()),
            next_serial: AtomicU64::new(1),
        }
    }

    /// Register factories for `encoding`.
    ///
    /// Provided factories replace earlier ones for the same encoding; a
    /// `None` factory leaves an existing one in place. The policy of the
    /// latest registration wins.
    pub fn register(
        &self,
        encoding: EncodingId,
        decoder: Option<Arc<dyn DecoderFactory>>,
        encoder: Option<Arc<dyn EncoderFactory>>,
        policy: CodecPolicy,
    ) -> RegistrationToken {
        let encoding = encoding.canonical();
        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);

        let mut entries = self.entries.write();
        let entry = entries.entry(encoding.clone()).or_insert_with(|| CodecEntry {
            decoder: None,
            encoder: None,
            policy,
            registrations: 0,
        });
        if decoder.is_some() {
            entry.decoder = decoder;
        }
        if encoder.is_some() {
            entry.encoder = encoder;
        }
        entry.policy = policy;
        entry.registrations += 1;

        info!(
            encoding = %encoding,
            decoder = entry.decoder.as_ref().map(|f| f.name()),
            encoder = entry.encoder.as_ref().map(|f| f.name()),
            registrations = entry.registrations,
            "Registered codec"
        );

        RegistrationToken {
            registry: self.id,
            encoding,
            serial,
        }
    }

    /// Release one registration.
    ///
    /// Factories are dropped once the last registration for the encoding is
    /// released. Returns `false` if the encoding had no registrations or the
    /// token was issued by another registry.
    pub fn unregister(&self, token: RegistrationToken) -> bool {
        if token.registry != self.id {
            warn!(
                encoding = %token.encoding,
                serial = token.serial,
                "Ignoring registration token issued by another registry"
            );
            return false;
        }
        let mut entries = self.entries.write();
        let Some(entry) = entries.get_mut(&token.encoding) else {
            debug!(encoding = %token.encoding, serial = token.serial, "Unregister of unknown codec");
            return false;
        };

        entry.registrations -= 1;
        if entry.registrations == 0 {
            entries.remove(&token.encoding);
            info!(encoding = %token.encoding, "Removed codec");
        } else {
            debug!(
                encoding = %token.encoding,
                remaining = entry.registrations,
                "Released codec registration"
            );
        }
        true
    }

    /// Decoder factory for `encoding`.
    pub fn resolve_decoder(
        &self,
        encoding: &EncodingId,
    ) -> Result<ResolvedCodec<dyn DecoderFactory>, RegistryError> {
        let entries = self.entries.read();
        entries
            .get(&encoding.canonical())
            .and_then(|entry| {
                entry.decoder.as_ref().map(|factory| ResolvedCodec {
                    factory: factory.clone(),
                    policy: entry.policy,
                })
            })
            .ok_or_else(|| RegistryError::NotFound(encoding.clone()))
    }

    /// Encoder factory for `encoding`.
    pub fn resolve_encoder(
        &self,
        encoding: &EncodingId,
    ) -> Result<ResolvedCodec<dyn EncoderFactory>, RegistryError> {
        let entries = self.entries.read();
        entries
            .get(&encoding.canonical())
            .and_then(|entry| {
                entry.encoder.as_ref().map(|factory| ResolvedCodec {
                    factory: factory.clone(),
                    policy: entry.policy,
                })
            })
            .ok_or_else(|| RegistryError::NotFound(encoding.clone()))
    }

    pub fn can_decode(&self, encoding: &EncodingId) -> bool {
        self.resolve_decoder(encoding).is_ok()
    }

    pub fn can_encode(&self, encoding: &EncodingId) -> bool {
        self.resolve_encoder(encoding).is_ok()
    }

    /// Outstanding registrations for `encoding`.
    pub fn registrations(&self, encoding: &EncodingId) -> usize {
        self.entries
            .read()
            .get(&encoding.canonical())
            .map_or(0, |entry| entry.registrations)
    }

    /// Capabilities of all registered encodings, sorted by UID.
    pub fn capabilities(&self) -> Vec<CodecCapability> {
        let entries = self.entries.read();
        let mut caps: Vec<CodecCapability> = entries
            .iter()
            .map(|(encoding, entry)| CodecCapability {
                encoding: encoding.clone(),
                name: encoding.name().to_string(),
                decoder: entry.decoder.as_ref().map(|f| f.name().to_string()),
                encoder: entry.encoder.as_ref().map(|f| f.name().to_string()),
                registrations: entry.registrations,
            })
            .collect();
        caps.sort_by(|a, b| a.encoding.cmp(&b.encoding));
        caps
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("capabilities", &self.capabilities())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
