//! Transfer syntax identifiers and codec parameters.
//!
//! An [`EncodingId`] names a transfer syntax by its UID. Every uncompressed
//! transfer syntax shares one pixel layout once the container has been
//! parsed, so they all normalize to [`EncodingId::NATIVE`] before touching
//! the representation cache.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Identifier of a transfer syntax (compression algorithm plus byte layout).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EncodingId(Cow<'static, str>);

impl EncodingId {
    /// Implicit VR Little Endian
    pub const IMPLICIT_VR_LITTLE_ENDIAN: EncodingId = EncodingId::from_static("1.2.840.10008.1.2");
    /// Explicit VR Little Endian, the canonical native encoding
    pub const EXPLICIT_VR_LITTLE_ENDIAN: EncodingId =
        EncodingId::from_static("1.2.840.10008.1.2.1");
    /// Deflated Explicit VR Little Endian
    pub const DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN: EncodingId =
        EncodingId::from_static("1.2.840.10008.1.2.1.99");
    /// Explicit VR Big Endian (retired)
    pub const EXPLICIT_VR_BIG_ENDIAN: EncodingId = EncodingId::from_static("1.2.840.10008.1.2.2");
    /// RLE Lossless
    pub const RLE_LOSSLESS: EncodingId = EncodingId::from_static("1.2.840.10008.1.2.5");
    /// JPEG Baseline (Process 1)
    pub const JPEG_BASELINE: EncodingId = EncodingId::from_static("1.2.840.10008.1.2.4.50");
    /// JPEG Extended (Process 2 & 4)
    pub const JPEG_EXTENDED: EncodingId = EncodingId::from_static("1.2.840.10008.1.2.4.51");
    /// JPEG Lossless, Non-Hierarchical (Process 14)
    pub const JPEG_LOSSLESS: EncodingId = EncodingId::from_static("1.2.840.10008.1.2.4.57");
    /// JPEG Lossless, Non-Hierarchical, First-Order Prediction (Process 14, SV1)
    pub const JPEG_LOSSLESS_SV1: EncodingId = EncodingId::from_static("1.2.840.10008.1.2.4.70");
    /// JPEG-LS Lossless
    pub const JPEG_LS_LOSSLESS: EncodingId = EncodingId::from_static("1.2.840.10008.1.2.4.80");
    /// JPEG-LS Near-Lossless
    pub const JPEG_LS_NEAR_LOSSLESS: EncodingId =
        EncodingId::from_static("1.2.840.10008.1.2.4.81");
    /// JPEG 2000 Lossless Only
    pub const JPEG2000_LOSSLESS: EncodingId = EncodingId::from_static("1.2.840.10008.1.2.4.90");
    /// JPEG 2000
    pub const JPEG2000: EncodingId = EncodingId::from_static("1.2.840.10008.1.2.4.91");

    /// The encoding every uncompressed transfer syntax normalizes to.
    pub const NATIVE: EncodingId = EncodingId::EXPLICIT_VR_LITTLE_ENDIAN;

    /// Create an identifier from a static UID.
    pub const fn from_static(uid: &'static str) -> Self {
        EncodingId(Cow::Borrowed(uid))
    }

    /// Create an identifier from a UID string.
    ///
    /// Trailing NUL padding and whitespace, as found in DICOM UI values, is
    /// stripped.
    pub fn new(uid: impl Into<String>) -> Self {
        let uid = uid.into();
        let trimmed = uid.trim_end_matches(['\0', ' ']).trim_start();
        if trimmed.len() == uid.len() {
            EncodingId(Cow::Owned(uid))
        } else {
            EncodingId(Cow::Owned(trimmed.to_string()))
        }
    }

    /// The transfer syntax UID.
    pub fn uid(&self) -> &str {
        &self.0
    }

    /// Whether pixel data in this encoding is stored uncompressed.
    pub fn is_native(&self) -> bool {
        matches!(
            self.uid(),
            "1.2.840.10008.1.2"
                | "1.2.840.10008.1.2.1"
                | "1.2.840.10008.1.2.1.99"
                | "1.2.840.10008.1.2.2"
        )
    }

    /// Whether this encoding discards information.
    pub fn is_lossy(&self) -> bool {
        matches!(
            self.uid(),
            "1.2.840.10008.1.2.4.50"
                | "1.2.840.10008.1.2.4.51"
                | "1.2.840.10008.1.2.4.81"
                | "1.2.840.10008.1.2.4.91"
        )
    }

    /// Map any uncompressed transfer syntax onto [`EncodingId::NATIVE`].
    pub fn canonical(&self) -> EncodingId {
        if self.is_native() {
            EncodingId::NATIVE
        } else {
            self.clone()
        }
    }

    /// Human-readable name for well-known transfer syntaxes.
    pub fn name(&self) -> &str {
        match self.uid() {
            "1.2.840.10008.1.2" => "Implicit VR Little Endian",
            "1.2.840.10008.1.2.1" => "Explicit VR Little Endian",
            "1.2.840.10008.1.2.1.99" => "Deflated Explicit VR Little Endian",
            "1.2.840.10008.1.2.2" => "Explicit VR Big Endian",
            "1.2.840.10008.1.2.5" => "RLE Lossless",
            "1.2.840.10008.1.2.4.50" => "JPEG Baseline (Process 1)",
            "1.2.840.10008.1.2.4.51" => "JPEG Extended (Process 2 & 4)",
            "1.2.840.10008.1.2.4.57" => "JPEG Lossless, Non-Hierarchical (Process 14)",
            "1.2.840.10008.1.2.4.70" => "JPEG Lossless, First-Order Prediction",
            "1.2.840.10008.1.2.4.80" => "JPEG-LS Lossless",
            "1.2.840.10008.1.2.4.81" => "JPEG-LS Near-Lossless",
            "1.2.840.10008.1.2.4.90" => "JPEG 2000 Lossless Only",
            "1.2.840.10008.1.2.4.91" => "JPEG 2000",
            other => other,
        }
    }
}

impl fmt::Display for EncodingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name() == self.uid() {
            write!(f, "{}", self.uid())
        } else {
            write!(f, "{} ({})", self.name(), self.uid())
        }
    }
}

impl From<&str> for EncodingId {
    fn from(uid: &str) -> Self {
        EncodingId::new(uid)
    }
}

/// Codec-specific tuning, compared by equality.
///
/// Entries are kept sorted so two parameter sets built in a different order
/// still address the same cache slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct EncodingParameters {
    entries: BTreeMap<String, String>,
}

impl EncodingParameters {
    /// Key of the JPEG quality setting (1-100).
    pub const QUALITY: &'static str = "quality";
    /// Key of the lossless JPEG predictor selection value.
    pub const PREDICTOR: &'static str = "predictor";
    /// Key of the lossless JPEG point transform.
    pub const POINT_TRANSFORM: &'static str = "point_transform";

    /// Empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion.
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.entries.insert(key.into(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Parse an entry as `u8`, `None` if missing or malformed.
    pub fn get_u8(&self, key: &str) -> Option<u8> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for EncodingParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}={}", k, v)?;
        }
        write!(f, "}}")
    }
}
