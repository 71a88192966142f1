//! HTTP body compression
//!
//! Codecs are looked up by their `Content-Encoding` name. Compression is best
//! effort: unknown methods and codec failures hand the input back unchanged.
//! Every codec checks its magic bytes before decompressing, so a payload the
//! transport already inflated passes straight through.

use std::borrow::Cow;
use std::io::{self, Read, Write};
use std::sync::LazyLock;

use flate2::Compression;
use flate2::read::{MultiGzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};

static REGISTRY: LazyLock<CodecRegistry> = LazyLock::new(CodecRegistry::with_available);

/// A single compression algorithm
pub trait Codec: Send + Sync {
    /// `Content-Encoding` token
    fn name(&self) -> &'static str;

    /// Whether `data` starts with this codec's magic bytes
    fn is_compressed(&self, data: &[u8]) -> bool;

    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>>;

    fn decompress(&self, data: &[u8]) -> io::Result<Vec<u8>>;
}

struct Gzip;

impl Codec for Gzip {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn is_compressed(&self, data: &[u8]) -> bool {
        data.starts_with(&[0x1f, 0x8b])
    }

    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data)?;
        encoder.finish()
    }

    fn decompress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        MultiGzDecoder::new(data).read_to_end(&mut out)?;
        Ok(out)
    }
}

/// HTTP `deflate` is the zlib container
struct Deflate;

impl Codec for Deflate {
    fn name(&self) -> &'static str {
        "deflate"
    }

    fn is_compressed(&self, data: &[u8]) -> bool {
        match data {
            [cmf, flg, ..] => cmf & 0x0f == 8 && (u16::from(*cmf) << 8 | u16::from(*flg)) % 31 == 0,
            _ => false,
        }
    }

    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data)?;
        encoder.finish()
    }

    fn decompress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        ZlibDecoder::new(data).read_to_end(&mut out)?;
        Ok(out)
    }
}

#[cfg(feature = "zstd")]
struct Zstd;

#[cfg(feature = "zstd")]
impl Codec for Zstd {
    fn name(&self) -> &'static str {
        "zstd"
    }

    fn is_compressed(&self, data: &[u8]) -> bool {
        data.starts_with(&[0x28, 0xb5, 0x2f, 0xfd])
    }

    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        zstd::stream::encode_all(data, 0)
    }

    fn decompress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        zstd::stream::decode_all(data)
    }
}

/// LZ4 frame format
#[cfg(feature = "lz4")]
struct Lz4;

#[cfg(feature = "lz4")]
impl Codec for Lz4 {
    fn name(&self) -> &'static str {
        "lz4"
    }

    fn is_compressed(&self, data: &[u8]) -> bool {
        data.starts_with(&[0x04, 0x22, 0x4d, 0x18])
    }

    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        let mut encoder = lz4_flex::frame::FrameEncoder::new(Vec::new());
        encoder.write_all(data)?;
        encoder.finish().map_err(io::Error::other)
    }

    fn decompress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        lz4_flex::frame::FrameDecoder::new(data).read_to_end(&mut out)?;
        Ok(out)
    }
}

/// Set of codecs available in this build
pub struct CodecRegistry {
    codecs: Vec<Box<dyn Codec>>,
}

impl CodecRegistry {
    /// Built-in codecs plus whichever optional ones were compiled in
    pub fn with_available() -> Self {
        let mut codecs: Vec<Box<dyn Codec>> = vec![Box::new(Gzip), Box::new(Deflate)];
        #[cfg(feature = "zstd")]
        codecs.push(Box::new(Zstd));
        #[cfg(feature = "lz4")]
        codecs.push(Box::new(Lz4));

        tracing::debug!(
            methods = ?codecs.iter().map(|c| c.name()).collect::<Vec<_>>(),
            "Compression codecs registered"
        );
        Self { codecs }
    }

    fn find(&self, method: &str) -> Option<&dyn Codec> {
        let method = method.trim();
        self.codecs
            .iter()
            .find(|c| c.name().eq_ignore_ascii_case(method))
            .map(|c| c.as_ref())
    }

    pub fn is_supported(&self, method: &str) -> bool {
        self.find(method).is_some()
    }

    pub fn methods(&self) -> Vec<&'static str> {
        self.codecs.iter().map(|c| c.name()).collect()
    }

    /// Compress with `method`; unknown methods and failures return the input
    pub fn compress<'a>(&self, data: &'a [u8], method: &str) -> Cow<'a, [u8]> {
        let Some(codec) = self.find(method) else {
            return Cow::Borrowed(data);
        };
        match codec.compress(data) {
            Ok(out) => Cow::Owned(out),
            Err(e) => {
                tracing::warn!(method = codec.name(), error = %e, "Compression failed, sending plain body");
                Cow::Borrowed(data)
            }
        }
    }

    /// Decompress with `method` when the payload carries the codec's magic bytes
    pub fn decompress<'a>(&self, data: &'a [u8], method: &str) -> Cow<'a, [u8]> {
        let Some(codec) = self.find(method) else {
            return Cow::Borrowed(data);
        };
        if !codec.is_compressed(data) {
            return Cow::Borrowed(data);
        }
        match codec.decompress(data) {
            Ok(out) => Cow::Owned(out),
            Err(e) => {
                tracing::warn!(method = codec.name(), error = %e, "Decompression failed, using body as-is");
                Cow::Borrowed(data)
            }
        }
    }
}

/// Process-wide registry
pub fn registry() -> &'static CodecRegistry {
    &REGISTRY
}

pub fn compress<'a>(data: &'a [u8], method: &str) -> Cow<'a, [u8]> {
    registry().compress(data, method)
}

pub fn decompress<'a>(data: &'a [u8], method: &str) -> Cow<'a, [u8]> {
    registry().decompress(data, method)
}

pub fn is_supported(method: &str) -> bool {
    registry().is_supported(method)
}

/// `Accept-Encoding` value advertising every available codec
pub fn accept_encoding() -> String {
    registry().methods().join(", ")
}
