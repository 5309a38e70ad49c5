//! Prefix-based encoding resolution for seekable byte streams.
//!
//! Only the first [`PREFIX_LEN`] bytes (or slightly more) are read to decide
//! the encoding. The remainder is decoded on demand by [`Utf8Reader`], after
//! one verification pass proves it decodes under the chosen encoding.

use std::io::{self, Cursor, Read, Seek, SeekFrom};

use super::codec::{codec_for, Codec, StreamDecoder};
use super::{convert_to_utf8, rewrite_declaration, Conversion, JSON_FEED_CONTENT_TYPE};
use crate::error::BozoError;
use crate::Headers;

/// Bytes examined before deciding the encoding of a binary stream.
pub const PREFIX_LEN: usize = 1 << 16;
/// Characters of a text source examined for content-type classification.
pub const TEXT_PREFIX_LEN: usize = 1 << 13;
/// Bytes scanned past the prefix looking for an ASCII byte.
const ASCII_SEARCH_LEN: usize = 1 << 8;
/// Extra bytes granted to the prefix, one per attempt.
const PREFIX_ATTEMPTS: usize = 4;
const READ_CHUNK: usize = 1 << 16;

/// A document whose encoding has been resolved.
///
/// Holds the converted UTF-8 prefix plus the underlying source positioned
/// at the first byte not covered by the prefix.
#[derive(Debug)]
pub struct Utf8Document<R> {
    prefix: Vec<u8>,
    source: R,
    rest_start: u64,
    codec: Option<Codec>,
    /// Encoding that decoded the document; empty when none did.
    pub encoding: String,
    pub content_type: String,
    pub error: Option<BozoError>,
}

impl Utf8Document<Cursor<Vec<u8>>> {
    /// Wraps the result of a whole-buffer conversion.
    pub fn from_conversion(conversion: Conversion) -> Self {
        Self {
            prefix: conversion.data,
            source: Cursor::new(Vec::new()),
            rest_start: 0,
            codec: None,
            encoding: conversion.encoding,
            content_type: conversion.content_type,
            error: conversion.error,
        }
    }
}

impl<R: Read + Seek> Utf8Document<R> {
    pub fn is_known(&self) -> bool {
        !self.encoding.is_empty()
    }

    pub fn is_json(&self) -> bool {
        self.content_type == JSON_FEED_CONTENT_TYPE
    }

    /// The converted leading part of the document.
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    pub fn set_prefix(&mut self, prefix: Vec<u8>) {
        self.prefix = prefix;
    }

    /// Reads the whole document as UTF-8. Bytes that do not decode are an
    /// [`io::ErrorKind::InvalidData`] error.
    pub fn reader(&mut self) -> io::Result<Utf8Reader<'_, R>> {
        self.open(false)
    }

    /// Reads the whole document as UTF-8, replacing bytes that do not decode.
    pub fn reader_lossy(&mut self) -> io::Result<Utf8Reader<'_, R>> {
        self.open(true)
    }

    pub fn read_to_string_lossy(&mut self) -> io::Result<String> {
        let mut bytes = Vec::new();
        self.reader_lossy()?.read_to_end(&mut bytes)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// The document bytes: UTF-8 when the encoding is known, as found
    /// otherwise.
    pub fn read_to_vec(&mut self) -> io::Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.reader()?.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    fn open(&mut self, lossy: bool) -> io::Result<Utf8Reader<'_, R>> {
        self.source.seek(SeekFrom::Start(self.rest_start))?;
        Ok(Utf8Reader {
            prefix: &self.prefix,
            prefix_pos: 0,
            source: &mut self.source,
            decoder: self.codec.map(Codec::decoder),
            lossy,
            pending: Vec::new(),
            pending_pos: 0,
            finished: false,
        })
    }
}

/// Streams a [`Utf8Document`] as UTF-8 bytes.
pub struct Utf8Reader<'a, R> {
    prefix: &'a [u8],
    prefix_pos: usize,
    source: &'a mut R,
    /// `None` passes the source through untouched.
    decoder: Option<StreamDecoder>,
    lossy: bool,
    pending: Vec<u8>,
    pending_pos: usize,
    finished: bool,
}

impl<R: Read> Utf8Reader<'_, R> {
    fn refill(&mut self) -> io::Result<()> {
        let mut chunk = vec![0u8; READ_CHUNK];
        let read = self.source.read(&mut chunk)?;
        chunk.truncate(read);
        let last = read == 0;

        self.pending_pos = 0;
        match &mut self.decoder {
            None => self.pending = chunk,
            Some(decoder) => {
                let mut text = String::new();
                if self.lossy {
                    decoder.decode_lossy(&chunk, last, &mut text);
                } else if decoder.decode(&chunk, last, &mut text).is_err() {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "document does not decode under its detected encoding",
                    ));
                }
                self.pending = text.into_bytes();
            }
        }
        self.finished = last;
        Ok(())
    }
}

impl<R: Read> Read for Utf8Reader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.prefix_pos < self.prefix.len() {
            let n = buf.len().min(self.prefix.len() - self.prefix_pos);
            buf[..n].copy_from_slice(&self.prefix[self.prefix_pos..self.prefix_pos + n]);
            self.prefix_pos += n;
            return Ok(n);
        }
        while self.pending_pos >= self.pending.len() {
            if self.finished {
                return Ok(0);
            }
            self.refill()?;
        }
        let n = buf.len().min(self.pending.len() - self.pending_pos);
        buf[..n].copy_from_slice(&self.pending[self.pending_pos..self.pending_pos + n]);
        self.pending_pos += n;
        Ok(n)
    }
}

fn read_up_to<R: Read>(source: &mut R, len: usize) -> io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(len);
    source.by_ref().take(len as u64).read_to_end(&mut buf)?;
    Ok(buf)
}

/// Reads until just after the next ASCII byte, giving up (and rewinding)
/// after `max_len` bytes.
fn read_to_after_ascii_byte<R: Read + Seek>(source: &mut R, max_len: usize) -> io::Result<Vec<u8>> {
    let offset = source.stream_position()?;
    let mut buf = Vec::new();
    for _ in 0..max_len {
        let byte = read_up_to(source, 1)?;
        let Some(&b) = byte.first() else { return Ok(buf) };
        buf.push(b);
        if b.is_ascii() {
            return Ok(buf);
        }
    }
    source.seek(SeekFrom::Start(offset))?;
    Ok(Vec::new())
}

/// Ranks a failed prefix conversion; the highest rank is kept.
///
/// `NonXmlContentType` survives only when decoding under the declared
/// encoding succeeded, so it outranks an override, which outranks an
/// unknown encoding. Among equals, UTF encodings are preferred, and the
/// latest attempt wins a full tie.
fn candidate_rank(conversion: &Conversion) -> (u8, bool) {
    let score = match conversion.error {
        Some(BozoError::NonXmlContentType(_)) => 20,
        Some(BozoError::CharacterEncodingOverride(_)) => 10,
        _ => 0,
    };
    (score, conversion.encoding.starts_with("utf-"))
}

/// Resolves the encoding of a seekable stream from its prefix.
///
/// The prefix is cut after [`PREFIX_LEN`]` - 1` bytes, extended to just
/// past the next ASCII byte, then grown one byte at a time for up to four
/// conversions so that a multi-byte sequence split at the boundary gets a
/// chance to complete. The first conversion with no error is used;
/// otherwise the best-ranked one (see [`candidate_rank`]). If the stream
/// ends during the attempts, the last attempt is used as is.
///
/// Once chosen, the rest of the stream is decoded once to verify it; on
/// failure the whole stream is re-read and resolved by
/// [`convert_to_utf8`].
pub fn convert_stream_to_utf8<R: Read + Seek>(
    headers: &Headers,
    mut source: R,
    detect: bool,
) -> io::Result<Utf8Document<R>> {
    let start = source.stream_position()?;
    let mut prefix = read_up_to(&mut source, PREFIX_LEN - 1)?;
    prefix.extend(read_to_after_ascii_byte(&mut source, ASCII_SEARCH_LEN)?);

    let mut candidates: Vec<(u64, Conversion)> = Vec::new();
    let mut chosen = None;
    let mut hit_eof = false;
    for attempt in 0..PREFIX_ATTEMPTS {
        let byte = read_up_to(&mut source, 1)?;
        if byte.is_empty() && attempt != 0 {
            hit_eof = true;
            break;
        }
        prefix.extend(byte);
        let conversion = convert_to_utf8(headers, &prefix, detect);
        let offset = source.stream_position()?;
        if conversion.error.is_none() {
            chosen = Some((offset, conversion));
            break;
        }
        candidates.push((offset, conversion));
    }

    let chosen = chosen.or_else(|| {
        if hit_eof {
            candidates.pop()
        } else {
            candidates.into_iter().max_by_key(|(_, c)| candidate_rank(c))
        }
    });
    let Some((rest_start, conversion)) = chosen else {
        return whole_stream(headers, source, start, detect);
    };
    tracing::debug!(
        encoding = %conversion.encoding,
        prefix_len = rest_start - start,
        "resolved encoding from stream prefix"
    );

    let codec = codec_for(&conversion.encoding);
    let mut document = Utf8Document {
        prefix: conversion.data,
        source,
        rest_start,
        codec,
        encoding: conversion.encoding,
        content_type: conversion.content_type,
        error: conversion.error,
    };
    if !document.is_known() {
        return Ok(document);
    }

    let verified = io::copy(&mut document.reader()?, &mut io::sink());
    match verified {
        Ok(_) => Ok(document),
        Err(err) if err.kind() == io::ErrorKind::InvalidData => {
            tracing::debug!(
                encoding = %document.encoding,
                "stream does not decode past the prefix, resolving the whole document"
            );
            whole_stream(headers, document.source, start, detect)
        }
        Err(err) => Err(err),
    }
}

fn whole_stream<R: Read + Seek>(
    headers: &Headers,
    mut source: R,
    start: u64,
    detect: bool,
) -> io::Result<Utf8Document<R>> {
    source.seek(SeekFrom::Start(start))?;
    let mut data = Vec::new();
    source.read_to_end(&mut data)?;
    let end = source.stream_position()?;
    let conversion = convert_to_utf8(headers, &data, detect);
    Ok(Utf8Document {
        prefix: conversion.data,
        source,
        rest_start: end,
        codec: None,
        encoding: conversion.encoding,
        content_type: conversion.content_type,
        error: conversion.error,
    })
}

/// Prepares already-decoded text. Only its first [`TEXT_PREFIX_LEN`]
/// characters are classified (for content type and header diagnostics);
/// the encoding is always reported as `utf-8`.
pub fn convert_text(headers: &Headers, text: &str, detect: bool) -> Utf8Document<Cursor<Vec<u8>>> {
    let cut = text
        .char_indices()
        .nth(TEXT_PREFIX_LEN)
        .map_or(text.len(), |(i, _)| i);
    let classified = convert_to_utf8(headers, text[..cut].as_bytes(), detect);

    let data = if classified.is_json() {
        text.as_bytes().to_vec()
    } else {
        rewrite_declaration(text.strip_prefix('\u{feff}').unwrap_or(text)).into_bytes()
    };
    Utf8Document::from_conversion(Conversion {
        data,
        encoding: "utf-8".to_owned(),
        content_type: classified.content_type,
        error: classified.error,
    })
}
