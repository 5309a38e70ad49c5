//! Strict decoders keyed by encoding label.
//!
//! `encoding_rs` follows the WHATWG label table, where `us-ascii` and
//! `iso-8859-1` both mean windows-1252 and no UTF-32 exists. Feeds need the
//! stricter classic meanings, so those are implemented here and everything
//! else is delegated.

use encoding_rs::{CoderResult, DecoderResult, Encoding};

/// Bytes that windows-1252 leaves undefined.
const CP1252_UNDEFINED: [u8; 5] = [0x81, 0x8d, 0x8f, 0x90, 0x9d];

/// IBM code page 037 (EBCDIC, US/Canada), indexed by byte.
const CP037: [char; 256] = [
    '\u{00}', '\u{01}', '\u{02}', '\u{03}', '\u{9c}', '\u{09}', '\u{86}', '\u{7f}',
    '\u{97}', '\u{8d}', '\u{8e}', '\u{0b}', '\u{0c}', '\u{0d}', '\u{0e}', '\u{0f}',
    '\u{10}', '\u{11}', '\u{12}', '\u{13}', '\u{9d}', '\u{85}', '\u{08}', '\u{87}',
    '\u{18}', '\u{19}', '\u{92}', '\u{8f}', '\u{1c}', '\u{1d}', '\u{1e}', '\u{1f}',
    '\u{80}', '\u{81}', '\u{82}', '\u{83}', '\u{84}', '\u{0a}', '\u{17}', '\u{1b}',
    '\u{88}', '\u{89}', '\u{8a}', '\u{8b}', '\u{8c}', '\u{05}', '\u{06}', '\u{07}',
    '\u{90}', '\u{91}', '\u{16}', '\u{93}', '\u{94}', '\u{95}', '\u{96}', '\u{04}',
    '\u{98}', '\u{99}', '\u{9a}', '\u{9b}', '\u{14}', '\u{15}', '\u{9e}', '\u{1a}',
    '\u{20}', '\u{a0}', '\u{e2}', '\u{e4}', '\u{e0}', '\u{e1}', '\u{e3}', '\u{e5}',
    '\u{e7}', '\u{f1}', '\u{a2}', '\u{2e}', '\u{3c}', '\u{28}', '\u{2b}', '\u{7c}',
    '\u{26}', '\u{e9}', '\u{ea}', '\u{eb}', '\u{e8}', '\u{ed}', '\u{ee}', '\u{ef}',
    '\u{ec}', '\u{df}', '\u{21}', '\u{24}', '\u{2a}', '\u{29}', '\u{3b}', '\u{ac}',
    '\u{2d}', '\u{2f}', '\u{c2}', '\u{c4}', '\u{c0}', '\u{c1}', '\u{c3}', '\u{c5}',
    '\u{c7}', '\u{d1}', '\u{a6}', '\u{2c}', '\u{25}', '\u{5f}', '\u{3e}', '\u{3f}',
    '\u{f8}', '\u{c9}', '\u{ca}', '\u{cb}', '\u{c8}', '\u{cd}', '\u{ce}', '\u{cf}',
    '\u{cc}', '\u{60}', '\u{3a}', '\u{23}', '\u{40}', '\u{27}', '\u{3d}', '\u{22}',
    '\u{d8}', '\u{61}', '\u{62}', '\u{63}', '\u{64}', '\u{65}', '\u{66}', '\u{67}',
    '\u{68}', '\u{69}', '\u{ab}', '\u{bb}', '\u{f0}', '\u{fd}', '\u{fe}', '\u{b1}',
    '\u{b0}', '\u{6a}', '\u{6b}', '\u{6c}', '\u{6d}', '\u{6e}', '\u{6f}', '\u{70}',
    '\u{71}', '\u{72}', '\u{aa}', '\u{ba}', '\u{e6}', '\u{b8}', '\u{c6}', '\u{a4}',
    '\u{b5}', '\u{7e}', '\u{73}', '\u{74}', '\u{75}', '\u{76}', '\u{77}', '\u{78}',
    '\u{79}', '\u{7a}', '\u{a1}', '\u{bf}', '\u{d0}', '\u{dd}', '\u{de}', '\u{ae}',
    '\u{5e}', '\u{a3}', '\u{a5}', '\u{b7}', '\u{a9}', '\u{a7}', '\u{b6}', '\u{bc}',
    '\u{bd}', '\u{be}', '\u{5b}', '\u{5d}', '\u{af}', '\u{a8}', '\u{b4}', '\u{d7}',
    '\u{7b}', '\u{41}', '\u{42}', '\u{43}', '\u{44}', '\u{45}', '\u{46}', '\u{47}',
    '\u{48}', '\u{49}', '\u{ad}', '\u{f4}', '\u{f6}', '\u{f2}', '\u{f3}', '\u{f5}',
    '\u{7d}', '\u{4a}', '\u{4b}', '\u{4c}', '\u{4d}', '\u{4e}', '\u{4f}', '\u{50}',
    '\u{51}', '\u{52}', '\u{b9}', '\u{fb}', '\u{fc}', '\u{f9}', '\u{fa}', '\u{ff}',
    '\u{5c}', '\u{f7}', '\u{53}', '\u{54}', '\u{55}', '\u{56}', '\u{57}', '\u{58}',
    '\u{59}', '\u{5a}', '\u{b2}', '\u{d4}', '\u{d6}', '\u{d2}', '\u{d3}', '\u{d5}',
    '\u{30}', '\u{31}', '\u{32}', '\u{33}', '\u{34}', '\u{35}', '\u{36}', '\u{37}',
    '\u{38}', '\u{39}', '\u{b3}', '\u{db}', '\u{dc}', '\u{d9}', '\u{da}', '\u{9f}',
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Ascii,
    Latin1,
    Windows1252,
    Cp037,
    Utf32 { big_endian: bool },
    Whatwg(&'static Encoding),
}

/// Looks up a decoder for an encoding label. Unknown labels yield `None`.
pub fn codec_for(label: &str) -> Option<Codec> {
    let label = label.trim().to_ascii_lowercase().replace('_', "-");
    let codec = match label.as_str() {
        "" => return None,
        "ascii" | "us-ascii" | "646" | "ansi-x3.4-1968" | "iso646-us" | "us" => Codec::Ascii,
        "iso-8859-1" | "iso8859-1" | "latin-1" | "latin1" | "l1" | "8859" | "cp819" | "iso-ir-100" => Codec::Latin1,
        "windows-1252" | "cp1252" | "x-cp1252" => Codec::Windows1252,
        "cp037" | "037" | "ibm037" | "ibm039" | "csibm037" | "ebcdic-cp-us" | "ebcdic-cp-ca" | "ebcdic-cp-wt"
        | "ebcdic-cp-nl" => Codec::Cp037,
        "utf-32" | "utf32" | "u32" | "utf-32le" | "iso-10646-ucs-4" | "ucs-4" | "csucs4" => {
            Codec::Utf32 { big_endian: false }
        }
        "utf-32be" => Codec::Utf32 { big_endian: true },
        "u16" | "utf16" | "iso-10646-ucs-2" | "ucs-2" | "csunicode" => Codec::Whatwg(encoding_rs::UTF_16LE),
        "u8" | "utf8" => Codec::Whatwg(encoding_rs::UTF_8),
        "gb2312" => Codec::Whatwg(encoding_rs::GB18030),
        other => {
            let encoding = Encoding::for_label_no_replacement(other.as_bytes())?;
            Codec::Whatwg(encoding)
        }
    };
    Some(codec)
}

impl Codec {
    /// Decodes the whole of `bytes`, failing on the first malformed sequence.
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        let mut decoder = self.decoder();
        let mut out = String::new();
        decoder.decode(bytes, true, &mut out).ok()?;
        Some(out)
    }

    /// Decodes `bytes`, replacing malformed sequences with U+FFFD.
    pub fn decode_lossy(self, bytes: &[u8]) -> String {
        let mut decoder = self.decoder();
        let mut out = String::new();
        decoder.decode_lossy(bytes, true, &mut out);
        out
    }

    pub fn decoder(self) -> StreamDecoder {
        match self {
            Codec::Whatwg(encoding) => StreamDecoder::Whatwg(encoding.new_decoder_without_bom_handling()),
            Codec::Utf32 { big_endian } => StreamDecoder::Utf32 {
                big_endian,
                pending: Vec::new(),
            },
            single => StreamDecoder::SingleByte(single),
        }
    }
}

/// The input was not valid in the decoder's encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Malformed;

/// Incremental decoder that carries partial sequences across chunks.
pub enum StreamDecoder {
    SingleByte(Codec),
    Utf32 { big_endian: bool, pending: Vec<u8> },
    Whatwg(encoding_rs::Decoder),
}

impl StreamDecoder {
    /// Appends the decoded form of `chunk` to `out`.
    pub fn decode(&mut self, chunk: &[u8], last: bool, out: &mut String) -> Result<(), Malformed> {
        match self {
            StreamDecoder::SingleByte(codec) => {
                out.reserve(chunk.len());
                for &b in chunk {
                    out.push(single_byte_char(*codec, b).ok_or(Malformed)?);
                }
                Ok(())
            }
            StreamDecoder::Utf32 { big_endian, pending } => {
                pending.extend_from_slice(chunk);
                let whole = pending.len() - pending.len() % 4;
                for unit in pending[..whole].chunks_exact(4) {
                    let bytes = [unit[0], unit[1], unit[2], unit[3]];
                    let cp = if *big_endian { u32::from_be_bytes(bytes) } else { u32::from_le_bytes(bytes) };
                    out.push(char::from_u32(cp).ok_or(Malformed)?);
                }
                pending.drain(..whole);
                if last && !pending.is_empty() {
                    return Err(Malformed);
                }
                Ok(())
            }
            StreamDecoder::Whatwg(decoder) => {
                let mut input = chunk;
                loop {
                    let needed = decoder
                        .max_utf8_buffer_length_without_replacement(input.len())
                        .unwrap_or(input.len() * 4 + 16);
                    out.reserve(needed);
                    let (result, read) = decoder.decode_to_string_without_replacement(input, out, last);
                    input = &input[read..];
                    match result {
                        DecoderResult::InputEmpty => return Ok(()),
                        DecoderResult::OutputFull => continue,
                        DecoderResult::Malformed(_, _) => return Err(Malformed),
                    }
                }
            }
        }
    }

    /// Like [`decode`](Self::decode), substituting U+FFFD for bad input.
    pub fn decode_lossy(&mut self, chunk: &[u8], last: bool, out: &mut String) {
        match self {
            StreamDecoder::SingleByte(codec) => {
                out.extend(chunk.iter().map(|b| single_byte_char(*codec, *b).unwrap_or('\u{fffd}')));
            }
            StreamDecoder::Utf32 { big_endian, pending } => {
                pending.extend_from_slice(chunk);
                let whole = pending.len() - pending.len() % 4;
                for unit in pending[..whole].chunks_exact(4) {
                    let bytes = [unit[0], unit[1], unit[2], unit[3]];
                    let cp = if *big_endian { u32::from_be_bytes(bytes) } else { u32::from_le_bytes(bytes) };
                    out.push(char::from_u32(cp).unwrap_or('\u{fffd}'));
                }
                pending.drain(..whole);
                if last && !pending.is_empty() {
                    pending.clear();
                    out.push('\u{fffd}');
                }
            }
            StreamDecoder::Whatwg(decoder) => {
                let mut input = chunk;
                loop {
                    let needed = decoder.max_utf8_buffer_length(input.len()).unwrap_or(input.len() * 4 + 16);
                    out.reserve(needed);
                    let (result, read, _) = decoder.decode_to_string(input, out, last);
                    input = &input[read..];
                    if result == CoderResult::InputEmpty {
                        return;
                    }
                }
            }
        }
    }
}

fn single_byte_char(codec: Codec, b: u8) -> Option<char> {
    match codec {
        Codec::Ascii => b.is_ascii().then_some(b as char),
        Codec::Latin1 => Some(b as char),
        Codec::Cp037 => Some(CP037[b as usize]),
        Codec::Windows1252 => {
            if CP1252_UNDEFINED.contains(&b) {
                None
            } else if (0x80..0xa0).contains(&b) {
                Some(crate::html::CP1252[(b - 0x80) as usize])
            } else {
                Some(b as char)
            }
        }
        _ => None,
    }
}
