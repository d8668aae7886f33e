//! Media type detection for attachments.
//!
//! [`detect`] implements the WHATWG MIME sniffing rules as commonly shipped
//! by HTTP libraries, with one extra rule up front: any `<svg` token in the
//! first 512 bytes yields `image/svg+xml`. The plain sniffer would classify
//! SVG documents as text.

/// Number of bytes looked at
pub const SNIFF_LEN: usize = 512;

enum Signature {
    /// Case insensitive HTML tag, followed by a space or `>`
    Html(&'static [u8]),
    Exact(&'static [u8]),
    Masked {
        mask: &'static [u8],
        pattern: &'static [u8],
        skip_ws: bool,
    },
    Mp4,
}

const SIGNATURES: &[(Signature, &str)] = &[
    (Signature::Html(b"<!DOCTYPE HTML"), "text/html; charset=utf-8"),
    (Signature::Html(b"<HTML"), "text/html; charset=utf-8"),
    (Signature::Html(b"<HEAD"), "text/html; charset=utf-8"),
    (Signature::Html(b"<SCRIPT"), "text/html; charset=utf-8"),
    (Signature::Html(b"<IFRAME"), "text/html; charset=utf-8"),
    (Signature::Html(b"<H1"), "text/html; charset=utf-8"),
    (Signature::Html(b"<DIV"), "text/html; charset=utf-8"),
    (Signature::Html(b"<FONT"), "text/html; charset=utf-8"),
    (Signature::Html(b"<TABLE"), "text/html; charset=utf-8"),
    (Signature::Html(b"<A"), "text/html; charset=utf-8"),
    (Signature::Html(b"<STYLE"), "text/html; charset=utf-8"),
    (Signature::Html(b"<TITLE"), "text/html; charset=utf-8"),
    (Signature::Html(b"<B"), "text/html; charset=utf-8"),
    (Signature::Html(b"<BODY"), "text/html; charset=utf-8"),
    (Signature::Html(b"<BR"), "text/html; charset=utf-8"),
    (Signature::Html(b"<P"), "text/html; charset=utf-8"),
    (Signature::Html(b"<!--"), "text/html; charset=utf-8"),
    (
        Signature::Masked {
            mask: b"\xFF\xFF\xFF\xFF\xFF",
            pattern: b"<?xml",
            skip_ws: true,
        },
        "text/xml; charset=utf-8",
    ),
    (Signature::Exact(b"%PDF-"), "application/pdf"),
    (Signature::Exact(b"%!PS-Adobe-"), "application/postscript"),
    // byte order marks
    (
        Signature::Masked {
            mask: b"\xFF\xFF\x00\x00",
            pattern: b"\xFE\xFF\x00\x00",
            skip_ws: false,
        },
        "text/plain; charset=utf-16be",
    ),
    (
        Signature::Masked {
            mask: b"\xFF\xFF\x00\x00",
            pattern: b"\xFF\xFE\x00\x00",
            skip_ws: false,
        },
        "text/plain; charset=utf-16le",
    ),
    (
        Signature::Masked {
            mask: b"\xFF\xFF\xFF\x00",
            pattern: b"\xEF\xBB\xBF\x00",
            skip_ws: false,
        },
        "text/plain; charset=utf-8",
    ),
    // images
    (Signature::Exact(b"\x00\x00\x01\x00"), "image/x-icon"),
    (Signature::Exact(b"\x00\x00\x02\x00"), "image/x-icon"),
    (Signature::Exact(b"BM"), "image/bmp"),
    (Signature::Exact(b"GIF87a"), "image/gif"),
    (Signature::Exact(b"GIF89a"), "image/gif"),
    (
        Signature::Masked {
            mask: b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF\xFF\xFF",
            pattern: b"RIFF\x00\x00\x00\x00WEBPVP",
            skip_ws: false,
        },
        "image/webp",
    ),
    (Signature::Exact(b"\x89PNG\x0D\x0A\x1A\x0A"), "image/png"),
    (Signature::Exact(b"\xFF\xD8\xFF"), "image/jpeg"),
    // audio and video
    (
        Signature::Masked {
            mask: b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF",
            pattern: b"FORM\x00\x00\x00\x00AIFF",
            skip_ws: false,
        },
        "audio/aiff",
    ),
    (Signature::Exact(b"ID3"), "audio/mpeg"),
    (Signature::Exact(b"OggS\x00"), "application/ogg"),
    (Signature::Exact(b"MThd\x00\x00\x00\x06"), "audio/midi"),
    (
        Signature::Masked {
            mask: b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF",
            pattern: b"RIFF\x00\x00\x00\x00AVI ",
            skip_ws: false,
        },
        "video/avi",
    ),
    (
        Signature::Masked {
            mask: b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF",
            pattern: b"RIFF\x00\x00\x00\x00WAVE",
            skip_ws: false,
        },
        "audio/wave",
    ),
    (Signature::Mp4, "video/mp4"),
    (Signature::Exact(b"\x1A\x45\xDF\xA3"), "video/webm"),
    // fonts
    (Signature::Exact(b"\x00\x01\x00\x00"), "font/ttf"),
    (Signature::Exact(b"OTTO"), "font/otf"),
    (Signature::Exact(b"ttcf"), "font/collection"),
    (Signature::Exact(b"wOFF"), "font/woff"),
    (Signature::Exact(b"wOF2"), "font/woff2"),
    // archives
    (Signature::Exact(b"\x1F\x8B\x08"), "application/x-gzip"),
    (Signature::Exact(b"PK\x03\x04"), "application/zip"),
    (
        Signature::Exact(b"Rar!\x1A\x07\x00"),
        "application/x-rar-compressed",
    ),
    (
        Signature::Exact(b"Rar!\x1A\x07\x01\x00"),
        "application/x-rar-compressed",
    ),
    (Signature::Exact(b"\x00\x61\x73\x6D"), "application/wasm"),
];

fn is_ws(b: u8) -> bool {
    matches!(b, b'\t' | b'\n' | b'\x0c' | b'\r' | b' ')
}

fn is_tag_terminating(b: u8) -> bool {
    b == b' ' || b == b'>'
}

fn is_binary(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}

impl Signature {
    fn matches(&self, data: &[u8], first_non_ws: usize) -> bool {
        match self {
            Signature::Html(tag) => {
                let data = &data[first_non_ws..];
                if data.len() < tag.len() + 1 {
                    return false;
                }
                let same = tag.iter().zip(data).all(|(&t, &d)| {
                    let d = if t.is_ascii_uppercase() { d & 0xDF } else { d };
                    t == d
                });
                same && is_tag_terminating(data[tag.len()])
            }
            Signature::Exact(pattern) => data.starts_with(pattern),
            Signature::Masked {
                mask,
                pattern,
                skip_ws,
            } => {
                let data = if *skip_ws {
                    &data[first_non_ws..]
                } else {
                    data
                };
                data.len() >= mask.len()
                    && mask
                        .iter()
                        .zip(pattern.iter())
                        .zip(data)
                        .all(|((m, p), d)| d & m == *p)
            }
            Signature::Mp4 => is_mp4(data),
        }
    }
}

fn is_mp4(data: &[u8]) -> bool {
    if data.len() < 12 {
        return false;
    }
    let box_size = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if data.len() < box_size || box_size % 4 != 0 || &data[4..8] != b"ftyp" {
        return false;
    }
    (8..box_size)
        .step_by(4)
        // bytes 12..16 hold the minor version
        .filter(|&start| start != 12)
        .any(|start| data.get(start..start + 3) == Some(&b"mp4"[..]))
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

/// Returns the media type of the given content.
///
/// The first [`SNIFF_LEN`] bytes are copied into a zeroed buffer of that
/// size, so short inputs are sniffed with trailing zero bytes. An empty input
/// is `application/octet-stream`.
pub fn detect(bytes: &[u8]) -> String {
    let mut header = [0u8; SNIFF_LEN];
    let len = bytes.len().min(SNIFF_LEN);
    header[..len].copy_from_slice(&bytes[..len]);

    if contains(&header, b"<svg") {
        return mime::IMAGE_SVG.to_string();
    }

    sniff(&header)
}

fn sniff(data: &[u8]) -> String {
    let first_non_ws = data.iter().position(|&b| !is_ws(b)).unwrap_or(data.len());

    for (signature, media_type) in SIGNATURES {
        if signature.matches(data, first_non_ws) {
            return (*media_type).to_owned();
        }
    }

    if data[first_non_ws..].iter().any(|&b| is_binary(b)) {
        mime::APPLICATION_OCTET_STREAM.to_string()
    } else {
        mime::TEXT_PLAIN_UTF_8.to_string()
    }
}
