//! Content sniffing: infers a MIME type from at most 512 leading bytes, following
//! the WHATWG MIME Sniffing Standard (the algorithm Go's `net/http` ships as
//! `DetectContentType`).
//!
//! Always returns a valid MIME type; `application/octet-stream` when nothing
//! more specific matches.

use mime::Mime;

/// Bytes considered by [`detect_content_type`]
pub const SNIFF_LEN: usize = 512;

static OCTET_STREAM: Mime = mime::APPLICATION_OCTET_STREAM;
static TEXT_HTML: Mime = mime::TEXT_HTML_UTF_8;
static TEXT_PLAIN: Mime = mime::TEXT_PLAIN_UTF_8;
static APPLICATION_PDF: Mime = mime::APPLICATION_PDF;
static IMAGE_BMP: Mime = mime::IMAGE_BMP;
static IMAGE_GIF: Mime = mime::IMAGE_GIF;
static IMAGE_PNG: Mime = mime::IMAGE_PNG;
static IMAGE_JPEG: Mime = mime::IMAGE_JPEG;
static FONT_WOFF: Mime = mime::FONT_WOFF;
static FONT_WOFF2: Mime = mime::FONT_WOFF2;

/// A sniffed type: a `mime` constant, or a literal for types `mime` has no constant for.
#[derive(Clone, Copy)]
enum Ct {
    Known(&'static Mime),
    Literal(&'static str),
}

impl Ct {
    fn as_str(self) -> &'static str {
        match self {
            Ct::Known(known) => known.as_ref(),
            Ct::Literal(literal) => literal,
        }
    }
}

enum Sig {
    /// case-insensitive tag, followed by a space or `>`
    Html(&'static [u8]),
    Masked { mask: &'static [u8], pat: &'static [u8], skip_ws: bool, ct: Ct },
    Exact(&'static [u8], Ct),
    Mp4,
    Text,
}

const fn masked(mask: &'static [u8], pat: &'static [u8], ct: Ct) -> Sig {
    Sig::Masked { mask, pat, skip_ws: false, ct }
}

static SIGNATURES: &[Sig] = &[
    Sig::Html(b"<!DOCTYPE HTML"),
    Sig::Html(b"<HTML"),
    Sig::Html(b"<HEAD"),
    Sig::Html(b"<SCRIPT"),
    Sig::Html(b"<IFRAME"),
    Sig::Html(b"<H1"),
    Sig::Html(b"<DIV"),
    Sig::Html(b"<FONT"),
    Sig::Html(b"<TABLE"),
    Sig::Html(b"<A"),
    Sig::Html(b"<STYLE"),
    Sig::Html(b"<TITLE"),
    Sig::Html(b"<B"),
    Sig::Html(b"<BODY"),
    Sig::Html(b"<BR"),
    Sig::Html(b"<P"),
    Sig::Html(b"<!--"),
    Sig::Masked { mask: b"\xFF\xFF\xFF\xFF\xFF", pat: b"<?xml", skip_ws: true, ct: Ct::Literal("text/xml; charset=utf-8") },
    Sig::Exact(b"%PDF-", Ct::Known(&APPLICATION_PDF)),
    Sig::Exact(b"%!PS-Adobe-", Ct::Literal("application/postscript")),
    // byte order marks
    masked(b"\xFF\xFF\x00\x00", b"\xFE\xFF\x00\x00", Ct::Literal("text/plain; charset=utf-16be")),
    masked(b"\xFF\xFF\x00\x00", b"\xFF\xFE\x00\x00", Ct::Literal("text/plain; charset=utf-16le")),
    masked(b"\xFF\xFF\xFF\x00", b"\xEF\xBB\xBF\x00", Ct::Known(&TEXT_PLAIN)),
    // images
    Sig::Exact(b"\x00\x00\x01\x00", Ct::Literal("image/x-icon")),
    Sig::Exact(b"\x00\x00\x02\x00", Ct::Literal("image/x-icon")),
    Sig::Exact(b"BM", Ct::Known(&IMAGE_BMP)),
    Sig::Exact(b"GIF87a", Ct::Known(&IMAGE_GIF)),
    Sig::Exact(b"GIF89a", Ct::Known(&IMAGE_GIF)),
    masked(b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF\xFF\xFF", b"RIFF\x00\x00\x00\x00WEBPVP", Ct::Literal("image/webp")),
    Sig::Exact(b"\x89PNG\x0D\x0A\x1A\x0A", Ct::Known(&IMAGE_PNG)),
    Sig::Exact(b"\xFF\xD8\xFF", Ct::Known(&IMAGE_JPEG)),
    // audio and video
    masked(b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF", b"FORM\x00\x00\x00\x00AIFF", Ct::Literal("audio/aiff")),
    masked(b"\xFF\xFF\xFF", b"ID3", Ct::Literal("audio/mpeg")),
    masked(b"\xFF\xFF\xFF\xFF\xFF", b"OggS\x00", Ct::Literal("application/ogg")),
    masked(b"\xFF\xFF\xFF\xFF\xFF\xFF\xFF\xFF", b"MThd\x00\x00\x00\x06", Ct::Literal("audio/midi")),
    masked(b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF", b"RIFF\x00\x00\x00\x00AVI ", Ct::Literal("video/avi")),
    masked(b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF", b"RIFF\x00\x00\x00\x00WAVE", Ct::Literal("audio/wave")),
    Sig::Mp4,
    Sig::Exact(b"\x1A\x45\xDF\xA3", Ct::Literal("video/webm")),
    // fonts: 34 zero bytes, then "LP"
    masked(
        b"\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\xFF\xFF",
        b"\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00LP",
        Ct::Literal("application/vnd.ms-fontobject"),
    ),
    Sig::Exact(b"\x00\x01\x00\x00", Ct::Literal("font/ttf")),
    Sig::Exact(b"OTTO", Ct::Literal("font/otf")),
    Sig::Exact(b"ttcf", Ct::Literal("font/collection")),
    Sig::Exact(b"wOFF", Ct::Known(&FONT_WOFF)),
    Sig::Exact(b"wOF2", Ct::Known(&FONT_WOFF2)),
    // archives
    Sig::Exact(b"\x1F\x8B\x08", Ct::Literal("application/x-gzip")),
    Sig::Exact(b"PK\x03\x04", Ct::Literal("application/zip")),
    Sig::Exact(b"Rar!\x1A\x07\x00", Ct::Literal("application/x-rar-compressed")),
    Sig::Exact(b"Rar!\x1A\x07\x01\x00", Ct::Literal("application/x-rar-compressed")),
    Sig::Exact(b"\x00\x61\x73\x6D", Ct::Literal("application/wasm")),
    Sig::Text,
];

pub fn detect_content_type(data: &[u8]) -> &'static str {
    let data = &data[..data.len().min(SNIFF_LEN)];
    let first_non_ws = data.iter().position(|b| !is_ws(*b)).unwrap_or(data.len());

    SIGNATURES.iter().find_map(|sig| sig.matches(data, first_non_ws)).map_or(OCTET_STREAM.as_ref(), Ct::as_str)
}

impl Sig {
    fn matches(&self, data: &[u8], first_non_ws: usize) -> Option<Ct> {
        match self {
            Sig::Html(tag) => {
                let data = &data[first_non_ws..];
                if data.len() < tag.len() + 1 {
                    return None;
                }
                let same = tag.iter().zip(data).all(|(t, d)| if t.is_ascii_uppercase() { *t == d & 0xDF } else { t == d });
                (same && is_tag_terminating(data[tag.len()])).then_some(Ct::Known(&TEXT_HTML))
            }

            Sig::Masked { mask, pat, skip_ws, ct } => {
                let data = if *skip_ws { &data[first_non_ws..] } else { data };
                if mask.len() != pat.len() || data.len() < pat.len() {
                    return None;
                }
                pat.iter().zip(*mask).zip(data).all(|((p, m), d)| d & m == *p).then_some(*ct)
            }

            Sig::Exact(sig, ct) => data.starts_with(sig).then_some(*ct),

            Sig::Mp4 => is_mp4(data).then_some(Ct::Literal("video/mp4")),

            Sig::Text => {
                let binary = data[first_non_ws..].iter().any(|b| is_binary_byte(*b));
                (!binary).then_some(Ct::Known(&TEXT_PLAIN))
            }
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
    // major brand at 8, minor version at 12, compatible brands after
    (8..box_size).step_by(4).filter(|st| *st != 12).any(|st| &data[st..st + 3] == b"mp4")
}

fn is_ws(b: u8) -> bool {
    matches!(b, b'\t' | b'\n' | b'\x0C' | b'\r' | b' ')
}

fn is_tag_terminating(b: u8) -> bool {
    b == b' ' || b == b'>'
}

fn is_binary_byte(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html() {
        assert_eq!(detect_content_type(b"<!DOCTYPE html><html></html>"), TEXT_HTML.as_ref());
        assert_eq!(detect_content_type(b"  \r\n<HtMl><b>hi</b>"), TEXT_HTML.as_ref());
        assert_eq!(detect_content_type(b"<p>para</p>"), TEXT_HTML.as_ref());
        assert_eq!(detect_content_type(b"<!-- note -->"), TEXT_HTML.as_ref());
        // a tag name must be followed by a space or '>'
        assert_eq!(detect_content_type(b"<pre>code</pre>"), TEXT_PLAIN.as_ref());
    }

    #[test]
    fn text_and_binary() {
        assert_eq!(detect_content_type(b"hello world"), TEXT_PLAIN.as_ref());
        assert_eq!(detect_content_type(b"   "), TEXT_PLAIN.as_ref());
        assert_eq!(detect_content_type(b"\x01\x02binary"), OCTET_STREAM.as_ref());
        assert_eq!(detect_content_type(b"\xEF\xBB\xBFbom"), TEXT_PLAIN.as_ref());
        assert_eq!(detect_content_type(b"\xFE\xFF\x00\x41"), "text/plain; charset=utf-16be");
    }

    #[test]
    fn xml_skips_leading_whitespace() {
        assert_eq!(detect_content_type(b"\n <?xml version=\"1.0\"?>"), "text/xml; charset=utf-8");
    }

    #[test]
    fn binary_signatures() {
        assert_eq!(detect_content_type(b"\x89PNG\x0D\x0A\x1A\x0A\x00\x00"), "image/png");
        assert_eq!(detect_content_type(b"GIF89a......"), "image/gif");
        assert_eq!(detect_content_type(b"\xFF\xD8\xFF\xE0"), "image/jpeg");
        assert_eq!(detect_content_type(b"RIFF\x10\x00\x00\x00WEBPVP8 "), "image/webp");
        assert_eq!(detect_content_type(b"RIFF\x10\x00\x00\x00WAVEfmt "), "audio/wave");
        assert_eq!(detect_content_type(b"%PDF-1.7"), "application/pdf");
        assert_eq!(detect_content_type(b"\x1F\x8B\x08\x00"), "application/x-gzip");
        assert_eq!(detect_content_type(b"\x00asm\x01\x00\x00\x00"), "application/wasm");
        assert_eq!(detect_content_type(b"wOF2...."), "font/woff2");
    }

    #[test]
    fn mp4() {
        let mut data = Vec::new();
        data.extend_from_slice(&24u32.to_be_bytes());
        data.extend_from_slice(b"ftypisom\x00\x00\x02\x00mp41isom");
        assert_eq!(detect_content_type(&data), "video/mp4");
    }

    #[test]
    fn only_the_first_512_bytes_count() {
        let mut data = vec![b'a'; SNIFF_LEN];
        data.push(0x00);
        assert_eq!(detect_content_type(&data), TEXT_PLAIN.as_ref());
    }
}
