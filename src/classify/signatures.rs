//! Ordered byte-signature table
//!
//! Order matters: the first matching entry wins. RIFF and EBML containers are
//! disambiguated by their sub-type, Ogg by its first codec header.

/// One entry of the signature table
pub struct Signature {
    /// Short label for logs
    pub label: &'static str,
    matcher: fn(&[u8], u64) -> Option<&'static str>,
}

impl Signature {
    const fn new(label: &'static str, matcher: fn(&[u8], u64) -> Option<&'static str>) -> Self {
        Self { label, matcher }
    }

    /// Extension this signature assigns to `header`, if it matches
    pub fn matches(&self, header: &[u8], file_size: u64) -> Option<&'static str> {
        (self.matcher)(header, file_size)
    }
}

/// The table, in priority order
pub static SIGNATURES: &[Signature] = &[
    Signature::new("png", png),
    Signature::new("jpeg", |h, _| h.starts_with(&[0xFF, 0xD8, 0xFF]).then_some("jpg")),
    Signature::new("gif", |h, _| {
        (h.starts_with(b"GIF87a") || h.starts_with(b"GIF89a")).then_some("gif")
    }),
    Signature::new("riff-webp", |h, _| riff(h, b"WEBP").then_some("webp")),
    Signature::new("riff-wave", |h, _| riff(h, b"WAVE").then_some("wav")),
    Signature::new("riff-avi", |h, _| riff(h, b"AVI ").then_some("avi")),
    Signature::new("pdf", |h, _| h.starts_with(b"%PDF").then_some("pdf")),
    Signature::new("ebml", ebml),
    Signature::new("ogg", ogg),
    Signature::new("iso-bmff", iso_bmff),
    Signature::new("flv", |h, _| h.starts_with(b"FLV\x01").then_some("flv")),
    Signature::new("midi", |h, _| h.starts_with(b"MThd").then_some("mid")),
    Signature::new("djvu", |h, _| h.starts_with(b"AT&TFORM").then_some("djvu")),
    Signature::new("xcf", |h, _| h.starts_with(b"gimp xcf").then_some("xcf")),
    Signature::new("tiff", |h, _| {
        (h.starts_with(b"II*\0") || h.starts_with(b"MM\0*")).then_some("tiff")
    }),
    Signature::new("flac", |h, _| h.starts_with(b"fLaC").then_some("flac")),
    Signature::new("mp3", mp3),
    Signature::new("svg", svg),
    Signature::new("stl", stl),
    Signature::new("bmp", |h, _| h.starts_with(b"BM").then_some("bmp")),
];

/// First matching signature and the extension it assigns
pub fn identify(header: &[u8], file_size: u64) -> Option<(&'static Signature, &'static str)> {
    SIGNATURES.iter().find_map(|signature| {
        signature
            .matches(header, file_size)
            .map(|extension| (signature, extension))
    })
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    find(haystack, needle).is_some()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn png(h: &[u8], _: u64) -> Option<&'static str> {
    const MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    if !h.starts_with(MAGIC) {
        return None;
    }
    // Animation control chunk precedes the first IDAT in an APNG
    Some(if contains(h, b"acTL") { "apng" } else { "png" })
}

fn riff(h: &[u8], form: &[u8; 4]) -> bool {
    h.len() >= 12 && h.starts_with(b"RIFF") && &h[8..12] == form
}

fn ebml(h: &[u8], _: u64) -> Option<&'static str> {
    if !h.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        return None;
    }
    // DocType element id 0x4282, one-byte size, then the doc type string
    let is_webm = find(h, &[0x42, 0x82]).is_some_and(|at| {
        let rest = &h[at + 2..];
        rest.len() > 1 && rest[1..].starts_with(b"webm")
    });
    Some(if is_webm { "webm" } else { "mkv" })
}

fn ogg(h: &[u8], _: u64) -> Option<&'static str> {
    if !h.starts_with(b"OggS") {
        return None;
    }
    Some(if contains(h, b"OpusHead") {
        "opus"
    } else if contains(h, b"\x80theora") {
        "ogv"
    } else {
        "ogg"
    })
}

fn iso_bmff(h: &[u8], _: u64) -> Option<&'static str> {
    if h.len() < 12 || &h[4..8] != b"ftyp" {
        return None;
    }
    Some(if &h[8..12] == b"qt  " { "mov" } else { "mp4" })
}

fn mp3(h: &[u8], _: u64) -> Option<&'static str> {
    let frame_sync = h.len() >= 2 && h[0] == 0xFF && (h[1] & 0xE0) == 0xE0;
    (h.starts_with(b"ID3") || frame_sync).then_some("mp3")
}

fn svg(h: &[u8], _: u64) -> Option<&'static str> {
    if h.contains(&0) {
        return None;
    }
    let text = String::from_utf8_lossy(h);
    let text = text.trim_start_matches('\u{FEFF}').trim_start();
    (text.starts_with('<') && text.contains("<svg")).then_some("svg")
}

fn stl(h: &[u8], file_size: u64) -> Option<&'static str> {
    if h.starts_with(b"solid ") {
        return Some("stl");
    }
    if h.len() < 84 || file_size < 84 {
        return None;
    }
    let triangles = u32::from_le_bytes([h[80], h[81], h[82], h[83]]) as u64;
    (84 + 50 * triangles == file_size).then_some("stl")
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn sniff(header: &[u8], file_size: u64) -> Option<&'static str> {
        identify(header, file_size).map(|(_, extension)| extension)
    }

    fn png_with(extra: &[u8], at: usize) -> Vec<u8> {
        let mut data = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        data.resize(at, 0);
        data.extend_from_slice(extra);
        data
    }

    #[test]
    fn test_png_and_apng() {
        let plain = png_with(b"IHDR", 12);
        assert_eq!(sniff(&plain, plain.len() as u64), Some("png"));

        let animated = png_with(b"acTL", 37);
        assert_eq!(sniff(&animated, animated.len() as u64), Some("apng"));
    }

    #[test]
    fn test_riff_subtypes() {
        let mut webp = b"RIFF\0\0\0\0WEBPVP8 ".to_vec();
        assert_eq!(sniff(&webp, 16), Some("webp"));
        webp[8..12].copy_from_slice(b"WAVE");
        assert_eq!(sniff(&webp, 16), Some("wav"));
        webp[8..12].copy_from_slice(b"AVI ");
        assert_eq!(sniff(&webp, 16), Some("avi"));
        // Truncated RIFF header matches nothing RIFF-specific
        assert_eq!(sniff(b"RIFF\0\0", 6), None);
    }

    #[test]
    fn test_ebml_doc_type() {
        let mut webm = vec![0x1A, 0x45, 0xDF, 0xA3, 0x9F, 0x42, 0x86, 0x81, 0x01];
        webm.extend_from_slice(&[0x42, 0x82, 0x84]);
        webm.extend_from_slice(b"webm");
        assert_eq!(sniff(&webm, webm.len() as u64), Some("webm"));

        let mut mkv = vec![0x1A, 0x45, 0xDF, 0xA3, 0x42, 0x82, 0x88];
        mkv.extend_from_slice(b"matroska");
        assert_eq!(sniff(&mkv, mkv.len() as u64), Some("mkv"));
    }

    #[test]
    fn test_ogg_codecs() {
        let mut opus = b"OggS\0\x02".to_vec();
        opus.resize(28, 0);
        opus.extend_from_slice(b"OpusHead");
        assert_eq!(sniff(&opus, 0), Some("opus"));

        let mut theora = b"OggS\0\x02".to_vec();
        theora.resize(28, 0);
        theora.extend_from_slice(b"\x80theora");
        assert_eq!(sniff(&theora, 0), Some("ogv"));

        let mut vorbis = b"OggS\0\x02".to_vec();
        vorbis.resize(28, 0);
        vorbis.extend_from_slice(b"\x01vorbis");
        assert_eq!(sniff(&vorbis, 0), Some("ogg"));
    }

    #[test]
    fn test_iso_bmff_brands() {
        assert_eq!(sniff(b"\0\0\0\x20ftypisom\0\0\x02\0", 16), Some("mp4"));
        assert_eq!(sniff(b"\0\0\0\x14ftypqt  \0\0\0\0", 16), Some("mov"));
    }

    #[test]
    fn test_simple_magics() {
        assert_eq!(sniff(&[0xFF, 0xD8, 0xFF, 0xE0], 4), Some("jpg"));
        assert_eq!(sniff(b"GIF89a", 6), Some("gif"));
        assert_eq!(sniff(b"%PDF-1.7", 8), Some("pdf"));
        assert_eq!(sniff(b"FLV\x01\x05", 5), Some("flv"));
        assert_eq!(sniff(b"MThd\0\0\0\x06", 8), Some("mid"));
        assert_eq!(sniff(b"AT&TFORM\0\0", 10), Some("djvu"));
        assert_eq!(sniff(b"gimp xcf v011", 13), Some("xcf"));
        assert_eq!(sniff(b"II*\0\x08\0", 6), Some("tiff"));
        assert_eq!(sniff(b"MM\0*\0\0", 6), Some("tiff"));
        assert_eq!(sniff(b"fLaC\0", 5), Some("flac"));
        assert_eq!(sniff(b"ID3\x04\0", 5), Some("mp3"));
        assert_eq!(sniff(&[0xFF, 0xFB, 0x90, 0x00], 4), Some("mp3"));
        assert_eq!(sniff(b"BM\x36\0\0\0", 6), Some("bmp"));
    }

    #[test]
    fn test_svg_with_prolog_and_bom() {
        let svg = "\u{FEFF}  <?xml version=\"1.0\"?>\n<!-- drawn by hand -->\n<svg xmlns=\"http://www.w3.org/2000/svg\"/>";
        assert_eq!(sniff(svg.as_bytes(), svg.len() as u64), Some("svg"));
        assert_eq!(sniff(b"<html><body></body></html>", 26), None);
    }

    #[test]
    fn test_stl_ascii_and_binary() {
        assert_eq!(sniff(b"solid cube\nfacet normal 0 0 1", 29), Some("stl"));

        let mut binary = vec![0u8; 80];
        binary.extend_from_slice(&2u32.to_le_bytes());
        binary.resize(84 + 100, 0);
        assert_eq!(sniff(&binary, binary.len() as u64), Some("stl"));
        // Triangle count disagrees with size
        assert_eq!(sniff(&binary, binary.len() as u64 + 1), None);
    }

    #[test]
    fn test_unknown_bytes() {
        assert_eq!(sniff(b"\0\x01\x02\x03 not a known format", 25), None);
        assert_eq!(sniff(b"", 0), None);
    }

    #[test]
    fn test_identify_names_matching_entry() {
        let (signature, extension) = identify(b"\0\0\0\x20ftypisom\0\0\x02\0", 16).unwrap();
        assert_eq!(signature.label, "iso-bmff");
        assert_eq!(extension, "mp4");

        let (signature, extension) = identify(b"RIFF\x24\0\0\0WAVEfmt ", 16).unwrap();
        assert_eq!(signature.label, "riff-wave");
        assert_eq!(extension, "wav");

        assert!(identify(b"plain text", 10).is_none());
    }
}
