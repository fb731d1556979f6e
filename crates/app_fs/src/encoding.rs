//! Text decoding for raw file reads

use encoding_rs::Encoding;

/// Decode bytes read from a file into a string.
///
/// A byte-order mark (UTF-8, UTF-16LE or UTF-16BE) selects the encoding and is
/// stripped; without one the bytes are taken as UTF-8. Invalid sequences are
/// replaced rather than rejected.
pub fn decode_text(bytes: &[u8]) -> String {
    let encoding = Encoding::for_bom(bytes);

    match encoding {
        Some((encoding, bom_len)) => {
            let (text, had_errors) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
            if had_errors {
                tracing::debug!("Replaced invalid {} sequences", encoding.name());
            }
            text.into_owned()
        }
        None => {
            let (text, had_errors) = encoding_rs::UTF_8.decode_without_bom_handling(bytes);
            if had_errors {
                tracing::debug!("Replaced invalid UTF-8 sequences");
            }
            text.into_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_utf8() {
        assert_eq!(decode_text("Hello, 世界!".as_bytes()), "Hello, 世界!");
    }

    #[test]
    fn test_utf8_bom_stripped() {
        let bytes = [0xEF, 0xBB, 0xBF, b'h', b'i'];
        assert_eq!(decode_text(&bytes), "hi");
    }

    #[test]
    fn test_utf16le_bom() {
        let bytes = [0xFF, 0xFE, b'o', 0, b'k', 0];
        assert_eq!(decode_text(&bytes), "ok");
    }

    #[test]
    fn test_invalid_bytes_replaced() {
        let decoded = decode_text(&[b'a', 0xFF, b'b']);
        assert_eq!(decoded, "a\u{FFFD}b");
    }
}
