//! Hex helpers for logging raw link traffic and for the offline CLI tools.

/// Render bytes as space separated upper-case hex (`A5 01 00`).
/// Output past `max` bytes is elided with a byte count so one noisy read
/// cannot flood the log.
pub fn hex_dump(data: &[u8], max: usize) -> String {
    use std::fmt::Write;
    let shown = data.len().min(max);
    let mut out = String::with_capacity(shown * 3 + 16);
    for (i, b) in data[..shown].iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(&mut out, "{:02X}", b);
    }
    if data.len() > shown {
        let _ = write!(&mut out, " … (+{} bytes)", data.len() - shown);
    }
    out
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum HexError {
    #[error("odd number of hex digits")]
    OddLength,
    #[error("invalid hex digit '{0}'")]
    InvalidDigit(char),
}

/// Parse hex text into bytes. Whitespace, commas, `:`/`-` separators and
/// `0x` prefixes are ignored, so both `A5 01 00` and `0xA5,0x01,0x00` work.
pub fn parse_hex(text: &str) -> Result<Vec<u8>, HexError> {
    let cleaned = text.replace("0x", "").replace("0X", "");
    let digits: Vec<char> = cleaned
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, ',' | ':' | '-'))
        .collect();
    if digits.len() % 2 != 0 {
        return Err(HexError::OddLength);
    }
    digits
        .chunks(2)
        .map(|pair| {
            let hi = pair[0].to_digit(16).ok_or(HexError::InvalidDigit(pair[0]))?;
            let lo = pair[1].to_digit(16).ok_or(HexError::InvalidDigit(pair[1]))?;
            Ok((hi * 16 + lo) as u8)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dumps_and_truncates() {
        assert_eq!(hex_dump(&[0xA5, 0x01, 0x0C], 16), "A5 01 0C");
        assert_eq!(hex_dump(&[], 16), "");
        assert_eq!(hex_dump(&[1, 2, 3, 4], 2), "01 02 … (+2 bytes)");
    }

    #[test]
    fn parses_common_spellings() {
        let want = vec![0xA5, 0x01, 0x00];
        assert_eq!(parse_hex("A5 01 00").unwrap(), want);
        assert_eq!(parse_hex("a50100").unwrap(), want);
        assert_eq!(parse_hex("0xA5, 0x01, 0x00").unwrap(), want);
        assert_eq!(parse_hex("a5:01:00\n").unwrap(), want);
        assert_eq!(parse_hex("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(parse_hex("A5 0"), Err(HexError::OddLength));
        assert_eq!(parse_hex("G5"), Err(HexError::InvalidDigit('G')));
    }
}
