//! Base62 encoding used for human-readable order codes.

const ALPHABET: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Encode an unsigned 64-bit integer into a base62 string using the alphabet
/// 0-9, A-Z, a-z. Zero encodes to "0".
pub fn encode_u64(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    // 62^11 > 2^64, so 11 digits always suffice
    let mut buf = [0u8; 11];
    let mut i = buf.len();
    while n > 0 {
        i -= 1;
        buf[i] = ALPHABET[(n % 62) as usize];
        n /= 62;
    }
    buf[i..].iter().map(|&b| b as char).collect()
}

/// Like [`encode_u64`], left-padded with '0' up to `min_width`.
pub fn encode_padded(n: u64, min_width: usize) -> String {
    format!("{:0>width$}", encode_u64(n), width = min_width)
}
