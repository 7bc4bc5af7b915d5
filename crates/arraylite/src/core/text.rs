//! Conversion between the host's single-byte text representation and
//! UTF-8.
//!
//! Only the 2-byte UTF-8 range is handled: every host byte maps to at
//! most two UTF-8 bytes and every lead byte >= 128 folds back into one
//! host byte. This covers the European single-byte charsets the format
//! was designed around; 3- and 4-byte sequences are out of scope.
//!
//! Each direction comes as a measuring pass and a writing pass into a
//! caller-sized buffer, plus an owned-buffer wrapper that runs both.

/// Number of bytes `to_utf8_into` will write for `latin1`.
pub fn utf8_len(latin1: &[u8]) -> usize {
    latin1.iter().map(|&b| if b < 128 { 1 } else { 2 }).sum()
}

/// Expand single-byte text to UTF-8. `out` must hold `utf8_len` bytes.
/// Returns the number of bytes written.
pub fn to_utf8_into(latin1: &[u8], out: &mut [u8]) -> usize {
    let mut n = 0;
    for &b in latin1 {
        if b < 128 {
            out[n] = b;
            n += 1;
        } else {
            out[n] = 0xC0 | (b >> 6);
            out[n + 1] = 0x80 | (b & 63);
            n += 2;
        }
    }
    n
}

pub fn to_utf8(latin1: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; utf8_len(latin1)];
    to_utf8_into(latin1, &mut out);
    out
}

/// Number of bytes `to_latin1_into` will write for `utf8`.
pub fn latin1_len(utf8: &[u8]) -> usize {
    let mut i = 0;
    let mut n = 0;
    while i < utf8.len() {
        i += if utf8[i] < 128 { 1 } else { 2 };
        n += 1;
    }
    n
}

/// Fold UTF-8 back into single-byte text. Any byte >= 128 is taken as
/// the lead of a 2-byte sequence; a missing continuation byte at the
/// end of input counts as zero. `out` must hold `latin1_len` bytes.
/// Returns the number of bytes written.
pub fn to_latin1_into(utf8: &[u8], out: &mut [u8]) -> usize {
    let mut i = 0;
    let mut n = 0;
    while i < utf8.len() {
        let b = utf8[i];
        if b < 128 {
            out[n] = b;
            i += 1;
        } else {
            let cont = utf8.get(i + 1).copied().unwrap_or(0);
            out[n] = (b << 6) | (cont & 63);
            i += 2;
        }
        n += 1;
    }
    n
}

pub fn to_latin1(utf8: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; latin1_len(utf8)];
    to_latin1_into(utf8, &mut out);
    out
}
