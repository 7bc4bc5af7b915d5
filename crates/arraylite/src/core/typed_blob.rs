//! The self-describing binary envelope used to round-trip typed,
//! dimensioned arrays through SQLite BLOB columns.
//!
//! Layout (fixed part is 32 bytes, multi-byte fields native-endian):
//!
//! | offset | size     | field                                   |
//! |--------|----------|-----------------------------------------|
//! | 0      | 13       | magic `"mkSQLite.tbh"` + NUL            |
//! | 13     | 1        | padding, written 0                      |
//! | 14     | 2        | version = serialized header size (36)   |
//! | 16     | 4        | element class tag                       |
//! | 20     | 11       | platform identifier, NUL-padded         |
//! | 31     | 1        | endianness, `'L'` or `'B'`              |
//! | 32     | 4*(N+1)  | dimension count N, then N extents (i32) |
//!
//! Payload bytes follow immediately after the dimension vector and are
//! copied verbatim: no byte-swapping is performed even when the stored
//! endianness differs from the runtime's. A mismatch only warns; the
//! envelope stays readable by any writer of the same layout.

use crate::core::value::{ClassId, HostArray};
use crate::error::{AppError, AppResult};

pub const MAGIC: &[u8; 12] = b"mkSQLite.tbh";

/// Serialized size of the original header struct with a one-slot
/// dimension vector; doubles as the format version.
pub const HEADER_VERSION: u16 = 36;

/// Offset of the dimension vector = size of the fixed header part.
const DIMS_OFFSET: usize = 32;

const OFF_VERSION: usize = 14;
const OFF_CLASS: usize = 16;
const OFF_PLATFORM: usize = 20;
const OFF_ENDIAN: usize = 31;
const PLATFORM_LEN: usize = 11;

/// Envelope size ceiling, applied before any allocation.
pub const MAX_BLOB_SIZE: usize = i32::MAX as usize;

/// Identifier of the producing architecture, recorded in every
/// envelope. Decode warns when it differs from the reader's.
pub fn platform_id() -> &'static str {
    if cfg!(all(target_os = "windows", target_pointer_width = "64")) {
        "PCWIN64"
    } else if cfg!(target_os = "windows") {
        "PCWIN"
    } else if cfg!(all(target_os = "macos", target_arch = "aarch64")) {
        "MACA64"
    } else if cfg!(target_os = "macos") {
        "MACI64"
    } else if cfg!(target_pointer_width = "64") {
        "GLNXA64"
    } else {
        "GLNX86"
    }
}

pub fn endian_byte() -> u8 {
    if cfg!(target_endian = "big") {
        b'B'
    } else {
        b'L'
    }
}

/// Offset of the payload for an `ndims`-dimensional envelope.
pub fn data_offset(ndims: usize) -> usize {
    DIMS_OFFSET + 4 * (ndims + 1)
}

/// Total envelope size, rejected before allocation when it would pass
/// the ceiling.
pub(crate) fn envelope_size(ndims: usize, payload: usize) -> AppResult<usize> {
    let size = data_offset(ndims)
        .checked_add(payload)
        .ok_or(AppError::BlobTooBig { size: usize::MAX, max: MAX_BLOB_SIZE })?;
    if size > MAX_BLOB_SIZE {
        return Err(AppError::BlobTooBig { size, max: MAX_BLOB_SIZE });
    }
    Ok(size)
}

/// Magic sniff: does this BLOB look like a typed envelope? The header
/// still has to pass full validation in `decode`.
pub fn looks_typed(blob: &[u8]) -> bool {
    blob.len() >= MAGIC.len() && &blob[..MAGIC.len()] == MAGIC
}

/// Encode an array into a typed envelope.
pub fn encode(array: &HostArray) -> AppResult<Vec<u8>> {
    array.validate()?;

    let ndims = array.dims.len();
    let total = envelope_size(ndims, array.data.len())?;

    let mut buf = Vec::new();
    buf.try_reserve_exact(total).map_err(|_| AppError::MemoryError)?;
    buf.resize(total, 0);

    buf[..MAGIC.len()].copy_from_slice(MAGIC);
    buf[OFF_VERSION..OFF_VERSION + 2].copy_from_slice(&HEADER_VERSION.to_ne_bytes());
    buf[OFF_CLASS..OFF_CLASS + 4].copy_from_slice(&(array.class as i32).to_ne_bytes());
    let platform = platform_id().as_bytes();
    buf[OFF_PLATFORM..OFF_PLATFORM + platform.len()].copy_from_slice(platform);
    buf[OFF_ENDIAN] = endian_byte();

    buf[DIMS_OFFSET..DIMS_OFFSET + 4].copy_from_slice(&(ndims as i32).to_ne_bytes());
    for (i, &d) in array.dims.iter().enumerate() {
        let off = DIMS_OFFSET + 4 * (i + 1);
        buf[off..off + 4].copy_from_slice(&d.to_ne_bytes());
    }

    buf[data_offset(ndims)..].copy_from_slice(&array.data);
    Ok(buf)
}

/// Decode a typed envelope back into an array.
pub fn decode(blob: &[u8]) -> AppResult<HostArray> {
    if !looks_typed(blob) || blob.len() < data_offset(0) {
        return Err(AppError::UnsupportedTypedBlobHeader("bad magic"));
    }

    let version = u16::from_ne_bytes([blob[OFF_VERSION], blob[OFF_VERSION + 1]]);
    if version != HEADER_VERSION {
        // Future header versions are explicitly not understood.
        return Err(AppError::UnsupportedTypedBlobHeader("version mismatch"));
    }

    let platform = &blob[OFF_PLATFORM..OFF_PLATFORM + PLATFORM_LEN];
    let stored_platform = &platform[..platform.iter().position(|&b| b == 0).unwrap_or(PLATFORM_LEN)];
    if stored_platform != platform_id().as_bytes() || blob[OFF_ENDIAN] != endian_byte() {
        tracing::warn!(
            platform = %String::from_utf8_lossy(stored_platform),
            endian = %(blob[OFF_ENDIAN] as char),
            "BLOB stored on different platform"
        );
    }

    let class_tag = i32::from_ne_bytes(read4(blob, OFF_CLASS));
    let class = ClassId::from_i32(class_tag).ok_or_else(|| {
        AppError::UnsupportedVariableType(format!("typed blob element class {class_tag}"))
    })?;

    let ndims = i32::from_ne_bytes(read4(blob, DIMS_OFFSET));
    if ndims < 0 || blob.len() < data_offset(ndims as usize) {
        return Err(AppError::InvalidArgument("typed blob dimension vector truncated".into()));
    }
    let ndims = ndims as usize;

    let mut dims = Vec::with_capacity(ndims);
    for i in 0..ndims {
        let d = i32::from_ne_bytes(read4(blob, DIMS_OFFSET + 4 * (i + 1)));
        if d < 0 {
            return Err(AppError::InvalidArgument("negative typed blob extent".into()));
        }
        dims.push(d);
    }

    let payload = &blob[data_offset(ndims)..];
    let elements: usize = dims.iter().map(|&d| d as usize).product();
    let expected = elements
        .checked_mul(class.element_size())
        .ok_or_else(|| AppError::InvalidArgument("typed blob size overflow".into()))?;
    if payload.len() != expected {
        return Err(AppError::InvalidArgument(format!(
            "typed blob payload is {} bytes, dimensions require {expected}",
            payload.len()
        )));
    }

    let mut data = Vec::new();
    data.try_reserve_exact(payload.len()).map_err(|_| AppError::MemoryError)?;
    data.extend_from_slice(payload);

    Ok(HostArray { class, dims, data })
}

fn read4(blob: &[u8], off: usize) -> [u8; 4] {
    [blob[off], blob[off + 1], blob[off + 2], blob[off + 3]]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix_3x4() -> HostArray {
        let data: Vec<u8> = (0..12).flat_map(|i| (i as f64 * 0.5).to_ne_bytes()).collect();
        HostArray { class: ClassId::Double, dims: vec![3, 4], data }
    }

    #[test]
    fn envelope_size_of_a_3x4_double_matrix() {
        let blob = encode(&matrix_3x4()).unwrap();
        // fixed part + (2+1) dim slots + 12 * 8 payload bytes
        assert_eq!(blob.len(), 32 + 12 + 96);
        assert_eq!(data_offset(2), 44);
    }

    #[test]
    fn round_trip_is_bit_exact() {
        for array in [
            matrix_3x4(),
            HostArray { class: ClassId::Uint8, dims: vec![1, 1], data: vec![42] },
            HostArray { class: ClassId::Int16, dims: vec![1, 5], data: vec![0; 10] },
            HostArray {
                class: ClassId::Single,
                dims: vec![2, 3, 4],
                data: (0..24).flat_map(|i| (i as f32).to_ne_bytes()).collect(),
            },
        ] {
            let decoded = decode(&encode(&array).unwrap()).unwrap();
            assert_eq!(decoded, array);
        }
    }

    #[test]
    fn header_records_the_runtime_fingerprint() {
        let blob = encode(&matrix_3x4()).unwrap();
        assert!(looks_typed(&blob));
        assert_eq!(&blob[..12], MAGIC);
        assert_eq!(u16::from_ne_bytes([blob[14], blob[15]]), 36);
        assert_eq!(blob[31], endian_byte());
    }

    #[test]
    fn altered_magic_is_rejected() {
        let mut blob = encode(&matrix_3x4()).unwrap();
        blob[3] ^= 0x01;
        assert!(matches!(
            decode(&blob),
            Err(AppError::UnsupportedTypedBlobHeader("bad magic"))
        ));
        assert!(matches!(
            decode(&blob[..10]),
            Err(AppError::UnsupportedTypedBlobHeader(_))
        ));
    }

    #[test]
    fn version_mismatch_is_rejected_even_with_good_magic() {
        let mut blob = encode(&matrix_3x4()).unwrap();
        let bumped = (HEADER_VERSION + 4).to_ne_bytes();
        blob[14..16].copy_from_slice(&bumped);
        assert!(matches!(
            decode(&blob),
            Err(AppError::UnsupportedTypedBlobHeader("version mismatch"))
        ));
    }

    #[test]
    fn payload_size_mismatch_is_rejected() {
        let mut blob = encode(&matrix_3x4()).unwrap();
        blob.truncate(blob.len() - 1);
        assert!(matches!(decode(&blob), Err(AppError::InvalidArgument(_))));
    }

    #[test]
    fn unknown_class_tag_is_rejected() {
        let mut blob = encode(&matrix_3x4()).unwrap();
        blob[16..20].copy_from_slice(&99i32.to_ne_bytes());
        assert!(matches!(decode(&blob), Err(AppError::UnsupportedVariableType(_))));
    }

    #[test]
    fn foreign_platform_still_decodes_the_payload() {
        let source = matrix_3x4();
        let mut blob = encode(&source).unwrap();
        let mut platform = [0u8; 11];
        platform[..5].copy_from_slice(b"SOL64");
        blob[20..31].copy_from_slice(&platform);
        // Only the fingerprint identity is waived, not the data.
        let decoded = decode(&blob).unwrap();
        assert_eq!(decoded.data, source.data);
        assert_eq!(decoded.dims, source.dims);
    }

    #[test]
    fn oversize_envelopes_are_rejected_before_allocation() {
        assert!(matches!(
            envelope_size(2, MAX_BLOB_SIZE),
            Err(AppError::BlobTooBig { .. })
        ));
        assert!(envelope_size(2, 96).is_ok());
    }
}
