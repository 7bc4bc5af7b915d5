use crate::error::{AppError, AppResult};

/// Element type tag of a host array. The numeric values are the wire
/// tags stored in typed BLOB envelopes and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ClassId {
    Logical = 3,
    Char = 4,
    Double = 6,
    Single = 7,
    Int8 = 8,
    Uint8 = 9,
    Int16 = 10,
    Uint16 = 11,
    Int32 = 12,
    Uint32 = 13,
    Int64 = 14,
    Uint64 = 15,
}

impl ClassId {
    pub fn from_i32(v: i32) -> Option<Self> {
        match v {
            3 => Some(ClassId::Logical),
            4 => Some(ClassId::Char),
            6 => Some(ClassId::Double),
            7 => Some(ClassId::Single),
            8 => Some(ClassId::Int8),
            9 => Some(ClassId::Uint8),
            10 => Some(ClassId::Int16),
            11 => Some(ClassId::Uint16),
            12 => Some(ClassId::Int32),
            13 => Some(ClassId::Uint32),
            14 => Some(ClassId::Int64),
            15 => Some(ClassId::Uint64),
            _ => None,
        }
    }

    pub fn element_size(self) -> usize {
        match self {
            ClassId::Logical | ClassId::Int8 | ClassId::Uint8 => 1,
            // Host characters are 2-byte code units.
            ClassId::Char | ClassId::Int16 | ClassId::Uint16 => 2,
            ClassId::Single | ClassId::Int32 | ClassId::Uint32 => 4,
            ClassId::Double | ClassId::Int64 | ClassId::Uint64 => 8,
        }
    }

    /// True for classes that bind as a scalar integer; floating classes
    /// bind as doubles.
    pub fn is_integer(self) -> bool {
        !matches!(self, ClassId::Double | ClassId::Single)
    }

    pub fn name(self) -> &'static str {
        match self {
            ClassId::Logical => "logical",
            ClassId::Char => "char",
            ClassId::Double => "double",
            ClassId::Single => "single",
            ClassId::Int8 => "int8",
            ClassId::Uint8 => "uint8",
            ClassId::Int16 => "int16",
            ClassId::Uint16 => "uint16",
            ClassId::Int32 => "int32",
            ClassId::Uint32 => "uint32",
            ClassId::Int64 => "int64",
            ClassId::Uint64 => "uint64",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "logical" => Some(ClassId::Logical),
            "char" => Some(ClassId::Char),
            "double" => Some(ClassId::Double),
            "single" => Some(ClassId::Single),
            "int8" => Some(ClassId::Int8),
            "uint8" => Some(ClassId::Uint8),
            "int16" => Some(ClassId::Int16),
            "uint16" => Some(ClassId::Uint16),
            "int32" => Some(ClassId::Int32),
            "uint32" => Some(ClassId::Uint32),
            "int64" => Some(ClassId::Int64),
            "uint64" => Some(ClassId::Uint64),
            _ => None,
        }
    }
}

/// A typed, dimensioned host array. `data` is the raw column-major
/// payload; its length must equal `len() * class.element_size()`.
#[derive(Debug, Clone, PartialEq)]
pub struct HostArray {
    pub class: ClassId,
    pub dims: Vec<i32>,
    pub data: Vec<u8>,
}

impl HostArray {
    /// Element count: product of the dimension extents.
    pub fn len(&self) -> usize {
        self.dims.iter().map(|&d| d.max(0) as usize).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks the payload length against the declared shape.
    pub fn validate(&self) -> AppResult<()> {
        let expected = self
            .len()
            .checked_mul(self.class.element_size())
            .ok_or_else(|| AppError::InvalidArgument("array size overflow".into()))?;
        if self.data.len() != expected {
            return Err(AppError::InvalidArgument(format!(
                "array payload is {} bytes, shape requires {expected}",
                self.data.len()
            )));
        }
        Ok(())
    }

    /// First element as an integer. Only meaningful for single-element
    /// arrays of an integer-like class.
    pub fn scalar_i64(&self) -> i64 {
        match self.class {
            ClassId::Logical => self.data.first().map(|&b| (b != 0) as i64).unwrap_or(0),
            ClassId::Int8 => self.data.first().map(|&b| b as i8 as i64).unwrap_or(0),
            ClassId::Uint8 => self.data.first().map(|&b| b as i64).unwrap_or(0),
            ClassId::Int16 => i16::from_ne_bytes(self.first_chunk()) as i64,
            ClassId::Uint16 | ClassId::Char => u16::from_ne_bytes(self.first_chunk()) as i64,
            ClassId::Int32 => i32::from_ne_bytes(self.first_chunk()) as i64,
            ClassId::Uint32 => u32::from_ne_bytes(self.first_chunk()) as i64,
            ClassId::Int64 => i64::from_ne_bytes(self.first_chunk()),
            ClassId::Uint64 => u64::from_ne_bytes(self.first_chunk()) as i64,
            ClassId::Single => f32::from_ne_bytes(self.first_chunk()) as i64,
            ClassId::Double => f64::from_ne_bytes(self.first_chunk()) as i64,
        }
    }

    /// First element as a double.
    pub fn scalar_f64(&self) -> f64 {
        match self.class {
            ClassId::Single => f32::from_ne_bytes(self.first_chunk()) as f64,
            ClassId::Double => f64::from_ne_bytes(self.first_chunk()),
            _ => self.scalar_i64() as f64,
        }
    }

    fn first_chunk<const N: usize>(&self) -> [u8; N] {
        let mut out = [0u8; N];
        if self.data.len() >= N {
            out.copy_from_slice(&self.data[..N]);
        }
        out
    }
}

/// One input value supplied for a statement placeholder.
///
/// `Cell`, `Struct` and `Complex` carry no marshalling rule; the binder
/// rejects them. They exist so callers can hand over anything the host
/// environment produces and get the documented error back.
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    Empty,
    Logical(bool),
    Int(i64),
    Float(f64),
    /// Host text in the single-byte representation.
    Text(Vec<u8>),
    Array(HostArray),
    Cell(Vec<HostValue>),
    Struct(Vec<(String, HostValue)>),
    Complex { re: f64, im: f64 },
}

/// One buffered column value, tagged with the storage class the engine
/// reported at row-fetch time.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Null,
    Integer(f64),
    Float(f64),
    /// Host-side text bytes (already through the text codec when UTF-8
    /// conversion is on).
    Text(Vec<u8>),
    Blob(Vec<u8>),
}

/// One projected output cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Number(f64),
    /// Host-side single-byte text.
    Text(Vec<u8>),
    /// Plain (untyped) BLOB payload.
    Bytes(Vec<u8>),
    /// Decoded typed BLOB.
    Array(HostArray),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_tags_round_trip() {
        for id in [
            ClassId::Logical,
            ClassId::Char,
            ClassId::Double,
            ClassId::Single,
            ClassId::Int8,
            ClassId::Uint8,
            ClassId::Int16,
            ClassId::Uint16,
            ClassId::Int32,
            ClassId::Uint32,
            ClassId::Int64,
            ClassId::Uint64,
        ] {
            assert_eq!(ClassId::from_i32(id as i32), Some(id));
            assert_eq!(ClassId::from_name(id.name()), Some(id));
        }
        assert_eq!(ClassId::from_i32(5), None);
        assert_eq!(ClassId::from_i32(42), None);
    }

    #[test]
    fn array_len_and_validation() {
        let a = HostArray {
            class: ClassId::Double,
            dims: vec![3, 4],
            data: vec![0u8; 96],
        };
        assert_eq!(a.len(), 12);
        assert!(a.validate().is_ok());

        let bad = HostArray { data: vec![0u8; 95], ..a };
        assert!(matches!(bad.validate(), Err(crate::error::AppError::InvalidArgument(_))));
    }

    #[test]
    fn scalar_reads_use_the_declared_class() {
        let a = HostArray {
            class: ClassId::Int32,
            dims: vec![1, 1],
            data: (-7i32).to_ne_bytes().to_vec(),
        };
        assert_eq!(a.scalar_i64(), -7);
        assert_eq!(a.scalar_f64(), -7.0);

        let f = HostArray {
            class: ClassId::Double,
            dims: vec![1, 1],
            data: 2.5f64.to_ne_bytes().to_vec(),
        };
        assert_eq!(f.scalar_f64(), 2.5);
    }
}
