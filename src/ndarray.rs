//! Parsing of `core/ndarray` metadata out of a tagged YAML mapping.

use crate::context::Context;
use crate::error::{AsdfError, ValueError};
use crate::log::LogLevel;
use crate::value::Value;

/// The element type of an ndarray, as named in the `datatype` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Bool8,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float16,
    Float32,
    Float64,
    Complex64,
    Complex128,
    /// Fixed-width ASCII string elements of the given byte length.
    Ascii(u64),
    /// Fixed-width UCS-4 string elements of the given character count.
    Ucs4(u64),
    /// A structured (record) datatype; recognized but not decoded.
    Record,
}

impl ScalarType {
    /// Size in bytes of one element, where fixed (record/ascii/ucs4 are
    /// variable or unsupported and return `None`).
    pub fn element_size(self) -> Option<u64> {
        use ScalarType::*;
        match self {
            Bool8 | Int8 | UInt8 => Some(1),
            Int16 | UInt16 | Float16 => Some(2),
            Int32 | UInt32 | Float32 => Some(4),
            Int64 | UInt64 | Float64 | Complex64 => Some(8),
            Complex128 => Some(16),
            Ascii(n) => Some(n),
            Ucs4(n) => Some(n * 4),
            Record => None,
        }
    }

    fn from_name(name: &str) -> Option<ScalarType> {
        use ScalarType::*;
        Some(match name {
            "bool8" => Bool8,
            "int8" => Int8,
            "int16" => Int16,
            "int32" => Int32,
            "int64" => Int64,
            "uint8" => UInt8,
            "uint16" => UInt16,
            "uint32" => UInt32,
            "uint64" => UInt64,
            "float16" => Float16,
            "float32" => Float32,
            "float64" => Float64,
            "complex64" => Complex64,
            "complex128" => Complex128,
            "ascii" => Ascii(0),
            "ucs4" => Ucs4(0),
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Big,
    Little,
}

impl ByteOrder {
    pub fn host() -> ByteOrder {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }
}

/// Parsed `core/ndarray` metadata.
#[derive(Debug, Clone)]
pub struct NdarrayMetadata {
    pub source: u64,
    pub shape: Vec<u64>,
    pub datatype: ScalarType,
    pub byteorder: ByteOrder,
    pub offset: u64,
    pub strides: Option<Vec<i64>>,
}

impl NdarrayMetadata {
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn element_count(&self) -> u64 {
        self.shape.iter().product()
    }

    /// Compute C-order (row-major) strides in elements.
    pub fn contiguous_strides(&self) -> Vec<u64> {
        let mut strides = vec![1u64; self.shape.len()];
        for d in (0..self.shape.len().saturating_sub(1)).rev() {
            strides[d] = strides[d + 1] * self.shape[d + 1];
        }
        strides
    }
}

fn get_required_property<'doc>(value: &Value<'doc>, name: &str, ctx: &Context) -> Result<Value<'doc>, AsdfError> {
    value.path(&format!("/{name}")).map_err(|e| {
        ctx.log(LogLevel::Error, format!("ndarray is missing required property {name:?}"));
        AsdfError::Value(e)
    })
}

/// `as_u64`, rejecting a truncated (overflowed) result rather than
/// silently accepting the reinterpreted value: ndarray metadata fields are
/// either non-negative by construction or meaningless if they overflow.
fn as_u64_exact(value: &Value<'_>) -> Result<u64, ValueError> {
    match value.as_u64()? {
        (v, false) => Ok(v),
        (_, true) => Err(ValueError::Overflow),
    }
}

fn as_i64_exact(value: &Value<'_>) -> Result<i64, ValueError> {
    match value.as_i64()? {
        (v, false) => Ok(v),
        (_, true) => Err(ValueError::Overflow),
    }
}

fn parse_datatype(value: &Value<'_>, ctx: &Context) -> Result<ScalarType, AsdfError> {
    if let Ok(name) = value.as_str() {
        return ScalarType::from_name(name).ok_or_else(|| {
            ctx.log(LogLevel::Warn, format!("unsupported ndarray datatype {name:?}"));
            AsdfError::UnsupportedDatatype(name.to_string())
        });
    }
    if let Ok(seq) = value.sequence() {
        let items: Vec<_> = seq.collect();
        if items.len() == 2 {
            if let (Ok(name), Ok(len)) = (items[0].as_str(), as_u64_exact(&items[1])) {
                return match name {
                    "ascii" => Ok(ScalarType::Ascii(len)),
                    "ucs4" => Ok(ScalarType::Ucs4(len)),
                    other => {
                        ctx.log(LogLevel::Warn, format!("unsupported fixed-width datatype {other:?}"));
                        Err(AsdfError::UnsupportedDatatype(other.to_string()))
                    }
                };
            }
        }
        ctx.log(LogLevel::Warn, "ndarray datatype sequence has unexpected shape, treating as record");
        return Ok(ScalarType::Record);
    }
    if value.mapping().is_ok() {
        return Ok(ScalarType::Record);
    }
    Err(AsdfError::UnsupportedDatatype("<unreadable>".to_string()))
}

/// Parse ndarray metadata from a tagged mapping value.
pub fn parse(value: &Value<'_>, ctx: &Context) -> Result<NdarrayMetadata, AsdfError> {
    let source = as_u64_exact(&get_required_property(value, "source", ctx)?)?;

    let shape_value = get_required_property(value, "shape", ctx)?;
    let shape: Vec<u64> = shape_value
        .sequence()
        .map_err(|e| AsdfError::Value(e))?
        .map(|v| as_u64_exact(&v))
        .collect::<Result<_, ValueError>>()?;
    if shape.is_empty() || shape.iter().any(|&n| n == 0) {
        ctx.log(LogLevel::Warn, "ndarray shape contains a zero or empty dimension list");
    }

    let datatype_value = get_required_property(value, "datatype", ctx)?;
    let datatype = parse_datatype(&datatype_value, ctx)?;

    let byteorder = match value.path("/byteorder") {
        Ok(v) => match v.as_str().unwrap_or("little") {
            "big" => ByteOrder::Big,
            "little" => ByteOrder::Little,
            other => {
                ctx.log(LogLevel::Warn, format!("unrecognized byteorder {other:?}, assuming little"));
                ByteOrder::Little
            }
        },
        Err(_) => ByteOrder::Little,
    };

    let offset = value.path("/offset").and_then(|v| as_u64_exact(&v)).unwrap_or(0);

    let strides = match value.path("/strides") {
        Ok(v) => match v.sequence() {
            Ok(items) => {
                let parsed: Result<Vec<i64>, ValueError> = items.map(|v| as_i64_exact(&v)).collect();
                match parsed {
                    Ok(strides) if strides.len() == shape.len() && strides.iter().all(|&s| s != 0) => {
                        Some(strides)
                    }
                    _ => {
                        ctx.log(LogLevel::Warn, "ignoring invalid ndarray strides");
                        None
                    }
                }
            }
            Err(_) => None,
        },
        Err(_) => None,
    };

    Ok(NdarrayMetadata {
        source,
        shape,
        datatype,
        byteorder,
        offset,
        strides,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_sizes_match_known_widths() {
        assert_eq!(ScalarType::Int8.element_size(), Some(1));
        assert_eq!(ScalarType::Float64.element_size(), Some(8));
        assert_eq!(ScalarType::Complex128.element_size(), Some(16));
        assert_eq!(ScalarType::Record.element_size(), None);
    }

    #[test]
    fn contiguous_strides_are_row_major() {
        let meta = NdarrayMetadata {
            source: 0,
            shape: vec![2, 3, 4],
            datatype: ScalarType::UInt8,
            byteorder: ByteOrder::Little,
            offset: 0,
            strides: None,
        };
        assert_eq!(meta.contiguous_strides(), vec![12, 4, 1]);
    }
}
