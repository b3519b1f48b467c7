//! JSON rendering of property values, streamed straight into a
//! [`fmt::Write`] sink.

use crate::error::FormatError;
use crate::value::{PropertyValue, Scalar};
use std::fmt::{self, Write as _};
use std::io;

/// Writes a [`PropertyValue`] as a single JSON value.
///
/// Implementations must write valid JSON or return an error; the
/// formatter does not attempt to repair a partially written value.
pub trait ValueFormatter: Send + Sync {
    fn format(&self, value: &PropertyValue, out: &mut dyn fmt::Write) -> Result<(), FormatError>;
}

/// Default [`ValueFormatter`]: sequences become arrays, structures and
/// dictionaries become objects. A structure's type tag is written last,
/// under `type_tag_name`.
#[derive(Debug, Clone)]
pub struct JsonValueFormatter {
    type_tag_name: String,
}

impl JsonValueFormatter {
    pub fn new(type_tag_name: impl Into<String>) -> Self {
        Self { type_tag_name: type_tag_name.into() }
    }

    pub fn type_tag_name(&self) -> &str {
        &self.type_tag_name
    }

    fn write_scalar(&self, scalar: &Scalar, out: &mut dyn fmt::Write) -> Result<(), FormatError> {
        match scalar {
            Scalar::Null => out.write_str("null")?,
            Scalar::Bool(b) => out.write_str(if *b { "true" } else { "false" })?,
            Scalar::I64(n) => write!(out, "{}", n)?,
            Scalar::U64(n) => write!(out, "{}", n)?,
            // non-finite floats come out as `null`
            Scalar::F64(n) => to_sink(n, out)?,
            Scalar::Str(s) => write_quoted_json(s, out)?,
        }
        Ok(())
    }
}

impl Default for JsonValueFormatter {
    fn default() -> Self {
        Self::new("$type")
    }
}

impl ValueFormatter for JsonValueFormatter {
    fn format(&self, value: &PropertyValue, out: &mut dyn fmt::Write) -> Result<(), FormatError> {
        match value {
            PropertyValue::Scalar(scalar) => self.write_scalar(scalar, out),
            PropertyValue::Sequence(items) => {
                out.write_char('[')?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.write_char(',')?;
                    }
                    self.format(item, out)?;
                }
                out.write_char(']')?;
                Ok(())
            }
            PropertyValue::Structure { type_tag, properties } => {
                out.write_char('{')?;
                let mut first = true;
                for (name, item) in properties {
                    if !first {
                        out.write_char(',')?;
                    }
                    first = false;
                    write_quoted_json(name, out)?;
                    out.write_char(':')?;
                    self.format(item, out)?;
                }
                if let Some(tag) = type_tag {
                    if !first {
                        out.write_char(',')?;
                    }
                    write_quoted_json(&self.type_tag_name, out)?;
                    out.write_char(':')?;
                    write_quoted_json(tag, out)?;
                }
                out.write_char('}')?;
                Ok(())
            }
            PropertyValue::Dictionary(entries) => {
                out.write_char('{')?;
                for (i, (key, item)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.write_char(',')?;
                    }
                    write_quoted_json(&key.to_string(), out)?;
                    out.write_char(':')?;
                    self.format(item, out)?;
                }
                out.write_char('}')?;
                Ok(())
            }
        }
    }
}

/// Write `s` as a quoted, escaped JSON string.
pub fn write_quoted_json(s: &str, out: &mut dyn fmt::Write) -> Result<(), FormatError> {
    to_sink(s, out)
}

fn to_sink<T: serde::Serialize + ?Sized>(value: &T, out: &mut dyn fmt::Write) -> Result<(), FormatError> {
    let mut adapter = FmtAdapter { inner: out };
    serde_json::to_writer(&mut adapter, value).map_err(|err| {
        if err.is_io() {
            FormatError::Write(fmt::Error)
        } else {
            FormatError::from(err)
        }
    })
}

/// Lets `serde_json` stream into a `fmt::Write`. serde_json only splits
/// string output at ASCII escape points, so every chunk is valid UTF-8.
struct FmtAdapter<'a> {
    inner: &'a mut dyn fmt::Write,
}

impl io::Write for FmtAdapter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = std::str::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.inner
            .write_str(s)
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "sink rejected write"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
