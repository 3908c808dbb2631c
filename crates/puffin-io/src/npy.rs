//! Structured `.npy` reading and writing for [`FeatureTable`].
//!
//! Tables are stored as a 1-D record array: one record per track, one
//! `<f8` field per column (with a `(m,)` subarray shape for vector
//! columns). The header is a Python dict literal, space padded so the data
//! starts on a 64-byte boundary.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use tracing::{debug, instrument};

use crate::IoError;
use crate::table::{Column, FeatureTable};

const MAGIC: &[u8; 6] = b"\x93NUMPY";
const ALIGN: usize = 64;
const FLOAT_DTYPE: &str = "<f8";

/// Serialize a table to `.npy` bytes.
#[must_use]
pub fn encode_table(table: &FeatureTable) -> Vec<u8> {
    let dict = header_dict(table);

    // Version 1.0 has a u16 header length; switch to 2.0 when it overflows.
    let (version, len_bytes) = if padded_len(&dict, 2) <= usize::from(u16::MAX) {
        (1u8, 2)
    } else {
        (2u8, 4)
    };
    let header_len = padded_len(&dict, len_bytes);

    let mut out = Vec::with_capacity(MAGIC.len() + 2 + len_bytes + header_len + table.values().len() * 8);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[version, 0]);
    if version == 1 {
        out.extend_from_slice(&(header_len as u16).to_le_bytes());
    } else {
        out.extend_from_slice(&(header_len as u32).to_le_bytes());
    }
    out.extend_from_slice(dict.as_bytes());
    out.resize(out.len() + header_len - dict.len() - 1, b' ');
    out.push(b'\n');
    for v in table.values() {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Write `table` to `path`. A partially written file is removed on failure.
///
/// # Errors
///
/// Returns [`IoError::WriteFile`] if the file cannot be written.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn write_table(path: &Path, table: &FeatureTable) -> Result<(), IoError> {
    let bytes = encode_table(table);
    if let Err(source) = fs::write(path, &bytes) {
        let _ = fs::remove_file(path);
        return Err(IoError::WriteFile {
            path: path.to_path_buf(),
            source,
        });
    }
    debug!(size_bytes = bytes.len(), n_rows = table.n_rows(), "npy table written");
    Ok(())
}

/// Read a table written by [`write_table`] or by numpy.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::FileNotFound`] | file cannot be read |
/// | [`IoError::NpyHeader`] | bad magic, version, header, or data length |
/// | [`IoError::UnsupportedDtype`] | anything but a record array of `<f8` fields |
#[instrument(skip_all, fields(path = %path.display()))]
pub fn read_table(path: &Path) -> Result<FeatureTable, IoError> {
    let bytes = fs::read(path).map_err(|source| IoError::FileNotFound {
        path: path.to_path_buf(),
        source,
    })?;
    let table = decode_table(&bytes).map_err(|e| match e {
        DecodeError::Header(reason) => IoError::NpyHeader {
            path: path.to_path_buf(),
            reason,
        },
        DecodeError::Dtype(descr) => IoError::UnsupportedDtype {
            path: path.to_path_buf(),
            descr,
        },
        DecodeError::Table(e) => e,
    })?;
    debug!(n_rows = table.n_rows(), n_columns = table.n_columns(), "npy table read");
    Ok(table)
}

#[derive(Debug)]
enum DecodeError {
    Header(String),
    Dtype(String),
    Table(IoError),
}

fn header_dict(table: &FeatureTable) -> String {
    let mut descr = String::from("[");
    for (i, column) in table.columns().iter().enumerate() {
        if i > 0 {
            descr.push_str(", ");
        }
        let _ = match column.width() {
            1 => write!(descr, "('{}', '{FLOAT_DTYPE}')", column.name()),
            m => write!(descr, "('{}', '{FLOAT_DTYPE}', ({m},))", column.name()),
        };
    }
    descr.push(']');
    format!(
        "{{'descr': {descr}, 'fortran_order': False, 'shape': ({},), }}",
        table.n_rows()
    )
}

/// Header length including padding and the trailing newline.
fn padded_len(dict: &str, len_bytes: usize) -> usize {
    let unpadded = MAGIC.len() + 2 + len_bytes + dict.len() + 1;
    dict.len() + 1 + ALIGN - unpadded % ALIGN
}

fn decode_table(bytes: &[u8]) -> Result<FeatureTable, DecodeError> {
    let header_err = |reason: &str| DecodeError::Header(reason.to_string());

    if bytes.len() < MAGIC.len() + 4 || &bytes[..MAGIC.len()] != MAGIC {
        return Err(header_err("missing \\x93NUMPY magic"));
    }
    let major = bytes[MAGIC.len()];
    let (header_len, header_start) = match major {
        1 => (
            usize::from(u16::from_le_bytes([bytes[8], bytes[9]])),
            10,
        ),
        2 | 3 if bytes.len() >= 12 => (
            u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize,
            12,
        ),
        _ => return Err(DecodeError::Header(format!("unsupported format version {major}"))),
    };
    let data_start = header_start + header_len;
    let header = bytes
        .get(header_start..data_start)
        .ok_or_else(|| header_err("header runs past end of file"))?;
    let header = std::str::from_utf8(header).map_err(|_| header_err("header is not UTF-8"))?;

    let Literal::Dict(entries) = parse_literal(header).map_err(DecodeError::Header)? else {
        return Err(header_err("header is not a dict"));
    };
    let lookup = |key: &str| {
        entries
            .iter()
            .find_map(|(k, v)| matches!(k, Literal::Str(s) if s == key).then_some(v))
            .ok_or_else(|| DecodeError::Header(format!("header has no '{key}' entry")))
    };

    let descr = lookup("descr")?;
    let columns = columns_from_descr(descr).ok_or_else(|| DecodeError::Dtype(descr.to_string()))?;

    if !matches!(lookup("fortran_order")?, Literal::Bool(_)) {
        return Err(header_err("'fortran_order' is not a bool"));
    }
    let n_rows = match lookup("shape")? {
        Literal::Tuple(dims) => match dims.as_slice() {
            [Literal::Int(n)] if *n >= 0 => *n as usize,
            _ => return Err(header_err("expected a 1-D shape")),
        },
        _ => return Err(header_err("'shape' is not a tuple")),
    };

    let expected_len = columns
        .iter()
        .try_fold(0usize, |acc, c| acc.checked_add(c.width()))
        .and_then(|width| width.checked_mul(n_rows))
        .and_then(|n| n.checked_mul(8))
        .ok_or_else(|| header_err("shape and dtype overflow the addressable size"))?;
    let data = &bytes[data_start..];
    if data.len() != expected_len {
        return Err(DecodeError::Header(format!(
            "expected {expected_len} data bytes for shape ({n_rows},), found {}",
            data.len()
        )));
    }
    let values = data
        .chunks_exact(8)
        .map(|chunk| {
            let mut le = [0u8; 8];
            le.copy_from_slice(chunk);
            f64::from_le_bytes(le)
        })
        .collect();

    FeatureTable::from_flat(columns, values).map_err(DecodeError::Table)
}

/// Map a record `descr` list to columns; `None` for anything that is not all `<f8`.
fn columns_from_descr(descr: &Literal) -> Option<Vec<Column>> {
    let Literal::List(fields) = descr else {
        return None;
    };
    if fields.is_empty() {
        return None;
    }
    fields
        .iter()
        .map(|field| match field {
            Literal::Tuple(parts) => match parts.as_slice() {
                [Literal::Str(name), Literal::Str(dtype)] if dtype == FLOAT_DTYPE => {
                    Some(Column::new(name.clone(), 1))
                }
                [Literal::Str(name), Literal::Str(dtype), Literal::Tuple(shape)] if dtype == FLOAT_DTYPE => {
                    match shape.as_slice() {
                        [Literal::Int(m)] if *m >= 1 => Some(Column::new(name.clone(), *m as usize)),
                        _ => None,
                    }
                }
                _ => None,
            },
            _ => None,
        })
        .collect()
}

/// The subset of Python literals that appears in `.npy` headers.
#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Str(String),
    Int(i64),
    Bool(bool),
    None,
    Tuple(Vec<Literal>),
    List(Vec<Literal>),
    Dict(Vec<(Literal, Literal)>),
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Str(s) => write!(f, "'{s}'"),
            Literal::Int(n) => write!(f, "{n}"),
            Literal::Bool(true) => f.write_str("True"),
            Literal::Bool(false) => f.write_str("False"),
            Literal::None => f.write_str("None"),
            Literal::Tuple(items) => write_seq(f, items, "(", ")"),
            Literal::List(items) => write_seq(f, items, "[", "]"),
            Literal::Dict(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

fn write_seq(f: &mut std::fmt::Formatter<'_>, items: &[Literal], open: &str, close: &str) -> std::fmt::Result {
    f.write_str(open)?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    // One-element tuples keep their comma.
    if open == "(" && items.len() == 1 {
        f.write_str(",")?;
    }
    f.write_str(close)
}

fn parse_literal(text: &str) -> Result<Literal, String> {
    let mut parser = LiteralParser {
        src: text.as_bytes(),
        pos: 0,
    };
    let value = parser.value()?;
    parser.skip_ws();
    if parser.pos != parser.src.len() {
        return Err(format!("trailing characters at offset {}", parser.pos));
    }
    Ok(value)
}

struct LiteralParser<'a> {
    src: &'a [u8],
    pos: usize,
}

impl LiteralParser<'_> {
    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn value(&mut self) -> Result<Literal, String> {
        self.skip_ws();
        match self.peek() {
            Some(q @ (b'\'' | b'"')) => self.string(q).map(Literal::Str),
            Some(b'(') => self.sequence(b')').map(Literal::Tuple),
            Some(b'[') => self.sequence(b']').map(Literal::List),
            Some(b'{') => self.dict(),
            Some(b) if b == b'-' || b.is_ascii_digit() => self.int(),
            Some(b) if b.is_ascii_alphabetic() => self.keyword(),
            Some(b) => Err(format!("unexpected '{}' at offset {}", b as char, self.pos)),
            None => Err("unexpected end of header".into()),
        }
    }

    fn string(&mut self, quote: u8) -> Result<String, String> {
        self.pos += 1;
        let mut out = Vec::new();
        while let Some(b) = self.peek() {
            self.pos += 1;
            match b {
                b'\\' => {
                    let escaped = self.peek().ok_or("unterminated escape")?;
                    out.push(escaped);
                    self.pos += 1;
                }
                b if b == quote => {
                    return String::from_utf8(out).map_err(|_| "string is not UTF-8".to_string());
                }
                b => out.push(b),
            }
        }
        Err("unterminated string".into())
    }

    fn int(&mut self) -> Result<Literal, String> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        // Python 2 era headers write shapes as `3L`.
        let digits = std::str::from_utf8(&self.src[start..self.pos]).map_err(|e| e.to_string())?;
        if self.peek() == Some(b'L') {
            self.pos += 1;
        }
        digits
            .parse()
            .map(Literal::Int)
            .map_err(|_| format!("bad integer at offset {start}"))
    }

    fn keyword(&mut self) -> Result<Literal, String> {
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_') {
            self.pos += 1;
        }
        match &self.src[start..self.pos] {
            b"True" => Ok(Literal::Bool(true)),
            b"False" => Ok(Literal::Bool(false)),
            b"None" => Ok(Literal::None),
            other => Err(format!("unknown name {:?}", String::from_utf8_lossy(other))),
        }
    }

    /// Comma-separated items up to `close`; a trailing comma is allowed.
    fn sequence(&mut self, close: u8) -> Result<Vec<Literal>, String> {
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok(items);
            }
            items.push(self.value()?);
            self.expect_separator(close)?;
        }
    }

    fn dict(&mut self) -> Result<Literal, String> {
        self.pos += 1;
        let mut entries = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(b'}') {
                self.pos += 1;
                return Ok(Literal::Dict(entries));
            }
            let key = self.value()?;
            self.skip_ws();
            if self.peek() != Some(b':') {
                return Err(format!("expected ':' at offset {}", self.pos));
            }
            self.pos += 1;
            let value = self.value()?;
            entries.push((key, value));
            self.expect_separator(b'}')?;
        }
    }

    fn expect_separator(&mut self, close: u8) -> Result<(), String> {
        self.skip_ws();
        match self.peek() {
            Some(b',') => {
                self.pos += 1;
                Ok(())
            }
            Some(b) if b == close => Ok(()),
            _ => Err(format!("expected ',' or '{}' at offset {}", close as char, self.pos)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label_x_y() -> FeatureTable {
        let columns = vec![Column::new("label", 1), Column::new("x", 1), Column::new("y", 1)];
        let rows = vec![vec![0.0, 1.0, 4.0], vec![1.0, 2.0, 5.0], vec![0.0, 3.0, 6.0]];
        FeatureTable::from_rows(columns, &rows).unwrap()
    }

    #[test]
    fn header_matches_numpy_layout() {
        let bytes = encode_table(&label_x_y());
        assert_eq!(&bytes[..8], b"\x93NUMPY\x01\x00");
        let header_len = usize::from(u16::from_le_bytes([bytes[8], bytes[9]]));
        assert_eq!((10 + header_len) % ALIGN, 0);

        let header = std::str::from_utf8(&bytes[10..10 + header_len]).unwrap();
        assert!(header.starts_with(
            "{'descr': [('label', '<f8'), ('x', '<f8'), ('y', '<f8')], 'fortran_order': False, 'shape': (3,), }"
        ));
        assert!(header.ends_with('\n'));
        assert_eq!(bytes.len(), 10 + header_len + 9 * 8);
    }

    #[test]
    fn vector_columns_round_trip() {
        let columns = vec![Column::new("isPuff", 1), Column::new("pos", 3)];
        let table = FeatureTable::from_flat(columns, vec![1.0, 0.1, 0.2, 0.3, 0.0, -1.5, 2.5, 1e300]).unwrap();
        let bytes = encode_table(&table);
        let header = String::from_utf8_lossy(&bytes[10..]);
        assert!(header.contains("('pos', '<f8', (3,))"));

        let decoded = decode_table(&bytes).unwrap();
        assert_eq!(decoded, table);
    }

    #[test]
    fn empty_table_encodes_zero_shape() {
        let table = FeatureTable::from_rows(vec![Column::new("label", 1)], &[]).unwrap();
        let bytes = encode_table(&table);
        assert!(String::from_utf8_lossy(&bytes).contains("'shape': (0,)"));
        assert_eq!(decode_table(&bytes).unwrap().n_rows(), 0);
    }

    #[test]
    fn reads_numpy_written_header_variants() {
        // Older numpy pads to 16 bytes and orders keys differently.
        let dict = "{'fortran_order': False, 'shape': (2L,), 'descr': [(\"a\", '<f8'), ('b', '<f8')]}";
        let mut bytes = b"\x93NUMPY\x01\x00".to_vec();
        bytes.extend_from_slice(&((dict.len() + 1) as u16).to_le_bytes());
        bytes.extend_from_slice(dict.as_bytes());
        bytes.push(b'\n');
        for v in [1.0f64, 2.0, 3.0, 4.0] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let table = decode_table(&bytes).unwrap();
        assert_eq!(table.column_names(), vec!["a", "b"]);
        assert_eq!(table.row(1), Some(&[3.0, 4.0][..]));
    }

    #[test]
    fn rejects_plain_and_integer_arrays() {
        for descr in ["'<f8'", "[('label', '<i8'), ('x', '<f8')]", "[]"] {
            let dict = format!("{{'descr': {descr}, 'fortran_order': False, 'shape': (3,), }}");
            let mut bytes = b"\x93NUMPY\x01\x00".to_vec();
            bytes.extend_from_slice(&(dict.len() as u16).to_le_bytes());
            bytes.extend_from_slice(dict.as_bytes());
            assert!(
                matches!(decode_table(&bytes), Err(DecodeError::Dtype(_))),
                "accepted {descr}"
            );
        }
    }

    #[test]
    fn rejects_bad_magic_and_truncated_data() {
        assert!(matches!(decode_table(b"PK\x03\x04 not npy"), Err(DecodeError::Header(_))));
        let mut bytes = encode_table(&label_x_y());
        bytes.truncate(bytes.len() - 8);
        assert!(matches!(decode_table(&bytes), Err(DecodeError::Header(_))));
    }

    #[test]
    fn oversized_shape_is_a_header_error() {
        for (descr, rows) in [
            ("[('a', '<f8')]", "2305843009213693952"),
            ("[('a', '<f8', (9223372036854775807,)), ('b', '<f8', (9223372036854775807,))]", "1"),
        ] {
            let dict = format!("{{'descr': {descr}, 'fortran_order': False, 'shape': ({rows},), }}");
            let mut bytes = b"\x93NUMPY\x01\x00".to_vec();
            bytes.extend_from_slice(&(dict.len() as u16).to_le_bytes());
            bytes.extend_from_slice(dict.as_bytes());
            bytes.extend_from_slice(&1.0f64.to_le_bytes());
            assert!(
                matches!(decode_table(&bytes), Err(DecodeError::Header(_))),
                "accepted shape ({rows},) with {descr}"
            );
        }
    }

    #[test]
    fn literal_parser_handles_nesting() {
        let lit = parse_literal("{'a': [(1, 'x'), ()], 'b': None, 'c': (-2,),}").unwrap();
        assert_eq!(lit.to_string(), "{'a': [(1, 'x'), ()], 'b': None, 'c': (-2,)}");
        assert!(parse_literal("{'a' 1}").is_err());
        assert!(parse_literal("[1, 2").is_err());
    }
}
