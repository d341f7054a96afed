//! Tuples and the tuple builder.

use bytes::{Buf, BufMut};

use super::error::RecordError;
use super::schema::{ColumnType, Schema};

/// One row's bytes.
///
/// The storage engine never interprets these; all typed access goes through
/// the getters with a [`Schema`] in hand. In the null bitmap, a set bit
/// means the column is present (NOT NULL).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuple {
    data: Vec<u8>,
}

impl Tuple {
    /// Wraps raw row bytes.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// The row bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True for a zero-length tuple.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether column `i` is NULL. Rows without a bitmap have no NULLs.
    pub fn is_null(&self, schema: &Schema, i: usize) -> bool {
        if !schema.has_null_bitmap() || i >= schema.len() {
            return false;
        }
        let byte = self.data.get(i / 8).copied().unwrap_or(0);
        byte & (1 << (i % 8)) == 0
    }

    fn fixed_cell(&self, schema: &Schema, i: usize, expected: ColumnType) -> Result<&[u8], RecordError> {
        if i >= schema.len() {
            return Err(RecordError::ColumnOutOfRange(i));
        }
        let column = &schema.columns()[i];
        let matches = match (column.ctype, expected) {
            (ColumnType::Char(_), ColumnType::Char(_)) => true,
            (ColumnType::VarChar(_), ColumnType::VarChar(_)) => true,
            (a, b) => a == b,
        };
        if !matches {
            return Err(RecordError::TypeMismatch {
                column: i,
                expected: column.ctype.name(),
            });
        }
        if self.is_null(schema, i) {
            return Err(RecordError::NullValue(i));
        }

        let start = schema.fixed_offset(i);
        let end = start + column.ctype.fixed_width();
        self.data
            .get(start..end)
            .ok_or_else(|| RecordError::Malformed(format!("fixed cell {}..{} out of bounds", start, end)))
    }

    /// Reads an `INT32` column.
    pub fn get_i32(&self, schema: &Schema, i: usize) -> Result<i32, RecordError> {
        let mut cell = self.fixed_cell(schema, i, ColumnType::Int32)?;
        Ok(cell.get_i32_le())
    }

    /// Reads an `INT64` column.
    pub fn get_i64(&self, schema: &Schema, i: usize) -> Result<i64, RecordError> {
        let mut cell = self.fixed_cell(schema, i, ColumnType::Int64)?;
        Ok(cell.get_i64_le())
    }

    /// Reads a `FLOAT32` column.
    pub fn get_f32(&self, schema: &Schema, i: usize) -> Result<f32, RecordError> {
        let mut cell = self.fixed_cell(schema, i, ColumnType::Float32)?;
        Ok(cell.get_f32_le())
    }

    /// Reads a `FLOAT64` column.
    pub fn get_f64(&self, schema: &Schema, i: usize) -> Result<f64, RecordError> {
        let mut cell = self.fixed_cell(schema, i, ColumnType::Float64)?;
        Ok(cell.get_f64_le())
    }

    /// Reads a `DATE` column as days since the epoch.
    pub fn get_date(&self, schema: &Schema, i: usize) -> Result<i32, RecordError> {
        let mut cell = self.fixed_cell(schema, i, ColumnType::Date)?;
        Ok(cell.get_i32_le())
    }

    /// Reads a `CHAR(N)` column, dropping the zero padding.
    pub fn get_char(&self, schema: &Schema, i: usize) -> Result<String, RecordError> {
        let cell = self.fixed_cell(schema, i, ColumnType::Char(0))?;
        let end = cell.iter().position(|&b| b == 0).unwrap_or(cell.len());
        Ok(String::from_utf8_lossy(&cell[..end]).into_owned())
    }

    /// Reads a `VARCHAR` column.
    pub fn get_varchar(&self, schema: &Schema, i: usize) -> Result<String, RecordError> {
        let mut cell = self.fixed_cell(schema, i, ColumnType::VarChar(0))?;
        let offset = cell.get_u16_le() as usize;
        let len = cell.get_u16_le() as usize;
        let payload = self.data.get(offset..offset + len).ok_or_else(|| {
            RecordError::Malformed(format!("varchar payload {}..{} out of bounds", offset, offset + len))
        })?;
        Ok(String::from_utf8_lossy(payload).into_owned())
    }
}

/// The values a builder can hold before assembly.
#[derive(Debug, Clone)]
enum Cell {
    Null,
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Date(i32),
    Str(String),
}

/// Column-by-column row construction.
///
/// ```
/// use quarry::record::{Column, ColumnType, Schema, TupleBuilder};
///
/// let schema = Schema::new(
///     vec![
///         Column::new("id", ColumnType::Int32, false),
///         Column::new("name", ColumnType::VarChar(40), false),
///     ],
///     false,
/// );
///
/// let mut builder = TupleBuilder::new(&schema);
/// builder.set_i32(0, 7).unwrap();
/// builder.set_varchar(1, "seven").unwrap();
/// let tuple = builder.build().unwrap();
///
/// assert_eq!(tuple.get_i32(&schema, 0).unwrap(), 7);
/// assert_eq!(tuple.get_varchar(&schema, 1).unwrap(), "seven");
/// ```
pub struct TupleBuilder<'a> {
    schema: &'a Schema,
    cells: Vec<Option<Cell>>,
}

impl<'a> TupleBuilder<'a> {
    /// Starts an empty row for `schema`.
    pub fn new(schema: &'a Schema) -> Self {
        Self {
            schema,
            cells: vec![None; schema.len()],
        }
    }

    fn column_type(&self, i: usize) -> Result<ColumnType, RecordError> {
        self.schema
            .columns()
            .get(i)
            .map(|c| c.ctype)
            .ok_or(RecordError::ColumnOutOfRange(i))
    }

    fn mismatch(&self, i: usize) -> RecordError {
        RecordError::TypeMismatch {
            column: i,
            expected: self.schema.columns()[i].ctype.name(),
        }
    }

    /// Sets column `i` to NULL.
    pub fn set_null(&mut self, i: usize) -> Result<(), RecordError> {
        if i >= self.schema.len() {
            return Err(RecordError::ColumnOutOfRange(i));
        }
        if !self.schema.has_null_bitmap() || !self.schema.columns()[i].nullable {
            return Err(RecordError::NullNotAllowed(i));
        }
        self.cells[i] = Some(Cell::Null);
        Ok(())
    }

    /// Sets an `INT32` column.
    pub fn set_i32(&mut self, i: usize, v: i32) -> Result<(), RecordError> {
        match self.column_type(i)? {
            ColumnType::Int32 => {
                self.cells[i] = Some(Cell::I32(v));
                Ok(())
            }
            _ => Err(self.mismatch(i)),
        }
    }

    /// Sets an `INT64` column.
    pub fn set_i64(&mut self, i: usize, v: i64) -> Result<(), RecordError> {
        match self.column_type(i)? {
            ColumnType::Int64 => {
                self.cells[i] = Some(Cell::I64(v));
                Ok(())
            }
            _ => Err(self.mismatch(i)),
        }
    }

    /// Sets a `FLOAT32` column.
    pub fn set_f32(&mut self, i: usize, v: f32) -> Result<(), RecordError> {
        match self.column_type(i)? {
            ColumnType::Float32 => {
                self.cells[i] = Some(Cell::F32(v));
                Ok(())
            }
            _ => Err(self.mismatch(i)),
        }
    }

    /// Sets a `FLOAT64` column.
    pub fn set_f64(&mut self, i: usize, v: f64) -> Result<(), RecordError> {
        match self.column_type(i)? {
            ColumnType::Float64 => {
                self.cells[i] = Some(Cell::F64(v));
                Ok(())
            }
            _ => Err(self.mismatch(i)),
        }
    }

    /// Sets a `DATE` column (days since the epoch).
    pub fn set_date(&mut self, i: usize, days: i32) -> Result<(), RecordError> {
        match self.column_type(i)? {
            ColumnType::Date => {
                self.cells[i] = Some(Cell::Date(days));
                Ok(())
            }
            _ => Err(self.mismatch(i)),
        }
    }

    /// Sets a `CHAR(N)` column. Overlong values are truncated to at most N
    /// bytes, backing up to a character boundary.
    pub fn set_char(&mut self, i: usize, v: impl Into<String>) -> Result<(), RecordError> {
        match self.column_type(i)? {
            ColumnType::Char(n) => {
                let mut s: String = v.into();
                if s.len() > n as usize {
                    let mut end = n as usize;
                    while !s.is_char_boundary(end) {
                        end -= 1;
                    }
                    s.truncate(end);
                }
                self.cells[i] = Some(Cell::Str(s));
                Ok(())
            }
            _ => Err(self.mismatch(i)),
        }
    }

    /// Sets a `VARCHAR(max)` column. Overlong values are rejected.
    pub fn set_varchar(&mut self, i: usize, v: impl Into<String>) -> Result<(), RecordError> {
        match self.column_type(i)? {
            ColumnType::VarChar(max) => {
                let s: String = v.into();
                if s.len() > max as usize {
                    return Err(RecordError::ValueTooLong {
                        column: i,
                        max: max as usize,
                        len: s.len(),
                    });
                }
                self.cells[i] = Some(Cell::Str(s));
                Ok(())
            }
            _ => Err(self.mismatch(i)),
        }
    }

    /// Assembles the row. Unset nullable columns become NULL; unset
    /// non-nullable columns are an error.
    pub fn build(self) -> Result<Tuple, RecordError> {
        let schema = self.schema;
        let mut row = vec![0u8; schema.fixed_end()];

        // Var payloads append behind the fixed area as columns are laid
        // down, so cells can be written in one pass.
        for (i, (column, cell)) in schema.columns().iter().zip(&self.cells).enumerate() {
            let is_null = match cell {
                None | Some(Cell::Null) => true,
                Some(_) => false,
            };
            if is_null {
                if !column.nullable || !schema.has_null_bitmap() {
                    return Err(RecordError::NullNotAllowed(i));
                }
                // Bit stays 0 (NULL); the fixed cell stays zeroed.
                continue;
            }
            if schema.has_null_bitmap() {
                row[i / 8] |= 1 << (i % 8);
            }

            let start = schema.fixed_offset(i);
            let width = column.ctype.fixed_width();
            match (column.ctype, cell.as_ref().expect("checked non-null")) {
                (ColumnType::Int32, Cell::I32(v)) => {
                    row[start..start + width].copy_from_slice(&v.to_le_bytes());
                }
                (ColumnType::Int64, Cell::I64(v)) => {
                    row[start..start + width].copy_from_slice(&v.to_le_bytes());
                }
                (ColumnType::Float32, Cell::F32(v)) => {
                    row[start..start + width].copy_from_slice(&v.to_le_bytes());
                }
                (ColumnType::Float64, Cell::F64(v)) => {
                    row[start..start + width].copy_from_slice(&v.to_le_bytes());
                }
                (ColumnType::Date, Cell::Date(v)) => {
                    row[start..start + width].copy_from_slice(&v.to_le_bytes());
                }
                (ColumnType::Char(n), Cell::Str(s)) => {
                    let bytes = s.as_bytes();
                    let copy = bytes.len().min(n as usize);
                    row[start..start + copy].copy_from_slice(&bytes[..copy]);
                    // Remaining cell bytes are already zero padding.
                }
                (ColumnType::VarChar(_), Cell::Str(s)) => {
                    let payload_at = row.len() as u16;
                    let mut fixed = &mut row[start..start + width];
                    fixed.put_u16_le(payload_at);
                    fixed.put_u16_le(s.len() as u16);
                    row.extend_from_slice(s.as_bytes());
                }
                _ => return Err(self.mismatch(i)),
            }
        }

        Ok(Tuple::from_bytes(row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Column;

    fn test_schema() -> Schema {
        Schema::new(
            vec![
                Column::new("id", ColumnType::Int32, false),
                Column::new("code", ColumnType::Char(8), false),
                Column::new("note", ColumnType::VarChar(20), false),
                Column::new("weight", ColumnType::Float64, false),
            ],
            false,
        )
    }

    #[test]
    fn test_build_and_read_back() {
        let schema = test_schema();
        let mut builder = TupleBuilder::new(&schema);
        builder.set_i32(0, -5).unwrap();
        builder.set_char(1, "AB").unwrap();
        builder.set_varchar(2, "variable text").unwrap();
        builder.set_f64(3, 2.75).unwrap();
        let tuple = builder.build().unwrap();

        assert_eq!(tuple.get_i32(&schema, 0).unwrap(), -5);
        assert_eq!(tuple.get_char(&schema, 1).unwrap(), "AB");
        assert_eq!(tuple.get_varchar(&schema, 2).unwrap(), "variable text");
        assert_eq!(tuple.get_f64(&schema, 3).unwrap(), 2.75);
    }

    #[test]
    fn test_type_checks() {
        let schema = test_schema();
        let mut builder = TupleBuilder::new(&schema);
        assert!(matches!(
            builder.set_i64(0, 1),
            Err(RecordError::TypeMismatch { .. })
        ));
        assert!(matches!(
            builder.set_i32(9, 1),
            Err(RecordError::ColumnOutOfRange(9))
        ));

        builder.set_i32(0, 1).unwrap();
        builder.set_char(1, "x").unwrap();
        builder.set_varchar(2, "y").unwrap();
        builder.set_f64(3, 0.0).unwrap();
        let tuple = builder.build().unwrap();
        assert!(matches!(
            tuple.get_i64(&schema, 0),
            Err(RecordError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_char_truncates_varchar_rejects() {
        let schema = test_schema();
        let mut builder = TupleBuilder::new(&schema);
        builder.set_char(1, "longer-than-eight").unwrap();
        assert!(matches!(
            builder.set_varchar(2, "x".repeat(21)),
            Err(RecordError::ValueTooLong { .. })
        ));

        builder.set_i32(0, 1).unwrap();
        builder.set_varchar(2, "ok").unwrap();
        builder.set_f64(3, 0.0).unwrap();
        let tuple = builder.build().unwrap();
        assert_eq!(tuple.get_char(&schema, 1).unwrap(), "longer-t");
    }

    #[test]
    fn test_char_truncation_respects_char_boundaries() {
        let schema = Schema::new(
            vec![Column::new("c", ColumnType::Char(5), false)],
            false,
        );
        let mut builder = TupleBuilder::new(&schema);
        // Five 2-byte chars: byte 5 splits a char, so truncation backs up
        // to 4 bytes.
        builder.set_char(0, "ééééé").unwrap();
        let tuple = builder.build().unwrap();
        assert_eq!(tuple.get_char(&schema, 0).unwrap(), "éé");
    }

    #[test]
    fn test_missing_required_column() {
        let schema = test_schema();
        let mut builder = TupleBuilder::new(&schema);
        builder.set_i32(0, 1).unwrap();
        assert!(matches!(
            builder.build(),
            Err(RecordError::NullNotAllowed(_))
        ));
    }

    #[test]
    fn test_nulls_with_bitmap() {
        let schema = Schema::new(
            vec![
                Column::new("a", ColumnType::Int32, false),
                Column::new("b", ColumnType::VarChar(10), true),
            ],
            true,
        );

        let mut builder = TupleBuilder::new(&schema);
        builder.set_i32(0, 3).unwrap();
        builder.set_null(1).unwrap();
        let tuple = builder.build().unwrap();

        assert!(!tuple.is_null(&schema, 0));
        assert!(tuple.is_null(&schema, 1));
        assert_eq!(tuple.get_i32(&schema, 0).unwrap(), 3);
        assert!(matches!(
            tuple.get_varchar(&schema, 1),
            Err(RecordError::NullValue(1))
        ));

        // Unset nullable column also builds as NULL.
        let mut builder = TupleBuilder::new(&schema);
        builder.set_i32(0, 4).unwrap();
        let tuple = builder.build().unwrap();
        assert!(tuple.is_null(&schema, 1));
    }

    #[test]
    fn test_null_rejected_without_bitmap() {
        let schema = test_schema();
        let mut builder = TupleBuilder::new(&schema);
        assert!(matches!(
            builder.set_null(0),
            Err(RecordError::NullNotAllowed(0))
        ));
    }

    #[test]
    fn test_malformed_varchar_detected() {
        let schema = Schema::new(
            vec![Column::new("v", ColumnType::VarChar(10), false)],
            false,
        );
        // A fixed cell pointing past the end of the row.
        let tuple = Tuple::from_bytes(vec![200, 0, 5, 0]);
        assert!(matches!(
            tuple.get_varchar(&schema, 0),
            Err(RecordError::Malformed(_))
        ));
    }

    #[test]
    fn test_two_varchars_do_not_collide() {
        let schema = Schema::new(
            vec![
                Column::new("a", ColumnType::VarChar(10), false),
                Column::new("b", ColumnType::VarChar(10), false),
            ],
            false,
        );
        let mut builder = TupleBuilder::new(&schema);
        builder.set_varchar(0, "first").unwrap();
        builder.set_varchar(1, "second").unwrap();
        let tuple = builder.build().unwrap();
        assert_eq!(tuple.get_varchar(&schema, 0).unwrap(), "first");
        assert_eq!(tuple.get_varchar(&schema, 1).unwrap(), "second");
    }
}
