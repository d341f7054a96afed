//! Table schemas: column types and row layout.

/// Column type. Length parameters are part of the type: `Char(n)` occupies
/// exactly `n` bytes in the fixed area, `VarChar(max)` a 4-byte cell
/// pointing into the var area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int32,
    Int64,
    Float32,
    Float64,
    /// Days since the epoch, stored as i32.
    Date,
    /// Fixed-width string, zero-padded, truncated when overlong.
    Char(u16),
    /// Variable-width string with a declared maximum length.
    VarChar(u16),
}

impl ColumnType {
    /// Bytes this type occupies in the fixed area.
    pub fn fixed_width(&self) -> usize {
        match self {
            ColumnType::Int32 | ColumnType::Float32 | ColumnType::Date => 4,
            ColumnType::Int64 | ColumnType::Float64 => 8,
            ColumnType::Char(n) => *n as usize,
            ColumnType::VarChar(_) => 4,
        }
    }

    /// Name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Int32 => "INT32",
            ColumnType::Int64 => "INT64",
            ColumnType::Float32 => "FLOAT32",
            ColumnType::Float64 => "FLOAT64",
            ColumnType::Date => "DATE",
            ColumnType::Char(_) => "CHAR",
            ColumnType::VarChar(_) => "VARCHAR",
        }
    }
}

/// One column definition.
#[derive(Debug, Clone)]
pub struct Column {
    /// Column name, used for display only.
    pub name: String,
    /// The column's type.
    pub ctype: ColumnType,
    /// Whether NULL is storable (requires the schema's null bitmap).
    pub nullable: bool,
}

impl Column {
    /// Creates a column definition.
    pub fn new(name: impl Into<String>, ctype: ColumnType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            ctype,
            nullable,
        }
    }
}

/// A row layout: ordered columns plus precomputed cell offsets.
#[derive(Debug, Clone)]
pub struct Schema {
    columns: Vec<Column>,
    use_null_bitmap: bool,
    /// Offset of each column's fixed cell from the start of the row.
    fixed_offsets: Vec<usize>,
    /// End of the fixed area; the var area starts here.
    fixed_end: usize,
}

impl Schema {
    /// Builds a schema. When `use_null_bitmap` is false the row has no
    /// bitmap and no column may be NULL.
    pub fn new(columns: Vec<Column>, use_null_bitmap: bool) -> Self {
        let bitmap_len = if use_null_bitmap {
            columns.len().div_ceil(8)
        } else {
            0
        };

        let mut fixed_offsets = Vec::with_capacity(columns.len());
        let mut offset = bitmap_len;
        for column in &columns {
            fixed_offsets.push(offset);
            offset += column.ctype.fixed_width();
        }

        Self {
            columns,
            use_null_bitmap,
            fixed_offsets,
            fixed_end: offset,
        }
    }

    /// The column definitions in order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// True for a zero-column schema.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Whether rows carry a null bitmap.
    pub fn has_null_bitmap(&self) -> bool {
        self.use_null_bitmap
    }

    /// Bytes of null bitmap at the start of each row.
    pub fn bitmap_len(&self) -> usize {
        if self.use_null_bitmap {
            self.columns.len().div_ceil(8)
        } else {
            0
        }
    }

    /// Offset of column `i`'s fixed cell from the row start.
    pub fn fixed_offset(&self, i: usize) -> usize {
        self.fixed_offsets[i]
    }

    /// Total length of bitmap plus fixed area; the var area begins here.
    pub fn fixed_end(&self) -> usize {
        self.fixed_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_layout_offsets() {
        let schema = Schema::new(
            vec![
                Column::new("id", ColumnType::Int32, false),
                Column::new("name", ColumnType::Char(25), false),
                Column::new("note", ColumnType::VarChar(100), false),
                Column::new("balance", ColumnType::Float64, false),
            ],
            false,
        );

        assert_eq!(schema.bitmap_len(), 0);
        assert_eq!(schema.fixed_offset(0), 0);
        assert_eq!(schema.fixed_offset(1), 4);
        assert_eq!(schema.fixed_offset(2), 29);
        assert_eq!(schema.fixed_offset(3), 33);
        assert_eq!(schema.fixed_end(), 41);
    }

    #[test]
    fn test_bitmap_shifts_offsets() {
        let schema = Schema::new(
            vec![
                Column::new("a", ColumnType::Int32, true),
                Column::new("b", ColumnType::Int64, true),
            ],
            true,
        );
        assert_eq!(schema.bitmap_len(), 1);
        assert_eq!(schema.fixed_offset(0), 1);
        assert_eq!(schema.fixed_offset(1), 5);
        assert_eq!(schema.fixed_end(), 13);
    }

    #[test]
    fn test_bitmap_len_rounds_up() {
        let columns: Vec<Column> = (0..9)
            .map(|i| Column::new(format!("c{}", i), ColumnType::Int32, true))
            .collect();
        let schema = Schema::new(columns, true);
        assert_eq!(schema.bitmap_len(), 2);
    }
}
