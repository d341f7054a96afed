//! Record codec errors.

/// Errors from building or reading typed tuples.
#[derive(Debug)]
pub enum RecordError {
    /// Column index past the schema's column count.
    ColumnOutOfRange(usize),

    /// A setter or getter was used with the wrong type for the column.
    TypeMismatch {
        /// Column index.
        column: usize,
        /// The column's declared type.
        expected: &'static str,
    },

    /// A varchar value exceeds the column's declared maximum.
    ValueTooLong {
        /// Column index.
        column: usize,
        /// Declared maximum length.
        max: usize,
        /// Offered value length.
        len: usize,
    },

    /// NULL assigned to a non-nullable column, or used without a bitmap.
    NullNotAllowed(usize),

    /// A getter hit a NULL value.
    NullValue(usize),

    /// The tuple bytes do not decode against the schema.
    Malformed(String),
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordError::ColumnOutOfRange(i) => write!(f, "column {} out of range", i),
            RecordError::TypeMismatch { column, expected } => {
                write!(f, "column {} is {}, wrong accessor", column, expected)
            }
            RecordError::ValueTooLong { column, max, len } => {
                write!(f, "column {}: value of {} bytes exceeds max {}", column, len, max)
            }
            RecordError::NullNotAllowed(i) => write!(f, "column {} cannot be NULL", i),
            RecordError::NullValue(i) => write!(f, "column {} is NULL", i),
            RecordError::Malformed(msg) => write!(f, "malformed tuple: {}", msg),
        }
    }
}

impl std::error::Error for RecordError {}
