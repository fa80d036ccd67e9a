/// Archive primary keys are PostgreSQL `SERIAL` (int4).
pub type DbId = i32;

/// Key of a row visited by a repair pass. Any integer key column is read as
/// `bigint`, so one type covers every table.
pub type RowKey = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
