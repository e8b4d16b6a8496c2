mod csv;

pub use csv::{parse_datetime, CsvConnector, DATETIME_COLUMN};
