//! Row scans with offset, limit and ordering.
//!
//! Rows are exposed as two string columns, `key` and `value`, decoded
//! lossily from their raw bytes.

use crate::cursor::Cursor;
use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::str::FromStr;

/// Column names produced by a scan.
pub const COLUMNS: [&str; 2] = ["key", "value"];

/// Column a scan can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    /// The row key.
    Key,
    /// The row data.
    Value,
}

impl FromStr for Column {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "key" => Ok(Column::Key),
            "value" => Ok(Column::Value),
            other => Err(Error::invalid_argument(format!("Unknown column: {}", other))),
        }
    }
}

/// Ordering function of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderFn {
    /// Ascending, compared as strings.
    StrAsc,
    /// Descending, compared as strings.
    StrDesc,
    /// Ascending, compared as numbers.
    NumAsc,
    /// Descending, compared as numbers.
    NumDesc,
}

impl FromStr for OrderFn {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "STRASC" => Ok(OrderFn::StrAsc),
            "STRDSC" => Ok(OrderFn::StrDesc),
            "NUMASC" => Ok(OrderFn::NumAsc),
            "NUMDSC" => Ok(OrderFn::NumDesc),
            other => Err(Error::invalid_argument(format!(
                "Unknown order function: {} (one of: STRASC, STRDSC, NUMASC, NUMDSC)",
                other
            ))),
        }
    }
}

impl OrderFn {
    fn compare(&self, a: &str, b: &str) -> Ordering {
        match self {
            OrderFn::StrAsc => a.cmp(b),
            OrderFn::StrDesc => b.cmp(a),
            OrderFn::NumAsc => compare_numeric(a, b),
            OrderFn::NumDesc => compare_numeric(b, a),
        }
    }
}

/// Numbers compare by value; anything that doesn't parse sorts after every
/// number and among itself as a string.
fn compare_numeric(a: &str, b: &str) -> Ordering {
    match (a.trim().parse::<f64>(), b.trim().parse::<f64>()) {
        (Ok(x), Ok(y)) => x.total_cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// A scan over the rows of a cursor.
#[derive(Debug, Clone, Default)]
pub struct Scan {
    limit: Option<usize>,
    offset: usize,
    order: Option<(Column, OrderFn)>,
}

impl Scan {
    /// Create a scan that emits every row in body order.
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit at most `limit` rows.
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = Some(limit);
    }

    /// Skip the first `offset` rows.
    pub fn set_offset(&mut self, offset: usize) {
        self.offset = offset;
    }

    /// Order rows by `column` using `order_fn`. Ordered scans buffer every
    /// row before emitting any.
    pub fn set_order_by(&mut self, column: Column, order_fn: OrderFn) {
        self.order = Some((column, order_fn));
    }

    /// Column names of the emitted rows.
    pub fn column_names(&self) -> Vec<String> {
        COLUMNS.iter().map(|c| c.to_string()).collect()
    }

    /// Run the scan from the cursor's current row, calling `emit` for every
    /// selected row. Returns the number of rows emitted.
    pub fn execute<C, F>(&self, cursor: &mut C, mut emit: F) -> Result<usize>
    where
        C: Cursor + ?Sized,
        F: FnMut(&[String]),
    {
        let limit = self.limit.unwrap_or(usize::MAX);

        let Some((column, order_fn)) = self.order else {
            let mut seen = 0;
            let mut emitted = 0;
            while cursor.valid() && emitted < limit {
                if seen >= self.offset {
                    emit(&[cursor.key_string()?, cursor.data_string()?]);
                    emitted += 1;
                }
                seen += 1;
                cursor.next()?;
            }
            return Ok(emitted);
        };

        let mut rows = Vec::new();
        while cursor.valid() {
            rows.push([cursor.key_string()?, cursor.data_string()?]);
            cursor.next()?;
        }

        let idx = match column {
            Column::Key => 0,
            Column::Value => 1,
        };
        rows.sort_by(|a, b| order_fn.compare(&a[idx], &b[idx]));

        let mut emitted = 0;
        for row in rows.iter().skip(self.offset).take(limit) {
            emit(row);
            emitted += 1;
        }
        Ok(emitted)
    }
}
