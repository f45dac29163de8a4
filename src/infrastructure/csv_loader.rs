//! CSV order import
//!
//! One row per purchased item:
//!
//! ```text
//! order_id,user_id,item_id,timestamp,categories
//! 1,10,100,1614969000,3;7
//! ```
//!
//! `categories` is optional and holds `;` or `|` separated ids. Time frame
//! attributes are derived from the Unix `timestamp`.

use crate::domain::errors::DataAccessError;
use crate::domain::types::{CategoryId, ItemId, Order, OrderId, Timestamp, UserId};
use crate::infrastructure::in_memory::OrderHistory;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::info;

#[derive(Debug, Deserialize)]
struct OrderRecord {
    order_id: OrderId,
    user_id: UserId,
    item_id: ItemId,
    timestamp: Timestamp,
    #[serde(default)]
    categories: Option<String>,
}

impl OrderRecord {
    fn into_order(self, line: usize) -> Result<Order, DataAccessError> {
        let categories = parse_categories(self.categories.as_deref().unwrap_or(""))
            .map_err(|reason| DataAccessError::Malformed { line, reason })?;
        Order::new(
            self.order_id,
            self.user_id,
            self.item_id,
            categories,
            self.timestamp,
        )
        .map_err(|e| DataAccessError::Malformed {
            line,
            reason: e.to_string(),
        })
    }
}

fn parse_categories(raw: &str) -> Result<BTreeSet<CategoryId>, String> {
    raw.split([';', '|'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<CategoryId>()
                .map_err(|_| format!("invalid category id '{}'", part))
        })
        .collect()
}

fn malformed(error: csv::Error) -> DataAccessError {
    let line = error.position().map(|p| p.line() as usize).unwrap_or(0);
    match error.into_kind() {
        csv::ErrorKind::Io(e) => DataAccessError::Io(e),
        kind => DataAccessError::Malformed {
            line,
            reason: format!("{:?}", kind),
        },
    }
}

/// Parse order rows from any CSV source with a header line.
pub fn read_orders<R: Read>(source: R) -> Result<Vec<Order>, DataAccessError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(source);
    let headers = reader.headers().map_err(malformed)?.clone();

    let mut orders = Vec::new();
    for result in reader.records() {
        let record = result.map_err(malformed)?;
        let line = record.position().map(|p| p.line() as usize).unwrap_or(0);
        let row: OrderRecord =
            record
                .deserialize(Some(&headers))
                .map_err(|e| DataAccessError::Malformed {
                    line,
                    reason: e.to_string(),
                })?;
        orders.push(row.into_order(line)?);
    }
    Ok(orders)
}

/// Load the full order history from a CSV file.
pub fn load_history(path: impl AsRef<Path>) -> Result<OrderHistory, DataAccessError> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let orders = read_orders(BufReader::new(file))?;
    if orders.is_empty() {
        return Err(DataAccessError::EmptyHistory);
    }

    info!("Loaded {} order rows from {:?}", orders.len(), path);
    Ok(OrderHistory::new(orders))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::PartOfDay;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_reads_rows_and_derives_time_frame() {
        let csv = "order_id,user_id,item_id,timestamp,categories\n\
                   1,10,100,1614969000,3;7\n\
                   1,10,101,1614969000,\n";
        let orders = read_orders(csv.as_bytes()).unwrap();

        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].categories, BTreeSet::from([3, 7]));
        assert!(orders[1].categories.is_empty());
        assert_eq!(orders[0].part_of_day, PartOfDay::Evening);
        assert_eq!(orders[0].month, 3);
    }

    #[test]
    fn test_categories_column_is_optional() {
        let csv = "order_id,user_id,item_id,timestamp\n2,20,200,1614931200\n";
        let orders = read_orders(csv.as_bytes()).unwrap();
        assert_eq!(orders[0].part_of_day, PartOfDay::Morning);
    }

    #[test]
    fn test_malformed_row_reports_line() {
        let csv = "order_id,user_id,item_id,timestamp\n\
                   1,10,100,1614969000\n\
                   2,ten,100,1614969000\n";
        match read_orders(csv.as_bytes()) {
            Err(DataAccessError::Malformed { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected malformed error, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_category_is_malformed() {
        let csv = "order_id,user_id,item_id,timestamp,categories\n1,1,1,1614969000,x|2\n";
        let err = read_orders(csv.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("invalid category id 'x'"));
    }

    #[test]
    fn test_load_history_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "order_id,user_id,item_id,timestamp,categories").unwrap();
        writeln!(file, "2,1,5,1614969600,1").unwrap();
        writeln!(file, "1,1,4,1614969000,1|2").unwrap();

        let history = load_history(file.path()).unwrap();
        assert_eq!(history.len(), 2);
        // sorted by timestamp
        assert_eq!(history.orders()[0].order_id, 1);
    }

    #[test]
    fn test_empty_file_is_empty_history() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "order_id,user_id,item_id,timestamp").unwrap();
        assert!(matches!(
            load_history(file.path()),
            Err(DataAccessError::EmptyHistory)
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        assert!(matches!(
            load_history("/nonexistent/orders.csv"),
            Err(DataAccessError::Io(_))
        ));
    }
}
