use thiserror::Error;

/// Errors related to k-fold time partitioning
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PartitionError {
    #[error("Not enough orders to split into {folds} folds: {orders} orders")]
    NotEnoughOrders { folds: usize, orders: usize },

    #[error("Fold index {fold} out of range for {folds} folds")]
    FoldOutOfRange { fold: usize, folds: usize },

    #[error("Partition boundaries have not been built")]
    NotBuilt,
}

/// Errors raised by data-access collaborators
#[derive(Debug, Error)]
pub enum DataAccessError {
    #[error("Failed to read order source: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed order record at line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("Order history is empty")]
    EmptyHistory,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_error_formatting() {
        let error = PartitionError::NotEnoughOrders {
            folds: 5,
            orders: 3,
        };

        let msg = error.to_string();
        assert!(msg.contains("5 folds"));
        assert!(msg.contains("3 orders"));
    }

    #[test]
    fn test_malformed_record_formatting() {
        let error = DataAccessError::Malformed {
            line: 12,
            reason: "missing item_id".to_string(),
        };

        let msg = error.to_string();
        assert!(msg.contains("line 12"));
        assert!(msg.contains("missing item_id"));
    }
}
