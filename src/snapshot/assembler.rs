use std::collections::HashSet;

use super::engine::Snapshot;
use super::error::SnapshotError;

/// One output column after the address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Column {
    Native,
    Token(String),
}

/// Header plus rows, ready for serialization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Lays a [`Snapshot`] out as rows in a fixed column order.
#[derive(Debug, Clone)]
pub struct SnapshotAssembler {
    native_symbol: String,
    columns: Vec<Column>,
}

impl SnapshotAssembler {
    /// Native column first, then `tracked` in order.
    pub fn new<S: AsRef<str>>(native_symbol: &str, tracked: &[S]) -> Self {
        let columns = std::iter::once(Column::Native)
            .chain(tracked.iter().map(|s| Column::Token(s.as_ref().to_string())))
            .collect();
        Self {
            native_symbol: native_symbol.to_string(),
            columns,
        }
    }

    /// Explicit order by name; the native symbol names the native column.
    ///
    /// Every tracked symbol must appear exactly once and nothing else may.
    pub fn with_order<S: AsRef<str>, T: AsRef<str>>(
        native_symbol: &str,
        tracked: &[T],
        order: &[S],
    ) -> Result<Self, SnapshotError> {
        let tracked: HashSet<&str> = tracked.iter().map(|s| s.as_ref()).collect();
        let mut seen = HashSet::new();
        let mut columns = Vec::with_capacity(order.len());

        for name in order {
            let name = name.as_ref();
            if !seen.insert(name) {
                return Err(SnapshotError::Configuration(format!(
                    "column {} listed twice",
                    name
                )));
            }
            if name == native_symbol {
                columns.push(Column::Native);
            } else if tracked.contains(name) {
                columns.push(Column::Token(name.to_string()));
            } else {
                return Err(SnapshotError::Configuration(format!(
                    "column {} is not a tracked symbol",
                    name
                )));
            }
        }

        if !seen.contains(native_symbol) {
            return Err(SnapshotError::Configuration(format!(
                "column order is missing the native column {}",
                native_symbol
            )));
        }
        if let Some(missing) = tracked.iter().find(|s| !seen.contains(*s)) {
            return Err(SnapshotError::Configuration(format!(
                "column order is missing tracked symbol {}",
                missing
            )));
        }

        Ok(Self {
            native_symbol: native_symbol.to_string(),
            columns,
        })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn header(&self) -> Vec<String> {
        std::iter::once("address".to_string())
            .chain(self.columns.iter().map(|c| match c {
                Column::Native => self.native_symbol.clone(),
                Column::Token(symbol) => symbol.clone(),
            }))
            .collect()
    }

    pub fn assemble(&self, snapshot: &Snapshot) -> Result<SnapshotTable, SnapshotError> {
        let mut rows = Vec::with_capacity(snapshot.records.len());
        for record in &snapshot.records {
            let mut row = Vec::with_capacity(self.columns.len() + 1);
            row.push(record.account.to_string());
            for column in &self.columns {
                let amount = match column {
                    Column::Native => &record.native_amount,
                    Column::Token(symbol) => record.token_amounts.get(symbol).ok_or_else(|| {
                        SnapshotError::Configuration(format!(
                            "no {} amount for {}",
                            symbol, record.account
                        ))
                    })?,
                };
                row.push(amount.clone());
            }
            rows.push(row);
        }

        Ok(SnapshotTable {
            header: self.header(),
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::client::{Account, BlockReference};
    use crate::snapshot::engine::BalanceRecord;
    use std::collections::BTreeMap;

    fn snapshot() -> Snapshot {
        let record = |account: &str, native: &str, usdt: &str, dai: &str| BalanceRecord {
            account: Account::new(account),
            native_amount: native.to_string(),
            token_amounts: BTreeMap::from([
                ("USDT".to_string(), usdt.to_string()),
                ("DAI".to_string(), dai.to_string()),
            ]),
        };
        Snapshot {
            block: BlockReference(1),
            tracked: vec!["USDT".to_string(), "DAI".to_string()],
            records: vec![
                record("0xa", "0.5", "1.5", "2.0"),
                record("0xb", "0.0", "0.0", "3.25"),
            ],
        }
    }

    #[test]
    fn test_default_order() {
        let table = SnapshotAssembler::new("ETH", &["USDT", "DAI"])
            .assemble(&snapshot())
            .unwrap();
        assert_eq!(table.header, vec!["address", "ETH", "USDT", "DAI"]);
        assert_eq!(table.rows[0], vec!["0xa", "0.5", "1.5", "2.0"]);
        assert_eq!(table.rows[1], vec!["0xb", "0.0", "0.0", "3.25"]);
    }

    #[test]
    fn test_custom_order() {
        let assembler =
            SnapshotAssembler::with_order("ETH", &["USDT", "DAI"], &["USDT", "ETH", "DAI"]).unwrap();
        let table = assembler.assemble(&snapshot()).unwrap();
        assert_eq!(table.header, vec!["address", "USDT", "ETH", "DAI"]);
        assert_eq!(table.rows[0], vec!["0xa", "1.5", "0.5", "2.0"]);
    }

    #[test]
    fn test_custom_order_must_cover_tracked() {
        assert!(SnapshotAssembler::with_order("ETH", &["USDT", "DAI"], &["USDT", "ETH"]).is_err());
        assert!(SnapshotAssembler::with_order("ETH", &["USDT"], &["USDT"]).is_err());
        assert!(SnapshotAssembler::with_order("ETH", &["USDT"], &["ETH", "USDT", "FOO"]).is_err());
        assert!(SnapshotAssembler::with_order("ETH", &["USDT"], &["ETH", "USDT", "USDT"]).is_err());
    }

    #[test]
    fn test_missing_amount_is_an_error() {
        let err = SnapshotAssembler::new("ETH", &["LINK"])
            .assemble(&snapshot())
            .unwrap_err();
        assert!(err.is_configuration());
    }
}
