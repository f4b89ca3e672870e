//! CSV I/O - account list in, balance snapshot out
//!
//! Input: a header row with an `address` column (any position), one
//! account per line. Output: comma-separated, header first, `\n` line ends.

use crate::snapshot::{Account, SnapshotTable};
use anyhow::{Context, Result, bail};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::info;

pub const ADDRESS_COLUMN: &str = "address";

// ============================================================
// Account Loading
// ============================================================

/// Load accounts from a CSV file, lowercased, in file order.
pub fn load_accounts(path: &str) -> Result<Vec<Account>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path))?;
    let accounts = parse_accounts(BufReader::new(file), path)?;
    info!("Loaded {} accounts from {}", accounts.len(), path);
    Ok(accounts)
}

/// Parse accounts from any reader; `source` only labels error messages.
pub fn parse_accounts<R: BufRead>(reader: R, source: &str) -> Result<Vec<Account>> {
    let mut lines = reader.lines().enumerate();

    let column = loop {
        let Some((_, line)) = lines.next() else {
            bail!("{} is empty, expected a header with an {} column", source, ADDRESS_COLUMN);
        };
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        break split_row(&line)
            .iter()
            .position(|cell| cell.trim().eq_ignore_ascii_case(ADDRESS_COLUMN))
            .with_context(|| format!("{} has no {} column", source, ADDRESS_COLUMN))?;
    };

    let mut accounts = Vec::new();
    for (line_num, line) in lines {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let cells = split_row(&line);
        let raw = cells
            .get(column)
            .with_context(|| format!("Missing address at line {} of {}", line_num + 1, source))?;
        let account = Account::parse(raw).with_context(|| {
            format!("Invalid address {:?} at line {} of {}", raw, line_num + 1, source)
        })?;
        accounts.push(account);
    }

    Ok(accounts)
}

/// Split one CSV row, honoring double-quoted cells.
fn split_row(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut quoted = false;
    let mut chars = line.trim_end_matches('\r').chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                cell.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => cells.push(std::mem::take(&mut cell)),
            _ => cell.push(c),
        }
    }
    cells.push(cell);
    cells
}

// ============================================================
// Snapshot Output
// ============================================================

/// Write the assembled snapshot, creating parent directories as needed.
pub fn write_snapshot(path: &str, table: &SnapshotTable) -> Result<()> {
    if let Some(parent) = Path::new(path).parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let file = File::create(path).with_context(|| format!("Failed to create {}", path))?;
    let mut writer = BufWriter::new(file);
    write_table(&mut writer, table)?;
    writer.flush()?;

    info!("The balances have been written to {}", path);
    Ok(())
}

pub fn write_table<W: Write>(writer: &mut W, table: &SnapshotTable) -> Result<()> {
    write_row(writer, &table.header)?;
    for row in &table.rows {
        write_row(writer, row)?;
    }
    Ok(())
}

fn write_row<W: Write>(writer: &mut W, cells: &[String]) -> Result<()> {
    let line: Vec<String> = cells.iter().map(|c| escape_cell(c)).collect();
    writeln!(writer, "{}", line.join(","))?;
    Ok(())
}

fn escape_cell(cell: &str) -> String {
    if cell.contains([',', '"', '\n']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}
