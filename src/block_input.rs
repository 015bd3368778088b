// src/block_input.rs
//
// Block list input: a CSV with `number` and `timestamp` columns.

use crate::error::Result;
use crate::types::BlockReference;
use log::{debug, info};
use serde::Deserialize;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct RawBlockRow {
    number: Option<String>,
    timestamp: Option<String>,
}

impl RawBlockRow {
    // Unparsable numbers and zero/missing timestamps drop the row
    fn parse(&self) -> Option<BlockReference> {
        let number = self.number.as_deref()?.trim().parse::<u64>().ok()?;
        let timestamp = self.timestamp.as_deref()?.trim().parse::<u64>().ok()?;
        if timestamp == 0 {
            return None;
        }
        Some(BlockReference::new(number, timestamp))
    }
}

/// Reads the block list at `path`. Failing to open or read the file is fatal;
/// malformed rows are skipped.
pub fn read_blocks_csv(path: impl AsRef<Path>) -> Result<Vec<BlockReference>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)?;
    let blocks = read_blocks(file)?;
    info!("Loaded {} blocks from {}", blocks.len(), path.display());
    Ok(blocks)
}

pub fn read_blocks<R: Read>(reader: R) -> Result<Vec<BlockReference>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut blocks = Vec::new();
    for (line, record) in csv_reader.deserialize::<RawBlockRow>().enumerate() {
        let row = match record {
            Ok(row) => row,
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                debug!("Skipping block row {}: {}", line + 1, e);
                continue;
            }
        };
        match row.parse() {
            Some(block) => blocks.push(block),
            None => debug!("Skipping block row {}: {:?}", line + 1, row),
        }
    }
    Ok(blocks)
}
