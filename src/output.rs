// src/output.rs
//
// CSV export of the final row set.

use crate::error::Result;
use crate::types::OutputRow;
use log::info;
use std::io::Write;
use std::path::Path;

pub const OUTPUT_HEADER: [&str; 7] = [
    "block_number",
    "timestamp",
    "user_address",
    "token_address",
    "token_balance",
    "token_symbol",
    "usd_price",
];

/// Writes `rows` to `writer` with the fixed header, even when `rows` is empty.
pub fn write_rows<W: Write>(writer: W, rows: &[OutputRow]) -> Result<()> {
    let mut csv_writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);

    csv_writer.write_record(OUTPUT_HEADER)?;
    for row in rows {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn write_rows_csv(path: impl AsRef<Path>, rows: &[OutputRow]) -> Result<()> {
    let path = path.as_ref();
    let file = std::fs::File::create(path)?;
    write_rows(std::io::BufWriter::new(file), rows)?;
    info!("CSV file has been written: {} ({} rows)", path.display(), rows.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BlockReference;
    use num_bigint::BigInt;
    use std::str::FromStr;

    #[test]
    fn test_header_and_exact_integer_balances() {
        let block = BlockReference::new(19_000_000, 1_704_067_200);
        let rows = vec![
            OutputRow::new(
                &block,
                "0xAaaa000000000000000000000000000000000001",
                "0x78354f8dccb269a615a7e0a24f9b0718fdc3c7a7",
                BigInt::from_str("123456789012345678901234567890").unwrap(),
                "ZERO",
            ),
            OutputRow::new(&block, "0xb", "0xt", BigInt::from(-5), "T"),
        ];
        let mut buf = Vec::new();
        write_rows(&mut buf, &rows).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines[0],
            "block_number,timestamp,user_address,token_address,token_balance,token_symbol,usd_price"
        );
        assert_eq!(
            lines[1],
            "19000000,1704067200,0xaaaa000000000000000000000000000000000001,0x78354f8dccb269a615a7e0a24f9b0718fdc3c7a7,123456789012345678901234567890,ZERO,0"
        );
        assert_eq!(lines[2], "19000000,1704067200,0xb,0xt,-5,T,0");
    }

    #[test]
    fn test_empty_output_still_has_header() {
        let mut buf = Vec::new();
        write_rows(&mut buf, &[]).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap().trim_end(), OUTPUT_HEADER.join(","));
    }
}
