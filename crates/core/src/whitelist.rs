//! Whitelist input: newline-delimited addresses.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::ledger::{AddressParseError, SuiAddress};

#[derive(Debug, thiserror::Error)]
pub enum WhitelistError {
    #[error("failed to read whitelist {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("whitelist line {line}: `{value}` is not an address: {source}")]
    InvalidAddress {
        line: usize,
        value: String,
        source: AddressParseError,
    },
}

/// Read and normalize the whitelist file at `path`.
pub async fn load(path: &Path, operator: SuiAddress, max_entries: usize) -> Result<Vec<SuiAddress>, WhitelistError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| WhitelistError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    let addresses = parse(&raw, operator, max_entries)?;
    tracing::info!(path = %path.display(), entries = addresses.len(), "whitelist loaded");
    Ok(addresses)
}

/// Parse whitelist text.
///
/// Lines are trimmed and blank lines skipped. The list is truncated to
/// `max_entries`, duplicates and the operator are dropped (first occurrence
/// wins), and the operator is appended last so it can exercise the claim
/// path.
pub fn parse(raw: &str, operator: SuiAddress, max_entries: usize) -> Result<Vec<SuiAddress>, WhitelistError> {
    let mut parsed = Vec::new();
    for (idx, line) in raw.lines().enumerate() {
        let value = line.trim();
        if value.is_empty() {
            continue;
        }
        if parsed.len() == max_entries {
            tracing::warn!(max_entries, "whitelist truncated");
            break;
        }
        let address = value
            .parse::<SuiAddress>()
            .map_err(|source| WhitelistError::InvalidAddress {
                line: idx + 1,
                value: value.to_string(),
                source,
            })?;
        parsed.push(address);
    }

    let mut seen = HashSet::with_capacity(parsed.len() + 1);
    seen.insert(operator);
    let before = parsed.len();
    parsed.retain(|address| seen.insert(*address));
    let dropped = before - parsed.len();
    if dropped > 0 {
        tracing::warn!(dropped, "dropped duplicate or operator whitelist entries");
    }

    parsed.push(operator);
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use testresult::TestResult;

    fn addr(b: u8) -> SuiAddress {
        SuiAddress::new([b; 32])
    }

    const OPERATOR: SuiAddress = SuiAddress::new([0xee; 32]);

    #[test]
    fn test_parse_trims_and_skips_blank_lines() -> TestResult {
        let raw = format!("  {}  \n\n{}\r\n   \n", addr(1), addr(2));
        let list = parse(&raw, OPERATOR, 600)?;
        assert_eq!(list, vec![addr(1), addr(2), OPERATOR]);
        Ok(())
    }

    #[test]
    fn test_parse_truncates_before_appending_operator() -> TestResult {
        let raw: String = (1..=10u8).map(|b| format!("{}\n", addr(b))).collect();
        let list = parse(&raw, OPERATOR, 4)?;
        assert_eq!(list, vec![addr(1), addr(2), addr(3), addr(4), OPERATOR]);
        Ok(())
    }

    #[test]
    fn test_parse_drops_duplicates_and_operator() -> TestResult {
        let raw = format!("{}\n{}\n{}\n{}\n", addr(1), OPERATOR, addr(1), addr(2));
        let list = parse(&raw, OPERATOR, 600)?;
        assert_eq!(list, vec![addr(1), addr(2), OPERATOR]);
        Ok(())
    }

    #[test]
    fn test_parse_rejects_bad_line_with_position() {
        let raw = format!("{}\n\nnot-an-address\n", addr(1));
        match parse(&raw, OPERATOR, 600) {
            Err(WhitelistError::InvalidAddress { line: 3, value, .. }) => assert_eq!(value, "not-an-address"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_empty_file_yields_operator_only() -> TestResult {
        assert_eq!(parse("", OPERATOR, 600)?, vec![OPERATOR]);
        Ok(())
    }

    #[tokio::test]
    async fn test_load_from_file() -> TestResult {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "{}", addr(7))?;
        writeln!(file, "0x2")?;
        let list = load(file.path(), OPERATOR, 600).await?;
        assert_eq!(list.len(), 3);
        assert_eq!(list[1], "0x2".parse::<SuiAddress>()?);
        Ok(())
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(&dir.path().join("absent.txt"), OPERATOR, 600).await.unwrap_err();
        assert!(matches!(err, WhitelistError::Read { .. }));
    }
}
