//! Upstream address parsing

use url::Url;

use crate::{RondoError, RondoResult};

/// Parse and validate an upstream base address.
///
/// Only absolute `http` and `https` URLs with a host are accepted.
pub fn parse_upstream(address: &str) -> RondoResult<Url> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(RondoError::invalid_address(address, "empty address"));
    }

    let url = Url::parse(trimmed).map_err(|e| RondoError::invalid_address(address, e))?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(RondoError::invalid_address(
                address,
                format!("unsupported scheme {other:?}"),
            ))
        }
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(RondoError::invalid_address(address, "missing host"));
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_addresses() {
        let url = parse_upstream("http://127.0.0.1:3000").unwrap();
        assert_eq!(url.host_str(), Some("127.0.0.1"));
        assert_eq!(url.port(), Some(3000));

        let url = parse_upstream("  https://example.com/api  ").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.path(), "/api");
    }

    #[test]
    fn test_parse_rejects_bad_addresses() {
        for bad in ["", "   ", "not a url", "ftp://example.com", "127.0.0.1:8080"] {
            let err = parse_upstream(bad).unwrap_err();
            assert!(
                matches!(err, RondoError::InvalidAddress { .. }),
                "{bad:?} should be rejected"
            );
        }
    }
}
