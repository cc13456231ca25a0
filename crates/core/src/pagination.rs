//! Continuation tokens for paged list calls.
//!
//! Wire format: standard base64 of the ASCII string `"<page>/<limit>"`. The
//! encoding keeps the token opaque to intermediaries that would otherwise
//! treat a bare number as a query value.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::{KappError, KappResult};

/// Decoded `(page, limit)` cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContinueToken {
    pub page: u64,
    pub limit: u64,
}

impl ContinueToken {
    pub fn new(page: u64, limit: u64) -> Self {
        Self { page, limit }
    }

    pub fn encode(&self) -> String {
        encode(self.page, self.limit)
    }

    pub fn decode(token: &str) -> KappResult<Self> {
        let (page, limit) = decode(token)?;
        Ok(Self { page, limit })
    }

    /// Index of the first item on this page.
    pub fn offset(&self) -> u64 {
        self.page.saturating_mul(self.limit)
    }

    pub fn next(&self) -> Self {
        Self { page: self.page.saturating_add(1), limit: self.limit }
    }

    /// Reject a token minted for a different page size.
    pub fn validate_limit(&self, limit: u64) -> KappResult<()> {
        if self.limit != limit {
            return Err(KappError::invalid(format!(
                "continue token limit {} does not match request limit {}",
                self.limit, limit
            )));
        }
        Ok(())
    }
}

pub fn encode(page: u64, limit: u64) -> String {
    STANDARD.encode(format!("{}/{}", page, limit))
}

pub fn decode(token: &str) -> KappResult<(u64, u64)> {
    let raw = STANDARD
        .decode(token.as_bytes())
        .map_err(|e| KappError::invalid(format!("invalid continue token: {}", e)))?;
    let text = String::from_utf8(raw)
        .map_err(|_| KappError::invalid("invalid continue token: not utf-8"))?;
    let parts: Vec<&str> = text.split('/').collect();
    match parts.as_slice() {
        [page, limit] => {
            let page = page
                .parse::<u64>()
                .map_err(|e| KappError::invalid(format!("invalid continue token page {:?}: {}", page, e)))?;
            let limit = limit
                .parse::<u64>()
                .map_err(|e| KappError::invalid(format!("invalid continue token limit {:?}: {}", limit, e)))?;
            Ok((page, limit))
        }
        _ => Err(KappError::invalid(format!(
            "invalid continue token: expected 2 parts, got {}",
            parts.len()
        ))),
    }
}
