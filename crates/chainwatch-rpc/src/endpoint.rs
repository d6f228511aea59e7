//! Endpoint pool with a rotation cursor used for failover.
//!
//! The pool is an ordered, non-empty list of RPC endpoints. Failover is done by
//! rotating the cursor one position at a time, wrapping modulo the pool length,
//! so every endpoint is revisited after `len()` rotations.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RpcError};

/// Address of one RPC service instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    url: String,
}

impl Endpoint {
    /// Create an endpoint from a URL. Surrounding whitespace is trimmed.
    pub fn new(url: impl AsRef<str>) -> Result<Self> {
        let trimmed = url.as_ref().trim();
        if trimmed.is_empty() {
            return Err(RpcError::InvalidEndpoint {
                url: url.as_ref().to_string(),
            });
        }
        Ok(Self {
            url: trimmed.to_string(),
        })
    }

    /// The endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// Ordered set of candidate endpoints plus the cursor selecting the active one.
#[derive(Debug, Clone)]
pub struct EndpointPool {
    endpoints: Vec<Endpoint>,
    cursor: usize,
}

impl EndpointPool {
    /// Create a pool. Fails with [`RpcError::EmptyPool`] when `endpoints` is empty.
    pub fn new(endpoints: Vec<Endpoint>) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(RpcError::EmptyPool);
        }
        Ok(Self {
            endpoints,
            cursor: 0,
        })
    }

    /// Create a pool from URL strings, keeping their order.
    pub fn from_urls<I, S>(urls: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let endpoints = urls
            .into_iter()
            .map(Endpoint::new)
            .collect::<Result<Vec<_>>>()?;
        Self::new(endpoints)
    }

    /// The endpoint under the cursor.
    pub fn current(&self) -> &Endpoint {
        &self.endpoints[self.cursor]
    }

    /// Advance the cursor by one, wrapping, and return the new current endpoint.
    pub fn rotate(&mut self) -> &Endpoint {
        self.cursor = (self.cursor + 1) % self.endpoints.len();
        &self.endpoints[self.cursor]
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Always false; an empty pool cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }
}
