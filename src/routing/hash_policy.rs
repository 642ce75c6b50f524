//! Hash policies for session affinity.
//!
//! # Responsibilities
//! - Turn a request context into a stable 64-bit hash
//!
//! # Design Decisions
//! - Pure: no side effects, identical input gives identical output
//! - Missing inputs (absent header, unknown peer) hash as the empty string,
//!   so every request still gets a deterministic hash
//! - `DefaultHasher::new()` uses fixed keys; hashes are stable within a build

use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};

use http::header::COOKIE;

use crate::routing::context::LoadBalancerContext;

/// Maps request context to a hash used for consistent host selection.
pub trait HashPolicy: Send + Sync + fmt::Debug {
    fn generate_hash(&self, ctx: &dyn LoadBalancerContext) -> u64;
}

fn hash_bytes(bytes: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    hasher.finish()
}

/// Hash of one request header's value.
#[derive(Debug, Clone)]
pub struct HeaderHashPolicy {
    name: String,
}

impl HeaderHashPolicy {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().to_ascii_lowercase(),
        }
    }
}

impl HashPolicy for HeaderHashPolicy {
    fn generate_hash(&self, ctx: &dyn LoadBalancerContext) -> u64 {
        let value = ctx
            .downstream_headers()
            .and_then(|h| h.get(self.name.as_str()))
            .map(|v| v.as_bytes())
            .unwrap_or_default();
        hash_bytes(value)
    }
}

/// Hash of the downstream client IP; the port is ignored.
#[derive(Debug, Clone, Default)]
pub struct SourceIpHashPolicy;

impl HashPolicy for SourceIpHashPolicy {
    fn generate_hash(&self, ctx: &dyn LoadBalancerContext) -> u64 {
        match ctx.downstream_remote_addr() {
            Some(addr) => hash_bytes(addr.ip().to_string().as_bytes()),
            None => hash_bytes(b""),
        }
    }
}

/// Hash of one cookie taken from the `Cookie` header.
#[derive(Debug, Clone)]
pub struct CookieHashPolicy {
    name: String,
}

impl CookieHashPolicy {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn find<'a>(&self, header: &'a str) -> Option<&'a str> {
        header.split(';').find_map(|pair| {
            let (k, v) = pair.trim().split_once('=')?;
            (k == self.name).then_some(v)
        })
    }
}

impl HashPolicy for CookieHashPolicy {
    fn generate_hash(&self, ctx: &dyn LoadBalancerContext) -> u64 {
        let value = ctx
            .downstream_headers()
            .map(|h| h.get_all(COOKIE))
            .and_then(|all| {
                all.iter()
                    .filter_map(|v| v.to_str().ok())
                    .find_map(|header| self.find(header))
            })
            .unwrap_or_default();
        hash_bytes(value.as_bytes())
    }
}
