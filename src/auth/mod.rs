//! Pre-admission boundary: credential verification and balance check.
//!
//! The real identity provider and credit store live outside this service;
//! this module only defines the contract the WebSocket endpoint calls
//! before upgrading a connection, plus two in-process implementations:
//! a static shared-key table and a debug bypass.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::TokenEntry;
use crate::error::PreAdmissionError;

/// Admission codes surfaced to rejected clients.
pub const CODE_MISSING_TOKEN: u16 = 4010;
pub const CODE_INVALID_TOKEN: u16 = 4011;
pub const CODE_BALANCE_EXHAUSTED: u16 = 4020;

/// Result of a successful admission check.
#[derive(Debug, Clone, Serialize)]
pub struct Admission {
    /// Authenticated principal the session's usage is billed to
    pub principal_id: String,

    /// Usage balance at admission time, in seconds. `None` means
    /// unmetered (debug bypass).
    pub remaining_secs: Option<f64>,
}

/// Verifies a credential token and performs the pre-admission balance
/// check. A rejection never reaches the session bridge.
#[async_trait]
pub trait AdmissionControl: Send + Sync {
    async fn admit(&self, token: Option<&str>) -> Result<Admission, PreAdmissionError>;
}

/// Admits every connection as a fixed debug identity.
pub struct BypassAdmission {
    principal_id: String,
}

impl BypassAdmission {
    pub fn new(principal_id: impl Into<String>) -> Self {
        Self {
            principal_id: principal_id.into(),
        }
    }
}

#[async_trait]
impl AdmissionControl for BypassAdmission {
    async fn admit(&self, _token: Option<&str>) -> Result<Admission, PreAdmissionError> {
        Ok(Admission {
            principal_id: self.principal_id.clone(),
            remaining_secs: None,
        })
    }
}

/// Token table admission: each configured token maps to a principal and
/// a usage balance. Tokens with an exhausted balance are rejected.
pub struct SharedKeyAdmission {
    tokens: HashMap<String, TokenEntry>,
}

impl SharedKeyAdmission {
    pub fn new(entries: Vec<TokenEntry>) -> Self {
        let tokens = entries
            .into_iter()
            .map(|e| (e.token.clone(), e))
            .collect();
        Self { tokens }
    }
}

#[async_trait]
impl AdmissionControl for SharedKeyAdmission {
    async fn admit(&self, token: Option<&str>) -> Result<Admission, PreAdmissionError> {
        let token = token.ok_or_else(|| {
            PreAdmissionError::new(CODE_MISSING_TOKEN, "missing credential token")
        })?;

        let entry = self.tokens.get(token).ok_or_else(|| {
            PreAdmissionError::new(CODE_INVALID_TOKEN, "unrecognized credential token")
        })?;

        if entry.remaining_secs <= 0.0 {
            return Err(PreAdmissionError::new(
                CODE_BALANCE_EXHAUSTED,
                "usage balance exhausted",
            ));
        }

        Ok(Admission {
            principal_id: entry.principal_id.clone(),
            remaining_secs: Some(entry.remaining_secs),
        })
    }
}
