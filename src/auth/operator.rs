//! Operator bearer-token gate and its Axum extractor.

use std::collections::HashSet;
use std::fmt::Debug;

use axum::extract::{FromRequestParts, Query};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use serde::Deserialize;

use crate::app_state::AppState;
use crate::error::GatewayError;

/// Decides whether an operator token may use the API.
pub trait OperatorGate: Send + Sync + Debug {
    /// Returns `true` if `token` (possibly absent) is accepted.
    fn is_authorized(&self, token: Option<&str>) -> bool;

    /// Returns `true` if every request is accepted regardless of token.
    fn is_open(&self) -> bool;
}

/// Fixed set of accepted operator tokens. An empty set accepts everyone.
#[derive(Debug, Clone, Default)]
pub struct StaticOperatorTokens {
    tokens: HashSet<String>,
}

impl StaticOperatorTokens {
    /// Builds a gate accepting exactly `tokens`.
    pub fn new(tokens: impl IntoIterator<Item = String>) -> Self {
        Self {
            tokens: tokens
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    /// Parses a comma-separated token list.
    #[must_use]
    pub fn parse(list: &str) -> Self {
        Self::new(list.split(',').map(str::to_string))
    }
}

impl OperatorGate for StaticOperatorTokens {
    fn is_authorized(&self, token: Option<&str>) -> bool {
        self.is_open() || token.is_some_and(|t| self.tokens.contains(t))
    }

    fn is_open(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Extractor that admits a request only if the operator gate accepts its
/// token, taken from `Authorization: Bearer ...` or a `token` query
/// parameter (browsers cannot set headers on WebSocket upgrades).
#[derive(Debug, Clone, Copy)]
pub struct OperatorAuth;

impl FromRequestParts<AppState> for OperatorAuth {
    type Rejection = GatewayError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header_token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|token| token.trim().to_string());
        let token = header_token.or_else(|| {
            Query::<TokenQuery>::try_from_uri(&parts.uri)
                .ok()
                .and_then(|Query(q)| q.token)
        });

        if state.operator_gate.is_authorized(token.as_deref()) {
            Ok(Self)
        } else {
            Err(GatewayError::Unauthorized)
        }
    }
}
