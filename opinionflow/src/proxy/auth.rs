//! Ordered authentication negotiation against the search upstream.

use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::Result;
use crate::transport::HttpReply;

/// Header carrying the token in the alternate scheme.
pub const ALT_AUTH_HEADER: &str = "X-Appbuilder-Authorization";
/// Query parameter carrying the token in the query scheme.
pub const TOKEN_QUERY_PARAM: &str = "access_token";

/// One way of presenting the search credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthScheme {
    /// `Authorization: Bearer {token}`.
    Bearer,
    /// `X-Appbuilder-Authorization: Bearer {token}`.
    AltHeader,
    /// `?access_token={token}`.
    QueryToken,
}

/// Schemes in the order they are attempted.
pub const AUTH_SCHEMES: [AuthScheme; 3] = [AuthScheme::Bearer, AuthScheme::AltHeader, AuthScheme::QueryToken];

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bearer => write!(f, "bearer"),
            Self::AltHeader => write!(f, "alt_header"),
            Self::QueryToken => write!(f, "query_token"),
        }
    }
}

/// URL and auth headers for one upstream attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamRequest {
    /// Target URL, possibly carrying the token.
    pub url: Url,
    /// Extra headers.
    pub headers: Vec<(String, String)>,
}

impl AuthScheme {
    /// Builds the attempt for this scheme. Pure.
    #[must_use]
    pub fn build(self, upstream: &Url, token: &str) -> UpstreamRequest {
        match self {
            Self::Bearer => UpstreamRequest {
                url: upstream.clone(),
                headers: vec![("Authorization".to_string(), format!("Bearer {token}"))],
            },
            Self::AltHeader => UpstreamRequest {
                url: upstream.clone(),
                headers: vec![(ALT_AUTH_HEADER.to_string(), format!("Bearer {token}"))],
            },
            Self::QueryToken => {
                let mut url = upstream.clone();
                url.query_pairs_mut().append_pair(TOKEN_QUERY_PARAM, token);
                UpstreamRequest { url, headers: Vec::new() }
            }
        }
    }
}

/// Result of a negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiated {
    /// The first non-401 reply, or the last 401 if every scheme was refused.
    pub reply: HttpReply,
    /// Scheme that produced `reply`.
    pub scheme: AuthScheme,
    /// Every scheme attempted, in order.
    pub tried: Vec<AuthScheme>,
}

/// Tries each scheme in [`AUTH_SCHEMES`] order, advancing only on 401.
///
/// `send` performs one attempt. A network failure ends the negotiation
/// with that error; any other status is returned unchanged.
pub async fn negotiate<F, Fut>(upstream: &Url, token: &str, mut send: F) -> Result<Negotiated>
where
    F: FnMut(UpstreamRequest) -> Fut,
    Fut: std::future::Future<Output = Result<HttpReply>>,
{
    let mut tried = Vec::with_capacity(AUTH_SCHEMES.len());
    let mut last = None;

    for scheme in AUTH_SCHEMES {
        tried.push(scheme);
        let reply = send(scheme.build(upstream, token)).await?;
        if reply.status != 401 {
            if !reply.is_success() {
                tracing::warn!(status = reply.status, scheme = %scheme, tried = ?tried, "Search upstream rejected request");
            }
            return Ok(Negotiated { reply, scheme, tried });
        }
        tracing::debug!(scheme = %scheme, "Search upstream refused credentials, trying next scheme");
        last = Some((scheme, reply));
    }

    let (scheme, reply) = last.unwrap_or((AuthScheme::QueryToken, HttpReply::new(401, "")));
    tracing::warn!(tried = ?tried, "Every auth scheme was refused");
    Ok(Negotiated { reply, scheme, tried })
}
