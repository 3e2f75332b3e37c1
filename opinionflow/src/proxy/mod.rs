//! The provider proxy, in-process.
//!
//! Routes search requests to the search provider with ordered auth
//! negotiation, chat requests to the chat provider with bearer auth, and
//! fetch requests to a plain GET of the target URL.

mod auth;
mod router;

pub use auth::{
    negotiate, AuthScheme, Negotiated, UpstreamRequest, ALT_AUTH_HEADER, AUTH_SCHEMES, TOKEN_QUERY_PARAM,
};
pub use router::{missing_key_reply, ProxyTransport, MISSING_CHAT_KEY, MISSING_SEARCH_KEY};
