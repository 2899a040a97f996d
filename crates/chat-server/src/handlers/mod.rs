//! HTTP handlers for the consumer boundary.

mod blocks;
mod chat;
mod subscribe;

pub use blocks::{list_blocked, set_blocked};
pub use chat::{
    clear_context, command_suggestions, get_conversation, list_conversations,
    put_message, start_conversation,
};
pub use subscribe::subscribe;

use axum::http::HeaderMap;

/// Identity of the calling user, from the `x-user` header.
/// A real deployment resolves this from the external identity provider.
pub(crate) fn caller(headers: &HeaderMap) -> String {
    headers
        .get("x-user")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("anonymous")
        .to_string()
}
