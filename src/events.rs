//! Structured logging, one call site per recognised event.
//!
//! Every record is greppable on the literal token `vmod-dynamic`, following the
//! `vmod-dynamic: <vcl> <director> <name-tail> <event> [<extra>]` line shape. Built on
//! `tracing`; unlike a feature-gated logging call this is unconditional, since
//! observability is part of the ambient stack rather than an optional extra.

use std::fmt;

/// Severity of a logged event.
#[derive(Clone, Copy, Debug)]
pub enum Level {
    /// A routine lifecycle event.
    Info,
    /// An event worth an operator's attention.
    Warn,
}

/// Emit one `vmod-dynamic: ...` log line.
///
/// `name_tail` is the domain's own identity within its director (e.g. `host:port` or a
/// service name); `extra` carries event-specific detail (an address, an errno, a count).
pub fn emit(vcl: &str, director: &str, name_tail: &str, event: &str, extra: Option<&dyn fmt::Display>, level: Level) {
    match extra {
        Some(extra) => match level {
            Level::Info => tracing::info!(
                target: "vmod-dynamic",
                vcl, director, name_tail, event, %extra,
                "vmod-dynamic: {vcl} {director} {name_tail} {event} {extra}"
            ),
            Level::Warn => tracing::warn!(
                target: "vmod-dynamic",
                vcl, director, name_tail, event, %extra,
                "vmod-dynamic: {vcl} {director} {name_tail} {event} {extra}"
            ),
        },
        None => match level {
            Level::Info => tracing::info!(
                target: "vmod-dynamic",
                vcl, director, name_tail, event,
                "vmod-dynamic: {vcl} {director} {name_tail} {event}"
            ),
            Level::Warn => tracing::warn!(
                target: "vmod-dynamic",
                vcl, director, name_tail, event,
                "vmod-dynamic: {vcl} {director} {name_tail} {event}"
            ),
        },
    }
}

/// Recognised event names, kept as constants so call sites can't typo the wire format.
pub mod kind {
    /// A domain's worker found it had been idle past `domain_usage_timeout`.
    pub const TIMEOUT: &str = "timeout";
    /// A domain's worker has released its backends and is exiting.
    pub const DELETED: &str = "deleted";
    /// A backend was added to a domain's address set during reconciliation.
    pub const ADDED: &str = "added";
    /// A whitelist rejected a resolved address.
    pub const WHITELIST_MISMATCH: &str = "whitelist mismatch";
    /// A resolve call failed.
    pub const GETADDRINFO: &str = "getaddrinfo";
    /// A resolve succeeded but returned no usable addresses.
    pub const EMPTY_ADDRESS_SET: &str = "empty address set";
}
