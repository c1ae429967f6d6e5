//! Typed error surface.
//!
//! Grounded on `examples/MalteJ-mvirt/mvirt-net/src/grpc/validation.rs`, which
//! uses a `thiserror`-derived enum with one `#[error("...")]` variant per
//! failure case. Per SPEC_FULL.md §2a two surfaces exist: process-level errors
//! (this enum) that do propagate, and packet-path errors that never do — a
//! malformed option or table-full condition always resolves locally to a drop
//! or a synthesized NA (§7) and is represented internally by `Option`/`Result`
//! local to the parsing routine, never by `GatewayError`.

use crate::addr::Interface;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("interface {0:?} failed to initialize")]
    InterfaceInitFailed(Interface),

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
}

/// Internal parse/rewrite failures, confined to the packet path. A handler
/// that receives one of these converts it to a silent drop (per the error
/// table in SPEC_FULL.md §7) and never lets it escape `NDProxy`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("option with len == 0")]
    ZeroLengthOption,

    #[error("option or header truncated")]
    Truncated,

    #[error("destination buffer too small for rewrite")]
    BufferTooSmall,

    #[error("malformed ARO (len != 2 or status != 0 on receipt)")]
    MalformedAro,
}
