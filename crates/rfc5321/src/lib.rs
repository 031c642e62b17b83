//! Server-side subset of the RFC 5321 grammar: HELO/EHLO arguments and
//! the reverse/forward paths carried by `MAIL FROM:` and `RCPT TO:`.
//!
//! The grammar here is deliberately pragmatic rather than a full ABNF
//! transcription: real-world clients routinely send trailing dots on
//! domains, bare `postmaster` recipients, source routes and ESMTP
//! parameters, and the parser accepts all of those.

mod parser;

pub use parser::{Address, ParseError, Parser};

/// Minimum number of recipient buffers an SMTP server must be able to
/// handle per transaction (RFC 5321 4.5.3.1.8). Used as the hard cap
/// on `RCPT TO` per envelope.
pub const LIMIT_RECIPIENTS: usize = 100;
