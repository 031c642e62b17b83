use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("expected {0}")]
    Expected(&'static str),
    #[error("invalid domain {0:?}")]
    InvalidDomain(String),
    #[error("invalid address literal {0:?}")]
    InvalidAddressLiteral(String),
    #[error("invalid local part")]
    InvalidLocalPart,
    #[error("input is not valid ASCII")]
    NotAscii,
}

/// A parsed mailbox. For `MAIL FROM:<>` (the null reverse-path) the engine
/// stores the default (empty) Address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub local_part: String,
    pub host: String,
    /// Set when the host was an address literal such as `[10.0.0.1]`
    /// or `[IPv6:::1]`.
    pub ip: Option<IpAddr>,
}

impl Address {
    pub fn is_empty(&self) -> bool {
        self.local_part.is_empty() && self.host.is_empty()
    }

    /// RFC 5321 departs from the usual local-part rules for postmaster:
    /// the match is case-insensitive.
    pub fn is_postmaster(&self) -> bool {
        self.local_part.eq_ignore_ascii_case("postmaster")
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        if self.host.is_empty() {
            write!(fmt, "{}", self.local_part)
        } else {
            write!(fmt, "{}@{}", self.local_part, self.host)
        }
    }
}

/// Parses the argument portion of HELO/EHLO/MAIL/RCPT lines.
///
/// `null_path` is a side-band flag: it is set by `mail_from` when the
/// reverse-path was `<>` and cleared on every other parse.
#[derive(Debug, Default)]
pub struct Parser {
    pub null_path: bool,
}

impl Parser {
    /// Parse the domain argument of a HELO command.
    pub fn helo(&mut self, input: &[u8]) -> Result<String, ParseError> {
        self.null_path = false;
        let (domain, _) = split_first_token(as_ascii(input)?)?;
        validate_domain(domain)?;
        Ok(domain.to_string())
    }

    /// Parse the domain argument of an EHLO command, returning the domain
    /// and any trailing parameter text the client advertised.
    pub fn ehlo(&mut self, input: &[u8]) -> Result<(String, Option<String>), ParseError> {
        self.null_path = false;
        let (domain, rest) = split_first_token(as_ascii(input)?)?;
        validate_domain(domain)?;
        let params = match rest.trim() {
            "" => None,
            p => Some(p.to_string()),
        };
        Ok((domain.to_string(), params))
    }

    /// Parse the reverse-path argument of `MAIL FROM:`.
    pub fn mail_from(&mut self, input: &[u8]) -> Result<Address, ParseError> {
        self.null_path = false;
        let text = as_ascii(input)?.trim();
        if strip_angles(text) == Some("") {
            self.null_path = true;
            return Ok(Address::default());
        }
        parse_path(text, false)
    }

    /// Parse the forward-path argument of `RCPT TO:`.
    pub fn rcpt_to(&mut self, input: &[u8]) -> Result<Address, ParseError> {
        self.null_path = false;
        let text = as_ascii(input)?.trim();
        if strip_angles(text) == Some("") {
            return Err(ParseError::Expected("forward path"));
        }
        parse_path(text, true)
    }
}

fn as_ascii(input: &[u8]) -> Result<&str, ParseError> {
    match std::str::from_utf8(input) {
        Ok(s) if s.is_ascii() => Ok(s),
        _ => Err(ParseError::NotAscii),
    }
}

fn split_first_token(input: &str) -> Result<(&str, &str), ParseError> {
    let input = input.trim_start();
    if input.is_empty() {
        return Err(ParseError::Expected("domain"));
    }
    match input.find(|c: char| c.is_ascii_whitespace()) {
        Some(idx) => Ok((&input[..idx], &input[idx..])),
        None => Ok((input, "")),
    }
}

/// If the text begins with `<`, return the content up to the matching `>`.
/// Anything after the closing angle (ESMTP parameters) is ignored here.
fn strip_angles(text: &str) -> Option<&str> {
    let rest = text.strip_prefix('<')?;
    let rangle = rest.find('>')?;
    Some(&rest[..rangle])
}

fn parse_path(text: &str, is_forward: bool) -> Result<Address, ParseError> {
    let mailbox = match strip_angles(text) {
        Some(inner) => inner,
        // Angle brackets are formally required, but plenty of senders
        // omit them, so take the first token as the mailbox.
        None => split_first_token(text)?.0,
    };

    // Drop any source route (`@hosta.int,@jkl.org:user@host`). RFC 5321
    // says it MUST be accepted and SHOULD be ignored.
    let mailbox = match mailbox.find(':') {
        Some(idx) if mailbox.starts_with('@') => &mailbox[idx + 1..],
        _ => mailbox,
    };

    let (local_part, domain) = split_mailbox(mailbox)?;

    if domain.is_empty() {
        // A bare <postmaster> forward path addresses the local host.
        if is_forward && local_part.eq_ignore_ascii_case("postmaster") {
            return Ok(Address {
                local_part: local_part.to_string(),
                host: String::new(),
                ip: None,
            });
        }
        return Err(ParseError::Expected("mailbox of the form local@domain"));
    }

    let (host, ip) = parse_domain_or_literal(domain)?;
    Ok(Address {
        local_part: local_part.to_string(),
        host,
        ip,
    })
}

/// Split `local@domain`, honoring quoted local parts so that
/// `"odd@ball"@example.com` parses correctly.
fn split_mailbox(mailbox: &str) -> Result<(&str, &str), ParseError> {
    if mailbox.is_empty() {
        return Err(ParseError::Expected("mailbox"));
    }
    let at = if let Some(rest) = mailbox.strip_prefix('"') {
        let mut close = None;
        let mut prev_backslash = false;
        for (idx, ch) in rest.char_indices() {
            if ch == '"' && !prev_backslash {
                close = Some(idx + 1);
                break;
            }
            prev_backslash = ch == '\\' && !prev_backslash;
        }
        let close = close.ok_or(ParseError::InvalidLocalPart)?;
        match rest[close..].chars().next() {
            Some('@') => Some(close + 1),
            None => None,
            Some(_) => return Err(ParseError::InvalidLocalPart),
        }
    } else {
        mailbox.find('@')
    };

    match at {
        Some(idx) => Ok((&mailbox[..idx], &mailbox[idx + 1..])),
        None => Ok((mailbox, "")),
    }
}

fn parse_domain_or_literal(domain: &str) -> Result<(String, Option<IpAddr>), ParseError> {
    if let Some(inner) = domain.strip_prefix('[').and_then(|d| d.strip_suffix(']')) {
        let literal = match inner.split_once(':') {
            Some((tag, rest)) if tag.eq_ignore_ascii_case("ipv6") => rest,
            _ => inner,
        };
        let ip: IpAddr = literal
            .parse()
            .map_err(|_| ParseError::InvalidAddressLiteral(domain.to_string()))?;
        return Ok((literal.to_ascii_lowercase(), Some(ip)));
    }
    validate_domain(domain)?;
    Ok((domain.to_string(), None))
}

/// Accepts names like `example.com`, `mx.example.` (trailing root dot)
/// and address literals in brackets.
fn validate_domain(domain: &str) -> Result<(), ParseError> {
    if domain.starts_with('[') {
        parse_domain_or_literal(domain)?;
        return Ok(());
    }
    if domain.is_empty() {
        return Err(ParseError::Expected("domain"));
    }
    let mut labels = domain.split('.').peekable();
    while let Some(label) = labels.next() {
        // a trailing dot leaves one empty label at the end
        if label.is_empty() && labels.peek().is_none() && domain.len() > 1 {
            break;
        }
        if label.is_empty()
            || !label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ParseError::InvalidDomain(domain.to_string()));
        }
    }
    Ok(())
}
