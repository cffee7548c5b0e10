//! Input validation
//!
//! Pure format checks run before any ledger or provider call. Every failure
//! is an [`Error::BadRequest`] whose message is safe to return to the client.

use std::net::Ipv4Addr;

use crate::error::{Error, Result};

/// Maximum length of a single DNS label (RFC 1035)
pub const MAX_LABEL_LEN: usize = 63;

/// Validate an account username: 3-20 characters of `[A-Za-z0-9_-]`
pub fn username(name: &str) -> Result<()> {
    let len = name.chars().count();
    if !(3..=20).contains(&len) {
        return Err(Error::bad_request(format!(
            "Invalid username '{name}': must be 3-20 characters"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(Error::bad_request(format!(
            "Invalid username '{name}': only letters, digits, '_' and '-' are allowed"
        )));
    }
    Ok(())
}

/// Validate a zone name such as `example.com`
pub fn domain_name(domain: &str) -> Result<()> {
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return Err(Error::bad_request(format!(
            "Invalid domain name '{domain}': at least one dot is required"
        )));
    }
    for label in labels {
        if !is_label(label, false) {
            return Err(Error::bad_request(format!(
                "Invalid domain label '{label}' in '{domain}'"
            )));
        }
    }
    Ok(())
}

/// Validate a host record: `@`, a single label, or a label starting with `*`
pub fn host_record(rr: &str) -> Result<()> {
    if rr == "@" || is_label(rr, true) {
        Ok(())
    } else {
        Err(Error::bad_request(format!("Invalid host record (RR) '{rr}'")))
    }
}

/// Parse a dotted-quad IPv4 literal
pub fn ipv4(value: &str) -> Result<Ipv4Addr> {
    value.parse::<Ipv4Addr>().map_err(|_| {
        Error::bad_request(format!("'{value}' is not a valid IPv4 address"))
    })
}

/// Alphanumeric label with internal hyphens, 1-63 characters.
/// With `wildcard`, the first character may also be `*`.
fn is_label(label: &str, wildcard: bool) -> bool {
    let bytes = label.as_bytes();
    let Some((&first, rest)) = bytes.split_first() else {
        return false;
    };
    if bytes.len() > MAX_LABEL_LEN {
        return false;
    }
    let first_ok = first.is_ascii_alphanumeric() || (wildcard && first == b'*');
    if !first_ok {
        return false;
    }
    match rest.split_last() {
        None => true,
        Some((&last, middle)) => {
            last.is_ascii_alphanumeric()
                && middle.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'-')
        }
    }
}
