//! Source address allow-listing.
//!
//! Entries are either exact address strings or IPv4 CIDR blocks
//! (`network/prefix`). Entries the matcher cannot interpret (IPv6,
//! malformed syntax, prefix outside `1..=32`) are skipped rather than
//! treated as errors.

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;

/// Check whether `client` matches any entry of the allow-list.
///
/// An empty list matches nothing; callers treat an empty list as "no
/// restriction" before reaching this function.
pub fn is_allowed<S: AsRef<str>>(client: &str, entries: &[S]) -> bool {
    // Fast path: exact match
    if entries.iter().any(|e| e.as_ref() == client) {
        return true;
    }

    let client_addr = match client.parse::<Ipv4Addr>() {
        Ok(addr) => addr,
        Err(_) => return false,
    };

    entries
        .iter()
        .filter_map(|e| parse_cidr(e.as_ref()))
        .any(|net| net.contains(&client_addr))
}

/// Parse an IPv4 CIDR entry. IPv6, malformed entries and prefixes outside
/// `1..=32` yield `None`.
fn parse_cidr(entry: &str) -> Option<Ipv4Net> {
    let net = entry.trim().parse::<Ipv4Net>().ok()?;
    if net.prefix_len() == 0 {
        return None;
    }
    Some(net.trunc())
}
