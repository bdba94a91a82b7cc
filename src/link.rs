//! Link Classifier
//!
//! Decides whether a reference string names a remote resource (fetched over the network) or a
//! local path (read from disk).
//!
//! A reference is remote when it contains an `http`, `https` or `ftp` URL whose host is either
//! a public dotted-quad address or a domain name with an alphabetic top-level label. Loopback
//! and private ranges (`10.x`, `127.x`, `169.254.x`, `192.168.x`, `172.16-31.x`) never count
//! as remote, and neither do single-label names like `localhost`.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Scheme, optional userinfo, host, optional port and optional path.
    static ref URL_RE: Regex = Regex::new(
        r"(?i)\b(?:https?|ftp)://(?:[^\s/?#@]+(?::[^\s/?#@]*)?@)?(?P<host>[^\s/?#:@]+)(?::(?P<port>\d{2,5}))?(?:[/?#]\S*)?"
    )
    .unwrap();

    static ref DOTTED_QUAD_RE: Regex = Regex::new(r"^\d{1,3}(?:\.\d{1,3}){3}$").unwrap();
}

/// Returns true when `reference` should be fetched as a remote URL.
pub fn is_remote(reference: &str) -> bool {
    URL_RE
        .captures_iter(reference)
        .filter_map(|caps| caps.name("host"))
        .any(|host| is_public_host(host.as_str()))
}

fn is_public_host(host: &str) -> bool {
    if DOTTED_QUAD_RE.is_match(host) {
        is_public_ipv4(host)
    } else {
        is_domain_name(host)
    }
}

/// Dotted-quad hosts outside the loopback and private ranges.
fn is_public_ipv4(host: &str) -> bool {
    let octets: Vec<u16> = match host.split('.').map(str::parse::<u16>).collect() {
        Ok(octets) => octets,
        Err(_) => return false,
    };
    let [a, b, c, d] = match octets.as_slice() {
        [a, b, c, d] => [*a, *b, *c, *d],
        _ => return false,
    };

    if a == 10 || a == 127 {
        return false;
    }
    if (a == 169 && b == 254) || (a == 192 && b == 168) {
        return false;
    }
    if a == 172 && (16..=31).contains(&b) {
        return false;
    }

    (1..=223).contains(&a) && b <= 255 && c <= 255 && (1..=254).contains(&d)
}

fn is_domain_name(host: &str) -> bool {
    let host = host.strip_suffix('.').unwrap_or(host);
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 2 || !labels.iter().all(|label| is_label(label)) {
        return false;
    }

    labels
        .last()
        .map(|tld| tld.chars().count() >= 2 && tld.chars().all(is_letter))
        .unwrap_or(false)
}

/// A label starts and ends with a letter or digit; dashes may only appear inside.
fn is_label(label: &str) -> bool {
    let valid_chars = label.chars().all(|c| is_alphanumeric(c) || c == '-');
    let starts_ok = label.chars().next().map(is_alphanumeric).unwrap_or(false);
    let ends_ok = label.chars().last().map(is_alphanumeric).unwrap_or(false);
    valid_chars && starts_ok && ends_ok
}

fn is_letter(c: char) -> bool {
    c.is_ascii_alphabetic() || c >= '\u{00a1}'
}

fn is_alphanumeric(c: char) -> bool {
    is_letter(c) || c.is_ascii_digit()
}
