//! The table of hosts we accept mail for: exact names, `*` globs, and
//! `[ip]` literals. The whole table is replaced atomically on config
//! reload, so lookups take the mutex.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::net::IpAddr;

#[derive(Default)]
struct Tables {
    /// lowercased host names, plus `[ip]` literals in canonical form
    table: HashSet<String>,
    /// lowercased patterns containing `*`
    wildcards: Vec<String>,
}

#[derive(Default)]
pub struct AllowedHosts {
    inner: Mutex<Tables>,
}

impl AllowedHosts {
    pub fn new(entries: &[String]) -> Self {
        let hosts = Self::default();
        hosts.replace(entries);
        hosts
    }

    /// Replace the whole table. Entries containing `*` become wildcard
    /// patterns; `[literal]` entries are parsed as IPs and stored in the
    /// short canonical form so that lookups for equivalent spellings of
    /// an IPv6 address match.
    pub fn replace(&self, entries: &[String]) {
        let mut tables = Tables::default();
        for entry in entries {
            if entry.contains('*') {
                tables.wildcards.push(entry.to_ascii_lowercase());
            } else if let Some(literal) = entry
                .strip_prefix('[')
                .and_then(|entry| entry.strip_suffix(']'))
            {
                match literal.parse::<IpAddr>() {
                    Ok(ip) => {
                        tables.table.insert(format!("[{ip}]"));
                    }
                    Err(_) => {
                        tracing::warn!("ignoring unparseable allowed-hosts literal {entry:?}");
                    }
                }
            } else {
                tables.table.insert(entry.to_ascii_lowercase());
            }
        }
        *self.inner.lock() = tables;
    }

    /// Is `host` a valid recipient host? Host checking is off entirely
    /// when the table consists of a single "." entry.
    pub fn allows(&self, host: &str) -> bool {
        let tables = self.inner.lock();
        if tables.table.len() == 1 && tables.table.contains(".") {
            return true;
        }
        let host = host.to_ascii_lowercase();
        if tables.table.contains(&host) {
            return true;
        }
        tables
            .wildcards
            .iter()
            .any(|pattern| glob_match(pattern, &host))
    }

    pub fn allows_ip(&self, ip: IpAddr) -> bool {
        self.allows(&format!("[{ip}]"))
    }
}

/// Glob match where `*` matches any run of characters, including the
/// empty one. Classic two-cursor scan with backtracking to the most
/// recent star.
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern = pattern.as_bytes();
    let text = text.as_bytes();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < text.len() {
        if pi < pattern.len() && pattern[pi] == b'*' {
            star = Some((pi, ti));
            pi += 1;
        } else if pi < pattern.len() && pattern[pi] == text[ti] {
            pi += 1;
            ti += 1;
        } else if let Some((star_pi, star_ti)) = star {
            pi = star_pi + 1;
            ti = star_ti + 1;
            star = Some((star_pi, star_ti + 1));
        } else {
            return false;
        }
    }
    while pi < pattern.len() && pattern[pi] == b'*' {
        pi += 1;
    }
    pi == pattern.len()
}

#[cfg(test)]
mod test {
    use super::*;

    fn hosts(entries: &[&str]) -> AllowedHosts {
        AllowedHosts::new(&entries.iter().map(|s| s.to_string()).collect::<Vec<_>>())
    }

    #[test]
    fn single_dot_allows_everything() {
        let hosts = hosts(&["."]);
        assert!(hosts.allows("example.com"));
        assert!(hosts.allows("anything.at.all"));
        assert!(hosts.allows_ip("10.0.0.1".parse().unwrap()));
    }

    #[test]
    fn exact_match_is_case_insensitive() {
        let hosts = hosts(&["Example.COM"]);
        assert!(hosts.allows("example.com"));
        assert!(hosts.allows("EXAMPLE.com"));
        assert!(!hosts.allows("example.net"));
    }

    #[test]
    fn wildcards() {
        let hosts = hosts(&["*.example.com"]);
        assert!(hosts.allows("a.example.com"));
        assert!(hosts.allows("deep.sub.example.com"));
        assert!(!hosts.allows("example.net"));
        assert!(!hosts.allows("example.com"));
    }

    #[test]
    fn ip_literals_are_canonicalized() {
        let hosts = hosts(&["[2001:0db8:0000:0000:0000:0000:0000:0001]", "[10.0.0.1]"]);
        // lookups in the short form match the long-form config entry
        assert!(hosts.allows_ip("2001:db8::1".parse().unwrap()));
        assert!(hosts.allows("[2001:db8::1]"));
        assert!(hosts.allows_ip("10.0.0.1".parse().unwrap()));
        assert!(!hosts.allows_ip("10.0.0.2".parse().unwrap()));
    }

    #[test]
    fn replace_swaps_the_whole_table() {
        let hosts = hosts(&["example.com"]);
        hosts.replace(&["example.net".to_string()]);
        assert!(!hosts.allows("example.com"));
        assert!(hosts.allows("example.net"));
    }

    #[test]
    fn glob_matching() {
        assert!(glob_match("*", "anything"));
        assert!(glob_match("*.example.com", "a.b.example.com"));
        assert!(glob_match("mx*.example.com", "mx17.example.com"));
        assert!(glob_match("a*b*c", "aXXbYYc"));
        assert!(!glob_match("a*b*c", "aXXbYY"));
        assert!(!glob_match("*.example.com", "example.com."));
    }
}
