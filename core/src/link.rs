//! Parser for the `Link` response header.
//!
//! Grammar accepted, per entry (entries separated by commas):
//!
//! ```text
//! entry  = "<" url ">" *( ";" param )
//! param  = name "=" ( token | quoted )
//! ```
//!
//! `rel` may carry several space-separated relation types. Commas inside the
//! angle brackets do not split entries.

/// Return the URL of the first `rel=next` entry in a `Link` header value.
///
/// Only absolute `http(s)` URLs qualify; anything else is skipped.
pub fn next_link(header: &str) -> Option<String> {
    split_entries(header)
        .filter_map(parse_entry)
        .find(|(_, rels)| rels.iter().any(|r| r.eq_ignore_ascii_case("next")))
        .map(|(url, _)| url.to_string())
}

fn split_entries(header: &str) -> impl Iterator<Item = &str> {
    let mut entries = Vec::new();
    let mut in_url = false;
    let mut start = 0;
    for (i, c) in header.char_indices() {
        match c {
            '<' => in_url = true,
            '>' => in_url = false,
            ',' if !in_url => {
                entries.push(&header[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    entries.push(&header[start..]);
    entries.into_iter().map(str::trim).filter(|e| !e.is_empty())
}

fn parse_entry(entry: &str) -> Option<(&str, Vec<&str>)> {
    let rest = entry.strip_prefix('<')?;
    let close = rest.find('>')?;
    let url = rest[..close].trim();
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        return None;
    }

    let mut rels = Vec::new();
    for param in rest[close + 1..].split(';') {
        let Some((name, value)) = param.split_once('=') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case("rel") {
            let value = value.trim().trim_matches('"');
            rels.extend(value.split_ascii_whitespace());
        }
    }
    Some((url, rels))
}
