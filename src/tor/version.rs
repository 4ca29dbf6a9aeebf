//! Tor version parsing and comparison

use std::cmp::Ordering;

/// Parse a dotted version such as `0.4.8.10` or `0.4.9.1-alpha`
///
/// Anything after the first whitespace is ignored, as is a non-numeric
/// suffix on each component. Returns `None` if any component has no
/// leading digits.
pub fn parse_version(raw: &str) -> Option<Vec<u64>> {
    let token = raw.split_whitespace().next()?.trim_end_matches('.');
    if token.is_empty() {
        return None;
    }

    token
        .split('.')
        .map(|part| {
            let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse::<u64>().ok()
        })
        .collect()
}

/// Compare two versions numerically, component by component
///
/// Missing trailing components count as zero, so `0.4` equals `0.4.0`.
pub fn compare_versions(a: &str, b: &str) -> Option<Ordering> {
    let a = parse_version(a)?;
    let b = parse_version(b)?;
    let len = a.len().max(b.len());

    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return Some(other),
        }
    }
    Some(Ordering::Equal)
}

/// True when `version >= minimum`; unparsable input is never compatible
pub fn version_compatible(version: &str, minimum: &str) -> bool {
    matches!(
        compare_versions(version, minimum),
        Some(Ordering::Greater | Ordering::Equal)
    )
}

/// Extract the version from `tor --version` output
///
/// Output looks like `Tor version 0.4.8.10.` possibly followed by more
/// lines about linked libraries.
pub fn version_from_output(output: &str) -> Option<String> {
    let first = output.lines().find(|l| !l.trim().is_empty())?;
    let rest = first.trim().strip_prefix("Tor version")?;
    let token = rest.split_whitespace().next()?.trim_end_matches('.');
    parse_version(token).map(|_| token.to_string())
}
