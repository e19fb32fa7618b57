//! URL canonicalization: start-URL normalization, link resolution, and
//! domain scoping. Mirrors `crawlerlib/parsing.py::UrlTools` from the
//! original implementation.

use url::Url;

/// Normalize a batch of seed URLs: drop empty inputs, prepend `https://`
/// when no scheme is given, strip the fragment. Preserves input order
/// and does not deduplicate.
pub fn normalize_start(urls: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(urls.len());
    for u in urls {
        if u.is_empty() {
            continue;
        }
        let candidate = if has_scheme(u) {
            u.clone()
        } else {
            format!("https://{u}")
        };
        match Url::parse(&candidate) {
            Ok(mut parsed) => {
                parsed.set_fragment(None);
                out.push(parsed.to_string());
            }
            Err(_) => out.push(candidate),
        }
    }
    out
}

fn has_scheme(u: &str) -> bool {
    Url::parse(u).is_ok()
}

/// Resolve an `<a href>` found on `base` into an absolute, fragment-free
/// `http(s)` URL, or `None` when the link is out of scope for crawling
/// (mailto/javascript/tel/bare-fragment links, or non-http(s) schemes).
pub fn normalize_link(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    if href.starts_with("mailto:")
        || href.starts_with("javascript:")
        || href.starts_with("tel:")
        || href.starts_with('#')
    {
        return None;
    }
    let base_url = Url::parse(base).ok()?;
    let mut resolved = base_url.join(href).ok()?;
    resolved.set_fragment(None);
    match resolved.scheme() {
        "http" | "https" => Some(resolved.to_string()),
        _ => None,
    }
}

/// `allowed` empty means allow-all. Otherwise true iff the lowercased
/// host equals some allowed domain, or ends with `"." + domain`.
/// Leading dots in configured domains are stripped by the caller when
/// building `allowed`.
pub fn is_allowed_domain(url: &str, allowed: &[String]) -> bool {
    if allowed.is_empty() {
        return true;
    }
    let host = match Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_lowercase)) {
        Some(h) => h,
        None => return false,
    };
    allowed
        .iter()
        .any(|d| host == *d || host.ends_with(&format!(".{d}")))
}
