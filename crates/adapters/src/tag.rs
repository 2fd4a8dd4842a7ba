// SPDX-License-Identifier: MIT

//! `#tag` fragment and `:tag` filename-suffix parsing (§4.3).

/// Split on a `#tag` fragment only — used for schemes (like `docker://`)
/// whose own reference syntax already uses `:` for a different purpose
/// (an image tag), so the `:tag` filename-suffix rule does not apply.
pub fn split_fragment_tag(uri: &str) -> (&str, String) {
    match uri.split_once('#') {
        Some((base, fragment)) if !fragment.is_empty() => (base, fragment.to_string()),
        Some((base, _)) => (base, String::new()),
        None => (uri, String::new()),
    }
}

/// Split a raw input URI into `(fetchable_uri, tag)`.
///
/// A `#tag` fragment always wins. Otherwise, a `:tag` suffix on the final
/// path segment (after the last `/`) is treated as a tag rather than part
/// of the fetchable location, e.g. `https://host/archive.zip:release-1`
/// fetches `https://host/archive.zip` and tags the result `release-1`.
pub fn split_uri_and_tag(uri: &str) -> (&str, String) {
    if let Some((base, fragment)) = uri.split_once('#') {
        if !fragment.is_empty() {
            return (base, fragment.to_string());
        }
        return (base, String::new());
    }

    let last_slash = uri.rfind('/').map(|i| i + 1).unwrap_or(0);
    let (head, tail) = uri.split_at(last_slash);
    if let Some(colon) = tail.find(':') {
        // Avoid treating the scheme separator ("https:") as a tag marker.
        if last_slash > 0 {
            let (filename, tag) = tail.split_at(colon);
            return (&uri[..last_slash + filename.len()], tag[1..].to_string());
        }
    }
    let _ = head;
    (uri, String::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_tag_is_extracted() {
        let (uri, tag) = split_uri_and_tag("https://example.com/a.zip#release-1");
        assert_eq!(uri, "https://example.com/a.zip");
        assert_eq!(tag, "release-1");
    }

    #[test]
    fn filename_suffix_tag_is_extracted() {
        let (uri, tag) = split_uri_and_tag("https://example.com/a.zip:release-1");
        assert_eq!(uri, "https://example.com/a.zip");
        assert_eq!(tag, "release-1");
    }

    #[test]
    fn plain_uri_has_no_tag() {
        let (uri, tag) = split_uri_and_tag("https://example.com/a.zip");
        assert_eq!(uri, "https://example.com/a.zip");
        assert_eq!(tag, "");
    }

    #[test]
    fn scheme_colon_is_not_mistaken_for_a_tag() {
        let (uri, tag) = split_uri_and_tag("https://example.com/path/a.zip");
        assert_eq!(uri, "https://example.com/path/a.zip");
        assert_eq!(tag, "");
    }
}
