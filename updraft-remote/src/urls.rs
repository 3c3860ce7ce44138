//! URL construction for the API and raw-content hosts.
//!
//! Path segments are percent-encoded one at a time so slashes inside a
//! repository path survive literally; query values encode everything but the
//! unreserved set.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Everything except RFC 3986 unreserved characters.
const UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Encode a single path segment.
pub fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, UNRESERVED).to_string()
}

/// Encode a slash-separated path, segment by segment.
pub fn encode_path(path: &str) -> String {
    path.split('/')
        .map(encode_segment)
        .collect::<Vec<_>>()
        .join("/")
}

fn trim_base(base: &str) -> &str {
    base.trim_end_matches('/')
}

/// `{api}/repos/{owner}/{repo}`
pub fn repo_url(api_base: &str, owner: &str, repo: &str) -> String {
    format!(
        "{}/repos/{}/{}",
        trim_base(api_base),
        encode_segment(owner),
        encode_segment(repo)
    )
}

/// `{api}/repos/{owner}/{repo}/commits/{ref}`
pub fn commit_url(api_base: &str, owner: &str, repo: &str, reference: &str) -> String {
    format!(
        "{}/commits/{}",
        repo_url(api_base, owner, repo),
        encode_path(reference)
    )
}

/// `{api}/repos/{owner}/{repo}/git/trees/{sha}[?recursive=1]`
pub fn tree_url(api_base: &str, owner: &str, repo: &str, sha: &str, recursive: bool) -> String {
    let url = format!(
        "{}/git/trees/{}",
        repo_url(api_base, owner, repo),
        encode_segment(sha)
    );
    if recursive {
        format!("{url}?recursive=1")
    } else {
        url
    }
}

/// `{api}/repos/{owner}/{repo}/commits?path={path}&per_page=1[&sha={ref}]`
pub fn path_commits_url(
    api_base: &str,
    owner: &str,
    repo: &str,
    path: &str,
    reference: Option<&str>,
) -> String {
    let mut url = format!(
        "{}/commits?path={}&per_page=1",
        repo_url(api_base, owner, repo),
        utf8_percent_encode(path, UNRESERVED)
    );
    if let Some(reference) = reference {
        url.push_str("&sha=");
        url.push_str(&utf8_percent_encode(reference, UNRESERVED).to_string());
    }
    url
}

/// `{api}/rate_limit`
pub fn rate_limit_url(api_base: &str) -> String {
    format!("{}/rate_limit", trim_base(api_base))
}

/// `{raw}/{owner}/{repo}/{ref or commit}/{path}`
pub fn raw_url(raw_base: &str, owner: &str, repo: &str, reference: &str, path: &str) -> String {
    format!(
        "{}/{}/{}/{}/{}",
        trim_base(raw_base),
        encode_segment(owner),
        encode_segment(repo),
        encode_path(reference),
        encode_path(path)
    )
}

/// Host part of an http(s) URL, without port or userinfo.
pub fn host_of(url: &str) -> Option<&str> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))?;
    let authority = rest.split(['/', '?', '#']).next()?;
    let authority = authority.rsplit('@').next()?;
    let host = match authority.strip_prefix('[') {
        Some(v6) => v6.split(']').next()?,
        None => authority.split(':').next()?,
    };
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_segments_encoded_independently() {
        assert_eq!(encode_path("dir with space/ä.txt"), "dir%20with%20space/%C3%A4.txt");
        assert_eq!(encode_path("a#b/c?d"), "a%23b/c%3Fd");
        assert_eq!(encode_path("keep-._~"), "keep-._~");
    }

    #[test]
    fn raw_url_preserves_slashes() {
        assert_eq!(
            raw_url("https://raw.test/", "octo", "widgets", "main", "bin/my tool"),
            "https://raw.test/octo/widgets/main/bin/my%20tool"
        );
    }

    #[test]
    fn path_commits_url_encodes_query() {
        assert_eq!(
            path_commits_url("https://api.test", "octo", "widgets", "bin/tool", Some("v1")),
            "https://api.test/repos/octo/widgets/commits?path=bin%2Ftool&per_page=1&sha=v1"
        );
        assert_eq!(
            path_commits_url("https://api.test", "octo", "widgets", "a.txt", None),
            "https://api.test/repos/octo/widgets/commits?path=a.txt&per_page=1"
        );
    }

    #[test]
    fn tree_url_recursive_flag() {
        assert_eq!(
            tree_url("https://api.test", "o", "r", "abc", true),
            "https://api.test/repos/o/r/git/trees/abc?recursive=1"
        );
        assert_eq!(
            tree_url("https://api.test", "o", "r", "abc", false),
            "https://api.test/repos/o/r/git/trees/abc"
        );
    }

    #[test]
    fn host_extraction() {
        assert_eq!(host_of("https://api.github.com/rate_limit"), Some("api.github.com"));
        assert_eq!(host_of("http://user@example.com:8080/x"), Some("example.com"));
        assert_eq!(host_of("https://[::1]:443/"), Some("::1"));
        assert_eq!(host_of("ftp://nope"), None);
        assert_eq!(host_of("https:///path"), None);
    }
}
