//! End-to-end remote flow against the in-memory transport: preflight gate,
//! budget accounting and resolution, with every request counted.

use std::time::Duration;

use rstest::rstest;
use serde_json::json;

use updraft_core::{DirectorySpec, FileDescriptor};
use updraft_remote::{
    required_calls, required_calls_for_directory, resolve_file_info, resolve_listing,
    GitHubClient, ListingRequest, MemoryTransport, PreflightGate, RemoteError, RequestKind,
    ScriptedConnectivity, WaitPolicy,
};

const API: &str = "https://api.test";
const RAW: &str = "https://raw.test";
const COMMIT: &str = "abcdefabcdefabcdefabcdefabcdefabcdefabcd";

fn no_wait() -> WaitPolicy {
    WaitPolicy {
        timeout: Duration::ZERO,
        interval: Duration::ZERO,
    }
}

fn rate_limit(remaining: u64) -> serde_json::Value {
    json!({ "resources": { "core": { "limit": 5000, "remaining": remaining, "reset": 1700000000 } } })
}

fn history(date: &str) -> serde_json::Value {
    json!([{
        "sha": COMMIT,
        "html_url": "https://github.test/c",
        "url": "https://api.test/c",
        "commit": { "message": "m", "author": { "date": date } }
    }])
}

#[rstest]
#[case(&[], 1)]
#[case(&[Some("main")], 2)]
#[case(&[None], 3)]
#[case(&[Some("v1"), None, None, Some("v2")], 7)]
fn batch_budget(#[case] refs: &[Option<&str>], #[case] expected: u64) {
    let batch: Vec<FileDescriptor> = refs
        .iter()
        .enumerate()
        .map(|(i, r)| FileDescriptor::new("o", "r", &format!("f{i}"), *r))
        .collect();
    assert_eq!(required_calls(&batch), expected);
}

#[rstest]
#[case(None, None, 4)]
#[case(Some("main"), None, 3)]
#[case(Some("main"), Some("a"), 4)]
#[case(None, Some("a/b/c"), 7)]
fn directory_budget(#[case] reference: Option<&str>, #[case] subpath: Option<&str>, #[case] expected: u64) {
    let spec = DirectorySpec {
        owner: "o".into(),
        repo: "r".into(),
        reference: reference.map(str::to_string),
        subpath: subpath.map(str::to_string),
        dest: "/srv/out".into(),
    };
    assert_eq!(required_calls_for_directory(&spec), expected);
}

#[test]
fn gated_batch_spends_exactly_the_estimated_budget() {
    let batch = vec![
        FileDescriptor::new("octo", "tools", "bin/a", Some("main")),
        FileDescriptor::new("octo", "tools", "bin/b", None),
    ];
    let transport = MemoryTransport::new()
        .with_json("https://api.test/rate_limit", 200, rate_limit(10))
        .with_json(
            "https://api.test/repos/octo/tools/commits?path=bin%2Fa&per_page=1&sha=main",
            200,
            history("2024-01-01T00:00:00Z"),
        )
        .with_json(
            "https://api.test/repos/octo/tools/commits?path=bin%2Fb&per_page=1",
            200,
            history("2024-02-01T00:00:00Z"),
        )
        .with_json(
            "https://api.test/repos/octo/tools",
            200,
            json!({ "default_branch": "main" }),
        );
    let client = GitHubClient::new(transport, API, RAW);
    let online = ScriptedConnectivity::online();
    let gate = PreflightGate::new(&client, &online, no_wait());

    gate.wait_for_connectivity().expect("online");
    gate.ensure_budget(required_calls(&batch)).expect("budget");
    let infos: Vec<_> = batch
        .iter()
        .map(|d| resolve_file_info(&client, d))
        .collect::<Result<_, _>>()
        .expect("infos");

    assert_eq!(infos.len(), 2);
    assert_eq!(infos[1].branch, "main");
    assert_eq!(client.api_calls(), required_calls(&batch));
    assert_eq!(client.transport().count(RequestKind::Download), 0);
}

#[test]
fn over_budget_batch_makes_no_resolution_calls() {
    let batch = vec![
        FileDescriptor::new("octo", "tools", "a", None),
        FileDescriptor::new("octo", "tools", "b", None),
    ];
    let transport = MemoryTransport::new().with_json("https://api.test/rate_limit", 200, rate_limit(4));
    let client = GitHubClient::new(transport, API, RAW);
    let online = ScriptedConnectivity::online();
    let gate = PreflightGate::new(&client, &online, no_wait());

    let err = gate.ensure_budget(required_calls(&batch)).unwrap_err();
    match err {
        RemoteError::InsufficientBudget { required, remaining } => {
            assert_eq!(required, 5);
            assert_eq!(remaining, 4);
        }
        other => panic!("expected insufficient budget, got {other:?}"),
    }
    let requests = client.transport().requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].1.ends_with("/rate_limit"));
}

#[test]
fn offline_gate_reports_network_unavailable() {
    let client = GitHubClient::new(MemoryTransport::new(), API, RAW);
    let offline = ScriptedConnectivity::offline();
    let gate = PreflightGate::new(&client, &offline, no_wait());
    let err = gate.wait_for_connectivity().unwrap_err();
    assert!(matches!(err, RemoteError::NetworkUnavailable(_)));
    assert!(err.is_retryable());
    assert_eq!(client.transport().total_requests(), 0);
}

#[test]
fn directory_listing_matches_its_budget() {
    let spec = DirectorySpec {
        owner: "octo".into(),
        repo: "site".into(),
        reference: None,
        subpath: Some("public".into()),
        dest: "/srv/site".into(),
    };
    let transport = MemoryTransport::new()
        .with_json("https://api.test/rate_limit", 200, rate_limit(100))
        .with_json("https://api.test/repos/octo/site", 200, json!({ "default_branch": "gh-pages" }))
        .with_json(
            "https://api.test/repos/octo/site/commits/gh-pages",
            200,
            json!({ "sha": COMMIT, "commit": { "tree": { "sha": "root" } } }),
        )
        .with_json(
            "https://api.test/repos/octo/site/git/trees/root",
            200,
            json!({ "sha": "root", "tree": [ { "path": "public", "type": "tree", "sha": "pub", "mode": "040000" } ] }),
        )
        .with_json(
            "https://api.test/repos/octo/site/git/trees/pub?recursive=1",
            200,
            json!({ "sha": "pub", "truncated": false, "tree": [
                { "path": "index.html", "type": "blob", "sha": "1".repeat(40), "size": 10, "mode": "100644" },
                { "path": "css", "type": "tree", "sha": "css", "mode": "040000" },
                { "path": "css/site.css", "type": "blob", "sha": "2".repeat(40), "size": 20, "mode": "100644" }
            ]}),
        );
    let client = GitHubClient::new(transport, API, RAW);
    let online = ScriptedConnectivity::online();
    let gate = PreflightGate::new(&client, &online, no_wait());

    gate.ensure_budget(required_calls_for_directory(&spec)).expect("budget");
    let listing = resolve_listing(&client, &ListingRequest::from(&spec)).expect("listing");

    assert_eq!(listing.reference, "gh-pages");
    assert_eq!(listing.blobs().count(), 2);
    assert_eq!(
        listing.items[1].mutable_url,
        "https://raw.test/octo/site/gh-pages/public/css/site.css"
    );
    assert_eq!(client.api_calls(), required_calls_for_directory(&spec));
}
