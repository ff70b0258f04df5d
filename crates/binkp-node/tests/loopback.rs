//! Full-stack test: two nodes over real loopback TCP, filesystem queues,
//! CRAM-MD5 secured link, graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use binkp_core::{CloseReason, FtnAddress};
use binkp_node::{Config, FsQueue, Node};

struct TestNode {
    node: Arc<Node>,
    dirs: TempDir,
}

fn addr_a() -> FtnAddress {
    "2:5020/1042".parse().unwrap()
}

fn addr_b() -> FtnAddress {
    "2:5020/99".parse().unwrap()
}

fn make_node(address: &FtnAddress, links: &[(FtnAddress, Option<u16>, &str)]) -> TestNode {
    let dirs = TempDir::new().unwrap();
    let mut text = format!(
        "ftn.primary = {address}\n\
         station.name = Node {address}\n\
         sysop.name = Op\n\
         ftn.location = Loopback\n\
         ftn.inbound = {in_dir}\n\
         ftn.outbound = {out_dir}\n\
         ftn.temp = {tmp_dir}\n\
         binkp.bind = 127.0.0.1\n\
         binkp.port = 0\n\
         binkp.timeout = 5\n\
         binkp.connect.timeout = 5\n",
        in_dir = dirs.path().join("in").display(),
        out_dir = dirs.path().join("out").display(),
        tmp_dir = dirs.path().join("tmp").display(),
    );
    for (link, port, password) in links {
        let host = match port {
            Some(port) => format!("127.0.0.1:{port}"),
            None => "-".to_owned(),
        };
        text.push_str(&format!("link.{link} = {host},{password}\n"));
    }

    let config = Config::parse(&text).unwrap();
    let queue = Arc::new(FsQueue::new(&config.outbound_dir));
    TestNode {
        node: Arc::new(Node::new(config, queue)),
        dirs,
    }
}

fn seed_outbound(node: &TestNode, link: &FtnAddress, name: &str, bytes: &[u8]) {
    let queue = FsQueue::new(&node.node.config().outbound_dir);
    let dir = queue.link_dir(link);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(name), bytes).unwrap();
}

async fn inbound_files(node: &TestNode) -> Vec<(String, Vec<u8>)> {
    let mut out = Vec::new();
    if let Ok(mut entries) = tokio::fs::read_dir(node.dirs.path().join("in")).await {
        while let Some(entry) = entries.next_entry().await.unwrap() {
            out.push((
                entry.file_name().to_string_lossy().into_owned(),
                tokio::fs::read(entry.path()).await.unwrap(),
            ));
        }
    }
    out.sort();
    out
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn poll_transfers_files_both_ways() {
    // Answering node A, with a secured link for B and a file queued for it.
    let node_a = make_node(&addr_a(), &[(addr_b(), None, "hunter2")]);
    seed_outbound(&node_a, &addr_b(), "reply_7.pkt", b"packet going south");

    let listener = node_a.node.bind().await.unwrap();
    let port = listener.local_addrs()[0].port();
    let serve_cancel = CancellationToken::new();
    let serving = {
        let cancel = serve_cancel.clone();
        tokio::spawn(listener.serve(cancel))
    };

    // Originating node B, dialing A with the matching password.
    let node_b = make_node(&addr_b(), &[(addr_a(), Some(port), "hunter2")]);
    seed_outbound(&node_b, &addr_a(), "echo_1.pkt", b"HELLO");
    seed_outbound(&node_b, &addr_a(), "echo_2.pkt", &[0x42; 100_000]);

    let outcome = tokio::time::timeout(
        Duration::from_secs(20),
        node_b.node.poll(&addr_a(), CancellationToken::new()),
    )
    .await
    .expect("poll deadlocked")
    .expect("poll failed");
    assert_eq!(outcome.reason, CloseReason::Complete);
    assert_eq!(outcome.peer, Some(addr_a()));

    // B's files landed in A's inbound, and vice versa.
    let a_files = inbound_files(&node_a).await;
    assert_eq!(a_files.len(), 2);
    assert_eq!(a_files[0], ("echo_1.pkt".to_owned(), b"HELLO".to_vec()));
    assert_eq!(a_files[1].1.len(), 100_000);

    assert_eq!(
        inbound_files(&node_b).await,
        vec![("reply_7.pkt".to_owned(), b"packet going south".to_vec())]
    );

    // Committed items are gone from B's queue; a second poll moves nothing.
    let second = node_b
        .node
        .poll(&addr_a(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(second.reason, CloseReason::Complete);
    assert_eq!(second.counters.files_tx, 0);
    assert_eq!(inbound_files(&node_a).await.len(), 2);

    let stats = node_b.node.stats();
    assert_eq!(stats.sessions_total, 2);
    assert_eq!(stats.sessions_active, 0);
    assert_eq!(stats.totals.files_tx, 2);
    assert_eq!(stats.totals.files_rx, 1);

    serve_cancel.cancel();
    tokio::time::timeout(Duration::from_secs(10), serving)
        .await
        .expect("shutdown hung")
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn wrong_link_password_is_rejected() {
    let node_a = make_node(&addr_a(), &[(addr_b(), None, "right-password")]);
    let listener = node_a.node.bind().await.unwrap();
    let port = listener.local_addrs()[0].port();
    let serve_cancel = CancellationToken::new();
    let serving = tokio::spawn(listener.serve(serve_cancel.clone()));

    let node_b = make_node(&addr_b(), &[(addr_a(), Some(port), "wrong-password")]);
    let result = tokio::time::timeout(
        Duration::from_secs(20),
        node_b.node.poll(&addr_a(), CancellationToken::new()),
    )
    .await
    .expect("poll deadlocked");
    assert!(result.is_err(), "poll with a bad password succeeded");

    serve_cancel.cancel();
    tokio::time::timeout(Duration::from_secs(10), serving)
        .await
        .expect("shutdown hung")
        .unwrap();
}

#[tokio::test]
async fn polling_a_hostless_link_fails_fast() {
    let node = make_node(&addr_a(), &[(addr_b(), None, "pw")]);
    let result = node.node.poll(&addr_b(), CancellationToken::new()).await;
    assert!(matches!(result, Err(binkp_node::node::NodeError::NoHost(_))));
}

#[tokio::test]
async fn shutdown_with_no_sessions_returns_promptly() {
    let node = make_node(&addr_a(), &[]);
    let listener = node.node.bind().await.unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), listener.serve(cancel))
        .await
        .expect("cancelled serve hung");
}
