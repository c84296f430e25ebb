//! Request routing, failover and replay against an in-memory connector.

mod common;

use std::time::Duration;

use serde_json::{json, Value};

use common::*;
use ethlink_core::connection::{Connection, ConnectionState};
use ethlink_core::error::RpcError;

// ─── Routing ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn responses_complete_out_of_order() {
    let connector = MockConnector::new();
    let client = client(pool(&["ws://a"]), &connector);

    let head = client.request("eth_blockNumber", vec![]);
    let chain = client.request("eth_chainId", vec![]);

    let conn = connector.connection(0);
    assert_eq!(conn.sent_ids(), vec![1, 2]);

    conn.deliver(ok(&json!(2), json!("0x1")));
    assert_eq!(chain.peek(), Some(Ok(json!("0x1"))));
    assert!(!head.is_done());

    conn.deliver(ok(&json!(1), json!("0x10")));
    assert_eq!(within(head).await, Ok(json!("0x10")));
    assert_eq!(client.pending_len(), 0);
}

#[tokio::test]
async fn batch_frames_are_routed_per_element() {
    let connector = MockConnector::new();
    let client = client(pool(&["ws://a"]), &connector);

    let a = client.request("eth_blockNumber", vec![]);
    let b = client.request("eth_gasPrice", vec![]);
    connector.connection(0).deliver(json!([
        ok(&json!(2), json!("0x3b9aca00")),
        ok(&json!(1), json!("0x5")),
    ]));

    assert_eq!(a.peek(), Some(Ok(json!("0x5"))));
    assert_eq!(b.peek(), Some(Ok(json!("0x3b9aca00"))));
}

#[tokio::test]
async fn node_error_fails_only_its_request() {
    let connector = MockConnector::new();
    let client = client(pool(&["ws://a", "ws://b"]), &connector);

    let call = client.request("eth_call", vec![json!({"to": "0x0"}), json!("latest")]);
    let head = client.request("eth_blockNumber", vec![]);

    let conn = connector.connection(0);
    conn.deliver(err(&json!(1), 3, "execution reverted"));

    match within(call).await {
        Err(RpcError::Rpc(e)) => {
            assert_eq!(e.code, 3);
            assert_eq!(e.message, "execution reverted");
        }
        other => panic!("expected node error, got {other:?}"),
    }
    assert!(!head.is_done());
    assert_eq!(connector.connections().len(), 1, "node errors must not fail over");
    assert_eq!(client.endpoint().url(), "ws://a");
}

#[tokio::test]
async fn null_result_is_a_value() {
    let connector = MockConnector::new();
    let client = client(pool(&["ws://a"]), &connector);

    let block = client.request("eth_getBlockByNumber", vec![json!("0xffffff"), json!(false)]);
    connector.connection(0).deliver(ok(&json!(1), Value::Null));
    assert_eq!(within(block).await, Ok(Value::Null));
}

#[tokio::test]
async fn typed_helpers_parse_quantities() {
    let connector = MockConnector::with_responder(|_, method, _| match method {
        "eth_chainId" => Some(Ok(json!("0x89"))),
        "eth_gasPrice" => Some(Ok(json!("0x6fc23ac00"))),
        _ => None,
    });
    let client = client(pool(&["ws://a"]), &connector);

    assert_eq!(within(client.chain_id()).await, Ok(137));
    assert_eq!(within(client.gas_price()).await, Ok(30_000_000_000));
}

// ─── Cancellation & shutdown ──────────────────────────────────────────────────

#[tokio::test]
async fn cancel_removes_request_from_replay() {
    let connector = MockConnector::new();
    let client = client(pool(&["ws://a", "ws://b"]), &connector);

    let r = client.request("eth_blockNumber", vec![]);
    assert!(r.cancel());
    assert_eq!(client.pending_len(), 0);

    connector.connection(0).fail();
    wait_for("failover", || connector.connections().len() == 2).await;
    assert!(connector.connection(1).sent_ids().is_empty());
    assert!(r.is_cancelled());
}

#[tokio::test]
async fn late_response_after_cancel_is_dropped() {
    let connector = MockConnector::new();
    let client = client(pool(&["ws://a"]), &connector);

    let r = client.request("eth_blockNumber", vec![]);
    r.cancel();
    connector.connection(0).deliver(ok(&json!(1), json!("0x1")));
    assert_eq!(r.peek(), Some(Err(RpcError::Cancelled)));
}

#[tokio::test]
async fn shutdown_closes_connection_and_stops_sending() {
    let connector = MockConnector::new();
    let client = client(pool(&["ws://a", "ws://b"]), &connector);

    let before = client.request("eth_blockNumber", vec![]);
    let conn = connector.connection(0);
    client.shutdown();
    assert!(client.is_shutdown());
    assert_eq!(conn.state(), ConnectionState::Closed);

    let after = client.request("eth_chainId", vec![]);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(conn.sent_ids(), vec![1]);
    assert_eq!(connector.connections().len(), 1);
    assert!(!before.is_done());
    assert!(!after.is_done());
}

// ─── Failover ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn failover_replays_pending_request_once() {
    let connector = MockConnector::new();
    let client = client(pool(&["ws://a", "ws://b"]), &connector);

    let r = client.request("eth_blockNumber", vec![]);
    let first = connector.connection(0);
    assert_eq!(first.url(), "ws://a");

    first.fail();
    wait_for("reconnect to b", || connector.connections().len() == 2).await;

    let second = connector.connection(1);
    assert_eq!(second.url(), "ws://b");
    assert_eq!(second.sent_ids(), vec![1]);
    assert_eq!(first.sent_ids(), vec![1]);

    second.deliver(ok(&json!(1), json!("0x2a")));
    assert_eq!(within(r).await, Ok(json!("0x2a")));
    assert_eq!(client.endpoint().url(), "ws://b");
}

#[tokio::test]
async fn requests_during_failover_wait_for_replay() {
    let connector = MockConnector::new();
    let client = client(pool(&["ws://a", "ws://b"]), &connector);

    let _first = client.request("eth_blockNumber", vec![]);
    connector.connection(0).close_by_peer();
    let _second = client.request("eth_chainId", vec![]);

    wait_for("reconnect", || connector.connections().len() == 2).await;
    let conn = connector.connection(1);
    assert_eq!(conn.sent_ids(), vec![1, 2]);

    let _third = client.request("eth_gasPrice", vec![]);
    assert_eq!(conn.sent_ids(), vec![1, 2, 3]);
}

#[tokio::test]
async fn responses_from_replaced_connection_still_complete() {
    let connector = MockConnector::new();
    let client = client(pool(&["ws://a", "ws://b"]), &connector);

    let r = client.request("eth_blockNumber", vec![]);
    let old = connector.connection(0);
    old.fail();
    wait_for("reconnect", || connector.connections().len() == 2).await;

    old.deliver(ok(&json!(1), json!("0x7")));
    assert_eq!(r.peek(), Some(Ok(json!("0x7"))));

    // the replayed copy's answer is ignored
    connector.connection(1).deliver(ok(&json!(1), json!("0x8")));
    assert_eq!(r.peek(), Some(Ok(json!("0x7"))));
}

#[tokio::test]
async fn fault_from_replaced_connection_is_ignored() {
    let connector = MockConnector::new();
    let client = client(pool(&["ws://a", "ws://b"]), &connector);

    let _r = client.request("eth_blockNumber", vec![]);
    let old = connector.connection(0);
    old.fail();
    wait_for("reconnect", || connector.connections().len() == 2).await;

    old.late_error();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(connector.connections().len(), 2);
    assert_eq!(client.endpoint().url(), "ws://b");
    assert_eq!(connector.connection(1).state(), ConnectionState::Open);
}

#[tokio::test(start_paused = true)]
async fn rotation_skips_refused_endpoint_and_wraps() {
    let connector = MockConnector::new();
    connector.refuse("ws://b");
    let client = client(pool(&["ws://a", "ws://b", "ws://c"]), &connector);

    let r = client.request("eth_blockNumber", vec![]);
    connector.connection(0).fail();
    wait_for("connect to c", || connector.connections().len() == 2).await;

    assert_eq!(connector.attempts(), vec!["ws://a", "ws://b", "ws://c"]);
    let c = connector.connection(1);
    assert_eq!(c.url(), "ws://c");
    assert_eq!(c.sent_ids(), vec![1]);

    c.fail();
    wait_for("wrap to a", || connector.connections().len() == 3).await;
    assert_eq!(connector.attempts().last().map(String::as_str), Some("ws://a"));
    assert_eq!(connector.connection(2).sent_ids(), vec![1]);

    connector.connection(2).deliver(ok(&json!(1), json!("0x1")));
    assert_eq!(within(r).await, Ok(json!("0x1")));
}

#[tokio::test(start_paused = true)]
async fn unreachable_pool_keeps_retrying() {
    let connector = MockConnector::new();
    connector.refuse("ws://b");
    let client = client(pool(&["ws://a", "ws://b"]), &connector);

    let r = client.request("eth_blockNumber", vec![]);
    connector.refuse("ws://a");
    connector.connection(0).fail();

    wait_for("several rounds", || connector.attempts().len() >= 5).await;
    assert_eq!(connector.connections().len(), 1);
    assert!(!r.is_done(), "transport faults never fail a request");
    assert_eq!(client.pending_len(), 1);
}
