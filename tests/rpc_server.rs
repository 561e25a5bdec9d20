//! End-to-end JSON-RPC over a real TCP socket.

#[cfg(test)]
mod tests {
    use libp2p_identity::PeerId;
    use peerctl::network::blacklist::Blacklist;
    use peerctl::network::connection_manager::ConnectionManager;
    use peerctl::network::peer_status::{PeerStatus, PeerStore};
    use peerctl::rpc::handler::{RpcHandler, INVALID_PARAMS, METHOD_NOT_FOUND, PARSE_ERROR};
    use peerctl::rpc::server::{RpcServer, DEFAULT_READ_TIMEOUT};
    use peerctl::{PeerControl, PeerManager};
    use serde_json::{json, Value};
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio_util::sync::CancellationToken;

    async fn start() -> (SocketAddr, Arc<PeerStatus>, CancellationToken) {
        start_with_read_timeout(DEFAULT_READ_TIMEOUT).await
    }

    async fn start_with_read_timeout(
        read_timeout: Duration,
    ) -> (SocketAddr, Arc<PeerStatus>, CancellationToken) {
        let store = Arc::new(PeerStatus::new());
        let cm = Arc::new(ConnectionManager::new(store.clone()));
        let control = PeerControl::new(
            PeerManager::new(store.clone(), cm),
            Arc::new(Blacklist::with_entries(vec!["6.6.6.6".to_string()], vec![])),
        );
        let handler = Arc::new(RpcHandler::new(Arc::new(control)));

        let server = RpcServer::bind("127.0.0.1:0", handler)
            .await
            .unwrap()
            .with_read_timeout(read_timeout);
        let addr = server.local_addr().unwrap();
        let token = CancellationToken::new();
        let run_token = token.clone();
        tokio::spawn(async move {
            server.run(run_token).await.unwrap();
        });
        (addr, store, token)
    }

    async fn post(addr: SocketAddr, body: &str) -> Value {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "POST / HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();
        let text = String::from_utf8(raw).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK"));
        let body = text.split("\r\n\r\n").nth(1).unwrap();
        serde_json::from_str(body).unwrap()
    }

    async fn call(addr: SocketAddr, method: &str, params: Value) -> Value {
        let body = json!({ "jsonrpc": "2.0", "id": 7, "method": method, "params": params });
        post(addr, &body.to_string()).await
    }

    #[tokio::test]
    async fn test_trusted_peer_lifecycle_over_tcp() {
        let (addr, store, token) = start().await;
        let peer = PeerId::random();

        let resp = call(
            addr,
            "addtrustedpeer",
            json!([format!("/ip4/127.0.0.1/tcp/13000/p2p/{}", peer)]),
        )
        .await;
        assert_eq!(resp["id"], 7);
        assert_eq!(resp["result"]["peer_id"], peer.to_string());
        assert!(store.is_trusted(&peer));

        let resp = call(addr, "listtrustedpeers", json!([])).await;
        let peers = resp["result"]["peers"].as_array().unwrap();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0]["peer_id"], peer.to_string());
        assert_eq!(peers[0]["state"], "NOT_CONNECTED");
        assert_eq!(peers[0]["direction"], "UNKNOWN");

        let resp = call(addr, "removetrustedpeer", json!([peer.to_string()])).await;
        assert!(resp.get("error").is_none());
        assert!(!store.is_trusted(&peer));

        token.cancel();
    }

    #[tokio::test]
    async fn test_blacklist_over_tcp() {
        let (addr, _, token) = start().await;

        call(addr, "addblacklist", json!(["1.2.3.4", "bad-peer"])).await;
        let resp = call(addr, "listblacklist", Value::Null).await;
        assert_eq!(
            resp["result"],
            json!({ "ips": ["1.2.3.4", "6.6.6.6"], "ids": ["bad-peer"] })
        );

        call(addr, "removeblacklist", json!(["6.6.6.6", null])).await;
        let resp = call(addr, "listblacklist", Value::Null).await;
        assert_eq!(resp["result"]["ips"], json!(["1.2.3.4"]));

        token.cancel();
    }

    #[tokio::test]
    async fn test_error_codes_over_tcp() {
        let (addr, _, token) = start().await;

        let resp = post(addr, "{not json").await;
        assert_eq!(resp["error"]["code"], PARSE_ERROR);
        assert_eq!(resp["id"], Value::Null);

        let resp = call(addr, "getpeerinfo", json!([])).await;
        assert_eq!(resp["error"]["code"], METHOD_NOT_FOUND);

        let resp = call(addr, "addtrustedpeer", json!(["/ip4/1.2.3.4/tcp/1"])).await;
        assert_eq!(resp["error"]["code"], INVALID_PARAMS);

        let resp = call(addr, "pruneall", json!([])).await;
        assert_eq!(resp["result"]["pruned"], 0);

        token.cancel();
    }

    #[tokio::test]
    async fn test_stalled_client_is_dropped() {
        let (addr, _, token) = start_with_read_timeout(Duration::from_millis(100)).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"POST / HTTP/1.1\r\nContent-Length: 100\r\n\r\n{\"method\"")
            .await
            .unwrap();

        let mut raw = Vec::new();
        let read = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut raw))
            .await
            .expect("server kept a stalled connection open");
        // Closed without a response, either cleanly or by reset.
        if read.is_ok() {
            assert!(raw.is_empty());
        }

        // Other clients are still served.
        let resp = call(addr, "pruneall", json!([])).await;
        assert_eq!(resp["result"]["pruned"], 0);

        token.cancel();
    }

    #[tokio::test]
    async fn test_server_stops_on_cancel() {
        let (addr, _, token) = start().await;
        token.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(TcpStream::connect(addr).await.is_err());
    }
}
