//! JSON-RPC method dispatch for the peer control surface.

use super::server::{RpcError, RpcRequest, RpcResponse};
use crate::control::{ControlError, PeerControl};
use serde_json::{json, Value};
use std::sync::Arc;

pub const PARSE_ERROR: i32 = -32700;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

pub struct RpcHandler {
    control: Arc<PeerControl>,
}

impl RpcHandler {
    pub fn new(control: Arc<PeerControl>) -> Self {
        Self { control }
    }

    pub async fn handle_request(&self, request: RpcRequest) -> RpcResponse {
        // Convert params Value to array
        let params_array = match &request.params {
            Value::Array(arr) => arr.clone(),
            Value::Null => vec![],
            other => vec![other.clone()],
        };

        let result = match request.method.as_str() {
            "listtrustedpeers" => self.list_trusted_peers(),
            "addtrustedpeer" => self.add_trusted_peer(&params_array),
            "removetrustedpeer" => self.remove_trusted_peer(&params_array).await,
            "pruneall" => self.prune_all(),
            "listblacklist" => self.list_blacklist(),
            "addblacklist" => self.add_blacklist(&params_array),
            "removeblacklist" => self.remove_blacklist(&params_array),
            _ => Err(RpcError {
                code: METHOD_NOT_FOUND,
                message: format!("Method not found: {}", request.method),
            }),
        };

        match result {
            Ok(value) => RpcResponse::success(request.id, value),
            Err(error) => RpcResponse::failure(request.id, error),
        }
    }

    fn list_trusted_peers(&self) -> Result<Value, RpcError> {
        let peers = self.control.list_trusted().map_err(control_error)?;
        Ok(json!({ "peers": peers }))
    }

    fn add_trusted_peer(&self, params: &[Value]) -> Result<Value, RpcError> {
        let addr = required_str(params, 0, "Multiaddress parameter required")?;
        let peer_id = self.control.add_trusted(addr).map_err(control_error)?;
        Ok(json!({
            "result": "success",
            "peer_id": peer_id.to_string()
        }))
    }

    async fn remove_trusted_peer(&self, params: &[Value]) -> Result<Value, RpcError> {
        let id = required_str(params, 0, "Peer id parameter required")?;
        self.control
            .remove_trusted(id)
            .await
            .map_err(control_error)?;
        Ok(json!({ "result": "success" }))
    }

    fn prune_all(&self) -> Result<Value, RpcError> {
        let pruned = self.control.prune_all();
        Ok(json!({
            "result": "success",
            "pruned": pruned
        }))
    }

    fn list_blacklist(&self) -> Result<Value, RpcError> {
        let snapshot = self.control.list_blacklist();
        Ok(json!({
            "ips": snapshot.ips,
            "ids": snapshot.ids
        }))
    }

    fn add_blacklist(&self, params: &[Value]) -> Result<Value, RpcError> {
        let (ip, id) = ip_and_id(params)?;
        self.control.add_blacklist(ip, id);
        Ok(json!({ "result": "success" }))
    }

    fn remove_blacklist(&self, params: &[Value]) -> Result<Value, RpcError> {
        let (ip, id) = ip_and_id(params)?;
        self.control.remove_blacklist(ip, id);
        Ok(json!({ "result": "success" }))
    }
}

fn control_error(err: ControlError) -> RpcError {
    let code = if err.is_malformed_input() {
        INVALID_PARAMS
    } else {
        INTERNAL_ERROR
    };
    RpcError {
        code,
        message: err.to_string(),
    }
}

fn required_str<'a>(params: &'a [Value], index: usize, missing: &str) -> Result<&'a str, RpcError> {
    params
        .get(index)
        .and_then(|v| v.as_str())
        .ok_or_else(|| RpcError {
            code: INVALID_PARAMS,
            message: missing.to_string(),
        })
}

/// Blacklist params: `[ip, id]` where either may be omitted, null or "".
fn ip_and_id(params: &[Value]) -> Result<(&str, &str), RpcError> {
    Ok((
        optional_str(params, 0, "ip")?,
        optional_str(params, 1, "id")?,
    ))
}

fn optional_str<'a>(params: &'a [Value], index: usize, name: &str) -> Result<&'a str, RpcError> {
    match params.get(index) {
        None | Some(Value::Null) => Ok(""),
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(other) => Err(RpcError {
            code: INVALID_PARAMS,
            message: format!("Invalid {} parameter: {}", name, other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::blacklist::Blacklist;
    use crate::network::connection_manager::ConnectionManager;
    use crate::network::peer_status::PeerStatus;
    use crate::peer_manager::PeerManager;
    use libp2p_identity::PeerId;

    fn handler() -> RpcHandler {
        let store = Arc::new(PeerStatus::new());
        let cm = Arc::new(ConnectionManager::new(store.clone()));
        let control = PeerControl::new(PeerManager::new(store, cm), Arc::new(Blacklist::new()));
        RpcHandler::new(Arc::new(control))
    }

    fn request(method: &str, params: Value) -> RpcRequest {
        RpcRequest {
            jsonrpc: "2.0".to_string(),
            id: json!(1),
            method: method.to_string(),
            params,
        }
    }

    #[tokio::test]
    async fn test_trusted_peer_round() {
        let handler = handler();
        let peer = PeerId::random();
        let addr = format!("/ip4/127.0.0.1/tcp/30303/p2p/{}", peer);

        let resp = handler.handle_request(request("addtrustedpeer", json!([addr]))).await;
        assert!(resp.error.is_none());
        assert_eq!(resp.result.unwrap()["peer_id"], peer.to_string());

        let resp = handler.handle_request(request("listtrustedpeers", Value::Null)).await;
        let result = resp.result.unwrap();
        assert_eq!(
            result,
            json!({
                "peers": [{
                    "peer_id": peer.to_string(),
                    "enr": "",
                    "last_seen_p2p_address": "",
                    "state": "NOT_CONNECTED",
                    "direction": "UNKNOWN"
                }]
            })
        );

        let resp = handler
            .handle_request(request("removetrustedpeer", json!([peer.to_string()])))
            .await;
        assert!(resp.error.is_none());
        let resp = handler.handle_request(request("listtrustedpeers", json!([]))).await;
        assert_eq!(resp.result.unwrap(), json!({ "peers": [] }));
    }

    #[tokio::test]
    async fn test_malformed_input_maps_to_invalid_params() {
        let handler = handler();
        let resp = handler
            .handle_request(request("addtrustedpeer", json!(["not-a-multiaddress"])))
            .await;
        let err = resp.error.unwrap();
        assert_eq!(err.code, INVALID_PARAMS);
        assert!(err.message.contains("could not derive peer info"));

        let resp = handler.handle_request(request("removetrustedpeer", json!([]))).await;
        assert_eq!(resp.error.unwrap().code, INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_blacklist_methods() {
        let handler = handler();
        handler
            .handle_request(request("addblacklist", json!(["1.2.3.4", ""])))
            .await;
        handler
            .handle_request(request("addblacklist", json!([null, "bad-peer"])))
            .await;

        let resp = handler.handle_request(request("listblacklist", Value::Null)).await;
        assert_eq!(
            resp.result.unwrap(),
            json!({ "ips": ["1.2.3.4"], "ids": ["bad-peer"] })
        );

        handler
            .handle_request(request("removeblacklist", json!(["1.2.3.4"])))
            .await;
        let resp = handler.handle_request(request("listblacklist", Value::Null)).await;
        assert_eq!(
            resp.result.unwrap(),
            json!({ "ips": [], "ids": ["bad-peer"] })
        );

        let resp = handler
            .handle_request(request("addblacklist", json!([42])))
            .await;
        assert_eq!(resp.error.unwrap().code, INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let handler = handler();
        let resp = handler.handle_request(request("getblockcount", Value::Null)).await;
        assert_eq!(resp.error.unwrap().code, METHOD_NOT_FOUND);
        assert_eq!(resp.id, json!(1));
    }

    #[tokio::test]
    async fn test_prune_all_reports_count() {
        let handler = handler();
        let resp = handler.handle_request(request("pruneall", Value::Null)).await;
        assert_eq!(resp.result.unwrap()["pruned"], 0);
    }
}
