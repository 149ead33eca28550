//! Wire format of the publish endpoint.
//!
//! Messages are JSON-RPC 2.0 objects, one per line. The only method is
//! `publish`; document content travels as standard base64.
//!
//! ```json
//! {"jsonrpc":"2.0","id":1,"method":"publish",
//!  "params":{"project":"demo","project_docs":[{"path":"index.html","content":"PHA+aGk8L3A+"}]}}
//! ```

use super::{ProjectDoc, PublishRequest};
use crate::error::PublishError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";
pub const PUBLISH_METHOD: &str = "publish";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const PUBLISH_FAILED: i64 = -32000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<&PublishError> for RpcError {
    fn from(err: &PublishError) -> Self {
        let code = if err.is_invalid_input() {
            INVALID_PARAMS
        } else {
            PUBLISH_FAILED
        };
        RpcError::new(code, err.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    /// `Some(Value::Null)` for an explicit `"result": null`.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// A field that is present deserializes to `Some`, even when it is `null`.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

impl RpcResponse {
    /// Successful `publish`: the result is always `null`.
    pub fn success(id: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(Value::Null),
            error: None,
        }
    }

    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// `params` of a `publish` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishParams {
    pub project: String,
    pub project_docs: Vec<WireDoc>,
}

/// A document as it travels on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireDoc {
    pub path: String,
    /// Standard base64 of the file bytes.
    pub content: String,
}

impl From<&PublishRequest> for PublishParams {
    fn from(request: &PublishRequest) -> Self {
        Self {
            project: request.project.clone(),
            project_docs: request
                .project_docs
                .iter()
                .map(|doc| WireDoc {
                    path: doc.path.clone(),
                    content: STANDARD.encode(&doc.content),
                })
                .collect(),
        }
    }
}

impl TryFrom<PublishParams> for PublishRequest {
    type Error = RpcError;

    fn try_from(params: PublishParams) -> Result<Self, Self::Error> {
        let project_docs = params
            .project_docs
            .into_iter()
            .map(|doc| {
                let content = STANDARD.decode(doc.content.as_bytes()).map_err(|e| {
                    RpcError::new(
                        INVALID_PARAMS,
                        format!("content of {:?} is not valid base64: {e}", doc.path),
                    )
                })?;
                Ok(ProjectDoc {
                    path: doc.path,
                    content,
                })
            })
            .collect::<Result<Vec<_>, RpcError>>()?;

        Ok(PublishRequest {
            project: params.project,
            project_docs,
        })
    }
}

/// Build the request line for a `publish` call.
pub fn encode_publish(id: u64, request: &PublishRequest) -> serde_json::Result<String> {
    let message = RpcRequest {
        jsonrpc: JSONRPC_VERSION.to_string(),
        id: Value::from(id),
        method: PUBLISH_METHOD.to_string(),
        params: serde_json::to_value(PublishParams::from(request))?,
    };
    serde_json::to_string(&message)
}

/// Decode one request line into a publish request.
///
/// On failure the returned response is ready to be sent back; it carries the
/// request id whenever one could be recovered.
pub fn decode_publish(line: &str) -> Result<(Value, PublishRequest), Box<RpcResponse>> {
    let raw: Value = serde_json::from_str(line).map_err(|e| {
        Box::new(RpcResponse::failure(
            Value::Null,
            RpcError::new(PARSE_ERROR, format!("invalid JSON: {e}")),
        ))
    })?;
    let id = raw.get("id").cloned().unwrap_or(Value::Null);
    let fail = |code, message: String| Box::new(RpcResponse::failure(id.clone(), RpcError::new(code, message)));

    let request: RpcRequest =
        serde_json::from_value(raw).map_err(|e| fail(INVALID_REQUEST, e.to_string()))?;
    if request.jsonrpc != JSONRPC_VERSION {
        return Err(fail(
            INVALID_REQUEST,
            format!("unsupported jsonrpc version {:?}", request.jsonrpc),
        ));
    }
    if request.method != PUBLISH_METHOD {
        return Err(fail(
            METHOD_NOT_FOUND,
            format!("method {:?} not found", request.method),
        ));
    }

    let params: PublishParams = serde_json::from_value(request.params)
        .map_err(|e| fail(INVALID_PARAMS, format!("invalid publish params: {e}")))?;
    let publish = PublishRequest::try_from(params).map_err(|e| fail(e.code, e.message))?;

    Ok((request.id, publish))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> PublishRequest {
        PublishRequest {
            project: "demo".into(),
            project_docs: vec![
                ProjectDoc::new("index.html", "<p>hi</p>"),
                ProjectDoc::new("img/logo.png", vec![0x89, b'P', b'N', b'G', 0x00, 0xff]),
            ],
        }
    }

    #[test]
    fn encoded_request_decodes_to_same_documents() {
        let line = encode_publish(7, &sample()).unwrap();
        assert!(!line.contains('\n'));

        let (id, decoded) = decode_publish(&line).unwrap();
        assert_eq!(id, json!(7));
        assert_eq!(decoded, sample());
    }

    #[test]
    fn content_is_base64_on_the_wire() {
        let line = encode_publish(1, &sample()).unwrap();
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["method"], "publish");
        assert_eq!(value["params"]["project_docs"][0]["content"], "PHA+aGk8L3A+");
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let err = decode_publish("{not json").unwrap_err();
        assert_eq!(err.id, Value::Null);
        assert_eq!(err.error.unwrap().code, PARSE_ERROR);
    }

    #[test]
    fn unknown_method_keeps_request_id() {
        let line = json!({"jsonrpc": "2.0", "id": 3, "method": "unpublish", "params": {}});
        let err = decode_publish(&line.to_string()).unwrap_err();
        assert_eq!(err.id, json!(3));
        assert_eq!(err.error.unwrap().code, METHOD_NOT_FOUND);
    }

    #[test]
    fn wrong_version_is_invalid_request() {
        let line = json!({"jsonrpc": "1.0", "id": 1, "method": "publish", "params": {}});
        let err = decode_publish(&line.to_string()).unwrap_err();
        assert_eq!(err.error.unwrap().code, INVALID_REQUEST);
    }

    #[test]
    fn bad_base64_is_invalid_params() {
        let line = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "publish",
            "params": {"project": "demo", "project_docs": [{"path": "a.txt", "content": "!!!"}]}
        });
        let err = decode_publish(&line.to_string()).unwrap_err();
        assert_eq!(err.error.unwrap().code, INVALID_PARAMS);
    }

    #[test]
    fn success_serializes_null_result() {
        let body = serde_json::to_value(RpcResponse::success(json!(5))).unwrap();
        assert_eq!(body, json!({"jsonrpc": "2.0", "id": 5, "result": null}));
    }

    #[test]
    fn null_result_is_kept_apart_from_missing_result() {
        let success: RpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":null}"#).unwrap();
        assert_eq!(success.result, Some(Value::Null));

        let failure: RpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"disk full"}}"#,
        )
        .unwrap();
        assert_eq!(failure.result, None);
    }

    #[test]
    fn publish_errors_map_to_codes() {
        let unsafe_path = PublishError::UnsafePath("../x".into());
        assert_eq!(RpcError::from(&unsafe_path).code, INVALID_PARAMS);

        let io = PublishError::Io {
            path: "demo/x".into(),
            source: std::io::Error::other("disk full"),
        };
        assert_eq!(RpcError::from(&io).code, PUBLISH_FAILED);
    }
}
