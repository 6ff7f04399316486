//! Line-delimited JSON framing.
//!
//! One message per line. serde_json escapes control characters inside strings,
//! so an encoded message never contains a raw newline.
use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::messages::{Request, Response};
use crate::error::{ClockVoteError, Result};

/// Any message that can appear on the wire
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    Request(Request),
    Response(Response),
}

/// Encode a message as a single line, without the trailing newline.
pub fn encode<T: Serialize>(message: &T) -> Result<String> {
    serde_json::to_string(message).map_err(ClockVoteError::from)
}

/// Decode one line into a typed message.
pub fn decode<T: DeserializeOwned>(line: &str) -> Result<T> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(ClockVoteError::Decode("empty line".to_string()));
    }
    serde_json::from_str(trimmed).map_err(ClockVoteError::from)
}

pub fn decode_request(line: &str) -> Result<Request> {
    decode(line)
}

pub fn decode_response(line: &str) -> Result<Response> {
    decode(line)
}

/// Decode a line of either direction. Responses are recognised by their `nodeId` field.
pub fn decode_message(line: &str) -> Result<Message> {
    let value: serde_json::Value = decode(line)?;
    if value.get("nodeId").is_some() {
        serde_json::from_value(value)
            .map(Message::Response)
            .map_err(ClockVoteError::from)
    } else {
        serde_json::from_value(value)
            .map(Message::Request)
            .map_err(ClockVoteError::from)
    }
}

/// Write one framed message and flush it.
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = encode(message)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeId;
    use crate::protocol::ResponseStatus;
    use tokio::io::{AsyncBufReadExt, BufReader};

    #[test]
    fn test_encode_has_no_newline() {
        let response = Response::ok(NodeId::new(1), 5, "line\nbreak");
        let line = encode(&response).unwrap();
        assert!(!line.contains('\n'));
        let decoded = decode_response(&line).unwrap();
        assert_eq!(decoded.message, "line\nbreak");
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(matches!(decode_request(""), Err(ClockVoteError::Decode(_))));
        assert!(matches!(
            decode_request("{\"kind\":\"SELF_DESTRUCT\"}"),
            Err(ClockVoteError::Decode(_))
        ));
        assert!(matches!(
            decode_response("{\"nodeId\":1}"),
            Err(ClockVoteError::Decode(_))
        ));
        assert!(matches!(decode_response("not json"), Err(ClockVoteError::Decode(_))));
    }

    #[test]
    fn test_decode_message_direction() {
        let msg = decode_message(r#"{"kind":"PING"}"#).unwrap();
        assert_eq!(msg, Message::Request(Request::Ping));

        let msg = decode_message(
            r#"{"nodeId":3,"timestampMillis":10,"status":"CRASHED","message":"crashed"}"#,
        )
        .unwrap();
        match msg {
            Message::Response(r) => {
                assert_eq!(r.node_id, NodeId::new(3));
                assert_eq!(r.status, ResponseStatus::Crashed);
            }
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_write_message_preserves_order() {
        let (mut client, server) = tokio::io::duplex(1024);
        write_message(&mut client, &Request::QueryTime).await.unwrap();
        write_message(&mut client, &Request::InjectOffset(7)).await.unwrap();
        write_message(&mut client, &Request::Ping).await.unwrap();
        drop(client);

        let mut lines = BufReader::new(server).lines();
        let mut seen = Vec::new();
        while let Some(line) = lines.next_line().await.unwrap() {
            seen.push(decode_request(&line).unwrap());
        }
        assert_eq!(
            seen,
            vec![Request::QueryTime, Request::InjectOffset(7), Request::Ping]
        );
    }
}
