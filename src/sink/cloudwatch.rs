//! Client for the CloudWatch Logs JSON protocol.
//!
//! Every operation is a `POST` of a JSON body to the service endpoint, with
//! the operation named in the `X-Amz-Target` header. Requests are not
//! signed, so the endpoint is expected to be a signing proxy or a local
//! emulator of the service.

use super::traits::{LogSink, SequenceToken, SinkError};
use crate::source::reader::Entry;
use async_trait::async_trait;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

const TARGET_PREFIX: &str = "Logs_20140328";
const AMZ_JSON: &str = "application/x-amz-json-1.1";

#[derive(Debug, Clone)]
pub struct CloudWatchClient {
    endpoint: String,
    client: reqwest::Client,
}

impl CloudWatchClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call<Req, Resp>(&self, operation: &str, request: &Req) -> Result<Resp, SinkError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let body = serde_json::to_vec(request)?;
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, HeaderValue::from_static(AMZ_JSON))
            .header("X-Amz-Target", format!("{TARGET_PREFIX}.{operation}"))
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            return Err(error_from_body(status.as_u16(), &bytes));
        }

        // Operations without output may answer with an empty body.
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(serde_json::from_slice(b"{}")?);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn find_stream(&self, group: &str, stream: &str) -> Result<Option<LogStream>, SinkError> {
        let mut next_token = None;

        loop {
            let request = DescribeLogStreamsRequest {
                log_group_name: group,
                log_stream_name_prefix: stream,
                next_token: next_token.take(),
            };
            let response: DescribeLogStreamsResponse =
                self.call("DescribeLogStreams", &request).await?;

            if let Some(found) = response
                .log_streams
                .into_iter()
                .find(|s| s.log_stream_name == stream)
            {
                return Ok(Some(found));
            }

            match response.next_token {
                Some(token) => next_token = Some(token),
                None => return Ok(None),
            }
        }
    }

    async fn create_group(&self, group: &str) -> Result<(), SinkError> {
        let request = CreateLogGroupRequest {
            log_group_name: group,
        };
        match self.call::<_, Empty>("CreateLogGroup", &request).await {
            Ok(_) => {
                info!(group, "Created log group");
                Ok(())
            }
            Err(SinkError::ResourceAlreadyExists(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn create_stream(&self, group: &str, stream: &str) -> Result<(), SinkError> {
        let request = CreateLogStreamRequest {
            log_group_name: group,
            log_stream_name: stream,
        };
        match self.call::<_, Empty>("CreateLogStream", &request).await {
            Ok(_) => {
                info!(group, stream, "Created log stream");
                Ok(())
            }
            Err(SinkError::ResourceAlreadyExists(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl LogSink for CloudWatchClient {
    async fn resolve_stream(
        &self,
        group: &str,
        stream: &str,
    ) -> Result<Option<SequenceToken>, SinkError> {
        match self.find_stream(group, stream).await {
            Ok(Some(found)) => {
                debug!(group, stream, "Found existing log stream");
                return Ok(found.upload_sequence_token.map(SequenceToken::new));
            }
            Ok(None) => {}
            Err(SinkError::ResourceNotFound(_)) => self.create_group(group).await?,
            Err(e) => return Err(e),
        }

        self.create_stream(group, stream).await?;
        Ok(None)
    }

    async fn put_events(
        &self,
        group: &str,
        stream: &str,
        events: &[Entry],
        token: Option<&SequenceToken>,
    ) -> Result<Option<SequenceToken>, SinkError> {
        let request = PutLogEventsRequest {
            log_group_name: group,
            log_stream_name: stream,
            log_events: events
                .iter()
                .map(|e| InputLogEvent {
                    timestamp: e.timestamp.timestamp_millis(),
                    message: &e.message,
                })
                .collect(),
            sequence_token: token.map(SequenceToken::as_str),
        };

        let response: PutLogEventsResponse = self.call("PutLogEvents", &request).await?;
        if let Some(rejected) = response
            .rejected_log_events_info
            .as_ref()
            .and_then(|info| info.describe(events.len()))
        {
            warn!(group, stream, rejected = %rejected, "Service dropped events from batch");
        }
        Ok(response.next_sequence_token.map(SequenceToken::new))
    }
}

fn error_from_body(status: u16, body: &[u8]) -> SinkError {
    let parsed: ErrorBody = serde_json::from_slice(body).unwrap_or_else(|_| ErrorBody {
        kind: String::new(),
        message: String::from_utf8_lossy(body).into_owned(),
        expected_sequence_token: None,
    });

    // `__type` may carry a namespace: "com.amazonaws.logs#ThrottlingException"
    let code = parsed.kind.rsplit('#').next().unwrap_or_default().to_string();
    let expected = parsed.expected_sequence_token.map(SequenceToken::new);

    match code.as_str() {
        "InvalidSequenceTokenException" => SinkError::InvalidSequenceToken { expected },
        "DataAlreadyAcceptedException" => SinkError::DataAlreadyAccepted { expected },
        "ResourceNotFoundException" => SinkError::ResourceNotFound(parsed.message),
        "ResourceAlreadyExistsException" => SinkError::ResourceAlreadyExists(parsed.message),
        "ThrottlingException" => SinkError::Throttled(parsed.message),
        _ => SinkError::Rejected {
            status,
            code,
            message: parsed.message,
        },
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "__type", default)]
    kind: String,
    #[serde(default, alias = "Message")]
    message: String,
    #[serde(rename = "expectedSequenceToken", default)]
    expected_sequence_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Empty {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DescribeLogStreamsRequest<'a> {
    log_group_name: &'a str,
    log_stream_name_prefix: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeLogStreamsResponse {
    #[serde(default)]
    log_streams: Vec<LogStream>,
    #[serde(default)]
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogStream {
    log_stream_name: String,
    #[serde(default)]
    upload_sequence_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateLogGroupRequest<'a> {
    log_group_name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateLogStreamRequest<'a> {
    log_group_name: &'a str,
    log_stream_name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PutLogEventsRequest<'a> {
    log_group_name: &'a str,
    log_stream_name: &'a str,
    log_events: Vec<InputLogEvent<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sequence_token: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct InputLogEvent<'a> {
    timestamp: i64,
    message: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PutLogEventsResponse {
    #[serde(default)]
    next_sequence_token: Option<String>,
    #[serde(default)]
    rejected_log_events_info: Option<RejectedLogEventsInfo>,
}

/// Index bounds of events the service accepted the request for but did not
/// store.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RejectedLogEventsInfo {
    #[serde(default)]
    too_new_log_event_start_index: Option<usize>,
    #[serde(default)]
    too_old_log_event_end_index: Option<usize>,
    #[serde(default)]
    expired_log_event_end_index: Option<usize>,
}

impl RejectedLogEventsInfo {
    /// Human readable ranges for a batch of `len` events, `None` if nothing
    /// was rejected.
    fn describe(&self, len: usize) -> Option<String> {
        let mut ranges = Vec::new();
        if let Some(end) = self.too_old_log_event_end_index {
            ranges.push(format!("too old [0, {end})"));
        }
        if let Some(end) = self.expired_log_event_end_index {
            ranges.push(format!("expired [0, {end})"));
        }
        if let Some(start) = self.too_new_log_event_start_index {
            ranges.push(format!("too new [{start}, {len})"));
        }
        (!ranges.is_empty()).then(|| ranges.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        let err = error_from_body(
            400,
            br#"{"__type":"InvalidSequenceTokenException","message":"bad token","expectedSequenceToken":"4963"}"#,
        );
        match err {
            SinkError::InvalidSequenceToken { expected } => {
                assert_eq!(expected, Some(SequenceToken::new("4963")));
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = error_from_body(
            400,
            br#"{"__type":"com.amazonaws.logs#ThrottlingException","message":"Rate exceeded"}"#,
        );
        assert!(matches!(err, SinkError::Throttled(ref m) if m == "Rate exceeded"));

        let err = error_from_body(400, br#"{"__type":"ResourceNotFoundException"}"#);
        assert!(matches!(err, SinkError::ResourceNotFound(_)));
    }

    #[test]
    fn test_unknown_and_non_json_errors() {
        let err = error_from_body(
            403,
            br#"{"__type":"AccessDeniedException","Message":"no access"}"#,
        );
        match err {
            SinkError::Rejected {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 403);
                assert_eq!(code, "AccessDeniedException");
                assert_eq!(message, "no access");
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = error_from_body(502, b"Bad Gateway");
        assert!(matches!(
            err,
            SinkError::Rejected { status: 502, ref message, .. } if message == "Bad Gateway"
        ));
    }

    #[test]
    fn test_rejected_events_are_described() {
        let response: PutLogEventsResponse = serde_json::from_str(
            r#"{"nextSequenceToken":"49","rejectedLogEventsInfo":{"tooOldLogEventEndIndex":2,"tooNewLogEventStartIndex":5}}"#,
        )
        .unwrap();

        assert_eq!(response.next_sequence_token.as_deref(), Some("49"));
        let info = response.rejected_log_events_info.unwrap();
        assert_eq!(
            info.describe(7).as_deref(),
            Some("too old [0, 2), too new [5, 7)")
        );

        let clean: PutLogEventsResponse =
            serde_json::from_str(r#"{"nextSequenceToken":"50"}"#).unwrap();
        assert!(clean.rejected_log_events_info.is_none());
        assert_eq!(RejectedLogEventsInfo::default().describe(3), None);
    }

    #[test]
    fn test_put_request_shape() {
        let ts = chrono::DateTime::parse_from_rfc3339("2021-01-24T19:13:15.501+00:00").unwrap();
        let request = PutLogEventsRequest {
            log_group_name: "devices",
            log_stream_name: "bench-7",
            log_events: vec![InputLogEvent {
                timestamp: ts.timestamp_millis(),
                message: "booted",
            }],
            sequence_token: None,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "logGroupName": "devices",
                "logStreamName": "bench-7",
                "logEvents": [{"timestamp": 1611515595501i64, "message": "booted"}]
            })
        );
    }
}
