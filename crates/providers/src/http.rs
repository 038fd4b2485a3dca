//! [`StageProvider`] backed by a remote insight service.
//!
//! Each stage is served by one endpoint. The provider POSTs
//!
//! ```json
//! { "subject": "ACME", "stage": "analysis", "context": { ... } }
//! ```
//!
//! and expects a stage outcome in return:
//!
//! ```json
//! { "status": "completed", "payload": { ... } }
//! { "status": "error", "cause": "no price history" }
//! ```
//!
//! A service that cannot produce its insight answers `200` with an `error`
//! outcome. Anything else (unreachable service, non-2xx status, a body that is
//! not an outcome) is an infrastructure fault and aborts the run.

use async_trait::async_trait;
use pipeline::{SharedContext, Stage, StageFault, StageOutcome, StageProvider, Ticker};
use reqwest::{StatusCode, Url};
use serde::Serialize;
use tracing::{debug, warn};

use crate::InsightClient;

/// Longest slice of an error body quoted in a fault message.
const BODY_EXCERPT_LEN: usize = 256;

#[derive(Serialize)]
struct StageRequest<'a> {
    subject: &'a Ticker,
    stage: Stage,
    context: &'a SharedContext,
}

/// Invokes one stage on a remote insight service.
#[derive(Debug, Clone)]
pub struct HttpStageProvider {
    stage: Stage,
    endpoint: Url,
    client: InsightClient,
}

impl HttpStageProvider {
    /// Creates a provider posting `stage` requests to `endpoint`.
    pub fn new(stage: Stage, endpoint: Url, client: InsightClient) -> Self {
        Self {
            stage,
            endpoint,
            client,
        }
    }

    /// The URL requests are posted to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl StageProvider for HttpStageProvider {
    fn stage(&self) -> Stage {
        self.stage
    }

    async fn analyze(
        &self,
        subject: &Ticker,
        context: &SharedContext,
    ) -> Result<StageOutcome, StageFault> {
        let request = StageRequest {
            subject,
            stage: self.stage,
            context,
        };
        debug!(endpoint = %self.endpoint, stage = %self.stage, "Posting stage request");

        let response = self
            .client
            .http()
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(|err| StageFault::transport(format!("{}: {err}", self.endpoint)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| StageFault::transport(format!("reading response body: {err}")))?;

        let outcome = interpret_response(status, &body);
        if let Err(fault) = &outcome {
            warn!(endpoint = %self.endpoint, %status, error = %fault, "Insight service fault");
        }
        outcome
    }
}

/// Maps an insight-service response onto a stage outcome or fault.
pub fn interpret_response(status: StatusCode, body: &str) -> Result<StageOutcome, StageFault> {
    if !status.is_success() {
        return Err(StageFault::transport(format!(
            "insight service answered {status}: {}",
            excerpt(body)
        )));
    }
    serde_json::from_str::<StageOutcome>(body)
        .map(StageOutcome::normalized)
        .map_err(|err| StageFault::Protocol {
            message: format!("response is not a stage outcome: {err}"),
        })
}

fn excerpt(body: &str) -> &str {
    let body = body.trim();
    if body.len() <= BODY_EXCERPT_LEN {
        return body;
    }
    let mut end = BODY_EXCERPT_LEN;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline::{ReportId, RunId};
    use serde_json::json;

    #[test]
    fn completed_body_becomes_completed_outcome() {
        let body = r#"{"status":"completed","payload":{"kpis":{"pe_ratio":18.2}}}"#;
        let outcome = interpret_response(StatusCode::OK, body).unwrap();
        assert_eq!(
            outcome.payload().and_then(|p| p.get("kpis")),
            Some(&json!({"pe_ratio": 18.2}))
        );
    }

    #[test]
    fn error_body_is_a_soft_failure() {
        let body = r#"{"status":"error","cause":"no price history"}"#;
        let outcome = interpret_response(StatusCode::OK, body).unwrap();
        assert_eq!(outcome.cause(), Some("no price history"));
    }

    #[test]
    fn blank_cause_is_replaced() {
        let body = r#"{"status":"error","cause":"  "}"#;
        let outcome = interpret_response(StatusCode::OK, body).unwrap();
        assert!(!outcome.cause().unwrap().trim().is_empty());
    }

    #[test]
    fn non_success_status_is_a_hard_fault() {
        let fault = interpret_response(StatusCode::BAD_GATEWAY, "upstream down").unwrap_err();
        assert!(matches!(fault, StageFault::Transport { .. }));
        assert!(fault.to_string().contains("502"));
        assert!(fault.to_string().contains("upstream down"));
    }

    #[test]
    fn malformed_body_is_a_protocol_fault() {
        for body in ["", "not json", r#"{"status":"maybe"}"#, r#"{"payload":{}}"#] {
            assert!(matches!(
                interpret_response(StatusCode::OK, body),
                Err(StageFault::Protocol { .. })
            ));
        }
    }

    #[test]
    fn long_error_bodies_are_truncated_on_char_boundary() {
        let body = "é".repeat(BODY_EXCERPT_LEN);
        let cut = excerpt(&body);
        assert!(cut.len() <= BODY_EXCERPT_LEN);
        assert!(cut.chars().all(|c| c == 'é'));
    }

    #[test]
    fn request_body_carries_subject_stage_and_context() {
        let subject = Ticker::parse("ACME").unwrap();
        let context = SharedContext::new(subject.clone(), ReportId::new(3), RunId::new_random());
        let request = StageRequest {
            subject: &subject,
            stage: Stage::Analysis,
            context: &context,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["subject"], json!("ACME"));
        assert_eq!(value["stage"], json!("analysis"));
        assert_eq!(value["context"]["report_id"], json!(3));
    }

    #[tokio::test]
    async fn unreachable_service_is_a_transport_fault() {
        let client = InsightClient::new(std::time::Duration::from_secs(2)).unwrap();
        // Port 9 on loopback (discard) is not expected to accept HTTP.
        let endpoint = Url::parse("http://127.0.0.1:9/research").unwrap();
        let provider = HttpStageProvider::new(Stage::Research, endpoint, client);
        let subject = Ticker::parse("ACME").unwrap();
        let context = SharedContext::new(subject.clone(), ReportId::new(1), RunId::new_random());

        let fault = provider.analyze(&subject, &context).await.unwrap_err();
        assert!(matches!(fault, StageFault::Transport { .. }));
    }
}
