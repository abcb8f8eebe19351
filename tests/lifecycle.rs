//! Full task-lifecycle tests driven against a scripted transport.
//!
//! Every test runs under tokio's paused clock, so the backoff and poll
//! sleeps resolve instantly while still advancing virtual time.

use aparavi_dtc::{
    run_batch, run_task, start_task, Body, ClientConfig, DtcError, Operation, Payload, PiiPolicy,
    PipelineDescriptor, SubmitOptions, TaskStatus, Transport, TransportResult, UploadMetadata,
};
use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Transport double replaying scripted responses per endpoint and recording
/// the call sequence. Empty queues fall back to benign defaults: submission
/// hands out `tok-1`, uploads ack with an empty body, status answers
/// `processing` forever.
struct ScriptedTransport {
    calls: Mutex<Vec<String>>,
    submit_results: Mutex<VecDeque<Result<String, DtcError>>>,
    upload_results: Mutex<VecDeque<Result<TransportResult, DtcError>>>,
    status_results: Mutex<VecDeque<Result<TransportResult, DtcError>>>,
    last_descriptor: Mutex<Option<serde_json::Value>>,
}

impl ScriptedTransport {
    fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            submit_results: Mutex::new(VecDeque::new()),
            upload_results: Mutex::new(VecDeque::new()),
            status_results: Mutex::new(VecDeque::new()),
            last_descriptor: Mutex::new(None),
        }
    }

    fn script_submit(self, result: Result<String, DtcError>) -> Self {
        self.submit_results.lock().unwrap().push_back(result);
        self
    }

    fn script_upload(self, result: Result<TransportResult, DtcError>) -> Self {
        self.upload_results.lock().unwrap().push_back(result);
        self
    }

    fn script_status(self, result: Result<TransportResult, DtcError>) -> Self {
        self.status_results.lock().unwrap().push_back(result);
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, kind: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == kind).count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn submit(
        &self,
        descriptor: &PipelineDescriptor,
        _options: &SubmitOptions,
    ) -> Result<String, DtcError> {
        self.calls.lock().unwrap().push("submit".into());
        *self.last_descriptor.lock().unwrap() =
            Some(serde_json::to_value(descriptor).unwrap());
        self.submit_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("tok-1".to_string()))
    }

    async fn upload(
        &self,
        _token: &str,
        _data: &[u8],
        _metadata: &UploadMetadata,
    ) -> Result<TransportResult, DtcError> {
        self.calls.lock().unwrap().push("upload".into());
        self.upload_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(TransportResult {
                    status: 200,
                    body: Body::Empty,
                })
            })
    }

    async fn poll_status(&self, _token: &str) -> Result<TransportResult, DtcError> {
        self.calls.lock().unwrap().push("status".into());
        self.status_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(TransportResult {
                    status: 200,
                    body: Body::Json(json!({ "status": "processing" })),
                })
            })
    }

    async fn terminate(&self, _token: &str) -> Result<(), DtcError> {
        self.calls.lock().unwrap().push("terminate".into());
        Ok(())
    }
}

fn ok_status(body: serde_json::Value) -> Result<TransportResult, DtcError> {
    Ok(TransportResult {
        status: 200,
        body: Body::Json(body),
    })
}

fn refused() -> Result<TransportResult, DtcError> {
    Err(DtcError::Upload {
        detail: "connection refused".into(),
    })
}

fn config() -> ClientConfig {
    ClientConfig::builder("test-key").build().unwrap()
}

fn pdf_payload() -> Payload {
    Payload::File {
        bytes: b"%PDF-1.4 stub".to_vec(),
        filename: "scan.pdf".into(),
    }
}

#[tokio::test(start_paused = true)]
async fn happy_path_submits_uploads_polls_and_releases() {
    let transport = ScriptedTransport::new()
        // Readiness probe, then two processing polls, then completion.
        .script_status(ok_status(json!({ "status": "processing" })))
        .script_status(ok_status(json!({ "status": "processing" })))
        .script_status(ok_status(json!({ "status": "completed", "text": ["hello world"] })));

    let outcome = run_task(&transport, &config(), &Operation::SimpleOcr, pdf_payload())
        .await
        .unwrap();

    assert_eq!(outcome.token, "tok-1");
    assert_eq!(outcome.status, TaskStatus::Completed);
    assert_eq!(outcome.body["text"], json!(["hello world"]));

    let calls = transport.calls();
    assert_eq!(calls.first().map(String::as_str), Some("submit"));
    assert_eq!(calls.last().map(String::as_str), Some("terminate"));
    assert_eq!(transport.count("upload"), 1);
    assert_eq!(transport.count("terminate"), 1);
}

#[tokio::test(start_paused = true)]
async fn submitted_descriptor_has_webhook_fixup_applied() {
    let transport = ScriptedTransport::new()
        .script_status(ok_status(json!({ "status": "processing" })))
        .script_status(ok_status(json!({ "status": "completed", "text": ["x"] })));

    run_task(&transport, &config(), &Operation::SimpleOcr, pdf_payload())
        .await
        .unwrap();

    let descriptor = transport.last_descriptor.lock().unwrap().clone().unwrap();
    let webhook = &descriptor["pipeline"]["components"][0];
    assert_eq!(webhook["provider"], "webhook");
    assert!(webhook["config"].get("parameters").is_none());
    assert_eq!(webhook["config"]["sync"], json!(false));
}

#[tokio::test(start_paused = true)]
async fn upload_result_fields_short_circuit_polling() {
    let transport = ScriptedTransport::new()
        .script_upload(ok_status(json!({ "text": ["inline result"] })));

    let outcome = run_task(
        &transport,
        &config(),
        &Operation::AnonymizePii,
        Payload::Text("John Doe".into()),
    )
    .await
    .unwrap();

    assert_eq!(outcome.status, TaskStatus::Completed);
    assert_eq!(outcome.body["text"], json!(["inline result"]));
    // The only status call was the readiness probe before upload.
    assert_eq!(transport.count("status"), 1);
}

#[tokio::test(start_paused = true)]
async fn transient_upload_failures_are_retried() {
    let transport = ScriptedTransport::new()
        .script_upload(refused())
        .script_upload(refused())
        .script_upload(ok_status(json!({ "text": ["made it"] })));

    let outcome = run_task(&transport, &config(), &Operation::SimpleParse, pdf_payload())
        .await
        .unwrap();

    assert_eq!(outcome.status, TaskStatus::Completed);
    assert_eq!(transport.count("upload"), 3);
}

#[tokio::test(start_paused = true)]
async fn upload_exhaustion_fails_but_still_releases_the_task() {
    let transport = ScriptedTransport::new()
        .script_upload(refused())
        .script_upload(refused())
        .script_upload(refused())
        .script_upload(refused())
        .script_upload(refused());

    let err = run_task(&transport, &config(), &Operation::SimpleOcr, pdf_payload())
        .await
        .unwrap_err();

    assert!(matches!(err, DtcError::Upload { .. }));
    assert_eq!(transport.count("upload"), 5);
    assert_eq!(transport.count("terminate"), 1);
}

#[tokio::test(start_paused = true)]
async fn remote_failure_propagates_and_still_releases_the_task() {
    let transport = ScriptedTransport::new()
        .script_status(ok_status(json!({ "status": "processing" })))
        .script_status(ok_status(
            json!({ "status": "failed", "error": { "message": "unsupported codec" } }),
        ));

    let err = run_task(
        &transport,
        &config(),
        &Operation::AudioTranscribe,
        Payload::File {
            bytes: vec![0u8; 16],
            filename: "call.ogg".into(),
        },
    )
    .await
    .unwrap_err();

    assert!(err.to_string().contains("unsupported codec"), "got: {err}");
    assert_eq!(transport.count("terminate"), 1);
}

#[tokio::test(start_paused = true)]
async fn poll_ceiling_yields_partial_outcome_and_releases() {
    // Status never leaves "processing" (scripted default).
    let transport = ScriptedTransport::new();

    let outcome = run_task(
        &transport,
        &config(),
        &Operation::SimpleParse,
        Payload::Text("short text".into()),
    )
    .await
    .unwrap();

    assert_eq!(outcome.status, TaskStatus::Processing);
    // Empty upload body degrades to the synthetic processing marker.
    assert_eq!(outcome.body["token"], "tok-1");
    assert_eq!(outcome.body["status"], "processing");
    assert_eq!(transport.count("terminate"), 1);
}

#[tokio::test(start_paused = true)]
async fn release_can_be_opted_out() {
    let transport = ScriptedTransport::new()
        .script_status(ok_status(json!({ "status": "processing" })))
        .script_status(ok_status(json!({ "status": "completed", "text": ["x"] })));
    let config = ClientConfig::builder("test-key")
        .release_tasks(false)
        .build()
        .unwrap();

    run_task(&transport, &config, &Operation::SimpleOcr, pdf_payload())
        .await
        .unwrap();

    assert_eq!(transport.count("terminate"), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_submission_never_uploads_or_releases() {
    let transport = ScriptedTransport::new().script_submit(Err(DtcError::Submission {
        status: 401,
        detail: "invalid API key".into(),
    }));

    let err = run_task(&transport, &config(), &Operation::SimpleOcr, pdf_payload())
        .await
        .unwrap_err();

    assert!(matches!(err, DtcError::Submission { status: 401, .. }));
    assert_eq!(transport.count("upload"), 0);
    // No token exists, so there is nothing to release.
    assert_eq!(transport.count("terminate"), 0);
}

#[tokio::test(start_paused = true)]
async fn batch_captures_per_item_errors_and_continues() {
    let transport = ScriptedTransport::new()
        // Item 1 fails at submission; item 2 runs a full lifecycle.
        .script_submit(Err(DtcError::Submission {
            status: 500,
            detail: "temporarily unavailable".into(),
        }))
        .script_submit(Ok("tok-2".to_string()))
        .script_status(ok_status(json!({ "status": "processing" })))
        .script_status(ok_status(json!({ "status": "completed", "text": ["second"] })));

    let results = run_batch(
        &transport,
        &config(),
        vec![
            (Operation::SimpleParse, Payload::Text("first".into())),
            (Operation::SimpleParse, Payload::Text("second".into())),
        ],
    )
    .await;

    assert_eq!(results.len(), 2);
    assert!(results[0].is_err());
    let second = results[1].as_ref().unwrap();
    assert_eq!(second.token, "tok-2");
    assert_eq!(second.status, TaskStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn pii_censor_descriptor_carries_policy_and_mask() {
    let transport = ScriptedTransport::new()
        .script_status(ok_status(json!({ "status": "processing" })))
        .script_status(ok_status(json!({ "status": "completed", "text": ["####"] })));

    run_task(
        &transport,
        &config(),
        &Operation::PiiCensor {
            policy: PiiPolicy::Hipaa,
            censor_char: Some('#'),
        },
        Payload::Text("patient record".into()),
    )
    .await
    .unwrap();

    let descriptor = transport.last_descriptor.lock().unwrap().clone().unwrap();
    let components = descriptor["pipeline"]["components"].as_array().unwrap();
    let pii = components
        .iter()
        .find(|c| c["provider"] == "pii")
        .unwrap();
    assert!(pii["config"]["default"]["classification"]
        .as_str()
        .unwrap()
        .contains("HIPAA"));
    assert_eq!(pii["config"]["default"]["censor_character"], "#");
    // Text payload feeds pii directly, no parse stage.
    assert!(components.iter().all(|c| c["provider"] != "parse"));
}

#[tokio::test(start_paused = true)]
async fn start_task_submits_without_upload_or_release() {
    let transport = ScriptedTransport::new().script_submit(Ok("tok-fire".to_string()));
    let descriptor_json = serde_json::to_string(&json!({
        "pipeline": {
            "source": "in_1",
            "components": [
                { "id": "in_1", "provider": "webhook", "config": {} },
                { "id": "out_1", "provider": "response", "config": {},
                  "input": [{ "lane": "text", "from": "in_1" }] }
            ]
        }
    }))
    .unwrap();

    let outcome = start_task(
        &transport,
        &config(),
        &Operation::Custom { descriptor_json },
    )
    .await
    .unwrap();

    assert_eq!(outcome.token, "tok-fire");
    assert_eq!(outcome.status, TaskStatus::Processing);
    assert_eq!(transport.calls(), vec!["submit".to_string()]);
}
