//! Pipeline descriptors: the JSON graphs submitted to the task endpoint.
//!
//! A descriptor is a DAG of typed components (source / transform / sink)
//! connected by named lanes (`text`, `table`, `image`, `audio`, `tags`).
//! Each predefined [`Operation`] expands to a fresh descriptor value on
//! every call — templates are pure data, never a shared singleton, so two
//! in-flight invocations can never contaminate each other's graphs.
//!
//! ## Webhook ingress fixup
//!
//! The predefined templates declare a `webhook` source carrying a
//! `parameters` sub-object (a local listener port/endpoint). This client
//! pushes payload bytes directly over the request body instead of running
//! a listener, so [`prepare_for_submission`] strips `parameters` and forces
//! `sync: false` — a synchronous webhook would deadlock the remote task
//! waiting on a callback that will never come.

use crate::error::DtcError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;

/// A complete pipeline descriptor as submitted to `POST /task`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDescriptor {
    pub pipeline: Pipeline,
}

/// The component graph. `source` names the single ingress component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub source: String,
    pub components: Vec<Component>,
}

/// One node of the graph: a provider with its config and inbound edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    pub id: String,
    pub provider: String,
    #[serde(default)]
    pub config: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input: Vec<InputEdge>,
}

/// A typed edge: data on `lane` flowing from the component named `from`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputEdge {
    pub lane: String,
    pub from: String,
}

impl InputEdge {
    fn new(lane: &str, from: &str) -> Self {
        Self {
            lane: lane.to_string(),
            from: from.to_string(),
        }
    }
}

/// PII jurisdiction policy applied by the `pii` provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PiiPolicy {
    /// US federal and state personal-data laws.
    UnitedStates,
    /// International regulations (GDPR etc.).
    International,
    /// Healthcare data under HIPAA.
    Hipaa,
}

impl PiiPolicy {
    pub fn classification(&self) -> &'static str {
        match self {
            PiiPolicy::UnitedStates => "United States Personal Data Policy",
            PiiPolicy::International => "International Personal Data Policy",
            PiiPolicy::Hipaa => "HIPAA Healthcare Data Policy",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PiiPolicy::UnitedStates => {
                "Detects personal data applicable to United States Federal and State laws"
            }
            PiiPolicy::International => {
                "Detects personal data applicable to international regulations (GDPR, etc.)"
            }
            PiiPolicy::Hipaa => "Detects healthcare data under HIPAA regulations",
        }
    }
}

/// One of the predefined processing operations, or a caller-supplied graph.
#[derive(Debug, Clone)]
pub enum Operation {
    /// Extract text from images with OCR.
    SimpleOcr,
    /// Parse documents into text and tables.
    SimpleParse,
    /// Document parsing with tables, images, metadata, and links extracted.
    AdvancedParse,
    /// Convert audio to text.
    AudioTranscribe,
    /// Transcribe audio and generate a summary.
    AudioSummary,
    /// Detect and anonymize PII in text or documents.
    AnonymizePii,
    /// Censor PII under a jurisdiction policy. `censor_char` replaces
    /// detected spans; the service default is used when `None`.
    PiiCensor {
        policy: PiiPolicy,
        censor_char: Option<char>,
    },
    /// A caller-supplied descriptor as raw JSON.
    Custom { descriptor_json: String },
}

impl Operation {
    /// Stable identifier, used for logging and the CLI.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::SimpleOcr => "simple-ocr",
            Operation::SimpleParse => "simple-parse",
            Operation::AdvancedParse => "advanced-parse",
            Operation::AudioTranscribe => "audio-transcribe",
            Operation::AudioSummary => "audio-summary",
            Operation::AnonymizePii => "anonymize-pii",
            Operation::PiiCensor { .. } => "pii-censor",
            Operation::Custom { .. } => "custom",
        }
    }

    /// Build a fresh descriptor for this operation.
    ///
    /// `binary_payload` selects the document variant of the PII graphs: a
    /// binary document must pass through `parse` before the `pii` stage,
    /// while plain text feeds `pii` directly.
    ///
    /// # Errors
    /// [`DtcError::Configuration`] when a custom descriptor fails to parse
    /// or references components that do not exist.
    pub fn descriptor(&self, binary_payload: bool) -> Result<PipelineDescriptor, DtcError> {
        let descriptor = match self {
            Operation::SimpleOcr => simple_ocr(),
            Operation::SimpleParse => simple_parse(),
            Operation::AdvancedParse => advanced_parse(),
            Operation::AudioTranscribe => audio_transcribe(),
            Operation::AudioSummary => audio_summary(),
            Operation::AnonymizePii => {
                pii_graph(PiiPolicy::UnitedStates, None, binary_payload)
            }
            Operation::PiiCensor {
                policy,
                censor_char,
            } => pii_graph(*policy, *censor_char, binary_payload),
            Operation::Custom { descriptor_json } => {
                serde_json::from_str(descriptor_json).map_err(|e| DtcError::Configuration {
                    detail: format!("custom pipeline JSON did not parse: {e}"),
                })?
            }
        };
        validate(&descriptor)?;
        Ok(descriptor)
    }
}

/// Check the descriptor's structural invariants: the declared source must
/// exist, component ids must be unique, and every input edge must name an
/// existing upstream component.
pub fn validate(descriptor: &PipelineDescriptor) -> Result<(), DtcError> {
    let mut ids = HashSet::new();
    for component in &descriptor.pipeline.components {
        if !ids.insert(component.id.as_str()) {
            return Err(DtcError::Configuration {
                detail: format!("duplicate component id '{}'", component.id),
            });
        }
    }

    if !ids.contains(descriptor.pipeline.source.as_str()) {
        return Err(DtcError::Configuration {
            detail: format!(
                "declared source '{}' is not a component in the pipeline",
                descriptor.pipeline.source
            ),
        });
    }

    for component in &descriptor.pipeline.components {
        for edge in &component.input {
            if !ids.contains(edge.from.as_str()) {
                return Err(DtcError::Configuration {
                    detail: format!(
                        "component '{}' input lane '{}' references unknown component '{}'",
                        component.id, edge.lane, edge.from
                    ),
                });
            }
        }
    }

    Ok(())
}

/// Rewrite webhook ingress components for body-push submission: drop the
/// local-listener `parameters` sub-object and force asynchronous mode.
/// Idempotent — running it twice yields the same descriptor as once.
pub fn prepare_for_submission(descriptor: &mut PipelineDescriptor) {
    for component in &mut descriptor.pipeline.components {
        if component.provider != "webhook" {
            continue;
        }
        if let Value::Object(config) = &mut component.config {
            if config.remove("parameters").is_some() {
                tracing::debug!(id = %component.id, "stripped local-listener parameters from webhook ingress");
            }
            config.insert("sync".to_string(), Value::Bool(false));
        }
    }
}

// ── Predefined templates ─────────────────────────────────────────────────
//
// These mirror the graphs the Aparavi workbench exports for each preset.
// The webhook `parameters` blocks are kept verbatim so the templates stay
// diffable against workbench exports; prepare_for_submission removes them.

fn webhook_source(id: &str) -> Component {
    Component {
        id: id.to_string(),
        provider: "webhook".to_string(),
        config: json!({
            "key": "webhook://*",
            "mode": "Source",
            "name": "Webhook Source",
            "parameters": {
                "endpoint": "/pipe/process",
                "port": 5566,
            },
        }),
        input: vec![],
    }
}

fn response_sink(id: &str, input: Vec<InputEdge>) -> Component {
    Component {
        id: id.to_string(),
        provider: "response".to_string(),
        config: json!({
            "keys": { "documents": "procdocs" },
        }),
        input,
    }
}

fn graph(components: Vec<Component>) -> PipelineDescriptor {
    PipelineDescriptor {
        pipeline: Pipeline {
            project_id: None,
            source: components[0].id.clone(),
            components,
        },
    }
}

fn simple_ocr() -> PipelineDescriptor {
    graph(vec![
        webhook_source("source_1"),
        Component {
            id: "ocr_1".to_string(),
            provider: "ocr".to_string(),
            config: json!({
                "profile": "default",
                "default": {
                    "doctr": {
                        "det_arch": "db_resnet50",
                        "reco_arch": "crnn_vgg16_bn",
                    },
                    "language": "en",
                    "table": "Doctr",
                },
                "multilingual": {
                    "doctr": {
                        "det_arch": "db_resnet50",
                        "reco_arch": "crnn_vgg16_bn",
                    },
                    "table": "Doctr",
                },
            }),
            input: vec![InputEdge::new("image", "source_1")],
        },
        response_sink("response_1", vec![InputEdge::new("text", "ocr_1")]),
    ])
}

fn simple_parse() -> PipelineDescriptor {
    graph(vec![
        webhook_source("source_1"),
        Component {
            id: "parse_1".to_string(),
            provider: "parse".to_string(),
            config: json!({}),
            input: vec![InputEdge::new("tags", "source_1")],
        },
        response_sink(
            "response_1",
            vec![
                InputEdge::new("text", "parse_1"),
                InputEdge::new("table", "parse_1"),
            ],
        ),
    ])
}

fn advanced_parse() -> PipelineDescriptor {
    graph(vec![
        webhook_source("source_1"),
        Component {
            id: "parse_1".to_string(),
            provider: "parse".to_string(),
            config: json!({
                "advanced": true,
                "extract_tables": true,
                "extract_images": true,
                "extract_metadata": true,
                "preserve_formatting": true,
                "extract_links": true,
            }),
            input: vec![InputEdge::new("tags", "source_1")],
        },
        response_sink(
            "response_1",
            vec![
                InputEdge::new("text", "parse_1"),
                InputEdge::new("table", "parse_1"),
                InputEdge::new("image", "parse_1"),
            ],
        ),
    ])
}

fn audio_transcribe_component(id: &str, from: &str) -> Component {
    Component {
        id: id.to_string(),
        provider: "audio_transcribe".to_string(),
        config: json!({
            "profile": "default",
            "default": {
                "max_seconds": 500,
                "min_seconds": 240,
                "model": "medium",
                "silence_threshold": 0.25,
                "vad_level": 2,
            },
        }),
        input: vec![InputEdge::new("audio", from)],
    }
}

fn audio_transcribe() -> PipelineDescriptor {
    graph(vec![
        webhook_source("source_1"),
        audio_transcribe_component("audio_transcribe_1", "source_1"),
        response_sink(
            "response_1",
            vec![InputEdge::new("text", "audio_transcribe_1")],
        ),
    ])
}

fn audio_summary() -> PipelineDescriptor {
    graph(vec![
        webhook_source("source_1"),
        audio_transcribe_component("audio_transcribe_1", "source_1"),
        Component {
            id: "summary_1".to_string(),
            provider: "summary".to_string(),
            config: json!({
                "max_length": 150,
                "min_length": 30,
            }),
            input: vec![InputEdge::new("text", "audio_transcribe_1")],
        },
        response_sink(
            "response_1",
            vec![
                InputEdge::new("text", "audio_transcribe_1"),
                InputEdge::new("text", "summary_1"),
            ],
        ),
    ])
}

/// PII detection graph. Binary documents pass through `parse` first; text
/// feeds the `pii` stage directly.
fn pii_graph(
    policy: PiiPolicy,
    censor_char: Option<char>,
    binary_payload: bool,
) -> PipelineDescriptor {
    let mut default = json!({
        "classification": policy.classification(),
        "description": policy.description(),
        "lanes": [],
    });
    if let (Value::Object(map), Some(ch)) = (&mut default, censor_char) {
        map.insert("censor_character".to_string(), json!(ch.to_string()));
    }

    let pii_config = json!({
        "profile": "default",
        "multilingual": { "enabled": false },
        "default": default,
    });

    let mut components = vec![Component {
        id: "webhook_1".to_string(),
        provider: "webhook".to_string(),
        config: json!({
            "key": "webhook://*",
            "mode": "Source",
            "sync": false,
        }),
        input: vec![],
    }];

    let pii_input_from = if binary_payload {
        components.push(Component {
            id: "parse_1".to_string(),
            provider: "parse".to_string(),
            config: json!({}),
            input: vec![InputEdge::new("tags", "webhook_1")],
        });
        "parse_1"
    } else {
        "webhook_1"
    };

    components.push(Component {
        id: "pii_1".to_string(),
        provider: "pii".to_string(),
        config: pii_config,
        input: vec![InputEdge::new("text", pii_input_from)],
    });
    components.push(response_sink(
        "response_1",
        vec![InputEdge::new("text", "pii_1")],
    ));

    graph(components)
}
