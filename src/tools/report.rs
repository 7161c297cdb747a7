//! `generateReport`: render collected data into a report file.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};

use super::{Tool, ToolStatus};
use crate::types::Result;
use crate::validation::validate_file_name;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    Summary,
    DetailedHtml,
    MarkdownComparison,
    Detailed,
    Performance,
    Stability,
    Security,
}

impl ReportType {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportType::Summary => "summary",
            ReportType::DetailedHtml => "detailed_html",
            ReportType::MarkdownComparison => "markdown_comparison",
            ReportType::Detailed => "detailed",
            ReportType::Performance => "performance",
            ReportType::Stability => "stability",
            ReportType::Security => "security",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ReportType::Summary | ReportType::MarkdownComparison => "md",
            ReportType::DetailedHtml => "html",
            ReportType::Detailed
            | ReportType::Performance
            | ReportType::Stability
            | ReportType::Security => "txt",
        }
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateReportInput {
    /// Reference to an earlier `collectTestData` run. Not resolvable yet;
    /// pass `inputData` instead.
    #[serde(default)]
    pub collected_data_execution_id: Option<String>,
    #[serde(default)]
    pub input_data: Option<Map<String, Value>>,
    pub report_type: ReportType,
    /// File in the templates directory.
    #[serde(default)]
    pub template_name: Option<String>,
    /// File name without extension; directories are stripped.
    #[serde(default)]
    pub output_file_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    pub report_type: ReportType,
    pub generated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_data_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_used: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size_bytes: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateReportOutput {
    pub status: ToolStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_metadata: Option<ReportMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl GenerateReportOutput {
    fn error(message: impl Into<String>, metadata: Option<ReportMetadata>) -> Self {
        Self {
            status: ToolStatus::Error,
            report_path: None,
            report_data: None,
            report_metadata: metadata,
            message: Some(message.into()),
        }
    }
}

/// Rendered body plus the structured data some report types carry.
struct Rendered {
    body: String,
    data: Option<Value>,
}

#[derive(Debug)]
pub struct ReportGenerator {
    reports_dir: PathBuf,
    templates_dir: PathBuf,
}

impl ReportGenerator {
    pub fn new(reports_dir: PathBuf, templates_dir: PathBuf) -> Self {
        Self {
            reports_dir,
            templates_dir,
        }
    }

    /// Load `name` from the templates directory. Missing or invalid names
    /// are logged and ignored.
    async fn load_template(&self, name: &str) -> Option<String> {
        if let Err(e) = validate_file_name(name, "templateName") {
            tracing::warn!("ignoring template: {}", e);
            return None;
        }
        let path = self.templates_dir.join(name);
        match tokio::fs::read_to_string(&path).await {
            Ok(template) => Some(template),
            Err(e) => {
                tracing::warn!(
                    "template {} unavailable ({}), rendering without it",
                    path.display(),
                    e
                );
                None
            }
        }
    }

    fn report_path(&self, report_type: ReportType, requested: Option<&str>, now: DateTime<Utc>) -> PathBuf {
        let stem = requested
            .and_then(|name| Path::new(name).file_name())
            .and_then(|name| name.to_str())
            .filter(|name| !name.is_empty() && *name != "..")
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}_report_{}", report_type.as_str(), now.timestamp_millis()));
        self.reports_dir
            .join(format!("{}.{}", stem, report_type.extension()))
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Markdown overview of the top-level keys, plus collection metadata when
/// the input is a `collectTestData` envelope.
fn render_summary(data: &Map<String, Value>, now: DateTime<Utc>) -> Rendered {
    let mut body = format!("# Summary Report\n\nGenerated at: {}\n\n## Data overview\n", now.to_rfc3339());
    for (key, value) in data {
        match value {
            Value::Object(_) | Value::Array(_) => {
                body.push_str(&format!("- **{}**:\n```json\n{}\n```\n", key, pretty(value)))
            }
            Value::String(s) => body.push_str(&format!("- **{}**: {}\n", key, s)),
            other => body.push_str(&format!("- **{}**: {}\n", key, other)),
        }
    }

    let metadata = data.get("metadata").filter(|m| m.get("processedSources").is_some());
    if let Some(meta) = metadata {
        body.push_str("\n## Collection metadata\n");
        body.push_str(&format!("- Processed sources: {}\n", meta["processedSources"]));
        if meta.get("failedSources").and_then(Value::as_u64).unwrap_or(0) > 0 {
            body.push_str(&format!("- Failed sources: {}\n", meta["failedSources"]));
        }
    }

    let keys: Vec<&String> = data.keys().collect();
    Rendered {
        body,
        data: Some(json!({
            "keys": keys,
            "collectionMetadata": metadata.cloned(),
        })),
    }
}

fn render(report_type: ReportType, data: &Map<String, Value>, now: DateTime<Utc>) -> Rendered {
    let raw = pretty(&Value::Object(data.clone()));
    match report_type {
        ReportType::Summary => render_summary(data, now),
        ReportType::DetailedHtml => Rendered {
            body: format!(
                "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>Detailed Report</title></head>\n<body><h1>Detailed Report</h1>\n<p>Generated at {}</p>\n<pre>{}</pre>\n</body></html>\n",
                now.to_rfc3339(),
                escape_html(&raw)
            ),
            data: None,
        },
        ReportType::MarkdownComparison => Rendered {
            body: format!("# Comparison Report\n\n```json\n{}\n```\n", raw),
            data: None,
        },
        ReportType::Detailed
        | ReportType::Performance
        | ReportType::Stability
        | ReportType::Security => {
            tracing::debug!("report type {} uses the generic layout", report_type.as_str());
            Rendered {
                body: format!("Report: {}\n\n{}\n", report_type.as_str(), raw),
                data: None,
            }
        }
    }
}

/// Substitute `{{report}}`, `{{reportType}}` and `{{generatedAt}}`.
fn apply_template(template: &str, body: &str, report_type: ReportType, now: DateTime<Utc>) -> String {
    template
        .replace("{{reportType}}", report_type.as_str())
        .replace("{{generatedAt}}", &now.to_rfc3339())
        .replace("{{report}}", body)
}

#[async_trait]
impl Tool for ReportGenerator {
    type Input = GenerateReportInput;
    type Output = GenerateReportOutput;

    const NAME: &'static str = "generateReport";
    const DESCRIPTION: &'static str =
        "Generates a report file from collected test data or directly supplied data.";

    async fn run(&self, input: Self::Input) -> Result<Self::Output> {
        let report_type = input.report_type;
        tracing::info!("generateReport type={}", report_type.as_str());

        let data = match (&input.input_data, &input.collected_data_execution_id) {
            (Some(data), _) => data,
            (None, Some(id)) => {
                tracing::warn!("cannot resolve collected data {} by reference", id);
                return Ok(GenerateReportOutput::error(
                    format!(
                        "Fetching data for collectedDataExecutionId '{}' is not implemented yet. Supply 'inputData' directly.",
                        id
                    ),
                    None,
                ));
            }
            (None, None) => {
                return Ok(GenerateReportOutput::error(
                    "Neither collectedDataExecutionId nor inputData was provided.",
                    None,
                ))
            }
        };

        let now = Utc::now();
        let rendered = render(report_type, data, now);
        let template = match &input.template_name {
            Some(name) => self.load_template(name).await,
            None => None,
        };
        let body = match &template {
            Some(template) => apply_template(template, &rendered.body, report_type, now),
            None => rendered.body,
        };

        let mut metadata = ReportMetadata {
            report_type,
            generated_at: now,
            source_data_id: input
                .collected_data_execution_id
                .clone()
                .or_else(|| Some("direct_input".to_string())),
            template_used: template.as_ref().and(input.template_name.clone()),
            file_size_bytes: None,
        };

        let path = self.report_path(report_type, input.output_file_name.as_deref(), now);
        let written = async {
            tokio::fs::create_dir_all(&self.reports_dir).await?;
            tokio::fs::write(&path, body.as_bytes()).await?;
            tokio::fs::metadata(&path).await
        }
        .await;

        match written {
            Ok(stat) => {
                metadata.file_size_bytes = Some(stat.len());
                tracing::info!("report written to {}", path.display());
                Ok(GenerateReportOutput {
                    status: ToolStatus::Success,
                    message: Some(format!(
                        "Report of type \"{}\" written to {}.",
                        report_type.as_str(),
                        path.display()
                    )),
                    report_path: Some(path),
                    report_data: rendered.data,
                    report_metadata: Some(metadata),
                })
            }
            Err(e) => {
                tracing::error!("writing report {} failed: {}", path.display(), e);
                Ok(GenerateReportOutput::error(
                    format!("Report generation failed: {}", e),
                    Some(metadata),
                ))
            }
        }
    }
}
