//! `measurePerformance`: time repeated invocations of a registered operation.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::time::Instant;

use super::operations::{operation_key, OperationRegistry};
use super::{Environment, Tool, ToolStatus};
use crate::resources::{round2, MemoryDelta, MemorySnapshot, ProcessSampler};
use crate::types::Result;

const RESOURCE_NOTE: &str =
    "CPU and memory usage are sampled for the whole server process and are only indicative.";

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MeasurePerformanceInput {
    pub operation_name: String,
    pub target_component: String,
    /// At most 100000 invocations per call.
    #[schemars(range(min = 1, max = 100000))]
    pub iterations: u32,
    /// Passed unchanged to every invocation.
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default)]
    pub environment: Environment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IterationError {
    /// 1-based iteration number.
    pub iteration: u32,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CpuUsage {
    /// Process CPU over the measured window, percent of one core.
    pub process_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsage {
    pub start: MemorySnapshot,
    pub end: MemorySnapshot,
    pub diff: MemoryDelta,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_duration_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_duration_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_duration_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_duration_ms: Option<f64>,
    pub iterations: u32,
    pub successful_iterations: u32,
    pub failed_iterations: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_usage: Option<CpuUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_usage: Option<MemoryUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<Vec<IterationError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MeasurePerformanceOutput {
    pub status: ToolStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub metrics: PerformanceMetrics,
}

/// Times operations from the shared operation registry.
#[derive(Debug)]
pub struct PerformanceProfiler {
    operations: Arc<OperationRegistry>,
}

impl PerformanceProfiler {
    pub fn new(operations: Arc<OperationRegistry>) -> Self {
        Self { operations }
    }
}

#[async_trait]
impl Tool for PerformanceProfiler {
    type Input = MeasurePerformanceInput;
    type Output = MeasurePerformanceOutput;

    const NAME: &'static str = "measurePerformance";
    const DESCRIPTION: &'static str =
        "Measures duration and resource usage of repeated invocations of a registered operation.";

    async fn run(&self, input: Self::Input) -> Result<Self::Output> {
        let key = operation_key(&input.target_component, &input.operation_name);
        tracing::info!("measurePerformance {} x{}", key, input.iterations);

        if input.environment == Environment::Docker {
            return Ok(not_run(
                &input,
                "Docker environment execution is not yet implemented.",
            ));
        }
        let operation = match self
            .operations
            .resolve(&input.target_component, &input.operation_name)
        {
            Ok(op) => op,
            Err(e) => {
                tracing::warn!("measurePerformance: {}", e);
                return Ok(not_run(&input, &format!("Unknown operation '{}'.", key)));
            }
        };

        let payload = input.payload.clone().unwrap_or(Value::Null);
        let mut sampler = ProcessSampler::new();
        let memory_start = sampler.memory();

        let mut timings = Vec::new();
        let mut error_details = Vec::new();
        for iteration in 1..=input.iterations {
            let started = Instant::now();
            match operation.invoke(&payload).await {
                Ok(_) => timings.push(started.elapsed().as_secs_f64() * 1000.0),
                Err(e) => {
                    tracing::error!("iteration {} of {} failed: {}", iteration, key, e);
                    error_details.push(IterationError {
                        iteration,
                        error: e.to_string(),
                    });
                }
            }
        }

        let cpu_usage = sampler.cpu_percent().map(|p| CpuUsage {
            process_percent: round2(f64::from(p)),
        });
        let memory_usage = match (memory_start, sampler.memory()) {
            (Some(start), Some(end)) => Some(MemoryUsage {
                start,
                end,
                diff: end.delta_since(&start),
            }),
            _ => None,
        };

        let successful = u32::try_from(timings.len()).unwrap_or(u32::MAX);
        let failed = u32::try_from(error_details.len()).unwrap_or(u32::MAX);
        let mut metrics = PerformanceMetrics {
            iterations: input.iterations,
            successful_iterations: successful,
            failed_iterations: failed,
            cpu_usage,
            memory_usage,
            additional_notes: Some(RESOURCE_NOTE.to_string()),
            ..PerformanceMetrics::default()
        };

        if timings.is_empty() {
            metrics.total_duration_ms = Some(0.0);
            metrics.avg_duration_ms = Some(0.0);
            metrics.min_duration_ms = Some(0.0);
            metrics.max_duration_ms = Some(0.0);
            metrics.error_details = Some(error_details);
            return Ok(MeasurePerformanceOutput {
                status: ToolStatus::Failure,
                message: Some(format!(
                    "All {} iterations failed for {} on {}.",
                    input.iterations, input.operation_name, input.target_component
                )),
                metrics,
            });
        }

        let total: f64 = timings.iter().sum();
        metrics.total_duration_ms = Some(round2(total));
        metrics.avg_duration_ms = Some(round2(total / timings.len() as f64));
        metrics.min_duration_ms = Some(round2(timings.iter().copied().fold(f64::INFINITY, f64::min)));
        metrics.max_duration_ms = Some(round2(timings.iter().copied().fold(0.0, f64::max)));
        metrics.error_details = (!error_details.is_empty()).then_some(error_details);

        Ok(MeasurePerformanceOutput {
            status: ToolStatus::Success,
            message: None,
            metrics,
        })
    }
}

/// Envelope for a measurement that never started.
fn not_run(input: &MeasurePerformanceInput, message: &str) -> MeasurePerformanceOutput {
    MeasurePerformanceOutput {
        status: ToolStatus::Error,
        message: Some(message.to_string()),
        metrics: PerformanceMetrics {
            iterations: input.iterations,
            successful_iterations: 0,
            failed_iterations: input.iterations,
            additional_notes: Some(message.to_string()),
            ..PerformanceMetrics::default()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::operations::MockOperation;
    use crate::types::Error;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn input(component: &str, operation: &str, iterations: u32) -> MeasurePerformanceInput {
        MeasurePerformanceInput {
            operation_name: operation.into(),
            target_component: component.into(),
            iterations,
            payload: None,
            environment: Environment::Local,
        }
    }

    fn profiler() -> PerformanceProfiler {
        PerformanceProfiler::new(Arc::new(OperationRegistry::with_builtins()))
    }

    #[tokio::test]
    async fn test_all_iterations_fail() {
        let output = profiler().run(input("builtin", "fail", 5)).await.unwrap();
        assert_eq!(output.status, ToolStatus::Failure);
        assert_eq!(output.metrics.successful_iterations, 0);
        assert_eq!(output.metrics.failed_iterations, 5);
        assert_eq!(output.metrics.total_duration_ms, Some(0.0));
        let details = output.metrics.error_details.unwrap();
        assert_eq!(details.len(), 5);
        assert_eq!(details[4].iteration, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timings_cover_successful_iterations() {
        let mut req = input("builtin", "sleep", 3);
        req.payload = Some(json!({"ms": 20}));
        let output = profiler().run(req).await.unwrap();
        assert_eq!(output.status, ToolStatus::Success);
        assert_eq!(output.metrics.successful_iterations, 3);
        assert_eq!(output.metrics.total_duration_ms, Some(60.0));
        assert_eq!(output.metrics.avg_duration_ms, Some(20.0));
        assert_eq!(output.metrics.min_duration_ms, Some(20.0));
        assert_eq!(output.metrics.max_duration_ms, Some(20.0));
        assert!(output.metrics.error_details.is_none());
    }

    #[tokio::test]
    async fn test_partial_failures_do_not_abort() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let mut mock = MockOperation::new();
        mock.expect_invoke().times(4).returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                Ok(Value::Null)
            } else {
                Err(Error::internal("flaky"))
            }
        });
        let mut registry = OperationRegistry::new();
        registry.register("svc", "flaky", Arc::new(mock));

        let output = PerformanceProfiler::new(Arc::new(registry))
            .run(input("svc", "flaky", 4))
            .await
            .unwrap();
        assert_eq!(output.status, ToolStatus::Success);
        assert_eq!(output.metrics.successful_iterations, 2);
        assert_eq!(output.metrics.failed_iterations, 2);
        let iterations: Vec<u32> = output
            .metrics
            .error_details
            .unwrap()
            .iter()
            .map(|e| e.iteration)
            .collect();
        assert_eq!(iterations, vec![2, 4]);
    }

    #[tokio::test]
    async fn test_unknown_operation_is_error() {
        let output = profiler().run(input("payments", "charge", 2)).await.unwrap();
        assert_eq!(output.status, ToolStatus::Error);
        assert!(output.message.unwrap().contains("payments::charge"));
    }

    #[tokio::test]
    async fn test_docker_is_error() {
        let mut req = input("builtin", "noop", 2);
        req.environment = Environment::Docker;
        let output = profiler().run(req).await.unwrap();
        assert_eq!(output.status, ToolStatus::Error);
        assert_eq!(output.metrics.successful_iterations, 0);
    }
}
