//! Four-stage capability pipeline behind every chat turn.
//!
//! A turn is: generate two SQL statements, run both against the store,
//! have the analysis capability interpret the results, then ask the
//! visualization capability for a chart description. Query execution is
//! the only fail-soft stage; a capability failure ends the turn.

use std::collections::HashMap;

use tracing::{info, warn};

use crate::capability::{CapabilityInvoker, CapabilityRequest, CapabilityResponse};
use crate::chart::ChartSpec;
use crate::config::AssistantConfig;
use crate::error::Result;
use crate::session::SessionState;
use crate::store::{DataStore, ResultSet};

pub const CAP_QUERY_GENERATION: &str = "sql_query_generation";
pub const CAP_DATA_ANALYSIS: &str = "data_analysis";
pub const CAP_DATA_VISUALIZATION: &str = "data_visualization";

pub const PARAM_TIMESERIES_QUERY: &str = "timeseries_sql_query";
pub const PARAM_PRECISE_QUERY: &str = "precise_sql_query";

/// Receives coarse progress while a turn runs.
pub trait ProgressSink: Send + Sync {
    fn update(&self, percent: u8, label: &str);
}

/// Sink for callers that do not surface progress.
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn update(&self, _percent: u8, _label: &str) {}
}

/// The two SQL statements produced by the generation capability. Either
/// may be empty when the capability had nothing to offer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPair {
    pub timeseries: String,
    pub precise: String,
}

impl QueryPair {
    pub fn from_response(response: &CapabilityResponse) -> Self {
        Self {
            timeseries: string_parameter(response, PARAM_TIMESERIES_QUERY),
            precise: string_parameter(response, PARAM_PRECISE_QUERY),
        }
    }
}

fn string_parameter(response: &CapabilityResponse, key: &str) -> String {
    response
        .parameters
        .get(key)
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// What a completed turn hands back to the shell.
#[derive(Debug, Clone)]
pub struct AssistantReply {
    pub analysis: String,
    pub chart: Option<ChartSpec>,
}

/// Run one full turn of the pipeline.
pub async fn run_pipeline(
    user_query: &str,
    store: &DataStore,
    session: &mut SessionState,
    invoker: &dyn CapabilityInvoker,
    progress: &dyn ProgressSink,
    config: &AssistantConfig,
) -> Result<AssistantReply> {
    // Step 1: generate the two SQL statements, carrying prior history
    progress.update(30, "Generating SQL queries...");
    let generation = invoker
        .invoke(&CapabilityRequest {
            capability_name: CAP_QUERY_GENERATION.to_string(),
            query: user_query.to_string(),
            context: None,
            history: Some(session.history.clone()),
            stream: false,
            timeout_secs: config.capability_timeout_secs,
            model_key: Some(config.generation_model_key.clone()),
        })
        .await?;
    session.absorb_generation(&generation);
    let queries = QueryPair::from_response(&generation);
    info!(
        "Generated queries: timeseries={:?} precise={:?}",
        queries.timeseries, queries.precise
    );

    // Step 2: run both statements; a failed one contributes an empty result
    let timeseries_results = store.execute(&queries.timeseries);
    let precise_results = store.execute(&queries.precise);

    // Step 3: have the analysis capability interpret query + results
    progress.update(50, "Analyzing the responses...");
    let context = build_analysis_context(
        user_query,
        &queries,
        &timeseries_results,
        &precise_results,
    );
    let analysis = invoker
        .invoke(&CapabilityRequest {
            capability_name: CAP_DATA_ANALYSIS.to_string(),
            query: user_query.to_string(),
            context: Some(HashMap::from([(CAP_DATA_ANALYSIS.to_string(), context)])),
            history: None,
            stream: false,
            timeout_secs: config.capability_timeout_secs,
            model_key: None,
        })
        .await?;

    // Step 4: turn the analysis into a chart description
    progress.update(70, "Generating visualizations...");
    let visualization = invoker
        .invoke(&CapabilityRequest {
            capability_name: CAP_DATA_VISUALIZATION.to_string(),
            query: user_query.to_string(),
            context: Some(HashMap::from([(
                CAP_DATA_VISUALIZATION.to_string(),
                analysis.message.clone(),
            )])),
            history: None,
            stream: false,
            timeout_secs: config.capability_timeout_secs,
            model_key: None,
        })
        .await?;

    let chart = match ChartSpec::from_parameters(&visualization.parameters) {
        Ok(chart) => chart,
        Err(e) => {
            warn!("Discarding malformed chart description: {}", e);
            None
        }
    };

    progress.update(100, "Done");
    Ok(AssistantReply {
        analysis: analysis.message,
        chart,
    })
}

/// Composite context block the analysis capability receives. The shape is
/// fixed; downstream prompt templates were tuned against it.
fn build_analysis_context(
    user_query: &str,
    queries: &QueryPair,
    timeseries_results: &ResultSet,
    precise_results: &ResultSet,
) -> String {
    let results = format!(
        "Timeseries Query: {}\nResults: {}SQL Query: {}\nResults: {}",
        queries.timeseries, timeseries_results, queries.precise, precise_results
    );
    format!(
        "Analyze this interaction:\nUser Query: {}\n\nDatabase Results: {}",
        user_query, results
    )
}
