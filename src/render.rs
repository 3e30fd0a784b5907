//! Deterministic figure construction from a parsed chart description.
//!
//! Produces the plot JSON the chat front-end consumes: a list of traces and
//! a dark layout. The renderer has no knowledge of column names; everything
//! it needs is in the `ChartSpec`.
//!
//! Multi-legend bar charts look each legend up by position in the first data
//! point's key list rather than by name. The line path matches by name. The
//! positional behavior is what shipped and downstream assistants were tuned
//! against it, so it stays until product says otherwise.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::chart::{ChartKind, ChartSpec, SeriesData};
use crate::error::Result;

/// Pastel palette chosen for the dark layout.
pub const PALETTE: [&str; 6] = [
    "#7CB9E8", // light blue
    "#FFB3BA", // pastel pink
    "#BAFCA2", // pastel green
    "#FFD7AA", // pastel orange
    "#E0BBE4", // pastel purple
    "#957DAD", // muted purple
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Figure {
    pub data: Vec<Trace>,
    pub layout: Layout,
}

impl Figure {
    /// Figure with no traces and an untouched layout, the fallback for
    /// anything that cannot be drawn.
    pub fn blank() -> Self {
        Self {
            data: Vec::new(),
            layout: Layout::default(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    #[serde(rename = "type")]
    pub trace_type: String,
    pub name: String,
    pub x: Vec<String>,
    pub y: Vec<Option<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<LineStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker: Option<MarkerStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yaxis: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineStyle {
    pub color: String,
    pub width: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerStyle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Font {
    pub color: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegendStyle {
    pub bgcolor: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub showgrid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gridcolor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub showline: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tickmode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticktext: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tickvals: Option<Vec<String>>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub axis_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlaying: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub side: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plot_bgcolor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paper_bgcolor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font: Option<Font>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub showlegend: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legend: Option<LegendStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xaxis: Option<Axis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yaxis: Option<Axis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yaxis2: Option<Axis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub barmode: Option<String>,
}

/// Build a figure for the given chart description.
///
/// Unknown chart kinds and empty series produce a blank figure rather than
/// an error; by the time a spec reaches this point its values are already
/// validated.
pub fn render(spec: &ChartSpec) -> Result<Figure> {
    if spec.series.is_empty() {
        return Ok(Figure::blank());
    }

    let structured = !matches!(spec.series, SeriesData::Scalar(_));
    let mut layout = base_layout(spec);

    let data = match &spec.kind {
        ChartKind::Line => {
            let traces = line_traces(spec);
            if structured && spec.legends.len() > 1 {
                layout.yaxis2 = Some(secondary_y_axis());
            }
            traces
        }
        ChartKind::Bar => {
            let traces = bar_traces(spec);
            if structured {
                layout.barmode = Some("group".to_string());
            }
            traces
        }
        ChartKind::Other(kind) => {
            debug!("No renderer for chart type {:?}", kind);
            return Ok(Figure::blank());
        }
    };

    Ok(Figure { data, layout })
}

/// Render a chart, substituting a blank figure when rendering fails.
pub fn render_or_blank(spec: &ChartSpec) -> Figure {
    match render(spec) {
        Ok(figure) => figure,
        Err(e) => {
            warn!("Failed to render chart: {}", e);
            Figure::blank()
        }
    }
}

fn line_traces(spec: &ChartSpec) -> Vec<Trace> {
    let x_values = x_strings(spec);
    match &spec.series {
        SeriesData::Scalar(entries) => {
            vec![Trace {
                trace_type: "scatter".to_string(),
                name: spec.legends.first().cloned().unwrap_or_default(),
                x: x_values,
                y: entries.iter().map(|(_, value)| *value).collect(),
                mode: Some("lines+markers".to_string()),
                line: Some(LineStyle {
                    color: PALETTE[0].to_string(),
                    width: 3.0,
                }),
                marker: Some(MarkerStyle {
                    color: None,
                    size: Some(8),
                }),
                yaxis: None,
            }]
        }
        SeriesData::Keyed(entries) => spec
            .legends
            .iter()
            .enumerate()
            .map(|(idx, legend)| {
                let y_values = entries
                    .iter()
                    .map(|(_, fields)| {
                        fields
                            .iter()
                            .find(|(name, _)| name == legend)
                            .and_then(|(_, value)| *value)
                    })
                    .collect();
                line_trace(spec, idx, legend, x_values.clone(), y_values)
            })
            .collect(),
        SeriesData::Positional(entries) => spec
            .legends
            .iter()
            .enumerate()
            .map(|(idx, legend)| {
                let y_values = entries
                    .iter()
                    .map(|(_, values)| values.get(idx).copied().flatten())
                    .collect();
                line_trace(spec, idx, legend, x_values.clone(), y_values)
            })
            .collect(),
    }
}

fn line_trace(
    spec: &ChartSpec,
    idx: usize,
    legend: &str,
    x: Vec<String>,
    y: Vec<Option<f64>>,
) -> Trace {
    let yaxis = if idx > 0 && spec.legends.len() > 1 {
        "y2"
    } else {
        "y"
    };
    Trace {
        trace_type: "scatter".to_string(),
        name: legend.to_string(),
        x,
        y,
        mode: Some("lines+markers".to_string()),
        line: Some(LineStyle {
            color: PALETTE[idx % PALETTE.len()].to_string(),
            width: 3.0,
        }),
        marker: Some(MarkerStyle {
            color: None,
            size: Some(8),
        }),
        yaxis: Some(yaxis.to_string()),
    }
}

fn bar_traces(spec: &ChartSpec) -> Vec<Trace> {
    let x_values = x_strings(spec);
    match &spec.series {
        SeriesData::Scalar(entries) => {
            vec![Trace {
                trace_type: "bar".to_string(),
                name: spec.legends.first().cloned().unwrap_or_default(),
                x: x_values,
                y: entries.iter().map(|(_, value)| *value).collect(),
                mode: None,
                line: None,
                marker: Some(MarkerStyle {
                    color: Some(PALETTE[0].to_string()),
                    size: None,
                }),
                yaxis: None,
            }]
        }
        SeriesData::Keyed(entries) => {
            // Legends map onto the first data point's keys by position,
            // not by name.
            let available_keys: Vec<&str> = entries
                .first()
                .map(|(_, fields)| fields.iter().map(|(name, _)| name.as_str()).collect())
                .unwrap_or_default();
            spec.legends
                .iter()
                .enumerate()
                .map(|(idx, legend)| {
                    let key = available_keys.get(idx).copied();
                    let y_values = entries
                        .iter()
                        .map(|(_, fields)| {
                            key.and_then(|key| {
                                fields
                                    .iter()
                                    .find(|(name, _)| name.as_str() == key)
                                    .and_then(|(_, value)| *value)
                            })
                        })
                        .collect();
                    bar_trace(idx, legend, x_values.clone(), y_values)
                })
                .collect()
        }
        SeriesData::Positional(entries) => spec
            .legends
            .iter()
            .enumerate()
            .map(|(idx, legend)| {
                let y_values = entries
                    .iter()
                    .map(|(_, values)| values.get(idx).copied().flatten())
                    .collect();
                bar_trace(idx, legend, x_values.clone(), y_values)
            })
            .collect(),
    }
}

fn bar_trace(idx: usize, legend: &str, x: Vec<String>, y: Vec<Option<f64>>) -> Trace {
    Trace {
        trace_type: "bar".to_string(),
        name: legend.to_string(),
        x,
        y,
        mode: None,
        line: None,
        marker: Some(MarkerStyle {
            color: Some(PALETTE[idx % PALETTE.len()].to_string()),
            size: None,
        }),
        yaxis: None,
    }
}

fn x_strings(spec: &ChartSpec) -> Vec<String> {
    spec.series.x_keys().iter().map(|k| k.to_string()).collect()
}

fn secondary_y_axis() -> Axis {
    Axis {
        overlaying: Some("y".to_string()),
        side: Some("right".to_string()),
        showgrid: Some(false),
        showline: Some(true),
        color: Some("white".to_string()),
        ..Axis::default()
    }
}

fn base_layout(spec: &ChartSpec) -> Layout {
    let x_values = x_strings(spec);
    Layout {
        title: Some(format!("{} vs {}", spec.x_axis_title, spec.y_axis_title)),
        plot_bgcolor: Some("black".to_string()),
        paper_bgcolor: Some("black".to_string()),
        font: Some(Font {
            color: "white".to_string(),
        }),
        showlegend: Some(true),
        legend: Some(LegendStyle {
            bgcolor: "rgba(0,0,0,0)".to_string(),
        }),
        xaxis: Some(Axis {
            title: Some(spec.x_axis_title.clone()),
            showgrid: Some(true),
            gridcolor: Some("rgba(128, 128, 128, 0.2)".to_string()),
            showline: Some(true),
            color: Some("white".to_string()),
            tickmode: Some("array".to_string()),
            ticktext: Some(x_values.clone()),
            tickvals: Some(x_values),
            axis_type: Some("category".to_string()),
            ..Axis::default()
        }),
        yaxis: Some(Axis {
            title: Some(spec.y_axis_title.clone()),
            showgrid: Some(true),
            gridcolor: Some("rgba(128, 128, 128, 0.2)".to_string()),
            showline: Some(true),
            color: Some("white".to_string()),
            ..Axis::default()
        }),
        yaxis2: None,
        barmode: None,
    }
}
