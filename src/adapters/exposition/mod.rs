//! Bridge from exported samples to the Prometheus data model.

mod collector;

use std::collections::{BTreeMap, BTreeSet};

use prometheus::core::Collector;
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, GaugeVec, Opts, TextEncoder};

use crate::domain::{MetricDefinition, MetricKind, MetricSample};

pub use collector::ServerCollector;

/// Content type of the text exposition format
pub fn text_content_type() -> String {
    TextEncoder::new().format_type().to_string()
}

fn gauge_vec(definition: &MetricDefinition) -> prometheus::Result<GaugeVec> {
    GaugeVec::new(Opts::new(definition.name, definition.help), &definition.labels)
}

/// One gauge family per definition, filled from the samples
pub fn gauge_families(
    definitions: &[MetricDefinition],
    samples: &[MetricSample],
) -> prometheus::Result<Vec<MetricFamily>> {
    let mut gauges: BTreeMap<MetricKind, GaugeVec> = BTreeMap::new();
    for definition in definitions {
        gauges.insert(definition.kind, gauge_vec(definition)?);
    }

    // The text encoder rejects families without a single metric.
    let mut filled = BTreeSet::new();
    for sample in samples {
        if let Some(gauge) = gauges.get(&sample.kind) {
            gauge
                .get_metric_with_label_values(&[sample.host.as_str(), sample.os_kind.as_str()])?
                .set(sample.value);
            filled.insert(sample.kind);
        }
    }

    Ok(gauges
        .into_iter()
        .filter(|(kind, _)| filled.contains(kind))
        .flat_map(|(_, gauge)| gauge.collect())
        .collect())
}

/// Render families in the text exposition format
pub fn encode_text(families: &[MetricFamily]) -> prometheus::Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
