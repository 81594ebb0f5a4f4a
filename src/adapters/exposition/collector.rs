use std::collections::HashMap;
use std::sync::Arc;

use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use tracing::error;

use crate::application::MetricsExporter;

use super::gauge_families;

/// `prometheus` collector answering scrapes straight from the stat cache
pub struct ServerCollector {
    exporter: Arc<MetricsExporter>,
    descs: Vec<Desc>,
}

impl ServerCollector {
    pub fn new(exporter: Arc<MetricsExporter>) -> prometheus::Result<Self> {
        let descs = exporter
            .describe()
            .into_iter()
            .map(|definition| {
                Desc::new(
                    definition.name.to_string(),
                    definition.help.to_string(),
                    definition.labels.iter().map(|l| l.to_string()).collect(),
                    HashMap::new(),
                )
            })
            .collect::<prometheus::Result<Vec<_>>>()?;

        Ok(Self { exporter, descs })
    }
}

impl Collector for ServerCollector {
    fn desc(&self) -> Vec<&Desc> {
        self.descs.iter().collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let samples = self.exporter.collect();
        match gauge_families(&self.exporter.describe(), &samples) {
            Ok(families) => families,
            Err(e) => {
                error!(error = %e, "Failed to build metric families");
                Vec::new()
            }
        }
    }
}
