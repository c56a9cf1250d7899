use oxtel_common::types::{Metric, MetricKind};
use oxtel_storage::{Repository, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Business logic between the HTTP handlers and the repository: parses
/// string inputs, dispatches by kind and formats outputs.
pub struct MetricsService {
    repo: Arc<dyn Repository>,
}

impl MetricsService {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    /// Updates a metric from URL path parameters, parsing the value
    /// according to its declared kind.
    pub async fn update_from_params(&self, kind: &str, name: &str, value: &str) -> Result<()> {
        let metric = Metric::from_params(kind, name, value)?;
        self.update_one(&metric).await
    }

    pub async fn update_one(&self, metric: &Metric) -> Result<()> {
        match metric.kind {
            MetricKind::Gauge => self.repo.update_gauge(metric).await,
            MetricKind::Counter => self.repo.update_counter(metric).await,
        }
    }

    /// Forwards the batch untouched; coalescing and chunking are the
    /// store's concern.
    pub async fn update_batch(&self, metrics: &[Metric]) -> Result<()> {
        self.repo.update_batch(metrics).await
    }

    /// Current value of a metric as its display string.
    pub async fn value_string(&self, kind: &str, name: &str) -> Result<String> {
        let kind: MetricKind = kind.parse()?;
        match kind {
            MetricKind::Gauge => Ok(format!("{}", self.repo.get_gauge(name).await?)),
            MetricKind::Counter => Ok(format!("{}", self.repo.get_counter(name).await?)),
        }
    }

    /// Fills in the payload field of a partial metric (id + kind) from
    /// storage.
    pub async fn populate(&self, mut metric: Metric) -> Result<Metric> {
        match metric.kind {
            MetricKind::Gauge => {
                metric.value = Some(self.repo.get_gauge(&metric.id).await?);
                metric.delta = None;
            }
            MetricKind::Counter => {
                metric.delta = Some(self.repo.get_counter(&metric.id).await?);
                metric.value = None;
            }
        }
        Ok(metric)
    }

    /// Every stored metric as display strings, sorted by name.
    pub async fn list_all(&self) -> Result<BTreeMap<String, String>> {
        let mut list = BTreeMap::new();
        for (name, value) in self.repo.all_gauges().await? {
            list.insert(name, format!("{value}"));
        }
        for (name, delta) in self.repo.all_counters().await? {
            list.insert(name, format!("{delta}"));
        }
        Ok(list)
    }

    pub async fn ping(&self) -> Result<()> {
        self.repo.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxtel_common::types::MetricError;
    use oxtel_storage::memory::MemStorage;
    use oxtel_storage::StorageError;

    fn service() -> MetricsService {
        MetricsService::new(Arc::new(MemStorage::new()))
    }

    #[tokio::test]
    async fn params_round_trip() {
        let service = service();
        service
            .update_from_params("gauge", "temperature", "23.5")
            .await
            .unwrap();
        assert_eq!(
            service.value_string("gauge", "temperature").await.unwrap(),
            "23.5"
        );

        service
            .update_from_params("counter", "requests", "5")
            .await
            .unwrap();
        service
            .update_from_params("counter", "requests", "7")
            .await
            .unwrap();
        assert_eq!(
            service.value_string("counter", "requests").await.unwrap(),
            "12"
        );
    }

    #[tokio::test]
    async fn invalid_inputs_map_to_sentinels() {
        let service = service();
        assert!(matches!(
            service.update_from_params("gauge", "g", "abc").await,
            Err(StorageError::Metric(MetricError::InvalidValue))
        ));
        assert!(matches!(
            service.update_from_params("weird", "g", "1").await,
            Err(StorageError::Metric(MetricError::UnsupportedKind))
        ));
        assert!(matches!(
            service.value_string("gauge", "absent").await,
            Err(StorageError::NotFound)
        ));
    }

    #[tokio::test]
    async fn populate_fills_the_kind_appropriate_field() {
        let service = service();
        service
            .update_one(&Metric::counter("requests", 3))
            .await
            .unwrap();

        let partial = Metric {
            id: "requests".into(),
            kind: MetricKind::Counter,
            delta: None,
            value: None,
        };
        let populated = service.populate(partial).await.unwrap();
        assert_eq!(populated.delta, Some(3));
        assert_eq!(populated.value, None);
    }

    #[tokio::test]
    async fn list_all_is_sorted_and_stringified() {
        let service = service();
        service.update_one(&Metric::gauge("beta", 2.5)).await.unwrap();
        service.update_one(&Metric::counter("alpha", 1)).await.unwrap();

        let list = service.list_all().await.unwrap();
        let names: Vec<&String> = list.keys().collect();
        assert_eq!(names, ["alpha", "beta"]);
        assert_eq!(list["alpha"], "1");
        assert_eq!(list["beta"], "2.5");
    }

    #[tokio::test]
    async fn ping_reports_missing_capability() {
        assert!(matches!(
            service().ping().await,
            Err(StorageError::PingUnsupported)
        ));
    }
}
