use crate::configuration::SharedConfiguration;
use kube::ResourceExt;
use kubert::index::NamespacedRemoved;
use parking_lot::RwLock;
use prometheus_client::{
    collector::Collector,
    encoding::{DescriptorEncoder, EncodeLabelSet, EncodeMetric},
    metrics::{counter::Counter, family::Family, gauge::ConstGauge, MetricType},
    registry::Registry,
};
use std::sync::Arc;


/// Reports the TransportServers currently holding a host or a listener.
#[derive(Clone)]
struct TransportServers(SharedConfiguration);

/// Counts the events applied to an index, by resource kind.
#[derive(Clone, Debug)]
pub struct IndexMetrics<T> {
    inner: T,

    index_applies: Family<IndexLabels, Counter>,
    index_deletes: Family<IndexLabels, Counter>,
    index_resets: Family<IndexLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct IndexLabels {
    kind: String,
}

pub fn register_transport_servers(reg: &mut Registry, configuration: SharedConfiguration) {
    reg.register_collector(Box::new(TransportServers(configuration)));
}

// === impl TransportServers ===

impl std::fmt::Debug for TransportServers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TransportServers").finish()
    }
}

impl Collector for TransportServers {
    fn encode(&self, mut encoder: DescriptorEncoder<'_>) -> Result<(), std::fmt::Error> {
        let metrics = self.0.read().get_transport_server_metrics();

        let mut family = encoder.encode_descriptor(
            "transport_servers",
            "The number of TransportServers holding a host or a listener",
            None,
            MetricType::Gauge,
        )?;
        for (kind, total) in [
            ("passthrough", metrics.total_tls_passthrough),
            ("tcp", metrics.total_tcp),
            ("udp", metrics.total_udp),
        ] {
            let labels = [("type", kind)];
            let gauge = ConstGauge::new(total as i64);
            gauge.encode(family.encode_family(&labels)?)?;
        }
        Ok(())
    }
}

// === impl IndexMetrics ===

impl<T> IndexMetrics<T> {
    pub fn register(inner: T, prom: &mut Registry) -> Self {
        let index_applies = Family::default();
        prom.register(
            "index_applies",
            "Count of applies to the index",
            index_applies.clone(),
        );

        let index_deletes = Family::default();
        prom.register(
            "index_deletes",
            "Count of deletes to the index",
            index_deletes.clone(),
        );

        let index_resets = Family::default();
        prom.register(
            "index_resets",
            "Count of resets to the index",
            index_resets.clone(),
        );

        Self {
            inner,
            index_applies,
            index_deletes,
            index_resets,
        }
    }

    pub fn shared(self) -> Arc<RwLock<Self>> {
        Arc::new(RwLock::new(self))
    }
}

impl<R, T> kubert::index::IndexNamespacedResource<R> for IndexMetrics<Arc<RwLock<T>>>
where
    T: kubert::index::IndexNamespacedResource<R>,
    R: ResourceExt<DynamicType = ()>,
{
    fn apply(&mut self, resource: R) {
        self.index_applies.get_or_create(&labels::<R>()).inc();
        self.inner.write().apply(resource);
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.index_deletes.get_or_create(&labels::<R>()).inc();
        self.inner.write().delete(namespace, name);
    }

    fn reset(&mut self, resources: Vec<R>, removed: NamespacedRemoved) {
        self.index_resets.get_or_create(&labels::<R>()).inc();
        self.inner.write().reset(resources, removed);
    }
}

fn labels<R: ResourceExt<DynamicType = ()>>() -> IndexLabels {
    IndexLabels {
        kind: R::kind(&()).to_string(),
    }
}
