use metrics::Label;

pub type Labels = [(&'static str, String)];

/// Destination for check metrics
pub trait MetricsSink: Send + Sync {
    fn increment(&self, name: &str, labels: &Labels);
    fn gauge(&self, name: &str, value: f64, labels: &Labels);
    fn histogram(&self, name: &str, value: f64, labels: &Labels);
}

/// Forwards to the `metrics` facade under a name prefix. Without an
/// installed recorder the calls are no-ops.
pub struct FacadeMetrics {
    prefix: String,
}

impl FacadeMetrics {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    fn key(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }
}

impl Default for FacadeMetrics {
    fn default() -> Self {
        Self::new("statwatch_")
    }
}

fn to_labels(labels: &Labels) -> Vec<Label> {
    labels.iter().map(|(key, value)| Label::new(*key, value.clone())).collect()
}

impl MetricsSink for FacadeMetrics {
    fn increment(&self, name: &str, labels: &Labels) {
        metrics::counter!(self.key(name), to_labels(labels)).increment(1);
    }

    fn gauge(&self, name: &str, value: f64, labels: &Labels) {
        metrics::gauge!(self.key(name), to_labels(labels)).set(value);
    }

    fn histogram(&self, name: &str, value: f64, labels: &Labels) {
        metrics::histogram!(self.key(name), to_labels(labels)).record(value);
    }
}

#[cfg(test)]
pub mod recording {
    use std::sync::Mutex;

    use super::{Labels, MetricsSink};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Kind {
        Counter,
        Gauge,
        Histogram,
    }

    #[derive(Debug, Clone)]
    pub struct Sample {
        pub kind: Kind,
        pub name: String,
        pub value: f64,
        pub labels: Vec<(&'static str, String)>,
    }

    /// Keeps every emitted sample for assertions
    #[derive(Default)]
    pub struct RecordingMetrics {
        samples: Mutex<Vec<Sample>>,
    }

    impl RecordingMetrics {
        fn push(&self, kind: Kind, name: &str, value: f64, labels: &Labels) {
            self.samples.lock().unwrap().push(Sample {
                kind,
                name: name.to_string(),
                value,
                labels: labels.to_vec(),
            });
        }

        pub fn samples(&self) -> Vec<Sample> {
            self.samples.lock().unwrap().clone()
        }

        pub fn counter(&self, name: &str) -> u64 {
            self.samples()
                .iter()
                .filter(|s| s.kind == Kind::Counter && s.name == name)
                .count() as u64
        }

        pub fn last_gauge(&self, name: &str) -> Option<f64> {
            self.samples()
                .iter()
                .rev()
                .find(|s| s.kind == Kind::Gauge && s.name == name)
                .map(|s| s.value)
        }

        pub fn count(&self, kind: Kind, name: &str) -> usize {
            self.samples().iter().filter(|s| s.kind == kind && s.name == name).count()
        }
    }

    impl MetricsSink for RecordingMetrics {
        fn increment(&self, name: &str, labels: &Labels) {
            self.push(Kind::Counter, name, 1.0, labels);
        }

        fn gauge(&self, name: &str, value: f64, labels: &Labels) {
            self.push(Kind::Gauge, name, value, labels);
        }

        fn histogram(&self, name: &str, value: f64, labels: &Labels) {
            self.push(Kind::Histogram, name, value, labels);
        }
    }
}
