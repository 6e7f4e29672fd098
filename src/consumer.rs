// File: src/consumer.rs

/// Sink for named feature events. The extractor streams one example per
/// call: a shared (source-side) namespace, then per-candidate features each
/// closed by `train` or `predict`, then one `finish_example`. Concrete
/// implementations (training-data writer, live scorer) live with their
/// owners; they also own any serialization needed when aggregating output
/// across concurrent extraction calls.
pub trait FeatureConsumer {
    /// Opens a feature namespace. `shared` namespaces hold features common
    /// to every candidate of the example.
    fn set_namespace(&mut self, ns: char, shared: bool);

    /// An indicator feature: present with implicit value 1.
    fn add_feature(&mut self, name: &str);

    /// A real-valued feature.
    fn add_feature_value(&mut self, name: &str, value: f64);

    /// Training: binds the candidate's accumulated features to its loss.
    fn train(&mut self, label: &str, loss: f32);

    /// Application: requests a score for the candidate instead.
    fn predict(&mut self, label: &str) -> f32;

    /// Closes the example.
    fn finish_example(&mut self);
}

/// Everything a consumer can observe, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Namespace(char, bool),
    Feature(String),
    FeatureValue(String, f64),
    Train(String, f32),
    Predict(String),
    FinishExample,
}

/// In-memory consumer recording the exact event stream. Used by the demo
/// binary and by tests that assert on emission order and atomicity.
#[derive(Debug, Default)]
pub struct CollectingConsumer {
    pub events: Vec<Event>,
}

impl CollectingConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Just the feature names, in emission order.
    pub fn feature_names(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Feature(name) | Event::FeatureValue(name, _) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl FeatureConsumer for CollectingConsumer {
    fn set_namespace(&mut self, ns: char, shared: bool) {
        self.events.push(Event::Namespace(ns, shared));
    }

    fn add_feature(&mut self, name: &str) {
        self.events.push(Event::Feature(name.to_string()));
    }

    fn add_feature_value(&mut self, name: &str, value: f64) {
        self.events.push(Event::FeatureValue(name.to_string(), value));
    }

    fn train(&mut self, label: &str, loss: f32) {
        self.events.push(Event::Train(label.to_string(), loss));
    }

    fn predict(&mut self, label: &str) -> f32 {
        self.events.push(Event::Predict(label.to_string()));
        0.0
    }

    fn finish_example(&mut self) {
        self.events.push(Event::FinishExample);
    }
}
