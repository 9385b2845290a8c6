use std::collections::BTreeMap;
use std::time::Duration;

/// Accumulated wall-clock time per named phase.
#[derive(Debug, Clone, Default)]
pub struct Timings {
    entries: BTreeMap<String, Duration>,
}

impl Timings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, name: &str, elapsed: Duration) {
        *self.entries.entry(name.to_string()).or_default() += elapsed;
    }

    pub fn get(&self, name: &str) -> Option<Duration> {
        self.entries.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Duration)> + '_ {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }
}
