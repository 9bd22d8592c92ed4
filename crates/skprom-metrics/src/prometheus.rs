//! Prometheus text exposition format.
//!
//! Every sample is a gauge. Samples sharing a metric name form one family
//! with a single `# HELP` / `# TYPE` header. Families are ordered by metric
//! name and samples within a family by identity key, so output is stable
//! for identical store contents.

use std::borrow::Cow;
use std::collections::BTreeMap;

use skprom_core::{MetricNaming, Sample, SampleStore};

/// Content type for the text exposition format, version 0.0.4.
pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Metric name for an internal path: `.` (and optionally `-`) become `_`.
pub fn metric_name(path: &str, naming: MetricNaming) -> String {
    match naming {
        MetricNaming::DotsAndDashes => path.replace(['.', '-'], "_"),
        MetricNaming::DotsOnly => path.replace('.', "_"),
    }
}

/// Render samples as gauges. An empty slice renders as an empty string.
pub fn render_prometheus(samples: &[Sample], naming: MetricNaming) -> String {
    let mut families: BTreeMap<String, Vec<&Sample>> = BTreeMap::new();
    for sample in samples {
        families
            .entry(metric_name(&sample.path, naming))
            .or_default()
            .push(sample);
    }

    let mut out = String::new();
    for (name, members) in &families {
        out.push_str(&format!("# HELP {name} {name}\n"));
        out.push_str(&format!("# TYPE {name} gauge\n"));
        for sample in members {
            write_sample(&mut out, name, sample);
        }
    }
    out
}

/// Evict expired samples from `store` and render the rest.
pub fn render_store(store: &SampleStore, max_age_ms: i64, now_ms: i64, naming: MetricNaming) -> String {
    let samples = store.snapshot_and_evict(max_age_ms, now_ms);
    render_prometheus(&samples, naming)
}

fn write_sample(out: &mut String, name: &str, sample: &Sample) {
    out.push_str(&format!(
        "{name}{{context=\"{}\",source=\"{}\"",
        escape_label_value(&sample.context),
        escape_label_value(&sample.source)
    ));
    if let Some(text) = &sample.value_str {
        out.push_str(&format!(",value_str=\"{}\"", escape_label_value(text)));
    }
    out.push_str(&format!("}} {} {}\n", sample.value, sample.timestamp));
}

fn escape_label_value(value: &str) -> Cow<'_, str> {
    if !value.contains(['\\', '"', '\n']) {
        return Cow::Borrowed(value);
    }
    let mut escaped = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            other => escaped.push(other),
        }
    }
    Cow::Owned(escaped)
}
