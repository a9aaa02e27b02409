//! Series to remote-write record mapping
//!
//! Each stored series becomes one or more `prompb` records. Counters,
//! gauges and rates map to a single record carrying `Sink::value()`. Trends
//! have no native Prometheus counterpart and fan out into eight records,
//! one per statistic, distinguished by a name suffix.

use crate::config::Config;
use crate::tsdb::{Sink, TimeSeries, TrendStats};

use super::proto::{Label, Sample, TimeSeries as WireSeries};
use super::{DEFAULT_METRIC_PREFIX, NAME_LABEL};

/// Tag carrying the request name, dropped unless explicitly kept
pub const NAME_TAG: &str = "name";

/// Tag carrying the request URL
pub const URL_TAG: &str = "url";

/// Name suffixes emitted for a trend, in emission order
pub const TREND_SUFFIXES: [&str; 8] = [
    "_count", "_sum", "_min", "_max", "_avg", "_med", "_p90", "_p95",
];

/// Converts stored series into labelled wire records
#[derive(Debug, Clone)]
pub struct WireMapper {
    prefix: String,
    keep_tags: bool,
    keep_name_tag: bool,
    keep_url_tag: bool,
}

impl Default for WireMapper {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_METRIC_PREFIX.to_string(),
            keep_tags: true,
            keep_name_tag: false,
            keep_url_tag: true,
        }
    }
}

impl WireMapper {
    /// Create a mapper with the given metric name prefix and default tag filtering
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    /// Create a mapper from the output configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            prefix: config.metric_prefix.clone(),
            keep_tags: config.keep_tags,
            keep_name_tag: config.keep_name_tag,
            keep_url_tag: config.keep_url_tag,
        }
    }

    /// Set whether tags are emitted as labels at all
    pub fn keep_tags(mut self, keep: bool) -> Self {
        self.keep_tags = keep;
        self
    }

    /// Set whether the `name` tag is emitted
    pub fn keep_name_tag(mut self, keep: bool) -> Self {
        self.keep_name_tag = keep;
        self
    }

    /// Set whether the `url` tag is emitted
    pub fn keep_url_tag(mut self, keep: bool) -> Self {
        self.keep_url_tag = keep;
        self
    }

    /// Metric name prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Map a series into wire records
    ///
    /// Records are stamped with the series' latest observation time, or
    /// `flush_time_ms` when nothing has been observed.
    pub fn map(&self, series: &TimeSeries, flush_time_ms: i64) -> Vec<WireSeries> {
        let labels = self.tag_labels(series);
        let timestamp = series.latest_timestamp_ms().unwrap_or(flush_time_ms);

        match &series.sink {
            Sink::Counter(_) | Sink::Gauge(_) | Sink::Rate(_) => vec![self.record(
                &labels,
                &series.metric,
                "",
                series.sink.value(),
                timestamp,
            )],
            Sink::Trend(trend) => {
                let stats = trend.stats();
                TREND_SUFFIXES
                    .iter()
                    .zip(trend_values(&stats))
                    .map(|(suffix, value)| {
                        self.record(&labels, &series.metric, suffix, value, timestamp)
                    })
                    .collect()
            },
        }
    }

    /// Labels derived from the series tags after filtering
    ///
    /// Tag sets are already sorted by key, so the result is sorted by name.
    pub fn tag_labels(&self, series: &TimeSeries) -> Vec<Label> {
        if !self.keep_tags {
            return Vec::new();
        }
        series
            .tags
            .iter()
            .filter(|tag| match tag.key.as_ref() {
                NAME_TAG => self.keep_name_tag,
                URL_TAG => self.keep_url_tag,
                _ => true,
            })
            .map(|tag| Label::new(tag.key.as_ref(), tag.value.as_ref()))
            .collect()
    }

    fn record(
        &self,
        tag_labels: &[Label],
        metric: &str,
        suffix: &str,
        value: f64,
        timestamp: i64,
    ) -> WireSeries {
        let mut labels = Vec::with_capacity(tag_labels.len() + 1);
        labels.extend_from_slice(tag_labels);
        labels.push(Label::new(
            NAME_LABEL,
            format!("{}{}{}", self.prefix, metric, suffix),
        ));
        labels.sort_by(|a, b| a.name.cmp(&b.name));

        WireSeries {
            labels,
            samples: vec![Sample { value, timestamp }],
        }
    }
}

fn trend_values(stats: &TrendStats) -> [f64; 8] {
    [
        stats.count as f64,
        stats.sum,
        stats.min,
        stats.max,
        stats.avg,
        stats.med,
        stats.p90,
        stats.p95,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tsdb::{Tag, TagSet};
    use crate::types::MetricType;

    fn series_with(kind: MetricType, pairs: &[(&str, &str)]) -> TimeSeries {
        let mut tags = TagSet::new();
        for (k, v) in pairs {
            tags.add(Tag::new(*k, *v));
        }
        TimeSeries::new("http_req_duration", tags, kind)
    }

    fn label_names(record: &WireSeries) -> Vec<&str> {
        record.labels.iter().map(|l| l.name.as_str()).collect()
    }

    #[test]
    fn test_counter_single_record() {
        let series = series_with(MetricType::Counter, &[("method", "GET"), ("status", "200")]);
        series.add_point(3.0, 1_000);
        series.add_point(4.0, 1_500);

        let records = WireMapper::default().map(&series, 9_999);
        assert_eq!(records.len(), 1);

        let record = &records[0];
        assert_eq!(label_names(record), vec!["__name__", "method", "status"]);
        assert_eq!(record.metric_name(), Some("k6_http_req_duration"));
        assert_eq!(record.samples.len(), 1);
        assert_eq!(record.samples[0].value, 7.0);
        assert_eq!(record.samples[0].timestamp, 1_500);
    }

    #[test]
    fn test_unobserved_series_uses_flush_time() {
        let series = series_with(MetricType::Gauge, &[]);
        let records = WireMapper::default().map(&series, 42);
        assert_eq!(records[0].samples[0].timestamp, 42);
    }

    #[test]
    fn test_trend_expands_to_eight_records() {
        let series = series_with(MetricType::Trend, &[("a", "1"), ("zz", "2")]);
        for v in [1.618, 2.718, 3.14] {
            series.add_point(v, 5_000);
        }

        let records = WireMapper::new("test_").map(&series, 0);
        assert_eq!(records.len(), 8);

        let names: Vec<_> = records.iter().filter_map(|r| r.metric_name()).collect();
        assert_eq!(
            names,
            vec![
                "test_http_req_duration_count",
                "test_http_req_duration_sum",
                "test_http_req_duration_min",
                "test_http_req_duration_max",
                "test_http_req_duration_avg",
                "test_http_req_duration_med",
                "test_http_req_duration_p90",
                "test_http_req_duration_p95",
            ]
        );

        for record in &records {
            assert_eq!(label_names(record), vec!["__name__", "a", "zz"]);
            assert_eq!(record.samples[0].timestamp, 5_000);
        }
        assert_eq!(records[0].samples[0].value, 3.0);
        assert_eq!(records[2].samples[0].value, 1.618);
        assert_eq!(records[3].samples[0].value, 3.14);
    }

    #[test]
    fn test_name_label_sorted_among_tags() {
        // Upper-case and underscore-prefixed keys sort before "__name__"
        let series = series_with(MetricType::Rate, &[("A", "x"), ("_id", "1"), ("b", "2")]);
        let records = WireMapper::default().map(&series, 0);

        let names = label_names(&records[0]);
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
        assert_eq!(names.iter().filter(|n| **n == NAME_LABEL).count(), 1);
    }

    #[test]
    fn test_tag_filtering() {
        let pairs = [("foo", "bar"), ("name", "nnn"), ("url", "uuu")];
        let series = series_with(MetricType::Counter, &pairs);

        let cases = [
            (WireMapper::default(), vec!["foo", "url"]),
            (WireMapper::default().keep_name_tag(true), vec!["foo", "name", "url"]),
            (WireMapper::default().keep_url_tag(false), vec!["foo"]),
            (WireMapper::default().keep_tags(false).keep_name_tag(true), vec![]),
        ];

        for (mapper, expected) in cases {
            let labels = mapper.tag_labels(&series);
            let names: Vec<_> = labels.iter().map(|l| l.name.as_str()).collect();
            assert_eq!(names, expected, "mapper {:?}", mapper);
        }
    }

    #[test]
    fn test_no_tags_only_name_label() {
        let series = series_with(MetricType::Counter, &[("foo", "bar")]);
        let records = WireMapper::default().keep_tags(false).map(&series, 0);
        assert_eq!(label_names(&records[0]), vec!["__name__"]);
    }
}
