use std::collections::BTreeMap;
use std::fmt;

/// Label name to label value, ordered by name.
pub type Labels = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
    Summary,
    Untyped,
}

impl MetricType {
    /// Maps the type token of a `# TYPE` line.
    pub fn from_type_token(token: &str) -> Option<MetricType> {
        match token {
            "counter" => Some(MetricType::Counter),
            "gauge" => Some(MetricType::Gauge),
            "histogram" => Some(MetricType::Histogram),
            "summary" => Some(MetricType::Summary),
            "untyped" => Some(MetricType::Untyped),
            _ => None,
        }
    }

    /// Counters, gauges and untyped metrics carry one value per sample.
    pub fn is_scalar(self) -> bool {
        matches!(
            self,
            MetricType::Counter | MetricType::Gauge | MetricType::Untyped
        )
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
            MetricType::Histogram => "histogram",
            MetricType::Summary => "summary",
            MetricType::Untyped => "untyped",
        };
        f.write_str(name)
    }
}

/// A counter, gauge or untyped sample.
///
/// `value` holds the canonical text rendering of the sampled float, see
/// [`crate::prom::format_value`].
#[derive(Debug, Clone, PartialEq)]
pub struct SingleValueSample {
    pub labels: Labels,
    pub value: String,
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistogramValueSample {
    pub labels: Labels,
    pub count: String,
    pub sum: String,
    /// Upper bound to cumulative count, in exposition order.
    pub buckets: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Quantile {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryValueSample {
    pub labels: Labels,
    pub count: String,
    pub sum: String,
    pub quantiles: Vec<Quantile>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Sample {
    CounterSample(SingleValueSample),
    GaugeSample(SingleValueSample),
    UntypedSample(SingleValueSample),
    HistogramSample(HistogramValueSample),
    SummarySample(SummaryValueSample),
}

impl Sample {
    pub fn labels(&self) -> &Labels {
        match self {
            Sample::CounterSample(s) | Sample::GaugeSample(s) | Sample::UntypedSample(s) => {
                &s.labels
            }
            Sample::HistogramSample(h) => &h.labels,
            Sample::SummarySample(s) => &s.labels,
        }
    }
}

/// One decoded metric family: every sample sharing a name and a type.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamily {
    pub name: String,
    pub help: Option<String>,
    pub metric_type: MetricType,
    pub samples: Vec<Sample>,
}
