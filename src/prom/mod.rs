mod model;
pub use self::model::HistogramValueSample;
pub use self::model::Labels;
pub use self::model::MetricFamily;
pub use self::model::MetricType;
pub use self::model::Quantile;
pub use self::model::Sample;
pub use self::model::SingleValueSample;
pub use self::model::SummaryValueSample;
pub(crate) mod parser;
pub use self::parser::{decode, format_value, TextDecoder};

mod metric_scraper;
pub use self::metric_scraper::MetricScraper;

#[cfg(test)]
pub(crate) mod test_data;
