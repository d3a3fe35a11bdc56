//! Incremental decoder for the Prometheus text exposition format.
//!
//! The decoder is fed raw body chunks and hands back every family that is
//! complete, so families can be consumed while the download is in flight. A
//! family is complete once a line for a different family shows up, all lines of
//! a family must therefore be contiguous.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use super::model::{
    HistogramValueSample, Labels, MetricFamily, MetricType, Quantile, Sample, SingleValueSample,
    SummaryValueSample,
};
use crate::error::{Error, Result};

fn sample_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Greedy label block, a label value may itself contain '}'.
    RE.get_or_init(|| {
        Regex::new(r"^([a-zA-Z_:][a-zA-Z0-9_:]*)(\{.*\})?\s+(\S+)(?:\s+(\S+))?$")
            .expect("sample line regex")
    })
}

fn metric_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z_:][a-zA-Z0-9_:]*$").expect("metric name regex"))
}

fn label_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("label name regex"))
}

fn parse_err(line: usize, msg: impl Into<String>) -> Error {
    Error::Parse {
        line,
        msg: msg.into(),
    }
}

/// Renders a sampled float the way the metric values are handed to the
/// flattener: shortest round-trip digits, exponent notation when the decimal
/// exponent is below -4 or at least 6.
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    let scientific = format!("{value:e}");
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return format!("{value}");
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return format!("{value}");
    };
    if (-4..6).contains(&exponent) {
        format!("{value}")
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exponent.abs())
    }
}

/// Renders an observation count as a plain integer. Counts are truncated to
/// whole numbers and never switch to exponent notation.
fn format_count(value: f64, line: usize) -> Result<String> {
    if !value.is_finite() || value < 0.0 {
        return Err(parse_err(
            line,
            format!("expected non-negative count, got {}", format_value(value)),
        ));
    }
    Ok((value as u64).to_string())
}

fn parse_float(token: &str) -> Option<f64> {
    match token {
        "+Inf" | "Inf" => Some(f64::INFINITY),
        "-Inf" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        _ => token.parse::<f64>().ok(),
    }
}

/// Splits off the first whitespace separated token.
fn split_token(text: &str) -> (&str, &str) {
    match text.find(char::is_whitespace) {
        Some(pos) => (&text[..pos], text[pos..].trim_start()),
        None => (text, ""),
    }
}

fn unescape_help(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Reads a quoted label value, the opening quote already consumed. Returns the
/// unescaped value and the text after the closing quote.
fn read_label_value(text: &str) -> std::result::Result<(String, &str), String> {
    let mut value = String::new();
    let mut chars = text.char_indices();
    while let Some((pos, c)) = chars.next() {
        match c {
            '"' => return Ok((value, &text[pos + 1..])),
            '\\' => match chars.next() {
                Some((_, 'n')) => value.push('\n'),
                Some((_, '\\')) => value.push('\\'),
                Some((_, '"')) => value.push('"'),
                Some((_, other)) => return Err(format!("invalid escape sequence '\\{other}'")),
                None => break,
            },
            _ => value.push(c),
        }
    }
    Err("unterminated label value".to_string())
}

fn parse_labels(block: &str, line: usize) -> Result<Labels> {
    let mut labels = Labels::new();
    let mut rest = block.trim_start();
    while !rest.is_empty() {
        let name_end = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        let name = &rest[..name_end];
        if !label_name_regex().is_match(name) {
            let found = rest.chars().next().unwrap_or_default();
            return Err(parse_err(line, format!("invalid label name starting at {found:?}")));
        }
        rest = rest[name_end..].trim_start();
        rest = rest
            .strip_prefix('=')
            .ok_or_else(|| parse_err(line, format!("expected '=' after label name {name}")))?
            .trim_start();
        rest = rest.strip_prefix('"').ok_or_else(|| {
            parse_err(line, format!("expected '\"' to open value of label {name}"))
        })?;
        let (value, remainder) = read_label_value(rest).map_err(|msg| parse_err(line, msg))?;
        if labels.insert(name.to_string(), value).is_some() {
            return Err(parse_err(line, format!("duplicate label name {name}")));
        }
        rest = remainder.trim_start();
        match rest.strip_prefix(',') {
            Some(after) => rest = after.trim_start(),
            None if rest.is_empty() => {}
            None => {
                return Err(parse_err(
                    line,
                    format!("unexpected {rest:?} after value of label {name}"),
                ))
            }
        }
    }
    Ok(labels)
}

/// Which series of a family a sample line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Series {
    Value,
    Bucket,
    Sum,
    Count,
}

struct FamilyBuilder {
    name: String,
    help: Option<String>,
    metric_type: MetricType,
    typed: bool,
    singles: Vec<SingleValueSample>,
    histograms: Vec<HistogramValueSample>,
    summaries: Vec<SummaryValueSample>,
}

impl FamilyBuilder {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            help: None,
            metric_type: MetricType::Untyped,
            typed: false,
            singles: Vec::new(),
            histograms: Vec::new(),
            summaries: Vec::new(),
        }
    }

    fn has_samples(&self) -> bool {
        !(self.singles.is_empty() && self.histograms.is_empty() && self.summaries.is_empty())
    }

    fn histogram(&mut self, labels: Labels) -> &mut HistogramValueSample {
        let pos = match self.histograms.iter().position(|h| h.labels == labels) {
            Some(pos) => pos,
            None => {
                self.histograms.push(HistogramValueSample {
                    labels,
                    count: "0".to_string(),
                    sum: "0".to_string(),
                    buckets: Vec::new(),
                });
                self.histograms.len() - 1
            }
        };
        &mut self.histograms[pos]
    }

    fn summary(&mut self, labels: Labels) -> &mut SummaryValueSample {
        let pos = match self.summaries.iter().position(|s| s.labels == labels) {
            Some(pos) => pos,
            None => {
                self.summaries.push(SummaryValueSample {
                    labels,
                    count: "0".to_string(),
                    sum: "0".to_string(),
                    quantiles: Vec::new(),
                });
                self.summaries.len() - 1
            }
        };
        &mut self.summaries[pos]
    }

    fn add(
        &mut self,
        series: Series,
        mut labels: Labels,
        value: f64,
        timestamp: Option<i64>,
        line: usize,
    ) -> Result<()> {
        let text = format_value(value);
        match self.metric_type {
            MetricType::Counter | MetricType::Gauge | MetricType::Untyped => {
                self.singles.push(SingleValueSample {
                    labels,
                    value: text,
                    timestamp,
                });
            }
            MetricType::Histogram => match series {
                Series::Value => {
                    return Err(parse_err(
                        line,
                        format!(
                            "histogram {} sample needs a _bucket, _sum or _count suffix",
                            self.name
                        ),
                    ))
                }
                Series::Bucket => {
                    let le = labels.remove("le").ok_or_else(|| {
                        parse_err(line, format!("bucket of {} without le label", self.name))
                    })?;
                    let bound = parse_float(&le).ok_or_else(|| {
                        parse_err(line, format!("expected float as value for 'le' label, got {le:?}"))
                    })?;
                    let count = format_count(value, line)?;
                    self.histogram(labels)
                        .buckets
                        .push((format_value(bound), count));
                }
                Series::Sum => self.histogram(labels).sum = text,
                Series::Count => self.histogram(labels).count = format_count(value, line)?,
            },
            MetricType::Summary => match series {
                Series::Bucket => {
                    return Err(parse_err(
                        line,
                        format!("summary {} has no _bucket series", self.name),
                    ))
                }
                Series::Value => {
                    let quantile = labels.remove("quantile").ok_or_else(|| {
                        parse_err(line, format!("summary {} sample without quantile label", self.name))
                    })?;
                    let q = parse_float(&quantile).ok_or_else(|| {
                        parse_err(
                            line,
                            format!("expected float as value for 'quantile' label, got {quantile:?}"),
                        )
                    })?;
                    self.summary(labels).quantiles.push(Quantile {
                        name: format_value(q),
                        value: text,
                    });
                }
                Series::Sum => self.summary(labels).sum = text,
                Series::Count => self.summary(labels).count = format_count(value, line)?,
            },
        }
        Ok(())
    }

    fn build(self) -> MetricFamily {
        let samples = match self.metric_type {
            MetricType::Counter => self.singles.into_iter().map(Sample::CounterSample).collect(),
            MetricType::Gauge => self.singles.into_iter().map(Sample::GaugeSample).collect(),
            MetricType::Untyped => self.singles.into_iter().map(Sample::UntypedSample).collect(),
            MetricType::Histogram => self
                .histograms
                .into_iter()
                .map(Sample::HistogramSample)
                .collect(),
            MetricType::Summary => self
                .summaries
                .into_iter()
                .map(Sample::SummarySample)
                .collect(),
        };
        MetricFamily {
            name: self.name,
            help: self.help,
            metric_type: self.metric_type,
            samples,
        }
    }
}

/// Line oriented exposition decoder.
#[derive(Default)]
pub struct TextDecoder {
    line: usize,
    pending: Vec<u8>,
    current: Option<FamilyBuilder>,
    seen: HashSet<String>,
}

impl TextDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk of the body and returns the families it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<MetricFamily>> {
        let mut pending = std::mem::take(&mut self.pending);
        pending.extend_from_slice(chunk);
        let mut done = Vec::new();
        let mut start = 0;
        while let Some(pos) = pending[start..].iter().position(|&b| b == b'\n') {
            let end = start + pos;
            done.extend(self.decode_raw(&pending[start..end])?);
            start = end + 1;
        }
        pending.drain(..start);
        self.pending = pending;
        Ok(done)
    }

    /// Decodes a trailing unterminated line and returns the last families.
    pub fn finish(mut self) -> Result<Vec<MetricFamily>> {
        let mut done = Vec::new();
        if !self.pending.is_empty() {
            let raw = std::mem::take(&mut self.pending);
            done.extend(self.decode_raw(&raw)?);
        }
        done.extend(self.current.take().map(FamilyBuilder::build));
        Ok(done)
    }

    fn decode_raw(&mut self, raw: &[u8]) -> Result<Option<MetricFamily>> {
        self.line += 1;
        let text = std::str::from_utf8(raw).map_err(|_| Error::Utf8 { line: self.line })?;
        self.decode_line(text)
    }

    fn decode_line(&mut self, text: &str) -> Result<Option<MetricFamily>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        match text.strip_prefix('#') {
            Some(comment) => self.decode_comment(comment),
            None => self.decode_sample(text),
        }
    }

    fn decode_comment(&mut self, comment: &str) -> Result<Option<MetricFamily>> {
        let line = self.line;
        let (keyword, rest) = split_token(comment.trim_start());
        if keyword != "HELP" && keyword != "TYPE" {
            return Ok(None);
        }
        let (name, rest) = split_token(rest);
        if !metric_name_regex().is_match(name) {
            return Err(parse_err(line, format!("invalid metric name {name:?} in comment")));
        }

        let (finished, builder) = self.enter_family(name)?;
        if keyword == "HELP" {
            if builder.help.is_some() {
                return Err(parse_err(line, format!("second HELP line for metric name {name}")));
            }
            builder.help = Some(unescape_help(rest));
        } else {
            if builder.typed || builder.has_samples() {
                return Err(parse_err(
                    line,
                    format!("second TYPE line for metric name {name}, or TYPE reported after samples"),
                ));
            }
            builder.metric_type = MetricType::from_type_token(rest.trim())
                .ok_or_else(|| parse_err(line, format!("unknown metric type {:?}", rest.trim())))?;
            builder.typed = true;
        }
        Ok(finished)
    }

    fn decode_sample(&mut self, text: &str) -> Result<Option<MetricFamily>> {
        let line = self.line;
        let caps = sample_line_regex()
            .captures(text)
            .ok_or_else(|| parse_err(line, format!("invalid sample line {text:?}")))?;

        let name = &caps[1];
        let labels = match caps.get(2) {
            Some(block) => {
                let block = block.as_str();
                parse_labels(&block[1..block.len() - 1], line)?
            }
            None => Labels::new(),
        };
        let value = parse_float(&caps[3]).ok_or_else(|| {
            parse_err(line, format!("expected float as value, got {:?}", &caps[3]))
        })?;
        let timestamp = caps
            .get(4)
            .map(|ts| {
                ts.as_str().parse::<i64>().map_err(|_| {
                    parse_err(line, format!("expected integer as timestamp, got {:?}", ts.as_str()))
                })
            })
            .transpose()?;

        let (family, series) = self.resolve(name);
        let (finished, builder) = self.enter_family(&family)?;
        builder.add(series, labels, value, timestamp, line)?;
        Ok(finished)
    }

    /// Maps a sample name onto the current histogram or summary family when it
    /// carries one of their suffixes.
    fn resolve(&self, name: &str) -> (String, Series) {
        if let Some(current) = &self.current {
            let suffixes: &[(&str, Series)] = match current.metric_type {
                MetricType::Histogram => &[
                    ("_bucket", Series::Bucket),
                    ("_sum", Series::Sum),
                    ("_count", Series::Count),
                ],
                MetricType::Summary => &[("_sum", Series::Sum), ("_count", Series::Count)],
                _ => &[],
            };
            for (suffix, series) in suffixes {
                if name.strip_suffix(suffix) == Some(current.name.as_str()) {
                    return (current.name.clone(), *series);
                }
            }
        }
        (name.to_string(), Series::Value)
    }

    /// Makes `name` the current family, completing the previous one.
    fn enter_family(&mut self, name: &str) -> Result<(Option<MetricFamily>, &mut FamilyBuilder)> {
        let switching = self.current.as_ref().map_or(true, |c| c.name != name);
        let finished = if switching {
            if !self.seen.insert(name.to_string()) {
                return Err(parse_err(
                    self.line,
                    format!("lines for metric family {name} are not contiguous"),
                ));
            }
            self.current
                .replace(FamilyBuilder::new(name))
                .map(FamilyBuilder::build)
        } else {
            None
        };
        let builder = self.current.get_or_insert_with(|| FamilyBuilder::new(name));
        Ok((finished, builder))
    }
}

/// Decodes a complete exposition body.
pub fn decode(text: &str) -> Result<Vec<MetricFamily>> {
    let mut decoder = TextDecoder::new();
    let mut families = decoder.push(text.as_bytes())?;
    families.extend(decoder.finish()?);
    Ok(families)
}
