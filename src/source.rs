use crate::errors::{AppError, AppResult};
use crate::line_buffer::LineBuffer;
use crate::models::Record;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

const FIELD_SEPARATOR: &str = ", ";
const MAX_LINE_BYTES: usize = 64 * 1024;

pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = AppResult<Vec<Record>>> + Send + 'a>>;

/// Where reload cycles get their points from.
///
/// `Ok(vec![])` means the source answered with no points; transport
/// failures are reported as `AppError::FetchFailed`.
pub trait DataSource: Send + Sync {
    fn fetch(&self) -> FetchFuture<'_>;
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ParsedPoints {
    pub records: Vec<Record>,
    pub skipped: usize,
}

impl ParsedPoints {
    fn accept(&mut self, line: &str) {
        if line.is_empty() || line.starts_with('#') {
            return;
        }
        match parse_line(line) {
            Ok(record) => self.records.push(record),
            Err(error) => {
                self.skipped += 1;
                tracing::warn!(error = %error, "skipping malformed point line");
            }
        }
    }
}

/// Parses one `"<int>, <int>, <name>"` line. The name is everything after
/// the second separator, verbatim.
pub fn parse_line(line: &str) -> AppResult<Record> {
    let mut fields = line.splitn(3, FIELD_SEPARATOR);
    let (Some(x), Some(y), Some(name)) = (fields.next(), fields.next(), fields.next()) else {
        return Err(AppError::ParseSkipped(format!(
            "expected 3 fields in {:?}",
            line
        )));
    };
    let x = parse_coordinate(x, line)?;
    let y = parse_coordinate(y, line)?;
    Ok(Record::new(f64::from(x), f64::from(y), name))
}

fn parse_coordinate(field: &str, line: &str) -> AppResult<i32> {
    field.parse::<i32>().map_err(|error| {
        AppError::ParseSkipped(format!("bad coordinate {:?} in {:?}: {}", field, line, error))
    })
}

/// Parses already-decoded text. The empty pieces between `\r\n` pairs are
/// dropped like any other blank line.
pub fn parse_points(text: &str) -> ParsedPoints {
    let mut parsed = ParsedPoints::default();
    for line in text.split(|c: char| c == '\n' || c == '\r') {
        parsed.accept(line);
    }
    parsed
}

#[derive(Debug, Clone)]
pub struct HttpDataSource {
    client: reqwest::Client,
    url: String,
}

impl HttpDataSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| AppError::Internal(format!("http client: {}", error)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn fetch_points(&self) -> AppResult<Vec<Record>> {
        let mut response = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?;

        let mut parsed = ParsedPoints::default();
        let mut buffer = LineBuffer::new(Some(MAX_LINE_BYTES));
        while let Some(chunk) = response.chunk().await? {
            for line in buffer.push(&chunk) {
                parsed.accept(&line);
            }
        }
        if let Some(tail) = buffer.flush() {
            parsed.accept(&tail);
        }

        let overflowed = buffer.consume_overflowed_bytes();
        if overflowed > 0 {
            tracing::warn!(url = %self.url, overflowed, "truncated oversized lines");
        }
        tracing::info!(
            url = %self.url,
            records = parsed.records.len(),
            skipped = parsed.skipped,
            "fetched point data"
        );
        Ok(parsed.records)
    }
}

impl DataSource for HttpDataSource {
    fn fetch(&self) -> FetchFuture<'_> {
        Box::pin(async move {
            self.fetch_points().await.map_err(|error| {
                tracing::warn!(url = %self.url, error = %error, "point fetch failed");
                error
            })
        })
    }
}
