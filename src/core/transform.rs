use crate::config::AppConfig;
use crate::utils::error::{Result, SyncError};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

/// Canonical gzip magic number.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

const DEFAULT_TEMPLATE: &str = include_str!("../../templates/report.html");

/// Detects gzip by content. File extensions lie; the first two bytes do not.
pub fn is_gzipped(path: &Path) -> Result<bool> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 2];
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(magic == GZIP_MAGIC),
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(err) => Err(err.into()),
    }
}

/// Filters the tabular source file to one category and renders the matching
/// rows into an HTML report through template substitution.
pub struct ReportRenderer {
    column: String,
    category: String,
    template: String,
}

impl ReportRenderer {
    pub fn new(
        column: impl Into<String>,
        category: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        Self {
            column: column.into(),
            category: category.into(),
            template: template.into(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let template = match &config.template_path {
            Some(path) => fs::read_to_string(path)?,
            None => DEFAULT_TEMPLATE.to_string(),
        };
        Ok(Self::new(
            config.report_column.clone(),
            config.report_category.clone(),
            template,
        ))
    }

    pub fn render_file(&self, input: &Path, output: &Path) -> Result<()> {
        let html = self.render(input)?;
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(output, html)?;
        Ok(())
    }

    pub fn render(&self, input: &Path) -> Result<String> {
        let file = File::open(input)?;
        let reader: Box<dyn Read> = if is_gzipped(input)? {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };

        let mut csv_reader = csv::Reader::from_reader(reader);
        let headers = csv_reader.headers().map_err(malformed)?.clone();
        let column_index = headers
            .iter()
            .position(|header| header == self.column)
            .ok_or_else(|| SyncError::MissingField {
                field: self.column.clone(),
            })?;

        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record.map_err(malformed)?;
            if record.get(column_index) == Some(self.category.as_str()) {
                rows.push(record);
            }
        }
        tracing::debug!(
            category = %self.category,
            matches = rows.len(),
            "filtered source rows"
        );

        let table = render_table(&headers, &rows);
        Ok(self.template.replace("{{ data }}", &table))
    }
}

fn malformed(err: csv::Error) -> SyncError {
    SyncError::MalformedInput {
        message: err.to_string(),
    }
}

fn render_table(headers: &csv::StringRecord, rows: &[csv::StringRecord]) -> String {
    let mut html = String::from("<table border=\"1\" class=\"dataframe\">\n  <thead>\n    <tr>");
    for header in headers {
        html.push_str("<th>");
        html.push_str(&escape(header));
        html.push_str("</th>");
    }
    html.push_str("</tr>\n  </thead>\n  <tbody>\n");
    for row in rows {
        html.push_str("    <tr>");
        for field in row {
            html.push_str("<td>");
            html.push_str(&escape(field));
            html.push_str("</td>");
        }
        html.push_str("</tr>\n");
    }
    html.push_str("  </tbody>\n</table>");
    html
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
