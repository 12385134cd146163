use crate::domain::model::{OutputFormat, ProjectedRow, RenderedOutput, RunResult};
use crate::utils::error::{EtlError, Result};
use serde::Serialize;

/// Header row plus one line per row, `\n`-separated, no trailing newline.
/// Fields are quoted only when they contain a delimiter, quote or line break.
pub fn render_csv<'a, I>(titles: &[&str], rows: I) -> Result<String>
where
    I: IntoIterator<Item = &'a ProjectedRow>,
{
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(Vec::new());

    writer.write_record(titles)?;
    for row in rows {
        writer.write_record(row.values())?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| EtlError::IoError(e.into_error()))?;
    let mut text = String::from_utf8(bytes)
        .map_err(|e| EtlError::IoError(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
    if text.ends_with('\n') {
        text.pop();
    }
    Ok(text)
}

pub fn render_json<'a, I>(rows: I) -> Result<String>
where
    I: IntoIterator<Item = &'a ProjectedRow>,
{
    let rows: Vec<&ProjectedRow> = rows.into_iter().collect();
    Ok(serde_json::to_string(&rows)?)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DebugEnvelope<'a> {
    debug: bool,
    carrier_code: &'a str,
    filters: Vec<&'a str>,
    upstream_urls: Vec<&'a str>,
    pages_fetched: usize,
    discarded: usize,
    rows: Vec<&'a ProjectedRow>,
}

/// Renders a finished run. In debug mode JSON output is wrapped in an
/// envelope carrying the filters and first-page URLs of every chunk.
pub fn render(
    run: &RunResult,
    format: OutputFormat,
    debug: bool,
) -> Result<RenderedOutput> {
    let body = match format {
        OutputFormat::Csv => render_csv(&run.titles, run.rows())?,
        OutputFormat::Json if debug => {
            let envelope = DebugEnvelope {
                debug: true,
                carrier_code: &run.carrier_code,
                filters: run.chunks.iter().map(|c| c.filter.as_str()).collect(),
                upstream_urls: run.chunks.iter().map(|c| c.first_page_url.as_str()).collect(),
                pages_fetched: run.pages_fetched(),
                discarded: run.chunks.iter().map(|c| c.discarded).sum(),
                rows: run.rows().collect(),
            };
            serde_json::to_string(&envelope)?
        }
        OutputFormat::Json => render_json(run.rows())?,
    };

    Ok(RenderedOutput {
        format,
        content_type: format.content_type(),
        body,
    })
}
