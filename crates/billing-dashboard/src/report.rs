use std::io::Write;

use billing_core::error::Result;
use billing_core::formatting::format_number;
use billing_core::models::FileWarning;
use billing_data::presenter::{ChartKind, ChartSeries, SeriesPresenter};
use serde::Serialize;

// ── TextPresenter ─────────────────────────────────────────────────────────────

/// Plain-text rendering, one block per section and chart.
pub struct TextPresenter<W: Write> {
    out: W,
}

impl<W: Write> TextPresenter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> SeriesPresenter for TextPresenter<W> {
    fn section(&mut self, title: &str, lines: &[String]) -> Result<()> {
        writeln!(self.out, "\n== {} ==", title)?;
        for line in lines {
            writeln!(self.out, "{}", line)?;
        }
        Ok(())
    }

    fn chart(&mut self, chart: &ChartSeries) -> Result<()> {
        writeln!(self.out, "\n-- {} --", chart.title)?;
        if chart.kind != ChartKind::Pie {
            writeln!(self.out, "{}", chart.y_axis)?;
        }
        for trace in &chart.traces {
            if chart.traces.len() > 1 {
                writeln!(self.out, "{}:", trace.name)?;
            }
            let width = trace.x_labels.iter().map(|l| l.chars().count()).max().unwrap_or(0);
            for (label, value) in trace.x_labels.iter().zip(&trace.y_values) {
                writeln!(
                    self.out,
                    "  {:<width$}  {:>16}",
                    label,
                    format_number(*value, 2),
                    width = width
                )?;
            }
        }
        Ok(())
    }

    fn warning(&mut self, warning: &FileWarning) -> Result<()> {
        writeln!(self.out, "warning: {}", warning)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

// ── JsonPresenter ─────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct SectionEntry {
    title: String,
    lines: Vec<String>,
}

#[derive(Debug, Default, Serialize)]
struct Document {
    warnings: Vec<String>,
    sections: Vec<SectionEntry>,
    charts: Vec<ChartSeries>,
}

/// Collects everything and writes one JSON document on [`finish`](SeriesPresenter::finish).
pub struct JsonPresenter<W: Write> {
    out: W,
    document: Document,
}

impl<W: Write> JsonPresenter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            document: Document::default(),
        }
    }
}

impl<W: Write> SeriesPresenter for JsonPresenter<W> {
    fn section(&mut self, title: &str, lines: &[String]) -> Result<()> {
        self.document.sections.push(SectionEntry {
            title: title.to_string(),
            lines: lines.to_vec(),
        });
        Ok(())
    }

    fn chart(&mut self, chart: &ChartSeries) -> Result<()> {
        self.document.charts.push(chart.clone());
        Ok(())
    }

    fn warning(&mut self, warning: &FileWarning) -> Result<()> {
        self.document.warnings.push(warning.to_string());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        serde_json::to_writer_pretty(&mut self.out, &self.document)?;
        writeln!(self.out)?;
        self.out.flush()?;
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
