mod bootstrap;
mod report;
mod views;

use anyhow::Result;
use billing_core::settings::Settings;
use billing_data::analysis::{analyze, AnalysisRequest};
use billing_data::presenter::SeriesPresenter;

use crate::report::{JsonPresenter, TextPresenter};
use crate::views::View;

fn main() -> Result<()> {
    let settings = Settings::load_with_last_used();

    bootstrap::ensure_directories()?;
    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_ref())?;

    tracing::info!("Billing Dashboard v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "View: {}, Profile: {}, Meter mode: {}",
        settings.view,
        settings.profile,
        settings.meter_mode
    );

    if settings.config_cleared {
        tracing::info!("Saved configuration cleared");
    } else if settings.clear {
        tracing::warn!("Saved configuration could not be cleared");
    }

    let view: View = settings.view.parse()?;
    let request = AnalysisRequest::from_settings(&settings)?;
    let analysis = analyze(&request)?;

    let stdout = std::io::stdout();
    let mut presenter: Box<dyn SeriesPresenter> = if settings.json {
        Box::new(JsonPresenter::new(stdout.lock()))
    } else {
        Box::new(TextPresenter::new(stdout.lock()))
    };
    views::render(&analysis, &request, view, presenter.as_mut())?;

    Ok(())
}
