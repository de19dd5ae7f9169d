use immo_suite::{
    config::TaxParameters,
    financial::{chart_series, compute_financials, dashboard_metrics, format_euros},
    models::PropertyInputs,
};
use tracing::info;

/// Prints the strategy-tab figures for the default property, or for the
/// `PropertyInputs` JSON file given as first argument.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let inputs = match std::env::args().nth(1) {
        Some(path) => {
            info!(path = %path, "Loading property inputs");
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str::<PropertyInputs>(&raw)?
        }
        None => PropertyInputs::default(),
    };

    let tax = TaxParameters::from_env()?;
    let result = compute_financials(&inputs, &tax)?;
    let metrics = dashboard_metrics(&result);
    let charts = chart_series(&inputs, &result);

    println!("\n=== DOSSIER : {} ===", inputs.address);
    println!("Rentabilité brute       : {}", metrics.gross_yield_label);
    println!("Cashflow (avant crédit) : {}", metrics.cashflow_label);
    println!("Gain fiscal (Réel/Micro): {}", metrics.tax_saving_label);
    println!("Budget total            : {} €", format_euros(result.total_project_cost));

    println!("\n{}:", charts.tax_comparison.title);
    for point in &charts.tax_comparison.points {
        println!("  {:<10} {:>10} €", point.label, format_euros(point.value));
    }
    println!("\n{}:", charts.investment_breakdown.title);
    for point in &charts.investment_breakdown.points {
        println!("  {:<10} {:>10} €", point.label, format_euros(point.value));
    }

    Ok(())
}
