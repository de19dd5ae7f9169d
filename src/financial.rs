//! Rental yield and furnished-rental tax comparison
//!
//! Closed-form formulas evaluated once per input change. Cashflow is computed
//! before financing: loan interest and principal are never modelled here.

use num_format::{Locale, ToFormattedString};
use tracing::debug;

use crate::config::TaxParameters;
use crate::error::DashboardError;
use crate::models::{
    ChartPoint, ChartSeries, DashboardCharts, DashboardMetrics, FinancialResult, PropertyInputs,
};
use crate::Result;

/// Compute every derived figure for one property
pub fn compute_financials(
    inputs: &PropertyInputs,
    params: &TaxParameters,
) -> Result<FinancialResult> {
    validate_inputs(inputs)?;
    params.validate()?;

    let annual_rent = inputs.monthly_rent_excluding_charges * 12.0;
    let total_project_cost = inputs.purchase_price + inputs.renovation_budget;

    if total_project_cost <= 0.0 {
        return Err(DashboardError::DivisionByZero(total_project_cost));
    }

    let gross_yield_percent = (annual_rent / total_project_cost) * 100.0;
    let yearly_expenses = inputs.annual_management_charges + inputs.annual_property_tax;
    let monthly_cashflow_before_financing =
        (annual_rent - inputs.annual_management_charges - inputs.annual_property_tax) / 12.0;

    let micro_regime_tax = (annual_rent * params.micro_allowance) * params.marginal_rate;

    let depreciation_allowance = (inputs.purchase_price
        * params.building_share
        * params.building_depreciation_rate)
        + (inputs.renovation_budget * params.renovation_depreciation_rate);

    let real_regime_tax_base = (annual_rent
        - depreciation_allowance
        - inputs.annual_management_charges
        - inputs.annual_property_tax)
        .max(0.0);
    let real_regime_tax = real_regime_tax_base * params.marginal_rate;

    debug!(
        annual_rent,
        yearly_expenses,
        depreciation_allowance,
        "computed financials for {}",
        inputs.address
    );

    Ok(FinancialResult {
        annual_rent,
        total_project_cost,
        gross_yield_percent,
        monthly_cashflow_before_financing,
        micro_regime_tax,
        depreciation_allowance,
        real_regime_tax_base,
        real_regime_tax,
        tax_saving_real_vs_micro: micro_regime_tax - real_regime_tax,
    })
}

fn validate_inputs(inputs: &PropertyInputs) -> Result<()> {
    for (name, value) in inputs.numeric_fields() {
        if !value.is_finite() {
            return Err(DashboardError::invalid_input(format!(
                "{} must be a finite number",
                name
            )));
        }
        if value < 0.0 {
            return Err(DashboardError::invalid_input(format!(
                "{} cannot be negative (got {})",
                name, value
            )));
        }
    }
    Ok(())
}

/// Headline metrics: yield to two decimals, euro amounts truncated
pub fn dashboard_metrics(result: &FinancialResult) -> DashboardMetrics {
    let gross_yield_percent = round_to(result.gross_yield_percent, 2);
    let monthly_cashflow = result.monthly_cashflow_before_financing.trunc() as i64;
    let yearly_tax_saving = result.tax_saving_real_vs_micro.trunc() as i64;

    DashboardMetrics {
        gross_yield_percent,
        monthly_cashflow,
        yearly_tax_saving,
        gross_yield_label: format!("{:.2} %", gross_yield_percent),
        cashflow_label: format!("{} €/mois", format_euros(monthly_cashflow as f64)),
        tax_saving_label: format!("{} €/an", format_euros(yearly_tax_saving as f64)),
    }
}

/// Series behind the tax comparison bars and the investment breakdown donut
pub fn chart_series(inputs: &PropertyInputs, result: &FinancialResult) -> DashboardCharts {
    DashboardCharts {
        tax_comparison: ChartSeries {
            title: "Comparatif Impôts".to_string(),
            points: vec![
                point("Micro-BIC", result.micro_regime_tax),
                point("Réel", result.real_regime_tax),
            ],
        },
        investment_breakdown: ChartSeries {
            title: "Répartition Investissement".to_string(),
            points: vec![
                point("Achat", inputs.purchase_price),
                point("Travaux", inputs.renovation_budget),
            ],
        },
    }
}

fn point(label: &str, value: f64) -> ChartPoint {
    ChartPoint {
        label: label.to_string(),
        value,
    }
}

/// Whole euros with French digit grouping
pub fn format_euros(value: f64) -> String {
    let whole = value.trunc() as i64;
    if whole < 0 {
        format!("-{}", whole.unsigned_abs().to_formatted_string(&Locale::fr))
    } else {
        whole.to_formatted_string(&Locale::fr)
    }
}

/// Money for prose: whole amounts as `format_euros`, otherwise cents kept
pub fn format_amount(value: f64) -> String {
    let cents = (value * 100.0).round() as i64;
    let sign = if cents < 0 { "-" } else { "" };
    let whole = (cents / 100).unsigned_abs().to_formatted_string(&Locale::fr);

    match (cents % 100).unsigned_abs() {
        0 => format!("{}{}", sign, whole),
        rest => format!("{}{},{:02}", sign, whole, rest),
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn sample() -> PropertyInputs {
        PropertyInputs::default()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < EPS
    }

    #[test]
    fn test_reference_property() {
        let result = compute_financials(&sample(), &TaxParameters::default()).unwrap();

        assert!(close(result.annual_rent, 15_600.0));
        assert!(close(result.total_project_cost, 235_000.0));
        assert!((result.gross_yield_percent - 6.638_297_872).abs() < 1e-6);
        assert!((result.monthly_cashflow_before_financing - 1_141.666_666_7).abs() < 1e-6);
        assert!(close(result.micro_regime_tax, 3_681.6));
        assert!(close(result.depreciation_allowance, 8_390.5));
        assert!(close(result.real_regime_tax_base, 5_309.5));
        assert!(close(result.real_regime_tax, 2_506.084));
        assert!(close(result.tax_saving_real_vs_micro, 1_175.516));
    }

    #[test]
    fn test_gross_yield_formula_is_exact() {
        let inputs = PropertyInputs {
            purchase_price: 187_345.0,
            renovation_budget: 12_777.0,
            monthly_rent_excluding_charges: 943.0,
            ..sample()
        };
        let result = compute_financials(&inputs, &TaxParameters::default()).unwrap();
        let annual_rent = 943.0 * 12.0;
        assert_eq!(
            result.gross_yield_percent,
            (annual_rent / (187_345.0 + 12_777.0)) * 100.0
        );
    }

    #[test]
    fn test_zero_total_cost_is_division_by_zero() {
        let inputs = PropertyInputs {
            purchase_price: 0.0,
            renovation_budget: 0.0,
            ..sample()
        };
        let result = compute_financials(&inputs, &TaxParameters::default());
        assert!(matches!(result, Err(DashboardError::DivisionByZero(_))));
    }

    #[test]
    fn test_negative_fields_rejected() {
        let inputs = PropertyInputs {
            annual_management_charges: -10.0,
            ..sample()
        };
        let err = compute_financials(&inputs, &TaxParameters::default()).unwrap_err();
        assert!(matches!(err, DashboardError::InvalidInput(_)));
        assert!(err.to_string().contains("annual_management_charges"));

        let inputs = PropertyInputs {
            renovation_budget: f64::NAN,
            ..sample()
        };
        assert!(compute_financials(&inputs, &TaxParameters::default()).is_err());
    }

    #[test]
    fn test_real_base_floored_at_zero() {
        // Heavy renovation: depreciation exceeds rent
        let inputs = PropertyInputs {
            renovation_budget: 400_000.0,
            monthly_rent_excluding_charges: 500.0,
            annual_management_charges: 6_000.0,
            ..sample()
        };
        let result = compute_financials(&inputs, &TaxParameters::default()).unwrap();
        // (6000 - 6000 - 700) / 12
        assert!(close(result.monthly_cashflow_before_financing, -700.0 / 12.0));
        assert_eq!(result.real_regime_tax_base, 0.0);
        assert_eq!(result.real_regime_tax, 0.0);
    }

    #[test]
    fn test_negative_saving_preserved() {
        let inputs = PropertyInputs {
            purchase_price: 100_000.0,
            renovation_budget: 0.0,
            monthly_rent_excluding_charges: 2_000.0,
            annual_property_tax: 0.0,
            annual_management_charges: 0.0,
            ..sample()
        };
        let result = compute_financials(&inputs, &TaxParameters::default()).unwrap();
        assert!(close(result.micro_regime_tax, 5_664.0));
        assert!(close(result.real_regime_tax, 10_004.04));
        assert!(close(result.tax_saving_real_vs_micro, -4_340.04));

        let metrics = dashboard_metrics(&result);
        assert_eq!(metrics.yearly_tax_saving, -4_340);
    }

    #[test]
    fn test_zero_renovation_and_tax_are_valid() {
        let inputs = PropertyInputs {
            renovation_budget: 0.0,
            annual_property_tax: 0.0,
            ..sample()
        };
        let result = compute_financials(&inputs, &TaxParameters::default()).unwrap();
        assert!(close(result.depreciation_allowance, 5_890.5));
    }

    #[test]
    fn test_idempotent() {
        let params = TaxParameters::default();
        let a = compute_financials(&sample(), &params).unwrap();
        let b = compute_financials(&sample(), &params).unwrap();
        assert_eq!(a.gross_yield_percent.to_bits(), b.gross_yield_percent.to_bits());
        assert_eq!(a, b);
    }

    #[test]
    fn test_custom_marginal_rate() {
        let params = TaxParameters {
            marginal_rate: 0.3,
            ..TaxParameters::default()
        };
        let result = compute_financials(&sample(), &params).unwrap();
        assert!(close(result.micro_regime_tax, 2_340.0));
        assert!(close(result.real_regime_tax, 5_309.5 * 0.3));
    }

    #[test]
    fn test_metrics_and_charts() {
        let inputs = sample();
        let result = compute_financials(&inputs, &TaxParameters::default()).unwrap();

        let metrics = dashboard_metrics(&result);
        assert_eq!(metrics.gross_yield_percent, 6.64);
        assert_eq!(metrics.gross_yield_label, "6.64 %");
        assert_eq!(metrics.monthly_cashflow, 1_141);
        assert_eq!(metrics.yearly_tax_saving, 1_175);

        let charts = chart_series(&inputs, &result);
        assert_eq!(charts.tax_comparison.points[0].label, "Micro-BIC");
        assert_eq!(charts.tax_comparison.points[1].value, result.real_regime_tax);
        assert_eq!(charts.investment_breakdown.points[1].value, 25_000.0);
    }

    #[test]
    fn test_format_euros_truncates() {
        assert_eq!(format_euros(999.99), "999");
        assert_eq!(format_euros(-12.7), "-12");
    }

    #[test]
    fn test_format_amount_keeps_cents() {
        assert_eq!(format_amount(10_000.0), format_euros(10_000.0));
        assert_eq!(format_amount(999.99), "999,99");
        assert_eq!(format_amount(850.5), "850,50");
        assert_eq!(format_amount(-0.5), "-0,50");
        assert_eq!(format_amount(12.004), "12");
    }
}
