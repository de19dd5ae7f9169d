//! White-label client report
//!
//! Produces one self-contained HTML document: inline CSS, inline logo, no
//! scripts and no external references, so the file still opens years later.
//! Model output crosses a trust boundary here and is escaped before embedding.

use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::info;

use crate::error::DashboardError;
use crate::financial::{dashboard_metrics, format_amount, format_euros};
use crate::models::{AssembledReport, FinancialResult, ImageAttachment, NarrativeReport, PropertyInputs};
use crate::Result;

pub const REPORT_FILE_NAME: &str = "Audit_Complet.html";
pub const REPORT_MIME_TYPE: &str = "text/html";
pub const BRAND_PLACEHOLDER: &str = "IMMO SUITE";

const STYLE: &str = r#"
body { font-family: Arial, sans-serif; padding: 40px; color: #333; }
.header { display: flex; justify-content: space-between; align-items: center; border-bottom: 2px solid #0078d7; padding-bottom: 20px; }
.box { background: #f0f2f6; padding: 15px; border-radius: 10px; margin: 20px 0; }
a { color: #0078d7; font-weight: bold; text-decoration: none; }
footer { margin-top: 40px; font-size: 0.8em; color: #888; }
"#;

lazy_static! {
    /// `[label](http...)` after escaping; other schemes stay plain text.
    /// The URL may hold one level of balanced parentheses.
    static ref MARKDOWN_LINK: Regex = Regex::new(
        r"\[([^\]\n]+)\]\((https?://(?:[^\s()]|\([^\s()]*\))+)\)"
    )
    .expect("valid link pattern");
}

/// Assemble the downloadable report for one analysed property
pub fn assemble_report(
    inputs: &PropertyInputs,
    result: &FinancialResult,
    narrative: Option<&NarrativeReport>,
    logo: Option<&ImageAttachment>,
) -> Result<AssembledReport> {
    let narrative = narrative.ok_or(DashboardError::MissingNarrative)?;
    let metrics = dashboard_metrics(result);

    let brand = match logo {
        Some(image) => format!(
            r#"<img src="{}" alt="logo" style="max-height:80px;">"#,
            image.data_uri()
        ),
        None => format!("<h2>{}</h2>", BRAND_PLACEHOLDER),
    };

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="fr"><head>
<meta charset="utf-8">
<title>Dossier Investissement - {address}</title>
<style>{style}</style>
</head>
<body>
<div class="header">
<div><h1>DOSSIER INVESTISSEMENT</h1><small>{address}</small></div>
{brand}
</div>
<div class="box">
<p><strong>Rentabilité :</strong> {yield_pct:.2}% | <strong>Budget Total :</strong> {total} €</p>
<p><strong>Optimisation Fiscale :</strong> Gain de {saving}€/an via le Régime Réel.</p>
</div>
<h2>Expertise &amp; Shopping List</h2>
<div class="narrative">
{narrative}
</div>
<footer>Généré le {date}</footer>
</body></html>
"#,
        address = escape_html(&inputs.address),
        style = STYLE,
        brand = brand,
        yield_pct = metrics.gross_yield_percent,
        total = format_amount(result.total_project_cost),
        saving = format_euros(metrics.yearly_tax_saving as f64),
        narrative = render_narrative(&narrative.content),
        date = Utc::now().format("%d/%m/%Y"),
    );

    info!(
        bytes = html.len(),
        with_logo = logo.is_some(),
        "Report assembled for {}",
        inputs.address
    );

    Ok(AssembledReport {
        file_name: REPORT_FILE_NAME.to_string(),
        mime_type: REPORT_MIME_TYPE.to_string(),
        html,
    })
}

/// Escape, linkify http(s) markdown links, then turn line breaks into `<br>`
pub fn render_narrative(text: &str) -> String {
    let escaped = escape_html(text);
    let linked = MARKDOWN_LINK.replace_all(&escaped, r#"<a href="$2">$1</a>"#);
    linked.replace("\r\n", "\n").replace('\n', "<br>\n")
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
