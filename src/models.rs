//! Core data models for the investment dashboard

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DashboardError;

//
// ================= Property =================
//

/// Sidebar inputs describing one property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyInputs {
    pub address: String,
    pub surface_m2: f64,
    /// Fees-and-taxes-included acquisition price
    pub purchase_price: f64,
    pub renovation_budget: f64,
    pub monthly_rent_excluding_charges: f64,
    pub annual_property_tax: f64,
    pub annual_management_charges: f64,
}

impl Default for PropertyInputs {
    fn default() -> Self {
        Self {
            address: "10 rue de la Paix, 75001 Paris".to_string(),
            surface_m2: 45.0,
            purchase_price: 210_000.0,
            renovation_budget: 25_000.0,
            monthly_rent_excluding_charges: 1_300.0,
            annual_property_tax: 700.0,
            annual_management_charges: 1_200.0,
        }
    }
}

impl PropertyInputs {
    /// Numeric fields paired with their names, in form order
    pub fn numeric_fields(&self) -> [(&'static str, f64); 6] {
        [
            ("surface_m2", self.surface_m2),
            ("purchase_price", self.purchase_price),
            ("renovation_budget", self.renovation_budget),
            ("monthly_rent_excluding_charges", self.monthly_rent_excluding_charges),
            ("annual_property_tax", self.annual_property_tax),
            ("annual_management_charges", self.annual_management_charges),
        ]
    }
}

//
// ================= Financial Result =================
//

/// Figures derived from [`PropertyInputs`]; recomputed on every change
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FinancialResult {
    pub annual_rent: f64,
    pub total_project_cost: f64,
    /// Plain percentage: `7.5` means 7.5%
    pub gross_yield_percent: f64,
    /// Excludes any debt service
    pub monthly_cashflow_before_financing: f64,
    pub micro_regime_tax: f64,
    pub depreciation_allowance: f64,
    pub real_regime_tax_base: f64,
    pub real_regime_tax: f64,
    /// Negative when the real regime costs more than the micro regime
    pub tax_saving_real_vs_micro: f64,
}

/// Headline figures as shown on the strategy tab
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardMetrics {
    /// Rounded to two decimals
    pub gross_yield_percent: f64,
    /// Truncated to whole euros
    pub monthly_cashflow: i64,
    /// Truncated to whole euros
    pub yearly_tax_saving: i64,
    pub gross_yield_label: String,
    pub cashflow_label: String,
    pub tax_saving_label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub label: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub title: String,
    pub points: Vec<ChartPoint>,
}

/// Data behind the two strategy-tab charts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardCharts {
    pub tax_comparison: ChartSeries,
    pub investment_breakdown: ChartSeries,
}

//
// ================= Narrative & Report =================
//

/// Model-produced shopping recommendation; never inspected beyond rendering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeReport {
    pub content: String,
    pub generated_at: DateTime<Utc>,
}

impl NarrativeReport {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            generated_at: Utc::now(),
        }
    }
}

/// Standalone downloadable document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledReport {
    pub file_name: String,
    pub mime_type: String,
    pub html: String,
}

//
// ================= Images =================
//

/// Upload payload as received over the API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUpload {
    pub file_name: String,
    pub data_base64: String,
}

/// Decoded image ready to be embedded or sent to the model
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAttachment {
    pub file_name: String,
    pub media_type: &'static str,
    pub data: Vec<u8>,
}

impl ImageAttachment {
    /// Accepts png/jpg/jpeg by extension; nothing else is checked
    pub fn from_upload(upload: &ImageUpload) -> crate::Result<Self> {
        let media_type = media_type_for(&upload.file_name).ok_or_else(|| {
            DashboardError::invalid_input(format!(
                "unsupported image type: {} (expected png, jpg or jpeg)",
                upload.file_name
            ))
        })?;

        let data = STANDARD.decode(upload.data_base64.trim())?;
        if data.is_empty() {
            return Err(DashboardError::invalid_input(format!(
                "image {} is empty",
                upload.file_name
            )));
        }

        Ok(Self {
            file_name: upload.file_name.clone(),
            media_type,
            data,
        })
    }

    /// Inline `data:` URI
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.media_type, STANDARD.encode(&self.data))
    }
}

fn media_type_for(file_name: &str) -> Option<&'static str> {
    let extension = file_name.rsplit_once('.')?.1.to_ascii_lowercase();
    match extension.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        _ => None,
    }
}

//
// ================= Chat =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatTurn {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(name: &str, bytes: &[u8]) -> ImageUpload {
        ImageUpload {
            file_name: name.to_string(),
            data_base64: STANDARD.encode(bytes),
        }
    }

    #[test]
    fn test_upload_filtering_by_extension() {
        let png = ImageAttachment::from_upload(&upload("salon.PNG", b"\x89PNG")).unwrap();
        assert_eq!(png.media_type, "image/png");

        let jpeg = ImageAttachment::from_upload(&upload("cuisine.jpeg", b"\xff\xd8")).unwrap();
        assert_eq!(jpeg.media_type, "image/jpeg");

        let gif = ImageAttachment::from_upload(&upload("plan.gif", b"GIF89a"));
        assert!(matches!(gif, Err(DashboardError::InvalidInput(_))));

        let no_ext = ImageAttachment::from_upload(&upload("photo", b"abc"));
        assert!(no_ext.is_err());
    }

    #[test]
    fn test_invalid_base64_rejected() {
        let bad = ImageUpload {
            file_name: "a.png".to_string(),
            data_base64: "not base64 !!".to_string(),
        };
        assert!(matches!(
            ImageAttachment::from_upload(&bad),
            Err(DashboardError::DecodeError(_))
        ));
    }

    #[test]
    fn test_data_uri() {
        let image = ImageAttachment::from_upload(&upload("logo.png", b"hi")).unwrap();
        assert_eq!(image.data_uri(), "data:image/png;base64,aGk=");
    }

    #[test]
    fn test_property_defaults_partial_json() {
        let inputs: PropertyInputs =
            serde_json::from_str(r#"{"address": "1 place Bellecour, Lyon"}"#).unwrap();
        assert_eq!(inputs.address, "1 place Bellecour, Lyon");
        assert_eq!(inputs.purchase_price, 210_000.0);
    }
}
