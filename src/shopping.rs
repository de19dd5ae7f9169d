//! Photo audit and shopping list
//!
//! One non-streaming model call over the uploaded photos. The answer is kept
//! verbatim as the narrative that later feeds the downloadable report.

use tracing::{info, warn};

use crate::error::DashboardError;
use crate::financial::format_amount;
use crate::llm::LanguageModel;
use crate::models::{ImageAttachment, NarrativeReport, PropertyInputs};
use crate::Result;

pub const LEROY_MERLIN_SEARCH: &str = "https://www.leroymerlin.fr/recherche?q=NOM_PRODUIT";
pub const IKEA_SEARCH: &str = "https://www.ikea.com/fr/fr/search/products/?q=NOM_PRODUIT";

/// Interior-architect brief sent alongside the photos
pub fn shopping_instructions(inputs: &PropertyInputs) -> String {
    format!(
        r#"Tu es architecte d'intérieur. Bien : {address}, {surface}m2. Budget travaux : {budget}€.
1. Analyse l'état des lieux à partir des photos.
2. Crée un TABLEAU "SHOPPING LIST" précis.

RÈGLES TABLEAU :
| Pièce | Produit | Prix Est. | LIEN D'ACHAT (Markdown) |

FORMAT LIENS :
- Leroy Merlin : {leroy}
- IKEA : {ikea}"#,
        address = inputs.address,
        surface = inputs.surface_m2,
        budget = format_amount(inputs.renovation_budget),
        leroy = LEROY_MERLIN_SEARCH,
        ikea = IKEA_SEARCH,
    )
}

/// Run the photo analysis; a blank answer counts as a failed call
pub async fn analyze_photos(
    model: &dyn LanguageModel,
    inputs: &PropertyInputs,
    images: &[ImageAttachment],
) -> Result<NarrativeReport> {
    if images.is_empty() {
        return Err(DashboardError::invalid_input(
            "at least one photo is required for the analysis",
        ));
    }

    info!(
        model = model.name(),
        photos = images.len(),
        "Starting shopping analysis for {}",
        inputs.address
    );

    let answer = model
        .generate_narrative(&shopping_instructions(inputs), images)
        .await?;

    if answer.trim().is_empty() {
        warn!("Language model returned an empty analysis");
        return Err(DashboardError::external("empty analysis returned by the model"));
    }

    info!(chars = answer.len(), "Shopping analysis complete");
    Ok(NarrativeReport::new(answer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLanguageModel;

    fn photo() -> ImageAttachment {
        ImageAttachment {
            file_name: "salon.jpg".to_string(),
            media_type: "image/jpeg",
            data: vec![0xff, 0xd8, 0xff],
        }
    }

    #[test]
    fn test_instructions_mention_property_and_links() {
        let text = shopping_instructions(&PropertyInputs::default());
        assert!(text.contains("10 rue de la Paix, 75001 Paris"));
        assert!(text.contains("45m2"));
        assert!(text.contains("| Pièce | Produit | Prix Est. |"));
        assert!(text.contains(LEROY_MERLIN_SEARCH));
        assert!(text.contains(IKEA_SEARCH));
    }

    #[tokio::test]
    async fn test_analysis_returns_narrative() {
        let model = MockLanguageModel::new("| Salon | Canapé | 499€ | [IKEA](https://www.ikea.com) |", &[]);
        let report = analyze_photos(&model, &PropertyInputs::default(), &[photo(), photo()])
            .await
            .unwrap();
        assert!(report.content.contains("Canapé"));
        assert_eq!(model.image_counts(), vec![2]);
    }

    #[tokio::test]
    async fn test_no_photos_rejected() {
        let model = MockLanguageModel::new("ok", &[]);
        let result = analyze_photos(&model, &PropertyInputs::default(), &[]).await;
        assert!(matches!(result, Err(DashboardError::InvalidInput(_))));
        assert!(model.image_counts().is_empty());
    }

    #[tokio::test]
    async fn test_blank_answer_is_external_error() {
        let model = MockLanguageModel::new("   \n", &[]);
        let result = analyze_photos(&model, &PropertyInputs::default(), &[photo()]).await;
        assert!(matches!(result, Err(DashboardError::ExternalService(_))));
    }

    #[tokio::test]
    async fn test_model_failure_surfaces() {
        let model = MockLanguageModel::new("", &[]).failing_narrative("401 unauthorized");
        let err = analyze_photos(&model, &PropertyInputs::default(), &[photo()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("401 unauthorized"));
    }
}
