use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    create_action_stacks, filter_existing_actions_with_common_land_cover, merge_land_cover_codes,
    shrink_existing_actions_to_shared_land_cover, sqm_to_ha, subtract_incompatible_stacks,
    total_valid_land_cover, AreaError, CompatibilityCheck, ExistingAction, LandCoverCodes,
    ParcelLandCover, Stack, LOG_CATEGORY,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AvailableAreaRequest {
    pub action_code: String,
    pub sheet_id: String,
    pub parcel_id: String,
    #[serde(default)]
    pub existing_actions: Vec<ExistingAction>,
}

/// Reference data a calculation needs, fetched up front by the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AvailableAreaDataRequirements {
    pub land_cover_codes_for_applied_for_action: Vec<LandCoverCodes>,
    pub land_covers_for_parcel: Vec<ParcelLandCover>,
    pub land_covers_for_existing_actions: BTreeMap<String, Vec<LandCoverCodes>>,
    pub land_cover_to_string: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AvailableAreaResult {
    pub stacks: Vec<Stack>,
    pub explanations: Vec<Vec<String>>,
    pub available_area_sqm: f64,
    pub total_valid_land_cover_sqm: f64,
    pub available_area_hectares: f64,
}

fn section(title: &str, lines: Vec<String>) -> Vec<String> {
    let mut section = Vec::with_capacity(lines.len() + 1);
    section.push(title.to_string());
    section.extend(lines);
    section
}

fn initial_context(request: &AvailableAreaRequest) -> Vec<String> {
    let existing = if request.existing_actions.is_empty() {
        "none".to_string()
    } else {
        request
            .existing_actions
            .iter()
            .map(|action| format!("{} ({} sqm)", action.action_code, action.area_sqm))
            .collect::<Vec<_>>()
            .join(", ")
    };

    vec![
        format!("Action applied for: {}", request.action_code),
        format!("Parcel: {}-{}", request.sheet_id, request.parcel_id),
        format!("Existing actions: {existing}"),
    ]
}

/// Calculate the area of a parcel still available to the applied-for action.
///
/// Eligible land cover is totalled, existing actions without common land cover
/// are dropped and the rest are capped to the shared cover, the survivors are
/// stacked, and every stack incompatible with the applied-for action is
/// removed from the total. Explanations come back as one section per phase.
///
/// # Errors
/// Returns [`AreaError::InvalidInput`] for a blank action code, or
/// [`AreaError::InvalidArea`] when any parcel land cover or existing action
/// carries a negative or non-finite area.
pub fn calculate_available_area<C>(
    request: &AvailableAreaRequest,
    compatibility: &C,
    data: &AvailableAreaDataRequirements,
) -> Result<AvailableAreaResult, AreaError>
where
    C: CompatibilityCheck + ?Sized,
{
    if request.action_code.trim().is_empty() {
        return Err(AreaError::InvalidInput("action_code MUST be non-empty".to_string()));
    }

    if data.land_cover_codes_for_applied_for_action.is_empty() {
        tracing::warn!(
            category = LOG_CATEGORY,
            action_code = %request.action_code,
            "no eligible land cover codes for applied-for action"
        );
    }

    let merged_codes = merge_land_cover_codes(&data.land_cover_codes_for_applied_for_action);
    let land_cover_total =
        total_valid_land_cover(&data.land_covers_for_parcel, &merged_codes, &data.land_cover_to_string)?;
    let total_valid_land_cover_sqm = land_cover_total.total_valid_land_cover_sqm;

    let filtered = filter_existing_actions_with_common_land_cover(
        &request.existing_actions,
        &merged_codes,
        &data.land_covers_for_existing_actions,
        &data.land_covers_for_parcel,
    )?;
    let shrunk = shrink_existing_actions_to_shared_land_cover(&filtered.actions);
    let stacked = create_action_stacks(&shrunk.actions, compatibility)?;
    let reduction = subtract_incompatible_stacks(
        &request.action_code,
        total_valid_land_cover_sqm,
        &stacked.stacks,
        compatibility,
    );

    let available_area_sqm = reduction.available_area_sqm;
    let available_area_hectares = sqm_to_ha(available_area_sqm);
    let mut result_lines = reduction.explanations;
    result_lines.push(format!("Available area in hectares: {available_area_hectares} ha"));

    tracing::info!(
        category = LOG_CATEGORY,
        action_code = %request.action_code,
        sheet_id = %request.sheet_id,
        parcel_id = %request.parcel_id,
        stacks = stacked.stacks.len(),
        available_area_sqm,
        "calculated available area"
    );

    Ok(AvailableAreaResult {
        stacks: stacked.stacks,
        explanations: vec![
            section("Application", initial_context(request)),
            section("Land cover totals", land_cover_total.explanations),
            section(
                &format!("Existing actions sharing land cover with {}", request.action_code),
                filtered.explanations,
            ),
            section("Existing action areas on shared land cover", shrunk.explanations),
            section("Stacks", stacked.explanations),
            section("Result", result_lines),
        ],
        available_area_sqm,
        total_valid_land_cover_sqm,
        available_area_hectares,
    })
}
