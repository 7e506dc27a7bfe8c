use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{ensure_valid_area, AreaError, LOG_CATEGORY};

/// A land-cover class and one of its member codes, as eligible for an action.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "camelCase")]
pub struct LandCoverCodes {
    pub land_cover_class_code: String,
    pub land_cover_code: String,
}

impl LandCoverCodes {
    #[must_use]
    pub fn new(land_cover_class_code: impl Into<String>, land_cover_code: impl Into<String>) -> Self {
        Self {
            land_cover_class_code: land_cover_class_code.into(),
            land_cover_code: land_cover_code.into(),
        }
    }
}

/// Area of one land-cover class on a parcel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParcelLandCover {
    pub land_cover_class_code: String,
    pub area_sqm: f64,
}

/// An action already agreed, or planned alongside the applied-for action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExistingAction {
    pub action_code: String,
    pub area_sqm: f64,
}

impl ExistingAction {
    #[must_use]
    pub fn new(action_code: impl Into<String>, area_sqm: f64) -> Self {
        Self { action_code: action_code.into(), area_sqm }
    }
}

/// An existing action kept because it shares land cover with the applied-for action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExistingActionWithLandCover {
    pub action_code: String,
    pub area_sqm: f64,
    pub shared_land_cover_codes: Vec<String>,
    pub shared_land_cover_sqm: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LandCoverTotal {
    pub total_valid_land_cover_sqm: f64,
    pub explanations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExistingActionFilter {
    pub actions: Vec<ExistingActionWithLandCover>,
    pub explanations: Vec<String>,
}

/// Flatten class codes and member codes into one ordered, deduplicated set.
#[must_use]
pub fn merge_land_cover_codes(codes: &[LandCoverCodes]) -> BTreeSet<String> {
    let mut merged = BTreeSet::new();
    for entry in codes {
        merged.insert(entry.land_cover_class_code.clone());
        merged.insert(entry.land_cover_code.clone());
    }
    merged
}

#[must_use]
pub fn describe_land_cover(code: &str, descriptions: &BTreeMap<String, String>) -> String {
    match descriptions.get(code) {
        Some(description) => format!("{code} - {description}"),
        None => code.to_string(),
    }
}

fn join_codes<'a, I>(codes: I) -> String
where
    I: IntoIterator<Item = &'a String>,
{
    let joined = codes.into_iter().map(String::as_str).collect::<Vec<_>>().join(", ");
    if joined.is_empty() {
        "none".to_string()
    } else {
        joined
    }
}

fn area_on_codes(parcel_land_covers: &[ParcelLandCover], codes: &BTreeSet<String>) -> f64 {
    parcel_land_covers
        .iter()
        .filter(|cover| codes.contains(&cover.land_cover_class_code))
        .map(|cover| cover.area_sqm)
        .sum()
}

/// Sum the parcel area whose land-cover class is eligible for the applied-for action.
///
/// # Errors
/// Returns [`AreaError::InvalidArea`] when a parcel land cover carries a negative
/// or non-finite area.
pub fn total_valid_land_cover(
    parcel_land_covers: &[ParcelLandCover],
    merged_codes: &BTreeSet<String>,
    descriptions: &BTreeMap<String, String>,
) -> Result<LandCoverTotal, AreaError> {
    let mut explanations =
        vec![format!("Eligible land cover codes: {}", join_codes(merged_codes))];
    let mut total = 0.0;

    if parcel_land_covers.is_empty() {
        explanations.push("Parcel has no land cover data".to_string());
    }

    for cover in parcel_land_covers {
        ensure_valid_area(&cover.land_cover_class_code, cover.area_sqm)?;
        let label = describe_land_cover(&cover.land_cover_class_code, descriptions);
        if merged_codes.contains(&cover.land_cover_class_code) {
            total += cover.area_sqm;
            explanations.push(format!("  {label}: {} sqm counted", cover.area_sqm));
        } else {
            explanations.push(format!("  {label}: {} sqm not eligible", cover.area_sqm));
        }
    }

    explanations.push(format!("Total valid land cover: {total} sqm"));
    Ok(LandCoverTotal { total_valid_land_cover_sqm: total, explanations })
}

/// Keep the existing actions that share at least one eligible land-cover code
/// with the applied-for action, recording the parcel area on that shared cover.
///
/// Actions without land-cover reference data share nothing and are dropped.
///
/// # Errors
/// Returns [`AreaError::InvalidArea`] when an existing action carries a negative
/// or non-finite area.
pub fn filter_existing_actions_with_common_land_cover(
    existing_actions: &[ExistingAction],
    applied_for_codes: &BTreeSet<String>,
    land_covers_for_existing_actions: &BTreeMap<String, Vec<LandCoverCodes>>,
    parcel_land_covers: &[ParcelLandCover],
) -> Result<ExistingActionFilter, AreaError> {
    let mut actions = Vec::new();
    let mut explanations = Vec::new();

    if existing_actions.is_empty() {
        explanations.push("No existing actions on this parcel".to_string());
    }

    for existing in existing_actions {
        ensure_valid_area(&existing.action_code, existing.area_sqm)?;
        let Some(codes) = land_covers_for_existing_actions.get(&existing.action_code) else {
            tracing::warn!(
                category = LOG_CATEGORY,
                action_code = %existing.action_code,
                "no land cover reference data for existing action"
            );
            explanations.push(format!(
                "  {}: no land cover data, ignored",
                existing.action_code
            ));
            continue;
        };

        let existing_codes = merge_land_cover_codes(codes);
        let shared = existing_codes.intersection(applied_for_codes).cloned().collect::<BTreeSet<_>>();
        if shared.is_empty() {
            explanations.push(format!(
                "  {} ({} sqm): no common land cover, ignored",
                existing.action_code, existing.area_sqm
            ));
            continue;
        }

        let shared_land_cover_sqm = area_on_codes(parcel_land_covers, &shared);
        explanations.push(format!(
            "  {} ({} sqm): shares land cover {} covering {shared_land_cover_sqm} sqm",
            existing.action_code,
            existing.area_sqm,
            join_codes(&shared)
        ));
        actions.push(ExistingActionWithLandCover {
            action_code: existing.action_code.clone(),
            area_sqm: existing.area_sqm,
            shared_land_cover_codes: shared.into_iter().collect(),
            shared_land_cover_sqm,
        });
    }

    Ok(ExistingActionFilter { actions, explanations })
}
