use std::collections::BTreeSet;

use anyhow::{Context, Result};
use available_area_core::{
    calculate_available_area, merge_land_cover_codes, AvailableAreaDataRequirements,
    AvailableAreaRequest, AvailableAreaResult, ExistingAction, Stack, LOG_CATEGORY,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub mod repository;

pub use repository::{
    ActionDefinition, ActionRepository, AgreementsRepository, CompatibilityMatrixProvider,
    LandCoverCodeRepository, ParcelLandCoverRepository, ReferenceData, ReferenceDataSource,
    ReferenceDocument,
};

pub const API_CONTRACT_VERSION: &str = "api.v1";
pub const AREA_UNIT: &str = "ha";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AvailableAreaQuery {
    pub action_code: String,
    pub sheet_id: String,
    pub parcel_id: String,
    /// Actions applied for alongside this one, on top of existing agreements.
    #[serde(default)]
    pub planned_actions: Vec<ExistingAction>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParcelAvailabilityQuery {
    pub sheet_id: String,
    pub parcel_id: String,
    /// Actions to evaluate; empty means every enabled action.
    #[serde(default)]
    pub action_codes: Vec<String>,
    #[serde(default)]
    pub planned_actions: Vec<ExistingAction>,
    #[serde(default)]
    pub with_results: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AreaValue {
    pub unit: String,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActionResults {
    pub total_valid_land_cover_sqm: f64,
    pub stacks: Vec<Stack>,
    pub explanations: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActionAvailability {
    pub code: String,
    pub available_area: AreaValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<ActionResults>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParcelAvailability {
    pub api_contract_version: String,
    pub calculation_id: String,
    pub sheet_id: String,
    pub parcel_id: String,
    pub actions: Vec<ActionAvailability>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AreaCheck {
    pub passed: bool,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct AvailableAreaApi<R> {
    reference_data: R,
}

impl<R> AvailableAreaApi<R>
where
    R: ReferenceDataSource,
{
    #[must_use]
    pub fn new(reference_data: R) -> Self {
        Self { reference_data }
    }

    /// Fetch the reference data one calculation needs.
    ///
    /// # Errors
    /// Returns an error when the action or parcel is unknown, or a repository fails.
    pub fn data_requirements(
        &self,
        action_code: &str,
        sheet_id: &str,
        parcel_id: &str,
        existing_actions: &[ExistingAction],
    ) -> Result<AvailableAreaDataRequirements> {
        let action = self.reference_data.action(action_code)?;
        let land_covers_for_parcel =
            self.reference_data.land_covers_for_parcel(sheet_id, parcel_id)?;

        let existing_codes = existing_actions
            .iter()
            .map(|existing| existing.action_code.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();
        let land_covers_for_existing_actions =
            self.reference_data.land_cover_codes_for_actions(&existing_codes)?;

        let mut described = merge_land_cover_codes(&action.land_cover_codes);
        described.extend(land_covers_for_parcel.iter().map(|cover| cover.land_cover_class_code.clone()));
        let land_cover_to_string = self.reference_data.land_cover_descriptions(&described)?;

        Ok(AvailableAreaDataRequirements {
            land_cover_codes_for_applied_for_action: action.land_cover_codes,
            land_covers_for_parcel,
            land_covers_for_existing_actions,
            land_cover_to_string,
        })
    }

    /// Run one available-area calculation for `query.action_code`.
    ///
    /// # Errors
    /// Returns an error when reference data is missing for the action or
    /// parcel, a repository fails, or the inputs are invalid.
    pub fn calculate_for_action(&self, query: AvailableAreaQuery) -> Result<AvailableAreaResult> {
        let mut existing_actions =
            self.reference_data.existing_actions_for_parcel(&query.sheet_id, &query.parcel_id)?;
        existing_actions.extend(query.planned_actions);

        let data = self.data_requirements(
            &query.action_code,
            &query.sheet_id,
            &query.parcel_id,
            &existing_actions,
        )?;

        let mut codes = existing_actions
            .iter()
            .map(|existing| existing.action_code.clone())
            .collect::<Vec<_>>();
        codes.push(query.action_code.clone());
        let matrix = self.reference_data.compatibility_matrix(&codes)?;
        let unknown = matrix.unknown_codes(codes.iter().map(String::as_str));
        if !unknown.is_empty() {
            tracing::warn!(
                category = LOG_CATEGORY,
                action_code = %query.action_code,
                unknown = ?unknown,
                "codes missing from compatibility table are treated as incompatible"
            );
        }

        let request = AvailableAreaRequest {
            action_code: query.action_code,
            sheet_id: query.sheet_id,
            parcel_id: query.parcel_id,
            existing_actions,
        };
        calculate_available_area(&request, &matrix, &data).with_context(|| {
            format!(
                "available area calculation failed for {} on {}-{}",
                request.action_code, request.sheet_id, request.parcel_id
            )
        })
    }

    /// Report the available area of each requested enabled action on one parcel.
    ///
    /// # Errors
    /// Returns an error when any single action calculation fails.
    pub fn calculate_for_parcel(&self, query: ParcelAvailabilityQuery) -> Result<ParcelAvailability> {
        let requested = if query.action_codes.is_empty() {
            self.reference_data.enabled_action_codes()?
        } else {
            query.action_codes.clone()
        };

        let mut actions = Vec::with_capacity(requested.len());
        for code in &requested {
            if !self.reference_data.action(code)?.enabled {
                tracing::warn!(category = LOG_CATEGORY, action_code = %code, "skipping disabled action");
                continue;
            }

            let result = self.calculate_for_action(AvailableAreaQuery {
                action_code: code.clone(),
                sheet_id: query.sheet_id.clone(),
                parcel_id: query.parcel_id.clone(),
                planned_actions: query.planned_actions.clone(),
            })?;
            actions.push(to_action_availability(code, result, query.with_results));
        }

        let calculation_id = compute_calculation_id(
            &query.sheet_id,
            &query.parcel_id,
            &requested,
            &query.planned_actions,
        );
        tracing::info!(
            category = LOG_CATEGORY,
            sheet_id = %query.sheet_id,
            parcel_id = %query.parcel_id,
            calculation_id = %calculation_id,
            actions = actions.len(),
            "calculated parcel availability"
        );

        Ok(ParcelAvailability {
            api_contract_version: API_CONTRACT_VERSION.to_string(),
            calculation_id,
            sheet_id: query.sheet_id,
            parcel_id: query.parcel_id,
            actions,
        })
    }
}

/// Map an engine result into the public hectare-based shape.
#[must_use]
pub fn to_action_availability(
    code: &str,
    result: AvailableAreaResult,
    with_results: bool,
) -> ActionAvailability {
    ActionAvailability {
        code: code.to_string(),
        available_area: AreaValue {
            unit: AREA_UNIT.to_string(),
            value: result.available_area_hectares,
        },
        results: with_results.then(|| ActionResults {
            total_valid_land_cover_sqm: result.total_valid_land_cover_sqm,
            stacks: result.stacks,
            explanations: result.explanations,
        }),
    }
}

/// Check an applied-for area against the calculated available area.
#[must_use]
pub fn check_applied_for_area(area_applied_for_ha: f64, result: &AvailableAreaResult) -> AreaCheck {
    let available = result.available_area_hectares;
    if !area_applied_for_ha.is_finite() || area_applied_for_ha <= 0.0 {
        return AreaCheck {
            passed: false,
            reason: format!("Applied-for area {area_applied_for_ha} ha is not a valid area"),
        };
    }

    if area_applied_for_ha <= available {
        AreaCheck {
            passed: true,
            reason: format!("Applied-for area {area_applied_for_ha} ha is within the available area of {available} ha"),
        }
    } else {
        AreaCheck {
            passed: false,
            reason: format!("Applied-for area {area_applied_for_ha} ha exceeds the available area of {available} ha"),
        }
    }
}

fn compute_calculation_id(
    sheet_id: &str,
    parcel_id: &str,
    action_codes: &[String],
    planned_actions: &[ExistingAction],
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sheet_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(parcel_id.as_bytes());

    let mut codes = action_codes.to_vec();
    codes.sort_unstable();
    for code in codes {
        hasher.update(b"\0");
        hasher.update(code.as_bytes());
    }

    let mut planned = planned_actions
        .iter()
        .map(|planned| format!("{}={}", planned.action_code, planned.area_sqm))
        .collect::<Vec<_>>();
    planned.sort_unstable();
    for entry in planned {
        hasher.update(b"\0");
        hasher.update(entry.as_bytes());
    }

    let digest = hasher.finalize();
    let digest_hex = format!("{digest:x}");
    format!("aac_{}", &digest_hex[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api() -> AvailableAreaApi<ReferenceData> {
        let raw = serde_json::json!({
            "actions": [
                {
                    "code": "CMOR1",
                    "landCoverCodes": [
                        { "landCoverClassCode": "130", "landCoverCode": "131" },
                        { "landCoverClassCode": "110", "landCoverCode": "111" }
                    ]
                },
                { "code": "UPL1", "landCoverCodes": [{ "landCoverClassCode": "130", "landCoverCode": "131" }] },
                { "code": "SW1", "landCoverCodes": [{ "landCoverClassCode": "110", "landCoverCode": "118" }] },
                { "code": "WOOD1", "landCoverCodes": [{ "landCoverClassCode": "250", "landCoverCode": "251" }] },
                { "code": "OLD1", "enabled": false }
            ],
            "landCoverDescriptions": { "110": "Arable land", "130": "Permanent grassland" },
            "parcels": [
                {
                    "sheetId": "SX0679",
                    "parcelId": "9238",
                    "landCovers": [
                        { "landCoverClassCode": "130", "areaSqm": 20000.0 },
                        { "landCoverClassCode": "110", "areaSqm": 5000.0 },
                        { "landCoverClassCode": "250", "areaSqm": 3000.0 }
                    ]
                }
            ],
            "agreements": [
                {
                    "sheetId": "SX0679",
                    "parcelId": "9238",
                    "actions": [
                        { "actionCode": "UPL1", "areaSqm": 8000.0 },
                        { "actionCode": "WOOD1", "areaSqm": 2000.0 }
                    ]
                }
            ],
            "compatibility": [{ "optionCode": "CMOR1", "optionCodeCompat": "SW1" }]
        })
        .to_string();

        match ReferenceData::from_json_str(&raw) {
            Ok(data) => AvailableAreaApi::new(data),
            Err(err) => panic!("reference data should load: {err:#}"),
        }
    }

    fn parcel_query(action_codes: &[&str], with_results: bool) -> ParcelAvailabilityQuery {
        ParcelAvailabilityQuery {
            sheet_id: "SX0679".to_string(),
            parcel_id: "9238".to_string(),
            action_codes: action_codes.iter().map(ToString::to_string).collect(),
            planned_actions: Vec::new(),
            with_results,
        }
    }

    fn action_query(action_code: &str, planned_actions: Vec<ExistingAction>) -> AvailableAreaQuery {
        AvailableAreaQuery {
            action_code: action_code.to_string(),
            sheet_id: "SX0679".to_string(),
            parcel_id: "9238".to_string(),
            planned_actions,
        }
    }

    #[test]
    fn agreement_actions_reduce_available_area() -> Result<()> {
        let result = api().calculate_for_action(action_query("CMOR1", Vec::new()))?;

        assert_eq!(result.stacks, vec![Stack::new(1, vec!["UPL1".to_string()], 8_000.0)]);
        assert!((result.total_valid_land_cover_sqm - 25_000.0).abs() < f64::EPSILON);
        assert!((result.available_area_sqm - 17_000.0).abs() < f64::EPSILON);
        Ok(())
    }

    #[test]
    fn compatible_planned_action_leaves_area_unchanged() -> Result<()> {
        let result =
            api().calculate_for_action(action_query("CMOR1", vec![ExistingAction::new("SW1", 1_000.0)]))?;

        assert_eq!(result.stacks.len(), 2);
        assert!((result.available_area_sqm - 17_000.0).abs() < f64::EPSILON);
        Ok(())
    }

    #[test]
    fn unknown_action_and_parcel_fail_the_request() {
        assert!(api().calculate_for_action(action_query("NOPE1", Vec::new())).is_err());

        let mut query = action_query("CMOR1", Vec::new());
        query.parcel_id = "0000".to_string();
        match api().calculate_for_action(query) {
            Ok(_) => panic!("unknown parcel should fail"),
            Err(err) => assert!(format!("{err:#}").contains("unknown parcel SX0679-0000")),
        }
    }

    #[test]
    fn parcel_availability_covers_enabled_actions_in_catalogue_order() -> Result<()> {
        let availability = api().calculate_for_parcel(parcel_query(&[], false))?;

        let summary = availability
            .actions
            .iter()
            .map(|action| (action.code.as_str(), action.available_area.value))
            .collect::<Vec<_>>();
        assert_eq!(summary, vec![("CMOR1", 1.7), ("UPL1", 1.2), ("SW1", 0.5), ("WOOD1", 0.1)]);
        assert!(availability.actions.iter().all(|action| action.available_area.unit == AREA_UNIT));
        assert!(availability.actions.iter().all(|action| action.results.is_none()));
        Ok(())
    }

    #[test]
    fn disabled_actions_are_skipped() -> Result<()> {
        let availability = api().calculate_for_parcel(parcel_query(&["OLD1", "SW1"], false))?;
        assert_eq!(availability.actions.len(), 1);
        assert_eq!(availability.actions[0].code, "SW1");
        Ok(())
    }

    #[test]
    fn results_are_attached_on_request() -> Result<()> {
        let availability = api().calculate_for_parcel(parcel_query(&["CMOR1"], true))?;
        let results = match &availability.actions[0].results {
            Some(results) => results,
            None => panic!("results should be attached"),
        };
        assert!((results.total_valid_land_cover_sqm - 25_000.0).abs() < f64::EPSILON);
        assert_eq!(results.explanations.len(), 6);

        assert_eq!(availability.api_contract_version, API_CONTRACT_VERSION);

        let value = serde_json::to_value(&availability)?;
        assert_eq!(value["apiContractVersion"], "api.v1");
        assert_eq!(value["actions"][0]["availableArea"]["unit"], "ha");
        assert!(value["actions"][0]["results"]["totalValidLandCoverSqm"].is_number());
        Ok(())
    }

    #[test]
    fn calculation_id_is_deterministic() -> Result<()> {
        let first = api().calculate_for_parcel(parcel_query(&["UPL1", "CMOR1"], false))?;
        let second = api().calculate_for_parcel(parcel_query(&["CMOR1", "UPL1"], true))?;
        let other = api().calculate_for_parcel(parcel_query(&["CMOR1"], false))?;

        assert!(first.calculation_id.starts_with("aac_"));
        assert_eq!(first.calculation_id.len(), 20);
        assert_eq!(first.calculation_id, second.calculation_id);
        assert_ne!(first.calculation_id, other.calculation_id);
        Ok(())
    }

    #[test]
    fn calculation_id_ignores_planned_action_order() -> Result<()> {
        let mut forward = parcel_query(&["CMOR1"], false);
        forward.planned_actions = vec![ExistingAction::new("SW1", 1_000.0), ExistingAction::new("UPL1", 500.0)];
        let mut reversed = forward.clone();
        reversed.planned_actions.reverse();
        let mut resized = forward.clone();
        resized.planned_actions[0].area_sqm = 1_500.0;

        let forward = api().calculate_for_parcel(forward)?;
        let reversed = api().calculate_for_parcel(reversed)?;
        let resized = api().calculate_for_parcel(resized)?;

        assert_eq!(forward.calculation_id, reversed.calculation_id);
        assert_ne!(forward.calculation_id, resized.calculation_id);
        Ok(())
    }

    #[test]
    fn applied_for_area_is_checked_against_available_hectares() -> Result<()> {
        let result = api().calculate_for_action(action_query("CMOR1", Vec::new()))?;

        assert!(check_applied_for_area(1.7, &result).passed);
        assert!(check_applied_for_area(0.5, &result).passed);

        let exceeded = check_applied_for_area(2.0, &result);
        assert!(!exceeded.passed);
        assert_eq!(exceeded.reason, "Applied-for area 2 ha exceeds the available area of 1.7 ha");

        assert!(!check_applied_for_area(-1.0, &result).passed);
        assert!(!check_applied_for_area(f64::NAN, &result).passed);
        Ok(())
    }
}
