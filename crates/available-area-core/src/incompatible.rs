use serde::{Deserialize, Serialize};

use crate::{ActionWithArea, CompatibilityCheck, ExistingActionWithLandCover, Stack};

const SQM_PER_HECTARE: f64 = 10_000.0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShrunkActions {
    pub actions: Vec<ActionWithArea>,
    pub explanations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IncompatibleAreaReduction {
    pub incompatible_stack_numbers: Vec<u32>,
    pub incompatible_area_sqm: f64,
    pub available_area_sqm: f64,
    pub explanations: Vec<String>,
}

/// Limit each existing action to the area of land cover it shares with the
/// applied-for action; its claimed area can be larger than that cover.
#[must_use]
pub fn shrink_existing_actions_to_shared_land_cover(
    existing: &[ExistingActionWithLandCover],
) -> ShrunkActions {
    let mut actions = Vec::with_capacity(existing.len());
    let mut explanations = Vec::new();

    if existing.is_empty() {
        explanations.push("No existing actions share land cover".to_string());
    }

    for action in existing {
        let area = action.area_sqm.min(action.shared_land_cover_sqm);
        if area < action.area_sqm {
            explanations.push(format!(
                "  {}: {} sqm claimed, {area} sqm on shared land cover",
                action.action_code, action.area_sqm
            ));
        } else {
            explanations.push(format!("  {}: {area} sqm", action.action_code));
        }
        actions.push(ActionWithArea::new(action.action_code.clone(), area));
    }

    ShrunkActions { actions, explanations }
}

/// Remove the area of every stack holding at least one action incompatible
/// with `action_code` from `total_valid_land_cover_sqm`, flooring at zero.
#[must_use]
pub fn subtract_incompatible_stacks<C>(
    action_code: &str,
    total_valid_land_cover_sqm: f64,
    stacks: &[Stack],
    compatibility: &C,
) -> IncompatibleAreaReduction
where
    C: CompatibilityCheck + ?Sized,
{
    let mut incompatible_stack_numbers = Vec::new();
    let mut incompatible_area_sqm = 0.0;
    let mut explanations = Vec::new();

    for stack in stacks {
        let incompatible = stack
            .action_codes
            .iter()
            .filter(|code| !compatibility.is_compatible(action_code, code))
            .map(String::as_str)
            .collect::<Vec<_>>();

        if incompatible.is_empty() {
            explanations.push(format!(
                "  Stack {} ({} sqm, {}): compatible with {action_code}",
                stack.stack_number,
                stack.area,
                stack.action_codes.join(", ")
            ));
            continue;
        }

        incompatible_stack_numbers.push(stack.stack_number);
        incompatible_area_sqm += stack.area;
        explanations.push(format!(
            "  Stack {} ({} sqm, {}): {action_code} is not compatible with {}, area removed",
            stack.stack_number,
            stack.area,
            stack.action_codes.join(", "),
            incompatible.join(", ")
        ));
    }

    let available_area_sqm = (total_valid_land_cover_sqm - incompatible_area_sqm).max(0.0);
    explanations.push(format!("Total valid land cover: {total_valid_land_cover_sqm} sqm"));
    explanations.push(format!("Area of incompatible stacks: {incompatible_area_sqm} sqm"));
    explanations.push(format!("Available area: {available_area_sqm} sqm"));

    IncompatibleAreaReduction {
        incompatible_stack_numbers,
        incompatible_area_sqm,
        available_area_sqm,
        explanations,
    }
}

/// Convert square metres to hectares rounded to two decimal places.
#[must_use]
pub fn sqm_to_ha(sqm: f64) -> f64 {
    (sqm / SQM_PER_HECTARE * 100.0).round() / 100.0
}
