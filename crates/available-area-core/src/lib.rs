//! Available-area allocation engine.
//!
//! Partitions the eligible land cover of a parcel into stacks of mutually
//! compatible actions and derives how much area is still free for a newly
//! applied-for action. Every step records human-readable explanations in the
//! order decisions were taken.

use serde::{Deserialize, Serialize};

mod available_area;
mod compatibility;
mod incompatible;
mod land_cover;
mod stacks;

pub use available_area::{
    calculate_available_area, AvailableAreaDataRequirements, AvailableAreaRequest,
    AvailableAreaResult,
};
pub use compatibility::{CompatibilityCheck, CompatibilityMatrix, CompatibilityRule};
pub use incompatible::{
    shrink_existing_actions_to_shared_land_cover, sqm_to_ha, subtract_incompatible_stacks,
    IncompatibleAreaReduction, ShrunkActions,
};
pub use land_cover::{
    describe_land_cover, filter_existing_actions_with_common_land_cover, merge_land_cover_codes,
    total_valid_land_cover, ExistingAction, ExistingActionFilter, ExistingActionWithLandCover,
    LandCoverCodes, LandCoverTotal, ParcelLandCover,
};
pub use stacks::{actions_from_json, create_action_stacks, StackResult, NO_EXISTING_ACTIONS};

/// Log category shared by every event the engine emits.
pub const LOG_CATEGORY: &str = "aac";

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum AreaError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid area {area} for {code}: area MUST be finite and >= 0")]
    InvalidArea { code: String, area: f64 },
}

/// Fail unless `area` is a finite, non-negative quantity.
///
/// # Errors
/// Returns [`AreaError::InvalidArea`] naming `code` when the area is negative,
/// NaN or infinite.
pub fn ensure_valid_area(code: &str, area: f64) -> Result<(), AreaError> {
    if area.is_finite() && area >= 0.0 {
        return Ok(());
    }
    Err(AreaError::InvalidArea { code: code.to_string(), area })
}

/// An action code with the area it occupies. The unit is whatever the caller
/// uses consistently; the orchestrator works in square metres.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionWithArea {
    pub code: String,
    pub area: f64,
}

impl ActionWithArea {
    #[must_use]
    pub fn new(code: impl Into<String>, area: f64) -> Self {
        Self { code: code.into(), area }
    }

    /// Check the action carries a code and a usable area.
    ///
    /// # Errors
    /// Returns [`AreaError::InvalidInput`] for a blank code, or
    /// [`AreaError::InvalidArea`] for a negative or non-finite area.
    pub fn validate(&self) -> Result<(), AreaError> {
        if self.code.trim().is_empty() {
            return Err(AreaError::InvalidInput("action code MUST be non-empty".to_string()));
        }
        ensure_valid_area(&self.code, self.area)
    }
}

/// One slice of parcel area shared by a combination of compatible actions.
///
/// `area` is the width of the slice, not the sum of its members' areas.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Stack {
    pub stack_number: u32,
    pub action_codes: Vec<String>,
    pub area: f64,
}

impl Stack {
    #[must_use]
    pub fn new(stack_number: u32, action_codes: Vec<String>, area: f64) -> Self {
        Self { stack_number, action_codes, area }
    }
}
