use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use available_area_core::{
    CompatibilityMatrix, CompatibilityRule, ExistingAction, LandCoverCodes, ParcelLandCover,
};
use serde::{Deserialize, Serialize};

/// Catalogue entry for one land-management action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActionDefinition {
    pub code: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub land_cover_codes: Vec<LandCoverCodes>,
}

fn default_enabled() -> bool {
    true
}

pub trait ActionRepository {
    /// # Errors
    /// Returns an error when `code` is not in the action catalogue.
    fn action(&self, code: &str) -> Result<ActionDefinition>;

    /// Enabled action codes in catalogue order.
    ///
    /// # Errors
    /// Returns an error when the catalogue cannot be read.
    fn enabled_action_codes(&self) -> Result<Vec<String>>;
}

pub trait LandCoverCodeRepository {
    /// Eligible land-cover codes keyed by action code. Codes with no
    /// reference data are absent from the map.
    ///
    /// # Errors
    /// Returns an error when the reference data cannot be read.
    fn land_cover_codes_for_actions(
        &self,
        codes: &[String],
    ) -> Result<BTreeMap<String, Vec<LandCoverCodes>>>;

    /// # Errors
    /// Returns an error when the reference data cannot be read.
    fn land_cover_descriptions(&self, codes: &BTreeSet<String>) -> Result<BTreeMap<String, String>>;
}

pub trait ParcelLandCoverRepository {
    /// # Errors
    /// Returns an error when the parcel is unknown.
    fn land_covers_for_parcel(&self, sheet_id: &str, parcel_id: &str) -> Result<Vec<ParcelLandCover>>;
}

pub trait AgreementsRepository {
    /// Actions already agreed on the parcel; a parcel with no agreement has none.
    ///
    /// # Errors
    /// Returns an error when the agreement data cannot be read.
    fn existing_actions_for_parcel(&self, sheet_id: &str, parcel_id: &str) -> Result<Vec<ExistingAction>>;
}

pub trait CompatibilityMatrixProvider {
    /// Snapshot holding every compatibility row that mentions one of `codes`.
    ///
    /// # Errors
    /// Returns an error when the compatibility table cannot be read.
    fn compatibility_matrix(&self, codes: &[String]) -> Result<CompatibilityMatrix>;
}

/// Everything a calculation reads from the outside world.
pub trait ReferenceDataSource:
    ActionRepository
    + LandCoverCodeRepository
    + ParcelLandCoverRepository
    + AgreementsRepository
    + CompatibilityMatrixProvider
{
}

impl<T> ReferenceDataSource for T where
    T: ActionRepository
        + LandCoverCodeRepository
        + ParcelLandCoverRepository
        + AgreementsRepository
        + CompatibilityMatrixProvider
{
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParcelRecord {
    pub sheet_id: String,
    pub parcel_id: String,
    #[serde(default)]
    pub land_covers: Vec<ParcelLandCover>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgreementRecord {
    pub sheet_id: String,
    pub parcel_id: String,
    #[serde(default)]
    pub actions: Vec<ExistingAction>,
}

/// On-disk layout of the reference-data document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceDocument {
    #[serde(default)]
    pub actions: Vec<ActionDefinition>,
    #[serde(default)]
    pub land_cover_descriptions: BTreeMap<String, String>,
    #[serde(default)]
    pub parcels: Vec<ParcelRecord>,
    #[serde(default)]
    pub agreements: Vec<AgreementRecord>,
    #[serde(default)]
    pub compatibility: Vec<CompatibilityRule>,
}

type ParcelKey = (String, String);

/// In-memory reference data indexed for lookup, read from a JSON document.
#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    actions: Vec<ActionDefinition>,
    action_index: BTreeMap<String, usize>,
    land_cover_descriptions: BTreeMap<String, String>,
    parcels: BTreeMap<ParcelKey, Vec<ParcelLandCover>>,
    agreements: BTreeMap<ParcelKey, Vec<ExistingAction>>,
    compatibility: Vec<CompatibilityRule>,
}

impl ReferenceData {
    /// Read and index the reference-data document at `path`.
    ///
    /// # Errors
    /// Returns an error when the file cannot be read or is not a valid document.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read reference data from {}", path.display()))?;
        Self::from_json_str(&raw)
            .with_context(|| format!("invalid reference data in {}", path.display()))
    }

    /// # Errors
    /// Returns an error when `raw` is not a valid reference-data document.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let document: ReferenceDocument =
            serde_json::from_str(raw).context("failed to parse reference data JSON")?;
        Self::from_document(document)
    }

    /// # Errors
    /// Returns an error when an action code or parcel appears twice.
    pub fn from_document(document: ReferenceDocument) -> Result<Self> {
        let mut action_index = BTreeMap::new();
        for (index, action) in document.actions.iter().enumerate() {
            if action_index.insert(action.code.clone(), index).is_some() {
                return Err(anyhow!("duplicate action code {} in reference data", action.code));
            }
        }

        let mut parcels = BTreeMap::new();
        for parcel in document.parcels {
            let key = (parcel.sheet_id, parcel.parcel_id);
            if parcels.contains_key(&key) {
                return Err(anyhow!("duplicate parcel {}-{} in reference data", key.0, key.1));
            }
            parcels.insert(key, parcel.land_covers);
        }

        let mut agreements: BTreeMap<ParcelKey, Vec<ExistingAction>> = BTreeMap::new();
        for agreement in document.agreements {
            agreements
                .entry((agreement.sheet_id, agreement.parcel_id))
                .or_default()
                .extend(agreement.actions);
        }

        Ok(Self {
            actions: document.actions,
            action_index,
            land_cover_descriptions: document.land_cover_descriptions,
            parcels,
            agreements,
            compatibility: document.compatibility,
        })
    }
}

fn parcel_key(sheet_id: &str, parcel_id: &str) -> ParcelKey {
    (sheet_id.to_string(), parcel_id.to_string())
}

impl ActionRepository for ReferenceData {
    fn action(&self, code: &str) -> Result<ActionDefinition> {
        self.action_index
            .get(code)
            .and_then(|index| self.actions.get(*index))
            .cloned()
            .ok_or_else(|| anyhow!("unknown action code {code}"))
    }

    fn enabled_action_codes(&self) -> Result<Vec<String>> {
        Ok(self
            .actions
            .iter()
            .filter(|action| action.enabled)
            .map(|action| action.code.clone())
            .collect())
    }
}

impl LandCoverCodeRepository for ReferenceData {
    fn land_cover_codes_for_actions(
        &self,
        codes: &[String],
    ) -> Result<BTreeMap<String, Vec<LandCoverCodes>>> {
        Ok(codes
            .iter()
            .filter_map(|code| {
                let index = self.action_index.get(code)?;
                let action = self.actions.get(*index)?;
                Some((code.clone(), action.land_cover_codes.clone()))
            })
            .collect())
    }

    fn land_cover_descriptions(&self, codes: &BTreeSet<String>) -> Result<BTreeMap<String, String>> {
        Ok(codes
            .iter()
            .filter_map(|code| {
                self.land_cover_descriptions
                    .get(code)
                    .map(|description| (code.clone(), description.clone()))
            })
            .collect())
    }
}

impl ParcelLandCoverRepository for ReferenceData {
    fn land_covers_for_parcel(&self, sheet_id: &str, parcel_id: &str) -> Result<Vec<ParcelLandCover>> {
        self.parcels
            .get(&parcel_key(sheet_id, parcel_id))
            .cloned()
            .ok_or_else(|| anyhow!("unknown parcel {sheet_id}-{parcel_id}"))
    }
}

impl AgreementsRepository for ReferenceData {
    fn existing_actions_for_parcel(&self, sheet_id: &str, parcel_id: &str) -> Result<Vec<ExistingAction>> {
        Ok(self.agreements.get(&parcel_key(sheet_id, parcel_id)).cloned().unwrap_or_default())
    }
}

impl CompatibilityMatrixProvider for ReferenceData {
    fn compatibility_matrix(&self, codes: &[String]) -> Result<CompatibilityMatrix> {
        let wanted = codes.iter().map(String::as_str).collect::<BTreeSet<_>>();
        let rows = self
            .compatibility
            .iter()
            .filter(|rule| {
                wanted.contains(rule.option_code.as_str())
                    || wanted.contains(rule.option_code_compat.as_str())
            })
            .cloned()
            .collect::<Vec<_>>();
        Ok(CompatibilityMatrix::from_rules(&rows))
    }
}
