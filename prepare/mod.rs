//! # Clinical Data Preparation
//!
//! Everything between the raw patient files and the numeric feature matrix:
//! loading, cleaning, rule-based imputation, feature derivation, projection
//! onto the model's feature contract, and the seeded train/test split.
//!
//! Every step operates on [`table::ClinicalTable`], an ordered column store in
//! which a missing cell is `None`. Steps never reorder rows.

pub mod clean;
pub mod derive;
pub mod impute;
pub mod loader;
pub mod missing;
pub mod select;
pub mod split;
pub mod table;

/// Source column names as they appear in the raw clinical export.
pub mod columns {
    pub const PATIENT_ID: &str = "Patient ID";
    pub const SEX: &str = "Sex";
    pub const COHORT: &str = "Cohort";

    pub const AGE_AT_DIAGNOSIS: &str = "Age at Diagnosis";
    pub const TUMOR_SIZE: &str = "Tumor Size";
    pub const TUMOR_STAGE: &str = "Tumor Stage";
    pub const MUTATION_COUNT: &str = "Mutation Count";
    pub const LYMPH_NODES_POSITIVE: &str = "Lymph nodes examined positive";
    pub const NOTTINGHAM_INDEX: &str = "Nottingham prognostic index";
    pub const RELAPSE_FREE_MONTHS: &str = "Relapse Free Status (Months)";
    pub const AGGRESSIVE_TREATMENT_SCORE: &str = "Aggressive Treatment Score";

    pub const SURGERY_TYPE: &str = "Type of Breast Surgery";
    pub const CELLULARITY: &str = "Cellularity";
    pub const CHEMOTHERAPY: &str = "Chemotherapy";
    pub const HORMONE_THERAPY: &str = "Hormone Therapy";
    pub const RADIO_THERAPY: &str = "Radio Therapy";
    pub const HER2_STATUS: &str = "HER2 Status";
    pub const PR_STATUS: &str = "PR Status";
    pub const ER_STATUS: &str = "ER Status";

    pub const CANCER_TYPE_DETAILED: &str = "Cancer Type Detailed";
    pub const OVERALL_SURVIVAL_STATUS: &str = "Overall Survival Status";
}
