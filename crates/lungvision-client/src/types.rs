//! Request and response types for the Lung Vision API.
//!
//! These types mirror the server's API contract.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::transport::MultipartForm;

// ─────────────────────────────────────────────────────────────────────────────
// Choice enums
// ─────────────────────────────────────────────────────────────────────────────

/// Declares a closed set of wire codes with `as_str`, `Display` and `FromStr`.
macro_rules! choice_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $code:literal, $label:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[doc = $label]
                #[serde(rename = $code)]
                $variant,
            )+
        }

        impl $name {
            /// All variants, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Wire code sent to the server.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $code,)+
                }
            }

            /// Human-readable label.
            pub fn label(&self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($code => Ok($name::$variant),)+
                    other => Err(format!(
                        "unknown {} '{}' (expected one of: {})",
                        stringify!($name),
                        other,
                        [$($code),+].join(", ")
                    )),
                }
            }
        }
    };
}

choice_enum! {
    /// Account role.
    Role {
        Doctor => "doctor", "Doctor",
        Researcher => "researcher", "Researcher",
        Admin => "admin", "Admin",
    }
}

choice_enum! {
    /// Administrative approval state of an account.
    AccountStatus {
        Pending => "pending", "Pending Approval",
        Approved => "approved", "Approved",
        Rejected => "rejected", "Rejected",
    }
}

choice_enum! {
    /// Medical specialization of a doctor account.
    Specialization {
        Pulmonologist => "pulmonologist", "Pulmonologist",
        Radiologist => "radiologist", "Radiologist",
        Internist => "internist", "Internal Medicine",
        Emergency => "emergency", "Emergency Medicine",
        Family => "family", "Family Medicine",
        ThoracicSurgeon => "thoracic_surgeon", "Thoracic Surgeon",
        RespiratoryTherapist => "respiratory_therapist", "Respiratory Therapist",
        Other => "other", "Other",
    }
}

choice_enum! {
    /// Affiliation of a researcher account.
    AffiliationType {
        Student => "student", "Student (Undergraduate/Graduate)",
        PhdStudent => "phd_student", "PhD Student",
        Postdoc => "postdoc", "Postdoctoral Researcher",
        Faculty => "faculty", "Faculty Member",
        ResearchScientist => "research_scientist", "Research Scientist",
        PrincipalInvestigator => "principal_investigator", "Principal Investigator",
        IndustryResearcher => "industry_researcher", "Industry Researcher",
        Other => "other", "Other",
    }
}

choice_enum! {
    /// Declared purpose of a researcher account.
    PurposeOfUse {
        AcademicResearch => "academic_research", "Academic Research",
        ModelTesting => "model_testing", "Model Testing & Validation",
        AlgorithmDevelopment => "algorithm_development", "Algorithm Development",
        ClinicalTrial => "clinical_trial", "Clinical Trial Research",
        ThesisProject => "thesis_project", "Thesis/Dissertation Project",
        CollaborativeStudy => "collaborative_study", "Collaborative Study",
        EducationalPurpose => "educational_purpose", "Educational Purpose",
        Other => "other", "Other",
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Credentials
// ─────────────────────────────────────────────────────────────────────────────

/// Access/refresh token pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Short-lived bearer credential.
    pub access: String,
    /// Longer-lived credential exchanged for new access tokens.
    pub refresh: String,
}

impl Credentials {
    /// Create a pair.
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: access.into(),
            refresh: refresh.into(),
        }
    }

    /// Both halves are non-empty.
    pub fn is_complete(&self) -> bool {
        !self.access.is_empty() && !self.refresh.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access", &"<redacted>")
            .field("refresh", &"<redacted>")
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────────────────────────

/// Authenticated account as reported by login, registration or `user/me/`.
///
/// Login responses omit `id`; `user/me/` omits `account_status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_status: Option<AccountStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_joined: Option<String>,

    // Doctor profile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medical_license_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hospital_affiliation: Option<String>,

    // Researcher profile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub research_institution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affiliation_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose_of_use: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orcid_id: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Auth requests and responses
// ─────────────────────────────────────────────────────────────────────────────

/// Legacy registration body.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub full_name: String,
    pub email: String,
    pub password: String,
}

impl RegisterRequest {
    pub fn new(
        full_name: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            full_name: full_name.into(),
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Login body.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Successful login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access: String,
    pub refresh: String,
    pub user: User,
}

/// Plain `{detail}` acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailResponse {
    pub detail: String,
}

/// Result of a token refresh; `refresh` is present only when rotated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub access: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
}

/// Role-specific registration acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationResponse {
    pub detail: String,
    #[serde(default)]
    pub user: Option<User>,
    /// Issued only when the backend authenticates new accounts immediately.
    #[serde(default, skip_serializing)]
    pub tokens: Option<Credentials>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Uploads
// ─────────────────────────────────────────────────────────────────────────────

/// File contents ready for a multipart upload.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl UploadFile {
    /// Wrap in-memory contents.
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let file_name = file_name.into();
        let content_type = guess_content_type(&file_name).map(str::to_string);
        Self {
            file_name,
            content_type,
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Self::new(file_name, bytes))
    }

    /// Override the MIME type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Lower-cased extension of the file name, if any.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.file_name)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
    }
}

fn guess_content_type(file_name: &str) -> Option<&'static str> {
    let ext = Path::new(file_name).extension()?.to_string_lossy().to_lowercase();
    match ext.as_str() {
        "pdf" => Some("application/pdf"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "zip" => Some("application/zip"),
        _ => None,
    }
}

/// Doctor onboarding submission.
#[derive(Debug, Clone)]
pub struct DoctorRegistration {
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub country: String,
    pub terms_accepted: bool,
    pub phone_number: Option<String>,
    pub medical_license_number: String,
    pub specialization: Specialization,
    pub hospital_affiliation: String,
    pub medical_license_file: UploadFile,
}

impl DoctorRegistration {
    pub(crate) fn to_form(&self) -> MultipartForm {
        common_fields(
            &self.full_name,
            &self.email,
            &self.password,
            &self.confirm_password,
            &self.country,
            self.terms_accepted,
            self.phone_number.as_deref(),
        )
        .text("medical_license_number", &self.medical_license_number)
        .text("specialization", self.specialization.as_str())
        .text("hospital_affiliation", &self.hospital_affiliation)
        .file("medical_license_file", self.medical_license_file.clone())
    }
}

/// Researcher onboarding submission.
#[derive(Debug, Clone)]
pub struct ResearcherRegistration {
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub country: String,
    pub terms_accepted: bool,
    pub phone_number: Option<String>,
    pub research_institution: String,
    pub affiliation_type: AffiliationType,
    pub purpose_of_use: PurposeOfUse,
    pub orcid_id: Option<String>,
    pub institutional_id_file: UploadFile,
}

impl ResearcherRegistration {
    pub(crate) fn to_form(&self) -> MultipartForm {
        let form = common_fields(
            &self.full_name,
            &self.email,
            &self.password,
            &self.confirm_password,
            &self.country,
            self.terms_accepted,
            self.phone_number.as_deref(),
        )
        .text("research_institution", &self.research_institution)
        .text("affiliation_type", self.affiliation_type.as_str())
        .text("purpose_of_use", self.purpose_of_use.as_str());

        let form = match self.orcid_id.as_deref().filter(|id| !id.is_empty()) {
            Some(orcid) => form.text("orcid_id", orcid),
            None => form,
        };
        form.file("institutional_id_file", self.institutional_id_file.clone())
    }
}

fn common_fields(
    full_name: &str,
    email: &str,
    password: &str,
    confirm_password: &str,
    country: &str,
    terms_accepted: bool,
    phone_number: Option<&str>,
) -> MultipartForm {
    let form = MultipartForm::new()
        .text("full_name", full_name)
        .text("email", email)
        .text("password", password)
        .text("confirm_password", confirm_password)
        .text("country", country)
        .text("terms_accepted", if terms_accepted { "true" } else { "false" });

    match phone_number.filter(|p| !p.is_empty()) {
        Some(phone) => form.text("phone_number", phone),
        None => form,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Prediction
// ─────────────────────────────────────────────────────────────────────────────

/// Classification result for an uploaded study archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub success: bool,
    pub patient_id: String,
    pub predicted_class: String,
    pub predicted_class_index: i64,
    pub confidence: f64,
    #[serde(default)]
    pub class_probabilities: HashMap<String, f64>,
    /// Base64 image payloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction_visualization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attention_visualization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_focus_visualization: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_info: Option<serde_json::Value>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome category of the last user action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Success,
    Error,
}

/// Message shown to the user after an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageState {
    pub kind: MessageKind,
    pub text: String,
}

impl MessageState {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Success,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Error,
            text: text.into(),
        }
    }
}
