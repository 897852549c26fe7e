//! Client-side input checks run before any request is sent.
//!
//! Each check reports the first violated rule for a field. Failures are
//! collected into an [`AuthErrorKind::InvalidInput`] error whose payload has
//! the server's field-map shape, so callers render local and remote field
//! errors the same way.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::{AuthError, AuthErrorKind, AuthResult};
use crate::types::{DoctorRegistration, RegisterRequest, ResearcherRegistration, UploadFile};

/// Largest accepted supporting document.
pub const MAX_DOCUMENT_BYTES: usize = 5 * 1024 * 1024;

/// Largest accepted study archive.
pub const MAX_ARCHIVE_BYTES: usize = 1024 * 1024 * 1024;

/// Accepted supporting document extensions.
pub const DOCUMENT_EXTENSIONS: [&str; 4] = ["pdf", "jpg", "jpeg", "png"];

/// Special characters a registration password may (and must) contain.
const PASSWORD_SPECIALS: &str = "@$!%*?&";

static EMAIL_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+$").expect("valid email shape regex"));

static EMAIL_DOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid email regex")
});

static FULL_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z\s]+$").expect("valid full name regex"));

// ─────────────────────────────────────────────────────────────────────────────
// Field rules
// ─────────────────────────────────────────────────────────────────────────────

pub fn email_error(email: &str) -> Option<&'static str> {
    if email.is_empty() {
        return Some("Email is required");
    }
    if !EMAIL_SHAPE.is_match(email) {
        return Some("Please enter a valid email address");
    }
    let local = email.split('@').next().unwrap_or_default();
    if !local.is_empty() && local.chars().all(|c| c.is_ascii_digit()) {
        return Some("Email cannot contain only digits before @ symbol");
    }
    if !EMAIL_DOMAIN.is_match(email) {
        return Some("Please enter a valid email address with proper domain");
    }
    None
}

/// Registration password strength.
pub fn password_error(password: &str) -> Option<&'static str> {
    let len = password.chars().count();
    if len == 0 {
        return Some("Password is required");
    }
    if len < 8 {
        return Some("Password must be at least 8 characters");
    }
    if len > 32 {
        return Some("Password must not exceed 32 characters");
    }
    let allowed = password
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || PASSWORD_SPECIALS.contains(c));
    if !allowed || !password_requirements(password).iter().all(|r| r.met) {
        return Some(
            "Password must contain at least one uppercase letter, one lowercase letter, one number, and one special character (@$!%*?&)",
        );
    }
    None
}

/// Login only checks presence and minimum length.
pub fn login_password_error(password: &str) -> Option<&'static str> {
    match password.chars().count() {
        0 => Some("Password is required"),
        1..8 => Some("Password must be at least 8 characters"),
        _ => None,
    }
}

pub fn full_name_error(full_name: &str) -> Option<&'static str> {
    let len = full_name.chars().count();
    if len == 0 {
        return Some("Full name is required");
    }
    if len < 2 {
        return Some("Full name must be at least 2 characters");
    }
    if len > 50 {
        return Some("Full name must be less than 50 characters");
    }
    if !FULL_NAME.is_match(full_name) {
        return Some("Full name can only contain letters and spaces");
    }
    if full_name.trim().chars().count() < 2 {
        return Some("Full name must contain at least 2 characters excluding spaces");
    }
    None
}

/// Supporting document for doctor/researcher onboarding.
pub fn document_error(file: &UploadFile) -> Option<&'static str> {
    if file.is_empty() {
        return Some("Supporting document is required");
    }
    let accepted = file
        .extension()
        .is_some_and(|ext| DOCUMENT_EXTENSIONS.contains(&ext.as_str()));
    if !accepted {
        return Some("Please upload a PDF, JPG, JPEG, or PNG file");
    }
    if file.len() > MAX_DOCUMENT_BYTES {
        return Some("File size must be less than 5MB");
    }
    None
}

/// Study archive for prediction.
pub fn archive_error(file: &UploadFile) -> Option<&'static str> {
    let is_zip = file.file_name.to_lowercase().ends_with(".zip")
        || file
            .content_type
            .as_deref()
            .is_some_and(|ct| ct.contains("zip"));
    if !is_zip {
        return Some("Please upload a .zip file containing DICOMs.");
    }
    if file.len() > MAX_ARCHIVE_BYTES {
        return Some("ZIP is too large. Please keep it under 1 GB.");
    }
    None
}

fn required(value: &str, message: &'static str) -> Option<&'static str> {
    value.trim().is_empty().then_some(message)
}

// ─────────────────────────────────────────────────────────────────────────────
// Password requirements
// ─────────────────────────────────────────────────────────────────────────────

/// One line of the password checklist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordRequirement {
    pub id: &'static str,
    pub label: &'static str,
    pub met: bool,
}

/// Evaluate each password rule independently, for live feedback.
pub fn password_requirements(password: &str) -> Vec<PasswordRequirement> {
    let len = password.chars().count();
    let rules: [(&'static str, &'static str, bool); 5] = [
        ("length", "8-32 characters long", (8..=32).contains(&len)),
        (
            "lowercase",
            "At least one lowercase letter",
            password.chars().any(|c| c.is_ascii_lowercase()),
        ),
        (
            "uppercase",
            "At least one uppercase letter",
            password.chars().any(|c| c.is_ascii_uppercase()),
        ),
        (
            "number",
            "At least one number",
            password.chars().any(|c| c.is_ascii_digit()),
        ),
        (
            "special",
            "At least one special character (@$!%*?&)",
            password.chars().any(|c| PASSWORD_SPECIALS.contains(c)),
        ),
    ];
    rules
        .into_iter()
        .map(|(id, label, met)| PasswordRequirement { id, label, met })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Form checks
// ─────────────────────────────────────────────────────────────────────────────

/// Accumulates the first failure per field.
#[derive(Debug, Default)]
struct FieldErrors {
    errors: Vec<(&'static str, &'static str)>,
}

impl FieldErrors {
    fn check(&mut self, field: &'static str, error: Option<&'static str>) -> &mut Self {
        if let Some(message) = error {
            self.errors.push((field, message));
        }
        self
    }

    fn finish(&self) -> AuthResult<()> {
        if self.errors.is_empty() {
            return Ok(());
        }
        let message = self
            .errors
            .iter()
            .map(|(_, m)| *m)
            .collect::<Vec<_>>()
            .join(", ");
        let payload: Map<String, Value> = self
            .errors
            .iter()
            .map(|(field, m)| (field.to_string(), Value::Array(vec![Value::from(*m)])))
            .collect();

        let mut error = AuthError::new(AuthErrorKind::InvalidInput, message);
        error.payload = Some(Value::Object(payload));
        Err(error)
    }
}

pub fn validate_login(email: &str, password: &str) -> AuthResult<()> {
    FieldErrors::default()
        .check("email", email_error(email))
        .check("password", login_password_error(password))
        .finish()
}

pub fn validate_registration(request: &RegisterRequest) -> AuthResult<()> {
    FieldErrors::default()
        .check("full_name", full_name_error(&request.full_name))
        .check("email", email_error(&request.email))
        .check("password", password_error(&request.password))
        .finish()
}

pub fn validate_doctor_registration(registration: &DoctorRegistration) -> AuthResult<()> {
    let mut errors = FieldErrors::default();
    account_fields(
        &mut errors,
        &registration.full_name,
        &registration.email,
        &registration.password,
        &registration.confirm_password,
        &registration.country,
        registration.terms_accepted,
    );
    errors
        .check(
            "medical_license_number",
            required(
                &registration.medical_license_number,
                "Medical license number is required",
            ),
        )
        .check(
            "hospital_affiliation",
            required(
                &registration.hospital_affiliation,
                "Hospital affiliation is required",
            ),
        )
        .check(
            "medical_license_file",
            document_error(&registration.medical_license_file),
        )
        .finish()
}

pub fn validate_researcher_registration(registration: &ResearcherRegistration) -> AuthResult<()> {
    let mut errors = FieldErrors::default();
    account_fields(
        &mut errors,
        &registration.full_name,
        &registration.email,
        &registration.password,
        &registration.confirm_password,
        &registration.country,
        registration.terms_accepted,
    );
    errors
        .check(
            "research_institution",
            required(
                &registration.research_institution,
                "Research institution is required",
            ),
        )
        .check(
            "institutional_id_file",
            document_error(&registration.institutional_id_file),
        )
        .finish()
}

fn account_fields(
    errors: &mut FieldErrors,
    full_name: &str,
    email: &str,
    password: &str,
    confirm_password: &str,
    country: &str,
    terms_accepted: bool,
) {
    errors
        .check("full_name", full_name_error(full_name))
        .check("email", email_error(email))
        .check("password", password_error(password))
        .check(
            "confirm_password",
            (password != confirm_password).then_some("Passwords do not match"),
        )
        .check("country", required(country, "Country is required"))
        .check(
            "terms_accepted",
            (!terms_accepted).then_some("You must accept the terms and conditions"),
        );
}

pub fn validate_archive(file: &UploadFile) -> AuthResult<()> {
    FieldErrors::default()
        .check("file", archive_error(file))
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Specialization;

    fn doctor() -> DoctorRegistration {
        DoctorRegistration {
            full_name: "Dana Doc".into(),
            email: "dana@example.com".into(),
            password: "Abc12345!".into(),
            confirm_password: "Abc12345!".into(),
            country: "Kenya".into(),
            terms_accepted: true,
            phone_number: None,
            medical_license_number: "ML-1".into(),
            specialization: Specialization::Radiologist,
            hospital_affiliation: "General".into(),
            medical_license_file: UploadFile::new("license.pdf", vec![1u8; 16]),
        }
    }

    #[test]
    fn test_email_rules() {
        assert_eq!(email_error(""), Some("Email is required"));
        assert_eq!(email_error("nope"), Some("Please enter a valid email address"));
        assert_eq!(
            email_error("12345@example.com"),
            Some("Email cannot contain only digits before @ symbol")
        );
        assert_eq!(
            email_error("user@localhost"),
            Some("Please enter a valid email address with proper domain")
        );
        assert_eq!(email_error("user.name+tag@example.co"), None);
    }

    #[test]
    fn test_password_rules() {
        assert_eq!(password_error(""), Some("Password is required"));
        assert_eq!(
            password_error("Ab1!"),
            Some("Password must be at least 8 characters")
        );
        assert_eq!(
            password_error(&"Ab1!".repeat(9)),
            Some("Password must not exceed 32 characters")
        );
        assert!(password_error("abcdefgh").is_some());
        assert!(password_error("Abc12345#").is_some());
        assert_eq!(password_error("Abc12345!"), None);

        assert_eq!(login_password_error("short"), Some("Password must be at least 8 characters"));
        assert_eq!(login_password_error("anything-long"), None);
    }

    #[test]
    fn test_password_requirements_checklist() {
        let reqs = password_requirements("abc");
        let met: Vec<_> = reqs.iter().filter(|r| r.met).map(|r| r.id).collect();
        assert_eq!(met, vec!["lowercase"]);
        assert_eq!(reqs.len(), 5);
        assert!(password_requirements("Abc12345!").iter().all(|r| r.met));
    }

    #[test]
    fn test_full_name_rules() {
        assert_eq!(full_name_error(""), Some("Full name is required"));
        assert_eq!(full_name_error("A"), Some("Full name must be at least 2 characters"));
        assert_eq!(
            full_name_error("Dr. Who"),
            Some("Full name can only contain letters and spaces")
        );
        assert_eq!(
            full_name_error(" a "),
            Some("Full name must contain at least 2 characters excluding spaces")
        );
        assert_eq!(full_name_error("Dana Doc"), None);
    }

    #[test]
    fn test_login_collects_field_errors() {
        let err = validate_login("", "short").unwrap_err();
        assert_eq!(err.kind, AuthErrorKind::InvalidInput);
        assert_eq!(
            err.message,
            "Email is required, Password must be at least 8 characters"
        );
        let mut fields = err.field_errors();
        fields.sort();
        assert_eq!(fields[0].0, "email");
        assert_eq!(fields[1].0, "password");

        validate_login("user@example.com", "Abc12345!").unwrap();
    }

    #[test]
    fn test_registration() {
        let ok = RegisterRequest::new("Dana Doc", "dana@example.com", "Abc12345!");
        validate_registration(&ok).unwrap();

        let bad = RegisterRequest::new("Dana Doc", "dana@example.com", "password");
        let err = validate_registration(&bad).unwrap_err();
        assert_eq!(err.field_errors()[0].0, "password");
    }

    #[test]
    fn test_doctor_registration() {
        validate_doctor_registration(&doctor()).unwrap();

        let mut reg = doctor();
        reg.confirm_password = "Different1!".into();
        reg.terms_accepted = false;
        reg.medical_license_file = UploadFile::new("license.exe", vec![1u8]);
        let err = validate_doctor_registration(&reg).unwrap_err();
        let mut fields: Vec<_> = err.field_errors().into_iter().map(|(f, _)| f).collect();
        fields.sort();
        assert_eq!(
            fields,
            vec!["confirm_password", "medical_license_file", "terms_accepted"]
        );
    }

    #[test]
    fn test_document_limits() {
        let big = UploadFile::new("scan.png", vec![0u8; MAX_DOCUMENT_BYTES + 1]);
        assert_eq!(document_error(&big), Some("File size must be less than 5MB"));
        let upper = UploadFile::new("SCAN.JPEG", vec![0u8; 8]);
        assert_eq!(document_error(&upper), None);
        let empty = UploadFile::new("scan.pdf", Vec::new());
        assert_eq!(document_error(&empty), Some("Supporting document is required"));
    }

    #[test]
    fn test_archive_type() {
        let zip = UploadFile::new("study.ZIP", vec![0u8; 4]);
        validate_archive(&zip).unwrap();

        let by_mime = UploadFile::new("study", vec![0u8; 4])
            .with_content_type("application/x-zip-compressed");
        validate_archive(&by_mime).unwrap();

        let err = validate_archive(&UploadFile::new("study.tar", vec![0u8; 4])).unwrap_err();
        assert_eq!(err.message, "Please upload a .zip file containing DICOMs.");
    }
}
