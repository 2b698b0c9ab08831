//! Registration and credential input checks.
//!
//! Checks run in form order and stop at the first failure, whose message is
//! suitable to show the user as-is.

use crate::session::Profile;

pub const MIN_PASSWORD_LEN: usize = 6;
pub const STUDENT_ID_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Please enter your first name.")]
    MissingFirstName,
    #[error("Please enter your last name.")]
    MissingLastName,
    #[error("Please enter your student ID.")]
    MissingStudentId,
    #[error("Please enter your email address.")]
    MissingEmail,
    #[error("Please enter a password.")]
    MissingPassword,
    #[error("Please confirm your password.")]
    MissingConfirmation,
    #[error("Please enter a valid email address.")]
    InvalidEmail,
    #[error("Student ID must be 8 digits.")]
    InvalidStudentId,
    #[error("Password must be at least 6 characters long.")]
    PasswordTooShort,
    #[error("Passwords do not match.")]
    PasswordMismatch,
    #[error("Please agree to the Terms of Service and Privacy Policy.")]
    TermsNotAccepted,
}

/// Raw registration form input.
#[derive(Debug, Clone, Default)]
pub struct RegistrationForm {
    pub first_name: String,
    pub last_name: String,
    pub student_id: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub accepted_terms: bool,
}

impl RegistrationForm {
    /// Validate and produce the profile to register. The email is
    /// normalized; names and student id are trimmed.
    ///
    /// # Errors
    ///
    /// Returns the first failing check.
    pub fn validate(&self) -> Result<Profile, ValidationError> {
        let required = [
            (&self.first_name, ValidationError::MissingFirstName),
            (&self.last_name, ValidationError::MissingLastName),
            (&self.student_id, ValidationError::MissingStudentId),
            (&self.email, ValidationError::MissingEmail),
            (&self.password, ValidationError::MissingPassword),
            (&self.confirm_password, ValidationError::MissingConfirmation),
        ];
        for (value, err) in required {
            if value.trim().is_empty() {
                return Err(err);
            }
        }

        let email = normalize_email(&self.email).ok_or(ValidationError::InvalidEmail)?;
        if !is_valid_student_id(self.student_id.trim()) {
            return Err(ValidationError::InvalidStudentId);
        }
        if !is_valid_password(&self.password) {
            return Err(ValidationError::PasswordTooShort);
        }
        if self.password != self.confirm_password {
            return Err(ValidationError::PasswordMismatch);
        }
        if !self.accepted_terms {
            return Err(ValidationError::TermsNotAccepted);
        }

        Ok(Profile {
            email,
            first_name: self.first_name.trim().to_owned(),
            last_name: self.last_name.trim().to_owned(),
            student_id: self.student_id.trim().to_owned(),
            avatar_url: crate::provider::memory::DEMO_AVATAR_URL.to_owned(),
        })
    }
}

/// `local@domain.tld` with no whitespace, a single `@`, and a dot inside the
/// domain that is neither its first nor last character.
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    if local.is_empty() {
        return false;
    }
    match domain.rfind('.') {
        Some(dot) => dot > 0 && dot + 1 < domain.len(),
        None => false,
    }
}

/// Trim and lowercase; `None` if the result is not a valid email.
#[must_use]
pub fn normalize_email(email: &str) -> Option<String> {
    let normalized = email.trim().to_ascii_lowercase();
    is_valid_email(&normalized).then_some(normalized)
}

#[must_use]
pub fn is_valid_student_id(student_id: &str) -> bool {
    student_id.len() == STUDENT_ID_LEN && student_id.chars().all(|c| c.is_ascii_digit())
}

#[must_use]
pub fn is_valid_password(password: &str) -> bool {
    password.chars().count() >= MIN_PASSWORD_LEN
}

#[cfg(test)]
#[path = "validation_test.rs"]
mod tests;
