//! Password rules for the change-password form.
//!
//! Every rule is evaluated; violations are collected per field so the form can
//! show all of them at once.

use secrecy::{ExposeSecret, SecretString};
use std::collections::BTreeMap;

pub const MIN_PASSWORD_LENGTH: usize = 8;

pub const MSG_CURRENT_REQUIRED: &str = "Current password is required";
pub const MSG_TOO_SHORT: &str = "Password must be at least 8 characters";
pub const MSG_NEEDS_UPPERCASE: &str = "Password must contain at least one uppercase letter";
pub const MSG_NEEDS_LOWERCASE: &str = "Password must contain at least one lowercase letter";
pub const MSG_NEEDS_DIGIT: &str = "Password must contain at least one number";
pub const MSG_MISMATCH: &str = "Passwords don't match";

/// Form fields an error can be attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    CurrentPassword,
    NewPassword,
    ConfirmPassword,
    Email,
    Password,
    /// Form-level message not tied to a single input.
    Form,
}

impl Field {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CurrentPassword => "currentPassword",
            Self::NewPassword => "newPassword",
            Self::ConfirmPassword => "confirmPassword",
            Self::Email => "email",
            Self::Password => "password",
            Self::Form => "_form",
        }
    }
}

/// Field-scoped validation messages.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<Field, Vec<String>>);

impl FieldErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn single(field: Field, message: &str) -> Self {
        let mut errors = Self::new();
        errors.push(field, message);
        errors
    }

    pub fn push(&mut self, field: Field, message: &str) {
        self.0.entry(field).or_default().push(message.to_string());
    }

    #[must_use]
    pub fn get(&self, field: Field) -> &[String] {
        self.0.get(&field).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.0.keys().copied()
    }

    /// Wire representation keyed by the form input names.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, Vec<String>> {
        self.0
            .iter()
            .map(|(field, messages)| (field.as_str().to_string(), messages.clone()))
            .collect()
    }
}

/// Validate a change-password submission.
///
/// The current password is only checked for presence here; whether it is
/// correct is decided later against the stored hash.
///
/// # Errors
/// Returns every violated rule, scoped to its field.
pub fn validate(
    current_password: &SecretString,
    new_password: &SecretString,
    confirm_password: &SecretString,
) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();

    if current_password.expose_secret().is_empty() {
        errors.push(Field::CurrentPassword, MSG_CURRENT_REQUIRED);
    }

    let candidate = new_password.expose_secret();
    if candidate.chars().count() < MIN_PASSWORD_LENGTH {
        errors.push(Field::NewPassword, MSG_TOO_SHORT);
    }
    if !candidate.chars().any(|c| c.is_ascii_uppercase()) {
        errors.push(Field::NewPassword, MSG_NEEDS_UPPERCASE);
    }
    if !candidate.chars().any(|c| c.is_ascii_lowercase()) {
        errors.push(Field::NewPassword, MSG_NEEDS_LOWERCASE);
    }
    if !candidate.chars().any(|c| c.is_ascii_digit()) {
        errors.push(Field::NewPassword, MSG_NEEDS_DIGIT);
    }

    if candidate != confirm_password.expose_secret() {
        errors.push(Field::ConfirmPassword, MSG_MISMATCH);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
