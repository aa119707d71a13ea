use lazy_static::lazy_static;
use regex::Regex;

use crate::auth::dto::{LoginRequest, RegisterRequest};
use crate::error::FieldError;

pub const NAME_MIN: usize = 2;
pub const NAME_MAX: usize = 50;
pub const PASSWORD_MIN: usize = 6;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Trim name, trim and lowercase email. Passwords are left untouched.
pub fn normalize_register(req: &mut RegisterRequest) {
    req.name = req.name.trim().to_owned();
    req.email = req.email.trim().to_lowercase();
}

pub fn normalize_login(req: &mut LoginRequest) {
    req.email = req.email.trim().to_lowercase();
}

/// Expects a normalized request. Returns every failed rule, not just the first.
pub fn validate_register(req: &RegisterRequest) -> Vec<FieldError> {
    let mut errors = Vec::new();

    let name_len = req.name.chars().count();
    if name_len == 0 {
        errors.push(FieldError::new("name", "Name is required"));
    } else if !(NAME_MIN..=NAME_MAX).contains(&name_len) {
        errors.push(FieldError::new(
            "name",
            format!("Name must be between {NAME_MIN} and {NAME_MAX} characters"),
        ));
    }

    if !is_valid_email(&req.email) {
        errors.push(FieldError::new("email", "Please provide a valid email"));
    }

    if req.password.chars().count() < PASSWORD_MIN {
        errors.push(FieldError::new(
            "password",
            format!("Password must be at least {PASSWORD_MIN} characters"),
        ));
    }

    errors
}

pub fn validate_login(req: &LoginRequest) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if !is_valid_email(&req.email) {
        errors.push(FieldError::new("email", "Please provide a valid email"));
    }
    if req.password.is_empty() {
        errors.push(FieldError::new("password", "Password is required"));
    }
    errors
}
