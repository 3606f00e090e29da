//! Input validation enforced at the store boundary.
//!
//! Every create/update path runs these before touching the database, so the
//! schema invariants hold no matter which handler issued the write.

use lazy_static::lazy_static;
use regex::Regex;

use super::models::{CreateTourRequest, DIFFICULTIES};

lazy_static! {
    /// Letters and spaces only (user display names)
    static ref NAME_REGEX: Regex = Regex::new(r"^[A-Za-z][A-Za-z ]*$").unwrap();

    /// Pragmatic email shape check: local@domain.tld
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$"
    ).unwrap();

    /// UUID v4 text format
    static ref UUID_REGEX: Regex = Regex::new(
        r"^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$"
    ).unwrap();
}

pub fn validate_user_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("Please provide your name".to_string());
    }
    if !NAME_REGEX.is_match(name.trim()) {
        return Err("Name must contain only letters".to_string());
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), String> {
    if email.trim().is_empty() {
        return Err("Please provide your email address".to_string());
    }
    if !EMAIL_REGEX.is_match(email.trim()) {
        return Err("Please provide a valid email address".to_string());
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("Please provide your password".to_string());
    }
    if password.len() < 8 {
        return Err("Password must be at least 8 characters".to_string());
    }
    Ok(())
}

pub fn validate_password_pair(password: &str, confirm: &str) -> Result<(), String> {
    validate_password(password)?;
    if password != confirm {
        return Err("Passwords do not match".to_string());
    }
    Ok(())
}

/// Validate a record identifier before it reaches a query.
pub fn validate_id(id: &str) -> Result<(), String> {
    if UUID_REGEX.is_match(id) {
        Ok(())
    } else {
        Err(format!("Invalid id: {}", id))
    }
}

/// Validate a fully merged tour document. Called on create and on every
/// update after the patch is applied.
pub fn validate_tour(tour: &CreateTourRequest) -> Vec<String> {
    let mut errors = Vec::new();

    let name_len = tour.name.trim().chars().count();
    if !(10..=50).contains(&name_len) {
        errors.push("Tour name must be between 10 and 50 characters".to_string());
    }

    if tour.duration < 1 {
        errors.push("Tour duration must be at least 1 day".to_string());
    }

    if !DIFFICULTIES.contains(&tour.difficulty.as_str()) {
        errors.push("Tour difficulty must be either easy, medium or difficult".to_string());
    }

    if tour.price <= 0.0 {
        errors.push("Tour price must be above zero".to_string());
    }

    if tour.max_group_size < 1 {
        errors.push("Tour must have a max group size of at least 1".to_string());
    }

    let summary_len = tour.summary.trim().chars().count();
    if !(10..=85).contains(&summary_len) {
        errors.push("Tour summary must be between 10 and 85 characters".to_string());
    }

    if tour.image_cover.trim().is_empty() {
        errors.push("Tour must have an image cover".to_string());
    }

    if let Some(avg) = tour.ratings_average {
        if !(1.0..=5.0).contains(&avg) {
            errors.push("Rating must be between 1 and 5".to_string());
        }
    }

    errors
}
