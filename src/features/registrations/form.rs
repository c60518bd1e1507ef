//! Public intake form. Validation runs before any network traffic and names
//! the offending field so the form can highlight it.

use crate::app_lib::AppError;
use crate::features::registrations::{client::RegistrationsApi, types::RegistrationRequest};
use chrono::{NaiveDate, Utc};
use regex::Regex;
use tracing::{info, instrument};

/// Validates and submits a registration, returning the server's id.
///
/// # Errors
/// `AppError::Validation` for local problems, otherwise the API error.
#[instrument(skip_all)]
pub async fn submit_registration(
    api: &dyn RegistrationsApi,
    request: &RegistrationRequest,
) -> Result<String, AppError> {
    let request = validate_registration(request, Utc::now().date_naive())?;
    let id = api.register(&request).await?;
    info!(registration_id = %id, "registration submitted");
    Ok(id)
}

/// Returns a trimmed copy of `request` with blank optional fields removed.
///
/// # Errors
/// `AppError::Validation` naming the first invalid field.
pub fn validate_registration(
    request: &RegistrationRequest,
    today: NaiveDate,
) -> Result<RegistrationRequest, AppError> {
    let full_name = request.full_name.trim();
    if full_name.is_empty() {
        return Err(AppError::validation("full_name", "Full name is required."));
    }

    let date_of_birth = request.date_of_birth.trim();
    let birth = NaiveDate::parse_from_str(date_of_birth, "%Y-%m-%d").map_err(|_| {
        AppError::validation("date_of_birth", "Use the YYYY-MM-DD format.")
    })?;
    if birth > today {
        return Err(AppError::validation(
            "date_of_birth",
            "Date of birth cannot be in the future.",
        ));
    }

    let email = optional(request.email.as_deref());
    if let Some(email) = &email
        && !valid_email(email)
    {
        return Err(AppError::validation("email", "Enter a valid email address."));
    }

    let health_card_number = match optional(request.health_card_number.as_deref()) {
        Some(raw) => match digits_only(&raw) {
            Some(number) if number.len() == 10 => Some(number),
            _ => {
                return Err(AppError::validation(
                    "health_card_number",
                    "Health card number must be 10 digits.",
                ));
            }
        },
        None => None,
    };

    let phone_number = optional(request.phone_number.as_deref());
    if let Some(phone) = &phone_number
        && !valid_phone(phone)
    {
        return Err(AppError::validation(
            "phone_number",
            "Phone number must have 10 to 15 digits.",
        ));
    }

    if !request.consent_given {
        return Err(AppError::validation(
            "consent_given",
            "Consent is required to register.",
        ));
    }

    Ok(RegistrationRequest {
        full_name: full_name.to_string(),
        date_of_birth: date_of_birth.to_string(),
        health_card_number,
        phone_number,
        email: email.map(|email| email.to_lowercase()),
        consent_given: true,
    })
}

pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email))
}

/// Digits with optional `+`, spaces, dashes, dots and parentheses.
fn valid_phone(phone: &str) -> bool {
    let allowed = phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '.' | '(' | ')'));
    let digits = phone.chars().filter(char::is_ascii_digit).count();
    allowed && (10..=15).contains(&digits)
}

/// Strips spaces and dashes; `None` when anything other than digits remains.
fn digits_only(value: &str) -> Option<String> {
    let stripped: String = value.chars().filter(|c| !matches!(c, ' ' | '-')).collect();
    stripped
        .chars()
        .all(|c| c.is_ascii_digit())
        .then_some(stripped)
}

fn optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
