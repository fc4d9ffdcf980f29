//! Input validation utilities

use regex::Regex;
use std::sync::OnceLock;
use tutoring::models::CheckInMethod;

/// Validate the shape of a check-in code before it reaches the store
pub fn validate_check_in_code(method: CheckInMethod, code: &str) -> Result<(), String> {
    let code = code.trim();
    if code.is_empty() {
        return Err("Check-in code is required".to_string());
    }

    static PIN_REGEX: OnceLock<Regex> = OnceLock::new();
    static QR_REGEX: OnceLock<Regex> = OnceLock::new();

    let (regex, message) = match method {
        CheckInMethod::Pin => (
            PIN_REGEX.get_or_init(|| Regex::new(r"^[0-9]{6}$").expect("Failed to compile PIN regex")),
            "PIN must be exactly 6 digits",
        ),
        CheckInMethod::Qr => (
            QR_REGEX
                .get_or_init(|| Regex::new(r"^[0-9a-f]{16}$").expect("Failed to compile QR regex")),
            "QR code must be 16 lowercase hexadecimal characters",
        ),
    };

    if !regex.is_match(code) {
        return Err(message.to_string());
    }

    Ok(())
}

/// Validate an online meeting link
pub fn validate_meeting_link(link: &str) -> Result<(), String> {
    if link.len() > 2048 {
        return Err("Meeting link must be at most 2048 characters long".to_string());
    }

    static URL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = URL_REGEX.get_or_init(|| {
        Regex::new(r"^https?://[A-Za-z0-9.-]+(:[0-9]{1,5})?(/\S*)?$")
            .expect("Failed to compile URL regex")
    });

    if !regex.is_match(link) {
        return Err("Meeting link must be an http(s) URL".to_string());
    }

    Ok(())
}

/// Validate free-text fields such as location or description
pub fn validate_text(field: &str, value: &str, max: usize) -> Result<(), String> {
    if value.chars().count() > max {
        return Err(format!("{} must be at most {} characters long", field, max));
    }
    Ok(())
}
