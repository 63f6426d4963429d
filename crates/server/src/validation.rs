use crate::config::LimitsConfig;
use crate::error::{ApiResult, AppError};

/// Trims and validates a required text field, naming the field in the error.
pub fn require_field(field: &'static str, value: &str, max_len: usize) -> ApiResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::bad_request(format!("{field} cannot be empty")));
    }
    if trimmed.len() > max_len {
        return Err(AppError::bad_request(format!(
            "{field} exceeds maximum length of {max_len}"
        )));
    }
    Ok(trimmed.to_string())
}

pub fn validate_name(limits: &LimitsConfig, name: &str) -> ApiResult<String> {
    require_field("name", name, limits.max_name_len)
}

pub fn validate_ip_address(limits: &LimitsConfig, ip: &str) -> ApiResult<String> {
    require_field("ip_address", ip, limits.max_ip_len)
}

/// Validates an optional caller-supplied event type. Empty input is treated
/// as absent so the classifier takes over.
pub fn validate_event_type(
    limits: &LimitsConfig,
    event_type: Option<&str>,
) -> ApiResult<Option<String>> {
    match event_type.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => {
            if value.len() > limits.max_event_type_len {
                return Err(AppError::bad_request(format!(
                    "event_type exceeds maximum length of {}",
                    limits.max_event_type_len
                )));
            }
            Ok(Some(value.to_string()))
        }
    }
}

pub fn validate_port(port: u16) -> ApiResult<u16> {
    if port == 0 {
        return Err(AppError::bad_request("port must be between 1 and 65535"));
    }
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> LimitsConfig {
        LimitsConfig::default()
    }

    #[test]
    fn empty_name_names_the_field() {
        let err = validate_name(&limits(), "   ").expect_err("empty name");
        assert!(err.message.contains("name"));
        assert_eq!(err.code, "bad_request");
    }

    #[test]
    fn overlong_ip_rejected() {
        let long = "f".repeat(46);
        let err = validate_ip_address(&limits(), &long).expect_err("too long");
        assert!(err.message.contains("ip_address"));
    }

    #[test]
    fn blank_event_type_becomes_none() {
        assert_eq!(validate_event_type(&limits(), Some("  ")).unwrap(), None);
        assert_eq!(validate_event_type(&limits(), None).unwrap(), None);
        assert_eq!(
            validate_event_type(&limits(), Some(" port_scan ")).unwrap(),
            Some("port_scan".to_string())
        );
    }

    #[test]
    fn zero_port_rejected() {
        assert!(validate_port(0).is_err());
        assert_eq!(validate_port(2222).unwrap(), 2222);
    }
}
