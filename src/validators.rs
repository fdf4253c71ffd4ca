//! Input validation for rule specs
//!
//! Every structured field of a [`FirewallRuleSpec`](crate::core::rule::FirewallRuleSpec)
//! ends up as an `iptables` argument, so values are checked before they are
//! compiled. Validators return `Result<_, String>`; the caller attaches the
//! field name.

use ipnetwork::IpNetwork;

/// Maximum length accepted for a comment (`xt_comment` limit is 256 bytes
/// including the terminator).
pub const MAX_COMMENT_LEN: usize = 255;

/// Validates a rule description for use inside `--comment "..."`.
///
/// The description is emitted verbatim and later reused as part of the
/// detection signature, so it is rejected rather than sanitized.
///
/// # Errors
///
/// Returns `Err` if the description contains a double quote or a control
/// character, or exceeds [`MAX_COMMENT_LEN`] bytes.
///
/// # Examples
///
/// ```
/// use fwconverge::validators::validate_comment;
///
/// assert!(validate_comment("allow ssh").is_ok());
/// assert!(validate_comment("bad \"quote\"").is_err());
/// ```
pub fn validate_comment(input: &str) -> Result<(), String> {
    if input.len() > MAX_COMMENT_LEN {
        return Err(format!("Comment too long (max {MAX_COMMENT_LEN} bytes)"));
    }

    if input.contains('"') {
        return Err("Comment must not contain double quotes".to_string());
    }

    if input.chars().any(char::is_control) {
        return Err("Comment must not contain control characters".to_string());
    }

    Ok(())
}

/// Validates a protocol name such as `tcp`, `udp` or `icmp`.
///
/// # Errors
///
/// Returns `Err` if the protocol is empty or contains anything other than
/// ASCII letters and digits.
pub fn validate_protocol(input: &str) -> Result<(), String> {
    if input.is_empty() {
        return Err("Protocol must not be empty".to_string());
    }

    if !input.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(format!("Invalid protocol name '{input}'"));
    }

    Ok(())
}

/// Validates a single port number.
///
/// # Errors
///
/// Returns `Err` if port is 0 (reserved).
pub fn validate_port(port: u16) -> Result<u16, String> {
    if port == 0 {
        Err("Port must be between 1 and 65535".to_string())
    } else {
        Ok(port)
    }
}

/// Validates a port range.
///
/// # Errors
///
/// Returns `Err` if:
/// - Either port is 0
/// - Start port is greater than end port
pub fn validate_port_range(start: u16, end: u16) -> Result<(u16, u16), String> {
    validate_port(start)?;
    validate_port(end)?;

    if start > end {
        Err("Start port must be less than or equal to end port".to_string())
    } else {
        Ok((start, end))
    }
}

/// Validates a network interface name.
///
/// Linux kernel interface name rules:
/// - Max 15 characters (IFNAMSIZ - 1)
/// - Alphanumeric, dot, dash, underscore only
/// - Cannot be "." or ".."
///
/// A single trailing `+` is accepted as the iptables interface wildcard.
///
/// # Errors
///
/// Returns `Err` if interface name violates kernel constraints.
pub fn validate_interface(name: &str) -> Result<(), String> {
    let base = name.strip_suffix('+').unwrap_or(name);

    if base.is_empty() && name.is_empty() {
        return Err("Interface name must not be empty".to_string());
    }

    if name.len() > 15 {
        return Err("Interface name too long (max 15 characters)".to_string());
    }

    if base == "." || base == ".." {
        return Err("Invalid interface name".to_string());
    }

    if !base
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
    {
        return Err("Interface name contains invalid characters".to_string());
    }

    Ok(())
}

/// Validates a source/destination address.
///
/// Accepts a bare address (`10.0.0.1`) or CIDR notation (`10.0.0.0/8`).
/// `iptables` only handles IPv4; IPv6 belongs to `ip6tables`.
///
/// # Errors
///
/// Returns `Err` if the value does not parse as an IP network or is IPv6.
pub fn validate_network(input: &str) -> Result<IpNetwork, String> {
    let network = input
        .parse::<IpNetwork>()
        .map_err(|e| format!("Invalid address '{input}': {e}"))?;

    if let IpNetwork::V6(_) = network {
        return Err(format!(
            "IPv6 address '{input}' is not supported by iptables (use ip6tables)"
        ));
    }

    Ok(network)
}

/// Validates a connection-state name (`new`, `established`, ...).
///
/// # Errors
///
/// Returns `Err` if the state is empty or not ASCII alphabetic.
pub fn validate_state(input: &str) -> Result<(), String> {
    if input.is_empty() || !input.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(format!("Invalid connection state '{input}'"));
    }
    Ok(())
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_validate_port_rejects_zero(port in any::<u16>()) {
            let result = validate_port(port);
            if port == 0 {
                prop_assert!(result.is_err());
            } else {
                prop_assert_eq!(result.unwrap(), port);
            }
        }

        #[test]
        fn test_validate_port_range_consistency(
            start in 1u16..=65535,
            end in 1u16..=65535
        ) {
            prop_assert_eq!(validate_port_range(start, end).is_ok(), start <= end);
        }

        #[test]
        fn test_validate_interface_char_constraint(
            valid_prefix in "[a-zA-Z0-9_-]{1,10}",
            invalid_char in "[^a-zA-Z0-9._+-]"
        ) {
            let invalid_name = format!("{valid_prefix}{invalid_char}");
            prop_assert!(validate_interface(&invalid_name).is_err());
        }

        #[test]
        fn test_validate_comment_accepts_printable_ascii(input in "[ !#-~]{0,64}") {
            prop_assert!(validate_comment(&input).is_ok());
        }
    }
}
