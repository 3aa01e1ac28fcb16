//! Display masking for decrypted PII. Used by API responses and audit log
//! metadata so plaintext never needs to leave the crypto boundary fully
//! exposed when only a hint is required.

/// `alice@example.com` -> `al***@example.com`.
pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) if local.len() > 2 => {
            format!("{}***@{}", &local[..2], domain)
        }
        Some((_, domain)) => format!("***@{domain}"),
        None => "***".to_string(),
    }
}

/// `+6281234567890` -> `+628123****890` (keeps the last 3 digits).
pub fn mask_phone(phone: &str) -> String {
    let len = phone.chars().count();
    if len <= 6 {
        return "*".repeat(len);
    }
    let keep_tail = 3;
    let chars: Vec<char> = phone.chars().collect();
    let head_len = len.saturating_sub(keep_tail + 4);
    let head: String = chars[..head_len].iter().collect();
    let tail: String = chars[len - keep_tail..].iter().collect();
    format!("{head}****{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_typical_email() {
        assert_eq!(mask_email("alice@example.com"), "al***@example.com");
    }

    #[test]
    fn masks_short_local_part() {
        assert_eq!(mask_email("ab@example.com"), "***@example.com");
    }

    #[test]
    fn masks_phone_keeping_tail() {
        let masked = mask_phone("+6281234567890");
        assert!(masked.ends_with("890"));
        assert!(masked.contains("****"));
    }

    #[test]
    fn masks_short_phone_entirely() {
        assert_eq!(mask_phone("12345"), "*****");
    }
}
