use std::collections::BTreeMap;

use serde::Serialize;

pub const MIN_PASSWORD_CHARS: usize = 8;

/// Field name to messages, collected across every check of a form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: &str) {
        self.0.entry(field.to_string()).or_default().push(message.to_string());
    }

    /// Records `message` against `field` when `ok` is false.
    pub fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.add(field, message);
        }
    }

    pub fn valid(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

pub fn not_blank(value: &str) -> bool {
    !value.trim().is_empty()
}

pub fn min_chars(value: &str, n: usize) -> bool {
    value.chars().count() >= n
}

/// Credential-strength rule shared by signup and password change.
pub fn check_password(errors: &mut FieldErrors, field: &str, password: &str) {
    errors.check(not_blank(password), field, "This field cannot be blank");
    errors.check(
        min_chars(password, MIN_PASSWORD_CHARS),
        field,
        "This field must be at least 8 characters long",
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_every_failure() {
        let mut errors = FieldErrors::new();
        errors.check(not_blank(""), "name", "This field cannot be blank");
        check_password(&mut errors, "password", "short");
        assert!(!errors.valid());
        assert_eq!(errors.fields().collect::<Vec<_>>(), vec!["name", "password"]);
        assert_eq!(errors.get("password").unwrap().len(), 1);
    }

    #[test]
    fn blank_password_reports_both_rules() {
        let mut errors = FieldErrors::new();
        check_password(&mut errors, "password", "");
        assert_eq!(errors.get("password").unwrap().len(), 2);
    }

    #[test]
    fn min_chars_counts_characters_not_bytes() {
        assert!(min_chars("пароль12", 8));
        assert!(!min_chars("ñññ", 4));
    }

    #[test]
    fn whitespace_is_blank() {
        assert!(!not_blank("   \t"));
        assert!(not_blank(" a "));
    }

    #[test]
    fn serializes_as_plain_map() {
        let mut errors = FieldErrors::new();
        errors.add("email", "Email address is already in use");
        let json = serde_json::to_string(&errors).unwrap();
        assert_eq!(json, r#"{"email":["Email address is already in use"]}"#);
    }
}
