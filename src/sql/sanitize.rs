//! SQL Identifier Sanitization Utilities
//!
//! Provides functions to quote and validate SQL identifiers. Every name the
//! DDL generator emits goes through [`quote_identifier`].

use std::sync::LazyLock;

use regex::Regex;

/// PostgreSQL truncates identifiers beyond this many bytes
pub const MAX_IDENTIFIER_LENGTH: usize = 63;

static IDENTIFIER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*$").expect("identifier pattern is valid")
});

/// Quote a SQL identifier to make it safe for use in statements
///
/// # Example
/// ```
/// use schema_forge::sql::quote_identifier;
///
/// let quoted = quote_identifier("my_table");
/// assert_eq!(quoted, "\"my_table\"");
/// ```
pub fn quote_identifier(identifier: &str) -> String {
    let escaped = identifier.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

/// Quote `schema.name`. An empty schema yields just the quoted name.
///
/// # Example
/// ```
/// use schema_forge::sql::qualified_name;
///
/// assert_eq!(qualified_name("FHIRDATA", "PATIENTS"), "\"FHIRDATA\".\"PATIENTS\"");
/// assert_eq!(qualified_name("", "FHIR_TS"), "\"FHIR_TS\"");
/// ```
pub fn qualified_name(schema: &str, name: &str) -> String {
    if schema.is_empty() {
        quote_identifier(name)
    } else {
        format!("{}.{}", quote_identifier(schema), quote_identifier(name))
    }
}

/// Quote a string literal
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Validate a schema, object, column or constraint name
///
/// Rules:
/// - Must not be empty or longer than [`MAX_IDENTIFIER_LENGTH`]
/// - Must start with a letter or underscore
/// - Can only contain letters, digits, underscores and `$`
///
/// # Example
/// ```
/// use schema_forge::sql::validate_identifier;
///
/// assert!(validate_identifier("LOGICAL_RESOURCES").is_ok());
/// assert!(validate_identifier("1abc").is_err());
/// ```
pub fn validate_identifier(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Identifier cannot be empty".to_string());
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(format!(
            "Identifier '{}' is longer than {} characters",
            name, MAX_IDENTIFIER_LENGTH
        ));
    }

    if !IDENTIFIER_PATTERN.is_match(name) {
        return Err(format!(
            "Identifier '{}' is invalid. Must start with a letter or underscore and contain only letters, numbers, underscores and '$'.",
            name
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // quote_identifier Tests
    // =========================================================================

    #[test]
    fn test_quote_identifier_simple() {
        assert_eq!(quote_identifier("my_table"), "\"my_table\"");
        assert_eq!(quote_identifier("PATIENTS"), "\"PATIENTS\"");
    }

    #[test]
    fn test_quote_identifier_with_quotes() {
        assert_eq!(
            quote_identifier("table\"with\"quotes"),
            "\"table\"\"with\"\"quotes\""
        );
    }

    #[test]
    fn test_quote_identifier_sql_injection_attempt() {
        let quoted = quote_identifier("x\"; DROP TABLE users; --");
        assert_eq!(quoted, "\"x\"\"; DROP TABLE users; --\"");
    }

    #[test]
    fn test_qualified_name() {
        assert_eq!(qualified_name("s", "t"), "\"s\".\"t\"");
        assert_eq!(qualified_name("", "t"), "\"t\"");
    }

    #[test]
    fn test_quote_literal_escapes() {
        assert_eq!(quote_literal("it's"), "'it''s'");
        assert_eq!(quote_literal("X"), "'X'");
    }

    // =========================================================================
    // validate_identifier Tests
    // =========================================================================

    #[test]
    fn test_validate_identifier_valid() {
        assert!(validate_identifier("PATIENT_RESOURCES").is_ok());
        assert!(validate_identifier("_private").is_ok());
        assert!(validate_identifier("mt_id").is_ok());
        assert!(validate_identifier("a1$").is_ok());
    }

    #[test]
    fn test_validate_identifier_invalid() {
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("1table").is_err());
        assert!(validate_identifier("my-table").is_err());
        assert!(validate_identifier("my table").is_err());
        assert!(validate_identifier("x\"y").is_err());
    }

    #[test]
    fn test_validate_identifier_too_long() {
        let name = "A".repeat(MAX_IDENTIFIER_LENGTH + 1);
        let err = validate_identifier(&name).unwrap_err();
        assert!(err.contains("longer than"));
        assert!(validate_identifier(&"A".repeat(MAX_IDENTIFIER_LENGTH)).is_ok());
    }
}
