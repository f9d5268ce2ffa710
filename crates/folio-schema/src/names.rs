//! Item name, namespace and tag rules.
//!
//! Valid item names:
//! - Must be non-empty
//! - Must not have leading or trailing whitespace
//! - Must not contain control characters
//! - Must not start with `+` (reserved for views such as `+history`),
//!   except for user names, which never appear in view URLs
//! - Must not start or end with `/`
//! - Must not contain consecutive slashes (`//`)
//!
//! `/` separates a name into path components; the parent of `a/b/c` is
//! `a/b`.

/// Prefix reserved for non-item views.
pub const RESERVED_PREFIX: char = '+';

/// Check an item name, returning the reason on failure.
///
/// # Examples
///
/// ```
/// use folio_schema::names::validate_name;
///
/// assert!(validate_name("Home").is_ok());
/// assert!(validate_name("Home/Sub").is_ok());
/// assert!(validate_name("/Home").is_err());
/// assert!(validate_name("a//b").is_err());
/// ```
pub fn validate_name(name: &str) -> Result<(), String> {
    if name.starts_with(RESERVED_PREFIX) {
        return Err(format!("name must not start with '{RESERVED_PREFIX}'"));
    }
    validate_user_name(name)
}

/// Check a user profile's name: the item name rules without the reserved
/// prefix.
pub fn validate_user_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("name must not be empty".into());
    }
    if name.trim() != name {
        return Err("name must not have leading or trailing whitespace".into());
    }
    if name.chars().any(char::is_control) {
        return Err("name must not contain control characters".into());
    }
    if name.starts_with('/') || name.ends_with('/') {
        return Err("name must not start or end with '/'".into());
    }
    if name.contains("//") {
        return Err("name must not contain '//'".into());
    }
    Ok(())
}

/// Check a namespace. The default namespace `""` is valid; others follow
/// the name rules.
pub fn validate_namespace(namespace: &str) -> Result<(), String> {
    if namespace.is_empty() {
        return Ok(());
    }
    validate_name(namespace).map_err(|reason| reason.replace("name", "namespace"))
}

/// Check a tag: non-empty, no surrounding whitespace.
pub fn validate_tag(tag: &str) -> Result<(), String> {
    if tag.is_empty() {
        return Err("tag must not be empty".into());
    }
    if tag.trim() != tag {
        return Err("tag must not have leading or trailing whitespace".into());
    }
    Ok(())
}

/// The direct parent of a hierarchical name, if any.
pub fn parent_name(name: &str) -> Option<&str> {
    name.rsplit_once('/').map(|(parent, _)| parent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names() {
        for name in ["Home", "Home/Sub", "a b", "ünïcode", "x/y/z", "a+b"] {
            assert!(validate_name(name).is_ok(), "{name:?}");
        }
    }

    #[test]
    fn invalid_names() {
        let cases = [
            ("", "empty"),
            (" Home", "whitespace"),
            ("Home ", "whitespace"),
            ("+history", "'+'"),
            ("/Home", "'/'"),
            ("Home/", "'/'"),
            ("a//b", "'//'"),
            ("tab\there", "control"),
        ];
        for (name, fragment) in cases {
            let reason = validate_name(name).unwrap_err();
            assert!(reason.contains(fragment), "{name:?}: {reason}");
        }
    }

    #[test]
    fn user_names_may_use_reserved_prefix() {
        assert!(validate_user_name("+alice").is_ok());
        assert!(validate_name("+alice").is_err());
        for bad in ["", " alice", "a//b", "/alice"] {
            assert!(validate_user_name(bad).is_err(), "{bad:?}");
        }
    }

    #[test]
    fn namespaces() {
        assert!(validate_namespace("").is_ok());
        assert!(validate_namespace("userprofiles").is_ok());
        let reason = validate_namespace("users/").unwrap_err();
        assert!(reason.starts_with("namespace"));
    }

    #[test]
    fn tags() {
        assert!(validate_tag("rust").is_ok());
        assert!(validate_tag("").is_err());
        assert!(validate_tag(" rust").is_err());
    }

    #[test]
    fn parents() {
        assert_eq!(parent_name("a/b/c"), Some("a/b"));
        assert_eq!(parent_name("a"), None);
    }
}
