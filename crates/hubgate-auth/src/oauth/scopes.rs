//! The known scope table.
//!
//! Requested scopes are filtered against this table; unknown scopes are
//! dropped silently rather than rejected, so clients asking for more
//! than exists simply get less.

/// Known scopes with their consent-screen descriptions.
pub const SCOPES: &[(&str, &str)] = &[
    ("read:campaigns", "Read access to marketing campaigns"),
    ("write:campaigns", "Write access to marketing campaigns"),
    ("read:analytics", "Read access to analytics data"),
    ("write:analytics", "Write access to analytics data"),
    ("read:users", "Read access to user data"),
    ("write:users", "Write access to user data"),
    ("admin", "Full administrative access"),
];

/// Default scope granted when a client-credentials request names none.
pub const DEFAULT_SCOPE: &str = "read:campaigns";

/// Returns `true` if the scope is in the table.
#[must_use]
pub fn is_known(scope: &str) -> bool {
    SCOPES.iter().any(|(name, _)| *name == scope)
}

/// Description for a known scope.
#[must_use]
pub fn describe(scope: &str) -> Option<&'static str> {
    SCOPES
        .iter()
        .find(|(name, _)| *name == scope)
        .map(|(_, description)| *description)
}

/// Filters a space-separated scope string down to known scopes,
/// dropping unknown ones silently.
#[must_use]
pub fn filter(requested: &str) -> Vec<String> {
    requested
        .split_whitespace()
        .filter(|scope| is_known(scope))
        .map(str::to_string)
        .collect()
}
