/// Cache key naming. Two key families exist: the live token pair per
/// identity, and pending verification keys.

/// `jwt:<email>` -> serialized token pair, TTL = refresh lifetime.
pub fn jwt(email: &str) -> String {
    format!("jwt:{}", email)
}

/// `verify:<key>` -> email, TTL = verification lifetime.
pub fn verify(key: &str) -> String {
    format!("verify:{}", key)
}
