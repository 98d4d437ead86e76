// 🔢 CNPJ Normalizer
// Company identifiers arrive as "12.345.678/0001-90"; joins run on digits only

/// Keep only the ASCII digits of an identifier.
///
/// Idempotent: a digits-only input comes back unchanged.
pub fn normalize(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// True when `value` is non-empty and made of digits only
pub fn is_normalized(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_digit())
}
