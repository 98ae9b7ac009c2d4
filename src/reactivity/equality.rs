// ============================================================================
// weft-signals - Equality Functions
// Comparison helpers for the `equals` option on signals and memos
// ============================================================================

// =============================================================================
// STRICT EQUALITY (Default)
// =============================================================================

/// Default strict equality using PartialEq.
/// This is what `signal()` and `memo()` use unless overridden.
///
/// # Example
/// ```
/// use weft_signals::equality::equals;
///
/// assert!(equals(&42, &42));
/// assert!(!equals(&42, &43));
/// ```
pub fn equals<T: PartialEq>(a: &T, b: &T) -> bool {
    a == b
}

/// Never-equal: every write and recomputation counts as a change.
///
/// Use for values whose comparison is meaningless or too expensive, or when
/// downstream consumers must observe every write regardless of content.
pub fn never_equals<T>(_: &T, _: &T) -> bool {
    false
}

/// Always-equal: writes never propagate. Occasionally useful for signals
/// whose identity matters but whose content changes should be invisible.
pub fn always_equals<T>(_: &T, _: &T) -> bool {
    true
}

// =============================================================================
// NaN-SAFE FLOAT EQUALITY
// =============================================================================

/// Equality for f64 treating NaN == NaN as true, so a signal holding NaN
/// does not notify on every re-set of NaN.
///
/// # Example
/// ```
/// use weft_signals::equality::safe_equals_f64;
///
/// assert!(safe_equals_f64(&1.0, &1.0));
/// assert!(!safe_equals_f64(&1.0, &2.0));
/// assert!(safe_equals_f64(&f64::NAN, &f64::NAN));
/// ```
pub fn safe_equals_f64(a: &f64, b: &f64) -> bool {
    if a.is_nan() {
        return b.is_nan();
    }
    a == b
}

/// f32 variant of [`safe_equals_f64`].
pub fn safe_equals_f32(a: &f32, b: &f32) -> bool {
    if a.is_nan() {
        return b.is_nan();
    }
    a == b
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::EqualsFn;

    #[test]
    fn default_equality_uses_partial_eq() {
        assert!(equals(&"hello", &"hello"));
        assert!(!equals(&vec![1, 2], &vec![1, 3]));
    }

    #[test]
    fn never_and_always() {
        assert!(!never_equals(&1, &1));
        assert!(always_equals(&1, &2));
    }

    #[test]
    fn nan_equals_nan() {
        assert!(safe_equals_f64(&f64::NAN, &f64::NAN));
        assert!(!safe_equals_f64(&f64::NAN, &1.0));
        assert!(safe_equals_f32(&f32::NAN, &f32::NAN));
        assert!(!safe_equals_f32(&1.0, &f32::NAN));
    }

    #[test]
    fn combinators_fit_the_equals_fn_type() {
        let _: EqualsFn<i32> = never_equals;
        let _: EqualsFn<String> = always_equals;
        let _: EqualsFn<f64> = safe_equals_f64;
    }
}
