//! Loan purpose encoding

/// Code used for any purpose label the models were not trained on.
pub const OTHER_PURPOSE: u8 = 3;

/// Map a loan purpose label to the integer code used at training time.
///
/// Matching is exact and case-sensitive; unknown labels fall back to
/// [`OTHER_PURPOSE`].
pub fn map_loan_purpose(label: &str) -> u8 {
    match label {
        "Business" => 0,
        "Home" => 1,
        "Education" => 2,
        "Other" | "Others" => OTHER_PURPOSE,
        "Auto" | "Automobile" => 4,
        _ => OTHER_PURPOSE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_purposes() {
        assert_eq!(map_loan_purpose("Business"), 0);
        assert_eq!(map_loan_purpose("Home"), 1);
        assert_eq!(map_loan_purpose("Education"), 2);
        assert_eq!(map_loan_purpose("Other"), 3);
        assert_eq!(map_loan_purpose("Others"), 3);
        assert_eq!(map_loan_purpose("Auto"), map_loan_purpose("Automobile"));
        assert_eq!(map_loan_purpose("Auto"), 4);
    }

    #[test]
    fn test_exact_match_only() {
        assert_eq!(map_loan_purpose("auto"), OTHER_PURPOSE);
        assert_eq!(map_loan_purpose(" Home"), OTHER_PURPOSE);
        assert_eq!(map_loan_purpose(""), OTHER_PURPOSE);
        assert_eq!(map_loan_purpose("Vacation"), OTHER_PURPOSE);
    }
}
