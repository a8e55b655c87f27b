/// Whether `user_id` can name a diet record on both ends.
///
/// The backend stores one file per user, so ids that could escape its data
/// directory are refused everywhere.
pub fn is_valid_user_id(user_id: &str) -> bool {
    !(user_id.trim().is_empty()
        || user_id.contains('/')
        || user_id.contains('\\')
        || user_id.contains("..")
        || user_id.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_ids() {
        assert!(is_valid_user_id("ana"));
        assert!(is_valid_user_id("user-123"));
        assert!(is_valid_user_id("ana maria"));

        assert!(!is_valid_user_id(""));
        assert!(!is_valid_user_id("   "));
        assert!(!is_valid_user_id("../etc"));
        assert!(!is_valid_user_id("a/b"));
        assert!(!is_valid_user_id("a\\b"));
        assert!(!is_valid_user_id(".hidden"));
    }
}
