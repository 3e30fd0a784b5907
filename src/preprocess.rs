use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    static ref STATE_LIKE: Regex = Regex::new(r"(?i)(state_name\s+like\s+')%([\w\s]+)%'").unwrap();
}

/// Normalize a generated SQL statement before execution.
///
/// The whole statement is lower-cased, including string literals, because the
/// backing tables store every text value in lower case. State names are stored
/// hyphen-joined ("tamil-nadu"), so the inner words of a
/// `state_name like '%...%'` pattern are joined with hyphens as well.
pub fn preprocess_query(query: &str) -> String {
    let mut query = query.to_lowercase();
    if query.contains("bangalore") {
        query = query.replace("bangalore", "bengaluru");
    }
    STATE_LIKE
        .replace_all(&query, |caps: &Captures| {
            let words: Vec<&str> = caps[2].split_whitespace().collect();
            format!("{}%{}%'", &caps[1], words.join("-"))
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lower_cases_the_whole_statement() {
        assert_eq!(
            preprocess_query("SELECT Amount FROM phonepe_transactions_data"),
            "select amount from phonepe_transactions_data"
        );
    }

    #[test]
    fn canonicalizes_bangalore() {
        assert_eq!(
            preprocess_query("select * from t where district = 'Bangalore'"),
            "select * from t where district = 'bengaluru'"
        );
    }

    #[test]
    fn hyphenates_state_like_patterns() {
        assert_eq!(
            preprocess_query("SELECT * FROM t WHERE state_name LIKE '%Tamil Nadu%'"),
            "select * from t where state_name like '%tamil-nadu%'"
        );
    }

    #[test]
    fn leaves_single_word_states_alone() {
        assert_eq!(
            preprocess_query("select * from t where state_name like '%karnataka%'"),
            "select * from t where state_name like '%karnataka%'"
        );
    }

    #[test]
    fn ignores_like_patterns_on_other_columns() {
        assert_eq!(
            preprocess_query("select * from t where district like '%new delhi%'"),
            "select * from t where district like '%new delhi%'"
        );
    }

    #[test]
    fn is_idempotent() {
        let queries = [
            "SELECT SUM(amount) FROM phonepe_transactions_data WHERE state_name LIKE '%Madhya Pradesh%'",
            "select * from t where district = 'Bangalore'",
            "select 1",
            "",
        ];
        for query in queries {
            let once = preprocess_query(query);
            assert_eq!(preprocess_query(&once), once, "not idempotent for {query:?}");
        }
    }
}
