//! Keyword-based capability detection.

use super::types::ServiceType;
use regex::Regex;
use std::sync::OnceLock;

/// Fragments that mark a data query. Checked before the domain set.
const DATA_QUERY_KEYWORDS: &[&str] = &[
    "sql",
    "select",
    "insert into",
    "update ",
    "delete from",
    "group by",
    "order by",
    "inner join",
    "left join",
    "tabel",
    "zapytani",
    "kwerend",
    "raport",
];

/// Fragments that mark an ERP domain question.
const DOMAIN_KEYWORDS: &[&str] = &[
    "erp",
    "moduł",
    "modul",
    "faktur",
    "magazyn",
    "księgow",
    "kontrahent",
    "zamówieni",
    "konfigur",
];

/// Alternation anchored at a word start, so stems still match inflected
/// forms ("faktur" in "fakturach") but not the inside of unrelated words.
fn word_start_pattern(keywords: &[&str]) -> Regex {
    let alternation = keywords
        .iter()
        .map(|kw| regex::escape(kw))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{alternation})")).expect("keyword pattern is valid")
}

/// Pick the backend capability for `text`.
///
/// Precedence: `forced`, then data-query keywords, then domain keywords,
/// then [`ServiceType::General`]. Matching is case-insensitive and each
/// keyword must begin a word.
#[must_use]
pub fn detect_service_type(text: &str, forced: Option<ServiceType>) -> ServiceType {
    static DATA_QUERY_RE: OnceLock<Regex> = OnceLock::new();
    static DOMAIN_RE: OnceLock<Regex> = OnceLock::new();

    if let Some(forced) = forced {
        return forced;
    }

    let data_query = DATA_QUERY_RE.get_or_init(|| word_start_pattern(DATA_QUERY_KEYWORDS));
    let domain = DOMAIN_RE.get_or_init(|| word_start_pattern(DOMAIN_KEYWORDS));

    if data_query.is_match(text) {
        ServiceType::Sql
    } else if domain.is_match(text) {
        ServiceType::Erp
    } else {
        ServiceType::General
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_query() {
        assert_eq!(detect_service_type("SELECT * FROM x", None), ServiceType::Sql);
        assert_eq!(
            detect_service_type("pokaż zapytanie o sprzedaż", None),
            ServiceType::Sql
        );
    }

    #[test]
    fn test_domain() {
        assert_eq!(
            detect_service_type("jak skonfigurować moduł ERP", None),
            ServiceType::Erp
        );
        assert_eq!(
            detect_service_type("Gdzie znajdę FAKTURY korygujące?", None),
            ServiceType::Erp
        );
    }

    #[test]
    fn test_default_general() {
        assert_eq!(
            detect_service_type("cześć, jak się masz", None),
            ServiceType::General
        );
        assert_eq!(detect_service_type("", None), ServiceType::General);
    }

    #[test]
    fn test_keywords_inside_other_words_are_ignored() {
        assert_eq!(
            detect_service_type("interpretacja wyników badania", None),
            ServiceType::General
        );
        assert_eq!(
            detect_service_type("mysqldump nie działa", None),
            ServiceType::General
        );
        assert_eq!(
            detect_service_type("Moduł ERP nie odpowiada", None),
            ServiceType::Erp
        );
        assert_eq!(
            detect_service_type("lista fakturach z marca", None),
            ServiceType::Erp
        );
        assert_eq!(
            detect_service_type("UPDATE users SET name = 'x'", None),
            ServiceType::Sql
        );
    }

    #[test]
    fn test_data_query_wins_over_domain() {
        assert_eq!(
            detect_service_type("select z tabeli faktur w ERP", None),
            ServiceType::Sql
        );
    }

    #[test]
    fn test_forced_overrides_keywords() {
        assert_eq!(
            detect_service_type("SELECT * FROM x", Some(ServiceType::General)),
            ServiceType::General
        );
        assert_eq!(
            detect_service_type("cześć", Some(ServiceType::Erp)),
            ServiceType::Erp
        );
    }
}
