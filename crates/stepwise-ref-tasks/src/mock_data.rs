//! Fictional data sources for the reference tasks.
//!
//! Nothing here contacts an external system.

use serde_json::{json, Value};

// ── Book catalogue (mock) ────────────────────────────────────────────────────

const CATALOGUE: &[(&str, &str, u32, &str)] = &[
    ("The Lighthouse Ledger", "Mara Quill", 2024, "mystery"),
    ("Salt and Circuitry", "Idris Vane", 2024, "science fiction"),
    ("Nine Winters North", "Hale Okonkwo", 2023, "adventure"),
    ("The Quiet Compiler", "Ines Marlowe", 2024, "science fiction"),
    ("Orchard of Small Hours", "Tomas Reyes", 2022, "literary"),
    ("A Map of Lost Rivers", "Priya Lenart", 2024, "adventure"),
];

/// Books whose genre or title contains `query` (case-insensitive),
/// optionally restricted to `year`.
pub fn search_books(query: &str, year: Option<u32>) -> Vec<Value> {
    let query = query.to_lowercase();
    CATALOGUE
        .iter()
        .filter(|(title, _, book_year, genre)| {
            (genre.contains(&query) || title.to_lowercase().contains(&query))
                && year.map_or(true, |y| y == *book_year)
        })
        .map(|(title, author, year, genre)| {
            json!({ "title": title, "author": author, "year": year, "genre": genre })
        })
        .collect()
}

// ── Gazetteer (mock) ─────────────────────────────────────────────────────────

/// Capital city and population (millions) of a handful of countries.
pub fn capital_of(country: &str) -> Option<(&'static str, f64)> {
    match country.to_lowercase().as_str() {
        "france" => Some(("Paris", 2.1)),
        "japan" => Some(("Tokyo", 14.0)),
        "kenya" => Some(("Nairobi", 4.4)),
        "peru" => Some(("Lima", 10.0)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_matches_genre_and_year() {
        let hits = search_books("Science Fiction", Some(2024));
        let titles: Vec<&str> = hits.iter().filter_map(|b| b["title"].as_str()).collect();
        assert_eq!(titles, vec!["Salt and Circuitry", "The Quiet Compiler"]);
        assert!(search_books("romance", None).is_empty());
    }

    #[test]
    fn gazetteer_is_case_insensitive() {
        assert_eq!(capital_of("FRANCE"), Some(("Paris", 2.1)));
        assert_eq!(capital_of("atlantis"), None);
    }
}
