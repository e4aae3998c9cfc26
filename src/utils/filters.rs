use std::collections::HashMap;

use time::{macros::format_description, Date, OffsetDateTime};

use super::{
    app_error::{AppError, FieldErrors},
    ordering::OrderField,
};

/// Splits `?search=` into lowercase terms; every term has to match one of
/// the searched fields.
pub fn search_terms(params: &HashMap<String, String>) -> Vec<String> {
    params
        .get("search")
        .map(|raw| {
            raw.split(|c: char| c.is_whitespace() || c == ',')
                .filter(|term| !term.is_empty())
                .map(str::to_lowercase)
                .collect()
        })
        .unwrap_or_default()
}

pub fn contains_ci(haystack: &str, lowercase_needle: &str) -> bool {
    haystack.to_lowercase().contains(lowercase_needle)
}

pub fn matches_search(terms: &[String], fields: &[&str]) -> bool {
    terms
        .iter()
        .all(|term| fields.iter().any(|field| contains_ci(field, term)))
}

/// `ILIKE` pattern matching `needle` anywhere, with wildcards escaped.
pub fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn text(params: &HashMap<String, String>, name: &str) -> Option<String> {
    params
        .get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn number<T: std::str::FromStr>(
    params: &HashMap<String, String>,
    name: &str,
    errors: &mut FieldErrors,
) -> Option<T> {
    let raw = text(params, name)?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            errors.add(name, "Enter a number.");
            None
        }
    }
}

fn date(params: &HashMap<String, String>, name: &str, errors: &mut FieldErrors) -> Option<Date> {
    let raw = text(params, name)?;
    match Date::parse(&raw, format_description!("[year]-[month]-[day]")) {
        Ok(date) => Some(date),
        Err(_) => {
            errors.add(name, "Enter a valid date.");
            None
        }
    }
}

fn boolean(
    params: &HashMap<String, String>,
    name: &str,
    errors: &mut FieldErrors,
) -> Option<bool> {
    let raw = text(params, name)?;
    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => {
            errors.add(name, "Enter a valid boolean.");
            None
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub search: Vec<String>,
}

impl UserFilter {
    pub fn from_query(params: &HashMap<String, String>) -> Self {
        Self {
            search: search_terms(params),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub author: Option<i64>,
    /// Restricts to these authors, used by the feed.
    pub authors_in: Option<Vec<i64>>,
    pub search: Vec<String>,
}

impl PostFilter {
    pub fn from_query(params: &HashMap<String, String>) -> Result<Self, AppError> {
        let mut errors = FieldErrors::default();
        let author = number(params, "author", &mut errors);
        errors.into_result()?;
        Ok(Self {
            author,
            authors_in: None,
            search: search_terms(params),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommentFilter {
    pub post: Option<i64>,
    pub author: Option<i64>,
    pub search: Vec<String>,
}

impl CommentFilter {
    pub fn from_query(params: &HashMap<String, String>) -> Result<Self, AppError> {
        let mut errors = FieldErrors::default();
        let post = number(params, "post", &mut errors);
        let author = number(params, "author", &mut errors);
        errors.into_result()?;
        Ok(Self {
            post,
            author,
            search: search_terms(params),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct NotificationFilter {
    pub read: Option<bool>,
}

impl NotificationFilter {
    pub fn from_query(params: &HashMap<String, String>) -> Result<Self, AppError> {
        let mut errors = FieldErrors::default();
        let read = boolean(params, "read", &mut errors);
        errors.into_result()?;
        Ok(Self { read })
    }
}

#[derive(Debug, Clone, Default)]
pub struct AuthorFilter {
    pub search: Vec<String>,
}

impl AuthorFilter {
    pub fn from_query(params: &HashMap<String, String>) -> Self {
        Self {
            search: search_terms(params),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BookFilter {
    pub author: Option<i64>,
    pub publication_year: Option<i32>,
    pub publication_year_gt: Option<i32>,
    pub publication_year_lt: Option<i32>,
    /// Lowercased, matched anywhere in the title.
    pub title: Option<String>,
    /// Lowercased, matched anywhere in the author's name.
    pub author_name: Option<String>,
    pub created_after: Option<Date>,
    pub created_before: Option<Date>,
    pub search: Vec<String>,
}

impl BookFilter {
    pub fn from_query(params: &HashMap<String, String>) -> Result<Self, AppError> {
        let mut errors = FieldErrors::default();
        let filter = Self {
            author: number(params, "author", &mut errors),
            publication_year: number(params, "publication_year", &mut errors),
            publication_year_gt: number(params, "publication_year_gt", &mut errors),
            publication_year_lt: number(params, "publication_year_lt", &mut errors),
            title: text(params, "title").map(|t| t.to_lowercase()),
            author_name: text(params, "author_name").map(|t| t.to_lowercase()),
            created_after: date(params, "created_after", &mut errors),
            created_before: date(params, "created_before", &mut errors),
            search: search_terms(params),
        };
        errors.into_result()?;
        Ok(filter)
    }

    /// Every predicate except those needing the author row.
    pub fn matches_book(
        &self,
        title: &str,
        publication_year: i32,
        author_id: i64,
        created_at: OffsetDateTime,
    ) -> bool {
        let created = created_at.date();
        self.author.map_or(true, |id| id == author_id)
            && self.publication_year.map_or(true, |y| y == publication_year)
            && self.publication_year_gt.map_or(true, |y| publication_year > y)
            && self.publication_year_lt.map_or(true, |y| publication_year < y)
            && self.title.as_deref().map_or(true, |t| contains_ci(title, t))
            && self.created_after.map_or(true, |d| created >= d)
            && self.created_before.map_or(true, |d| created <= d)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UserOrder {
    Username,
    CreatedAt,
}

impl OrderField for UserOrder {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "username" => Some(UserOrder::Username),
            "created_at" => Some(UserOrder::CreatedAt),
            _ => None,
        }
    }

    fn column(self) -> &'static str {
        match self {
            UserOrder::Username => "u.username",
            UserOrder::CreatedAt => "u.created_at",
        }
    }
}

/// Shared by posts and comments, which order on the same timestamps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimestampOrder {
    CreatedAt,
    UpdatedAt,
}

impl OrderField for TimestampOrder {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "created_at" => Some(TimestampOrder::CreatedAt),
            "updated_at" => Some(TimestampOrder::UpdatedAt),
            _ => None,
        }
    }

    fn column(self) -> &'static str {
        match self {
            TimestampOrder::CreatedAt => "created_at",
            TimestampOrder::UpdatedAt => "updated_at",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AuthorOrder {
    Name,
    CreatedAt,
}

impl OrderField for AuthorOrder {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "name" => Some(AuthorOrder::Name),
            "created_at" => Some(AuthorOrder::CreatedAt),
            _ => None,
        }
    }

    fn column(self) -> &'static str {
        match self {
            AuthorOrder::Name => "a.name",
            AuthorOrder::CreatedAt => "a.created_at",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BookOrder {
    Title,
    PublicationYear,
    CreatedAt,
}

impl OrderField for BookOrder {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "title" => Some(BookOrder::Title),
            "publication_year" => Some(BookOrder::PublicationYear),
            "created_at" => Some(BookOrder::CreatedAt),
            _ => None,
        }
    }

    fn column(self) -> &'static str {
        match self {
            BookOrder::Title => "b.title",
            BookOrder::PublicationYear => "b.publication_year",
            BookOrder::CreatedAt => "b.created_at",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::StatusCode;
    use time::macros::{date, datetime};

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn search_terms_split_on_spaces_and_commas() {
        let terms = search_terms(&query(&[("search", "Harry  potter,Rowling")]));
        assert_eq!(terms, vec!["harry", "potter", "rowling"]);
    }

    #[test]
    fn every_term_must_hit_some_field() {
        let terms = vec!["another".to_string(), "two".to_string()];
        assert!(matches_search(&terms, &["Another Book", "Author Two"]));
        assert!(!matches_search(&terms, &["Another Book", "Author One"]));
        assert!(matches_search(&[], &["anything"]));
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn book_filter_rejects_bad_numbers_and_dates() {
        let err = BookFilter::from_query(&query(&[
            ("publication_year", "twenty"),
            ("created_after", "2020-13-01"),
        ]))
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn book_filter_matches_year_ranges_and_dates() {
        let filter = BookFilter::from_query(&query(&[
            ("publication_year_gt", "2019"),
            ("publication_year_lt", "2022"),
            ("title", "book"),
            ("created_after", "2024-01-01"),
        ]))
        .unwrap();
        assert_eq!(filter.created_after, Some(date!(2024 - 01 - 01)));
        let created = datetime!(2024-01-01 10:00 UTC);
        assert!(filter.matches_book("Book One", 2020, 1, created));
        assert!(!filter.matches_book("Book One", 2019, 1, created));
        assert!(!filter.matches_book("Novel", 2020, 1, created));
        assert!(!filter.matches_book("Book One", 2020, 1, datetime!(2023-12-31 23:59 UTC)));
    }

    #[test]
    fn notification_filter_parses_booleans() {
        let filter = NotificationFilter::from_query(&query(&[("read", "false")])).unwrap();
        assert_eq!(filter.read, Some(false));
        assert!(NotificationFilter::from_query(&query(&[("read", "maybe")])).is_err());
    }
}
