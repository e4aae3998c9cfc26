use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::models::catalog::{Author, Book};

#[derive(Deserialize)]
pub struct AuthorPayload {
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthorResponse {
    pub id: i64,
    pub name: String,
    pub books: Vec<BookResponse>,
    pub books_count: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl AuthorResponse {
    pub fn new(author: Author, books: Vec<BookResponse>) -> Self {
        Self {
            id: author.id,
            name: author.name,
            books_count: books.len() as u64,
            books,
            created_at: author.created_at,
            updated_at: author.updated_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookPayload {
    pub title: Option<String>,
    pub publication_year: Option<i32>,
    pub author: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookResponse {
    pub id: i64,
    pub title: String,
    pub publication_year: i32,
    pub author: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<Book> for BookResponse {
    fn from(book: Book) -> Self {
        Self {
            id: book.id,
            title: book.title,
            publication_year: book.publication_year,
            author: book.author_id,
            created_at: book.created_at,
            updated_at: book.updated_at,
        }
    }
}

#[derive(Deserialize)]
pub struct BulkDelete {
    #[serde(default)]
    pub ids: Vec<i64>,
}
