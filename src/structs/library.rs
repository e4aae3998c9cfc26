use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::models::catalog::{Librarian, Library, Stats};

use super::{catalog::BookResponse, user::PublicUser};

#[derive(Deserialize)]
pub struct NamePayload {
    pub name: Option<String>,
}

#[derive(Deserialize)]
pub struct LibraryBookPayload {
    pub book: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct LibraryResponse {
    pub id: i64,
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<Library> for LibraryResponse {
    fn from(library: Library) -> Self {
        Self {
            id: library.id,
            name: library.name,
            created_at: library.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LibrarianResponse {
    pub id: i64,
    pub name: String,
    pub library: i64,
}

impl From<Librarian> for LibrarianResponse {
    fn from(librarian: Librarian) -> Self {
        Self {
            id: librarian.id,
            name: librarian.name,
            library: librarian.library_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LibraryDetail {
    #[serde(flatten)]
    pub library: LibraryResponse,
    pub librarian: Option<LibrarianResponse>,
    pub books: Vec<BookResponse>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub users: u64,
    pub posts: u64,
    pub comments: u64,
    pub authors: u64,
    pub books: u64,
    pub libraries: u64,
}

impl From<Stats> for StatsResponse {
    fn from(stats: Stats) -> Self {
        Self {
            users: stats.users,
            posts: stats.posts,
            comments: stats.comments,
            authors: stats.authors,
            books: stats.books,
            libraries: stats.libraries,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub title: &'static str,
    pub user: PublicUser,
    pub stats: StatsResponse,
}
