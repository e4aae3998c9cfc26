use time::OffsetDateTime;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Author {
    pub id: i64,
    pub name: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

pub struct NewAuthor {
    pub name: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub publication_year: i32,
    pub author_id: i64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewBook {
    pub title: String,
    pub publication_year: i32,
    pub author_id: i64,
}

#[derive(Default)]
pub struct BookChanges {
    pub title: Option<String>,
    pub publication_year: Option<i32>,
    pub author_id: Option<i64>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Library {
    pub id: i64,
    pub name: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Librarian {
    pub id: i64,
    pub name: String,
    pub library_id: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub users: u64,
    pub posts: u64,
    pub comments: u64,
    pub authors: u64,
    pub books: u64,
    pub libraries: u64,
}
