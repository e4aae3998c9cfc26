use std::collections::HashMap;

use time::OffsetDateTime;
use tracing::warn;

use crate::{
    models::catalog::{Author, BookChanges, NewBook},
    store::Store,
    structs::catalog::{AuthorResponse, BookPayload, BookResponse},
};

use super::app_error::{AppError, FieldErrors};

pub const NAME_MAX_LEN: usize = 200;
const FORBIDDEN_CHARACTERS: [char; 6] = ['<', '>', '"', '\'', '%', '&'];

fn check_characters(errors: &mut FieldErrors, field: &str, label: &str, value: &str) {
    if value.contains(FORBIDDEN_CHARACTERS) {
        warn!("{label} `{value}` contains invalid characters");
        errors.add(field, format!("{label} contains invalid characters."));
    }
}

pub fn check_author_name(name: Option<&str>, partial: bool) -> Result<(), AppError> {
    let mut errors = FieldErrors::default();
    if errors.check_text("name", name, partial, NAME_MAX_LEN) {
        if let Some(name) = name {
            check_characters(&mut errors, "name", "Name", name);
        }
    }
    errors.into_result()
}

fn check_book_fields(errors: &mut FieldErrors, payload: &BookPayload, partial: bool, prefix: &str) {
    let field = |name: &str| format!("{prefix}{name}");
    let title = payload.title.as_deref();
    if errors.check_text(&field("title"), title, partial, NAME_MAX_LEN) {
        if let Some(title) = title {
            check_characters(errors, &field("title"), "Title", title);
        }
    }

    match payload.publication_year {
        None if !partial => errors.add(&field("publication_year"), "This field is required."),
        Some(year) if year > OffsetDateTime::now_utc().year() => {
            warn!("Publication year {year} is in the future");
            errors.add(
                &field("publication_year"),
                "Publication year cannot be in the future",
            );
        }
        _ => {}
    }

    if payload.author.is_none() && !partial {
        errors.add(&field("author"), "This field is required.");
    }
}

/// Validates a payload and turns it into an insert. The author's existence
/// is checked by the caller.
pub fn check_new_book(payload: &BookPayload) -> Result<NewBook, AppError> {
    let mut errors = FieldErrors::default();
    check_book_fields(&mut errors, payload, false, "");
    errors.into_result()?;
    match (&payload.title, payload.publication_year, payload.author) {
        (Some(title), Some(publication_year), Some(author_id)) => Ok(NewBook {
            title: title.trim().to_string(),
            publication_year,
            author_id,
        }),
        _ => Err(AppError::internal_server_error()),
    }
}

/// Validates a whole batch; errors are keyed `index.field`.
pub fn check_new_books(payloads: &[BookPayload]) -> Result<Vec<NewBook>, AppError> {
    let mut errors = FieldErrors::default();
    for (i, payload) in payloads.iter().enumerate() {
        check_book_fields(&mut errors, payload, false, &format!("{i}."));
    }
    errors.into_result()?;
    payloads.iter().map(check_new_book).collect()
}

pub fn check_book_changes(payload: &BookPayload, partial: bool) -> Result<BookChanges, AppError> {
    let mut errors = FieldErrors::default();
    check_book_fields(&mut errors, payload, partial, "");
    errors.into_result()?;
    Ok(BookChanges {
        title: payload.title.as_deref().map(|t| t.trim().to_string()),
        publication_year: payload.publication_year,
        author_id: payload.author,
    })
}

/// Fails with a 400 on `author` when one of `ids` names no author.
pub async fn check_authors_exist(store: &dyn Store, ids: &[i64]) -> Result<(), AppError> {
    let existing = store.existing_author_ids(ids).await?;
    let mut errors = FieldErrors::default();
    for id in ids.iter().filter(|id| !existing.contains(id)) {
        warn!("Unknown author {id}");
        errors.add(
            "author",
            format!("Invalid pk \"{id}\" - object does not exist."),
        );
    }
    errors.into_result()
}

pub async fn expand_authors(
    store: &dyn Store,
    authors: Vec<Author>,
) -> Result<Vec<AuthorResponse>, AppError> {
    let ids: Vec<i64> = authors.iter().map(|a| a.id).collect();
    let mut books_by_author: HashMap<i64, Vec<BookResponse>> = HashMap::new();
    for book in store.books_for_authors(&ids).await? {
        books_by_author
            .entry(book.author_id)
            .or_default()
            .push(book.into());
    }
    Ok(authors
        .into_iter()
        .map(|author| {
            let books = books_by_author.remove(&author.id).unwrap_or_default();
            AuthorResponse::new(author, books)
        })
        .collect())
}
