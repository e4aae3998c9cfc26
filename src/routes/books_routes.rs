use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    Json,
};
use hyper::{Method, StatusCode};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::{
    extractors::{
        app_extractors::{AppJson, AppPath},
        auth_extractor::RequiredUser,
    },
    models::catalog::Book,
    structs::catalog::{BookPayload, BookResponse, BulkDelete},
    utils::{
        app_error::AppError,
        book::{check_authors_exist, check_book_changes, check_new_book, check_new_books},
        filters::{BookFilter, BookOrder},
        ordering::{Direction, OrderBy},
        pagination::{PaginatedResponse, PaginationParams},
    },
    AppState,
};

async fn existing_book(app_state: &AppState, id: i64) -> Result<Book, AppError> {
    app_state
        .store
        .book_by_id(id)
        .await?
        .ok_or_else(AppError::not_found)
}

pub async fn list_books_route(
    State(app_state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<PaginatedResponse<BookResponse>>, AppError> {
    let filter = BookFilter::from_query(&params)?;
    let order = OrderBy::from_query(&params, &[(BookOrder::Title, Direction::Asc)]);
    let page = PaginationParams::from_query(&params)?;

    let books = app_state.store.list_books(&filter, &order, page).await?;
    let results = books.items.into_iter().map(BookResponse::from).collect();
    Ok(Json(PaginatedResponse::new(page, books.count, results)?))
}

pub async fn create_book_route(
    State(app_state): State<AppState>,
    RequiredUser(auth_user): RequiredUser,
    AppJson(book): AppJson<BookPayload>,
) -> Result<(StatusCode, Json<BookResponse>), AppError> {
    let new_book = check_new_book(&book)?;
    check_authors_exist(app_state.store.as_ref(), &[new_book.author_id]).await?;

    let book = app_state
        .store
        .create_books(vec![new_book])
        .await?
        .pop()
        .ok_or_else(AppError::internal_server_error)?;
    info!("User {} created book {}", auth_user.id, book.id);
    Ok((StatusCode::CREATED, Json(book.into())))
}

pub async fn get_book_route(
    State(app_state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<BookResponse>, AppError> {
    Ok(Json(existing_book(&app_state, id).await?.into()))
}

pub async fn update_book_route(
    State(app_state): State<AppState>,
    method: Method,
    RequiredUser(auth_user): RequiredUser,
    AppPath(id): AppPath<i64>,
    AppJson(book): AppJson<BookPayload>,
) -> Result<Json<BookResponse>, AppError> {
    let current = existing_book(&app_state, id).await?;
    let changes = check_book_changes(&book, method == Method::PATCH)?;
    if let Some(author_id) = changes.author_id {
        check_authors_exist(app_state.store.as_ref(), &[author_id]).await?;
    }

    let book = app_state.store.update_book(current.id, changes).await?;
    info!("User {} edited book {}", auth_user.id, book.id);
    Ok(Json(book.into()))
}

pub async fn delete_book_route(
    State(app_state): State<AppState>,
    RequiredUser(auth_user): RequiredUser,
    AppPath(id): AppPath<i64>,
) -> Result<StatusCode, AppError> {
    let book = existing_book(&app_state, id).await?;
    app_state.store.delete_book(book.id).await?;
    info!("User {} deleted book {}", auth_user.id, book.id);
    Ok(StatusCode::NO_CONTENT)
}

/// Creates every book or none of them.
pub async fn bulk_create_books_route(
    State(app_state): State<AppState>,
    RequiredUser(auth_user): RequiredUser,
    AppJson(books): AppJson<Vec<BookPayload>>,
) -> Result<(StatusCode, Json<Vec<BookResponse>>), AppError> {
    if books.is_empty() {
        warn!("User {} sent an empty bulk create", auth_user.id);
        return Err(AppError::bad_request("Expected a non-empty list of books."));
    }
    let new_books = check_new_books(&books)?;

    let mut author_ids: Vec<i64> = new_books.iter().map(|b| b.author_id).collect();
    author_ids.sort_unstable();
    author_ids.dedup();
    check_authors_exist(app_state.store.as_ref(), &author_ids).await?;

    let created = app_state.store.create_books(new_books).await?;
    info!("User {} created {} books", auth_user.id, created.len());
    Ok((
        StatusCode::CREATED,
        Json(created.into_iter().map(BookResponse::from).collect()),
    ))
}

pub async fn bulk_delete_books_route(
    State(app_state): State<AppState>,
    RequiredUser(auth_user): RequiredUser,
    AppJson(bulk): AppJson<BulkDelete>,
) -> Result<Json<Value>, AppError> {
    if bulk.ids.is_empty() {
        warn!("User {} sent an empty bulk delete", auth_user.id);
        return Err(AppError::field_error("ids", "This list may not be empty."));
    }
    let deleted = app_state.store.delete_books(&bulk.ids).await?;
    info!("User {} deleted {deleted} books", auth_user.id);
    Ok(Json(json!({ "deleted": deleted })))
}
