use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    Json,
};
use hyper::{Method, StatusCode};
use tracing::info;

use crate::{
    extractors::{
        app_extractors::{AppJson, AppPath},
        auth_extractor::RequiredUser,
    },
    models::catalog::{Author, NewAuthor},
    structs::catalog::{AuthorPayload, AuthorResponse},
    utils::{
        app_error::AppError,
        book::{check_author_name, expand_authors},
        filters::{AuthorFilter, AuthorOrder},
        ordering::{Direction, OrderBy},
        pagination::{PaginatedResponse, PaginationParams},
    },
    AppState,
};

async fn existing_author(app_state: &AppState, id: i64) -> Result<Author, AppError> {
    app_state
        .store
        .author_by_id(id)
        .await?
        .ok_or_else(AppError::not_found)
}

async fn expand_author(app_state: &AppState, author: Author) -> Result<AuthorResponse, AppError> {
    expand_authors(app_state.store.as_ref(), vec![author])
        .await?
        .pop()
        .ok_or_else(AppError::internal_server_error)
}

pub async fn list_authors_route(
    State(app_state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<PaginatedResponse<AuthorResponse>>, AppError> {
    let filter = AuthorFilter::from_query(&params);
    let order = OrderBy::from_query(&params, &[(AuthorOrder::Name, Direction::Asc)]);
    let page = PaginationParams::from_query(&params)?;

    let authors = app_state.store.list_authors(&filter, &order, page).await?;
    let results = expand_authors(app_state.store.as_ref(), authors.items).await?;
    Ok(Json(PaginatedResponse::new(page, authors.count, results)?))
}

pub async fn create_author_route(
    State(app_state): State<AppState>,
    RequiredUser(auth_user): RequiredUser,
    AppJson(author): AppJson<AuthorPayload>,
) -> Result<(StatusCode, Json<AuthorResponse>), AppError> {
    let name = author.name.as_deref().map(str::trim);
    check_author_name(name, false)?;

    let author = app_state
        .store
        .create_author(NewAuthor {
            name: name.unwrap_or_default().to_string(),
        })
        .await?;
    info!("User {} created author {}", auth_user.id, author.id);
    Ok((StatusCode::CREATED, Json(AuthorResponse::new(author, Vec::new()))))
}

pub async fn get_author_route(
    State(app_state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<AuthorResponse>, AppError> {
    let author = existing_author(&app_state, id).await?;
    Ok(Json(expand_author(&app_state, author).await?))
}

pub async fn update_author_route(
    State(app_state): State<AppState>,
    method: Method,
    RequiredUser(auth_user): RequiredUser,
    AppPath(id): AppPath<i64>,
    AppJson(changes): AppJson<AuthorPayload>,
) -> Result<Json<AuthorResponse>, AppError> {
    let author = existing_author(&app_state, id).await?;
    let name = changes.name.as_deref().map(str::trim);
    check_author_name(name, method == Method::PATCH)?;

    let author = match name {
        Some(name) => {
            let author = app_state
                .store
                .update_author(author.id, name.to_string())
                .await?;
            info!("User {} renamed author {}", auth_user.id, author.id);
            author
        }
        None => author,
    };
    Ok(Json(expand_author(&app_state, author).await?))
}

pub async fn delete_author_route(
    State(app_state): State<AppState>,
    RequiredUser(auth_user): RequiredUser,
    AppPath(id): AppPath<i64>,
) -> Result<StatusCode, AppError> {
    let author = existing_author(&app_state, id).await?;
    app_state.store.delete_author(author.id).await?;
    info!("User {} deleted author {} and their books", auth_user.id, author.id);
    Ok(StatusCode::NO_CONTENT)
}
