use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    Json,
};
use hyper::StatusCode;
use tracing::{info, warn};

use crate::{
    extractors::{
        app_extractors::{AppJson, AppPath},
        auth_extractor::RequiredUser,
    },
    models::catalog::Library,
    structs::{
        catalog::BookResponse,
        library::{
            LibrarianResponse, LibraryBookPayload, LibraryDetail, LibraryResponse, NamePayload,
        },
    },
    utils::{
        app_error::{AppError, FieldErrors},
        book::NAME_MAX_LEN,
        pagination::{PaginatedResponse, PaginationParams},
    },
    AppState,
};

async fn existing_library(app_state: &AppState, id: i64) -> Result<Library, AppError> {
    app_state
        .store
        .library_by_id(id)
        .await?
        .ok_or_else(AppError::not_found)
}

fn checked_name(payload: &NamePayload) -> Result<String, AppError> {
    let name = payload.name.as_deref().map(str::trim);
    let mut errors = FieldErrors::default();
    errors.check_text("name", name, false, NAME_MAX_LEN);
    errors.into_result()?;
    Ok(name.unwrap_or_default().to_string())
}

pub async fn list_libraries_route(
    State(app_state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<PaginatedResponse<LibraryResponse>>, AppError> {
    let page = PaginationParams::from_query(&params)?;
    let libraries = app_state.store.list_libraries(page).await?;
    let results = libraries
        .items
        .into_iter()
        .map(LibraryResponse::from)
        .collect();
    Ok(Json(PaginatedResponse::new(page, libraries.count, results)?))
}

pub async fn get_library_route(
    State(app_state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<LibraryDetail>, AppError> {
    let library = existing_library(&app_state, id).await?;
    let librarian = app_state.store.librarian_for_library(library.id).await?;
    let books = app_state.store.library_books(library.id).await?;

    Ok(Json(LibraryDetail {
        library: library.into(),
        librarian: librarian.map(LibrarianResponse::from),
        books: books.into_iter().map(BookResponse::from).collect(),
    }))
}

pub async fn create_library_route(
    State(app_state): State<AppState>,
    RequiredUser(auth_user): RequiredUser,
    AppJson(payload): AppJson<NamePayload>,
) -> Result<(StatusCode, Json<LibraryResponse>), AppError> {
    let name = checked_name(&payload)?;

    let library = app_state.store.create_library(name).await?;
    info!("Admin {} opened library {}", auth_user.id, library.id);
    Ok((StatusCode::CREATED, Json(library.into())))
}

pub async fn assign_librarian_route(
    State(app_state): State<AppState>,
    RequiredUser(auth_user): RequiredUser,
    AppPath(id): AppPath<i64>,
    AppJson(payload): AppJson<NamePayload>,
) -> Result<Json<LibrarianResponse>, AppError> {
    let library = existing_library(&app_state, id).await?;
    let name = checked_name(&payload)?;

    let librarian = app_state.store.assign_librarian(library.id, name).await?;
    info!(
        "Admin {} made librarian {} responsible for library {}",
        auth_user.id, librarian.id, library.id
    );
    Ok(Json(librarian.into()))
}

pub async fn add_library_book_route(
    State(app_state): State<AppState>,
    RequiredUser(auth_user): RequiredUser,
    AppPath(id): AppPath<i64>,
    AppJson(payload): AppJson<LibraryBookPayload>,
) -> Result<Json<LibraryDetail>, AppError> {
    let library = existing_library(&app_state, id).await?;
    let book_id = payload
        .book
        .ok_or_else(|| AppError::field_error("book", "This field is required."))?;

    if app_state.store.book_by_id(book_id).await?.is_none() {
        warn!("User {} tried to shelve unknown book {book_id}", auth_user.id);
        return Err(AppError::field_error(
            "book",
            format!("Invalid pk \"{book_id}\" - object does not exist."),
        ));
    }

    app_state.store.add_library_book(library.id, book_id).await?;
    info!("User {} added book {book_id} to library {}", auth_user.id, library.id);
    get_library_route(State(app_state), AppPath(library.id)).await
}

pub async fn remove_library_book_route(
    State(app_state): State<AppState>,
    RequiredUser(auth_user): RequiredUser,
    AppPath((id, book_id)): AppPath<(i64, i64)>,
) -> Result<StatusCode, AppError> {
    let library = existing_library(&app_state, id).await?;
    app_state
        .store
        .remove_library_book(library.id, book_id)
        .await?;
    info!(
        "User {} removed book {book_id} from library {}",
        auth_user.id, library.id
    );
    Ok(StatusCode::NO_CONTENT)
}
