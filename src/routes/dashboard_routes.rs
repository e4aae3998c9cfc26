use axum::{extract::State, Json};

use crate::{
    extractors::auth_extractor::RequiredUser,
    models::account::User,
    structs::{library::DashboardResponse, user::PublicUser},
    utils::app_error::AppError,
    AppState,
};

async fn dashboard(
    app_state: &AppState,
    auth_user: User,
    title: &'static str,
) -> Result<Json<DashboardResponse>, AppError> {
    let stats = app_state.store.stats().await?;
    Ok(Json(DashboardResponse {
        title,
        user: PublicUser::from(&auth_user),
        stats: stats.into(),
    }))
}

pub async fn admin_dashboard_route(
    State(app_state): State<AppState>,
    RequiredUser(auth_user): RequiredUser,
) -> Result<Json<DashboardResponse>, AppError> {
    dashboard(&app_state, auth_user, "Admin Dashboard").await
}

pub async fn librarian_dashboard_route(
    State(app_state): State<AppState>,
    RequiredUser(auth_user): RequiredUser,
) -> Result<Json<DashboardResponse>, AppError> {
    dashboard(&app_state, auth_user, "Librarian Dashboard").await
}

pub async fn member_dashboard_route(
    State(app_state): State<AppState>,
    RequiredUser(auth_user): RequiredUser,
) -> Result<Json<DashboardResponse>, AppError> {
    dashboard(&app_state, auth_user, "Member Dashboard").await
}
