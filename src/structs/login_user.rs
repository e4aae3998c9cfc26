use serde::Deserialize;

#[derive(Deserialize)]
pub struct LoginUser {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}
