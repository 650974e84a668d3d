mod auth;
mod health_check;

pub use auth::{
    force_change_password, forgot_password, login, logout, logout_all, refresh, reset_password,
};
pub use health_check::health_check;
