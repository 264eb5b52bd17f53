use std::io;

use log::error;
use rocket::{
    http::Status,
    request::Request,
    response::{self, status::Custom, Responder},
    serde::json::Json,
};
use serde_json::json;
use thiserror::Error;


pub type AppResult<T> = Result<T, AppError>;


#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Invalid(String),

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Invalid username or password")]
    BadCredentials,

    #[error("Permission denied")]
    Forbidden,

    #[error("Not found")]
    NotFound,

    #[error("{0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(diesel::result::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("File error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("PDF export failed: {0}")]
    Export(String),

    #[error("Initialization failed: {0}")]
    Init(String),
}

impl AppError {
    pub fn invalid<S: Into<String>>(msg: S) -> Self {
        AppError::Invalid(msg.into())
    }

    pub fn status(&self) -> Status {
        match self {
            AppError::Invalid(_) => Status::BadRequest,
            AppError::Unauthenticated | AppError::BadCredentials => Status::Unauthorized,
            AppError::Forbidden => Status::Forbidden,
            AppError::NotFound => Status::NotFound,
            AppError::Conflict(_) => Status::Conflict,
            AppError::Database(_)
            | AppError::Pool(_)
            | AppError::Io(_)
            | AppError::Json(_)
            | AppError::Hash(_)
            | AppError::Export(_)
            | AppError::Init(_) => Status::InternalServerError,
        }
    }
}

impl From<diesel::result::Error> for AppError {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error as DieselError};

        match err {
            DieselError::NotFound => AppError::NotFound,
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                AppError::Conflict(format!("Already exists: {}", info.message()))
            },
            other => AppError::Database(other),
        }
    }
}

impl<'r> Responder<'r, 'static> for AppError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        let status = self.status();
        if status.code >= 500 {
            error!("{} {} failed: {}", req.method(), req.uri(), self);
        }

        Custom(status, Json(json!({ "error": self.to_string() }))).respond_to(req)
    }
}
