// User accounts module
// Relational storage of user credentials behind a repository trait, plus a
// service layer that owns password hashing

pub mod postgres;
pub mod service;

use crate::crypto::CryptoError;
use async_trait::async_trait;

pub use postgres::PostgresUserRepository;
pub use service::UserService;

/// A stored user row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEntity {
    pub id: u32,
    pub login: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct CreateUserDto {
    pub login: String,
    pub password: String,
}

/// Partial update; at least one field must be present
#[derive(Debug, Clone, Default)]
pub struct UpdateUserDto {
    pub login: Option<String>,
    pub password: Option<String>,
}

/// User-layer errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserError {
    NotFound,
    AlreadyExists,
    NoUpdateParams,
    Crypto(CryptoError),
    Database(String),
}

impl std::fmt::Display for UserError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserError::NotFound => write!(f, "User not found"),
            UserError::AlreadyExists => write!(f, "User already exists"),
            UserError::NoUpdateParams => write!(f, "There are no update params"),
            UserError::Crypto(e) => write!(f, "{}", e),
            UserError::Database(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl std::error::Error for UserError {}

impl From<CryptoError> for UserError {
    fn from(err: CryptoError) -> Self {
        UserError::Crypto(err)
    }
}

/// Storage operations for user accounts
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get_by_login(&self, login: &str) -> Result<UserEntity, UserError>;

    async fn create(&self, dto: CreateUserDto) -> Result<UserEntity, UserError>;

    async fn update(&self, id: u32, dto: UpdateUserDto) -> Result<UserEntity, UserError>;
}
