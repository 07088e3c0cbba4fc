// PostgreSQL user repository
// Parameterized queries over a sqlx connection pool; partial updates build
// their SET clause dynamically

use super::{CreateUserDto, UpdateUserDto, UserEntity, UserError, UserRepository};
use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::{Postgres, QueryBuilder};

// SQLSTATE for unique-constraint violations
const UNIQUE_VIOLATION: &str = "23505";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i32,
    login: String,
    password: String,
}

impl From<UserRow> for UserEntity {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id as u32,
            login: row.login,
            password: row.password,
        }
    }
}

fn database_error(err: sqlx::Error) -> UserError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return UserError::AlreadyExists;
        }
    }

    UserError::Database(err.to_string())
}

/// `UserRepository` backed by PostgreSQL
pub struct PostgresUserRepository {
    pool: PgPool,
}

impl PostgresUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn get_by_login(&self, login: &str) -> Result<UserEntity, UserError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, login, password FROM users WHERE login = $1",
        )
        .bind(login)
        .fetch_optional(&self.pool)
        .await
        .map_err(database_error)?;

        row.map(UserEntity::from).ok_or(UserError::NotFound)
    }

    async fn create(&self, dto: CreateUserDto) -> Result<UserEntity, UserError> {
        let row = sqlx::query_as::<_, UserRow>(
            "INSERT INTO users (login, password) VALUES ($1, $2) RETURNING id, login, password",
        )
        .bind(&dto.login)
        .bind(&dto.password)
        .fetch_one(&self.pool)
        .await
        .map_err(database_error)?;

        Ok(row.into())
    }

    async fn update(&self, id: u32, dto: UpdateUserDto) -> Result<UserEntity, UserError> {
        if dto.login.is_none() && dto.password.is_none() {
            return Err(UserError::NoUpdateParams);
        }

        let mut builder = QueryBuilder::<Postgres>::new("UPDATE users SET ");
        let mut updates = builder.separated(", ");

        if let Some(login) = &dto.login {
            updates.push("login = ");
            updates.push_bind_unseparated(login);
        }

        if let Some(password) = &dto.password {
            updates.push("password = ");
            updates.push_bind_unseparated(password);
        }

        builder.push(" WHERE id = ");
        builder.push_bind(id as i32);
        builder.push(" RETURNING id, login, password");

        let row = builder
            .build_query_as::<UserRow>()
            .fetch_optional(&self.pool)
            .await
            .map_err(database_error)?;

        row.map(UserEntity::from).ok_or(UserError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{Generator, SystemGenerator};

    // These tests require a local Postgres with the users table:
    //   CREATE TABLE users (
    //       id SERIAL PRIMARY KEY,
    //       login TEXT NOT NULL UNIQUE,
    //       password TEXT NOT NULL
    //   );
    // Set DATABASE_URL and remove the ignore markers to run them.

    async fn repository() -> PostgresUserRepository {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL is not set");
        let pool = PgPool::connect(&url).await.expect("Failed to connect");

        PostgresUserRepository::new(pool)
    }

    #[tokio::test]
    #[ignore] // Requires a local Postgres instance
    async fn test_create_and_get_by_login() {
        let repository = repository().await;
        let login = format!("user-{}", SystemGenerator::new().random_string(12));

        let created = repository
            .create(CreateUserDto {
                login: login.clone(),
                password: "hash".to_string(),
            })
            .await
            .unwrap();

        let fetched = repository.get_by_login(&login).await.unwrap();
        assert_eq!(created, fetched);

        let duplicate = repository
            .create(CreateUserDto {
                login,
                password: "hash".to_string(),
            })
            .await;
        assert_eq!(duplicate, Err(UserError::AlreadyExists));
    }

    #[tokio::test]
    #[ignore] // Requires a local Postgres instance
    async fn test_update_requires_params() {
        let repository = repository().await;

        let result = repository.update(1, UpdateUserDto::default()).await;

        assert_eq!(result, Err(UserError::NoUpdateParams));
    }

    #[tokio::test]
    #[ignore] // Requires a local Postgres instance
    async fn test_update_missing_user_is_not_found() {
        let repository = repository().await;

        let result = repository
            .update(
                u32::MAX,
                UpdateUserDto {
                    login: Some("renamed".to_string()),
                    password: None,
                },
            )
            .await;

        assert_eq!(result, Err(UserError::NotFound));
    }
}
