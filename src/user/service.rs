// User service
// Hashes incoming passwords before they reach the repository; everything else
// passes through

use super::{CreateUserDto, UpdateUserDto, UserEntity, UserError, UserRepository};
use crate::crypto::PasswordManager;
use std::sync::Arc;
use tracing::info;

pub struct UserService {
    repository: Arc<dyn UserRepository>,
    passwords: Arc<dyn PasswordManager>,
}

impl UserService {
    pub fn new(repository: Arc<dyn UserRepository>, passwords: Arc<dyn PasswordManager>) -> Self {
        Self {
            repository,
            passwords,
        }
    }

    pub async fn get_by_login(&self, login: &str) -> Result<UserEntity, UserError> {
        self.repository.get_by_login(login).await
    }

    pub async fn create(&self, dto: CreateUserDto) -> Result<UserEntity, UserError> {
        let password = self.passwords.hash(&dto.password)?;

        let user = self
            .repository
            .create(CreateUserDto {
                login: dto.login,
                password,
            })
            .await?;

        info!("Created user {}", user.id);

        Ok(user)
    }

    pub async fn update(&self, id: u32, dto: UpdateUserDto) -> Result<UserEntity, UserError> {
        let password = match &dto.password {
            Some(password) => Some(self.passwords.hash(password)?),
            None => None,
        };

        self.repository
            .update(
                id,
                UpdateUserDto {
                    login: dto.login,
                    password,
                },
            )
            .await
    }
}
