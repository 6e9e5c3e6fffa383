//! Password hashing
//!
//! Stored hashes are Argon2id PHC strings, each with its own random salt.
//! The parameters used at hashing time travel inside the string, so changing
//! them later does not invalidate existing users.
use crate::error::{AuctionSiteError, Result};
use argon2::password_hash::{PasswordHash, SaltString};
use argon2::{Algorithm, Argon2, Params, PasswordHasher as _, PasswordVerifier as _, Version};
use rand::rngs::OsRng;
use std::sync::Arc;

pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> Result<String>;
    fn verify(&self, password: &str, stored: &str) -> bool;
}

pub type SharedPasswordHasher = Arc<dyn PasswordHasher>;

#[derive(Debug, Clone)]
pub struct Argon2Hasher {
    params: Params,
}

impl Argon2Hasher {
    pub const DEFAULT_TIME_COST: u32 = Params::DEFAULT_T_COST;
    pub const DEFAULT_MEMORY_KIB: u32 = Params::DEFAULT_M_COST;

    /// `time_cost` passes over `memory_kib` KiB of memory
    pub fn new(time_cost: u32, memory_kib: u32) -> Result<Self> {
        let params = Params::new(memory_kib, time_cost, Params::DEFAULT_P_COST, None)
            .map_err(|e| AuctionSiteError::ArgumentOutOfRange(format!("argon2 parameters: {e}")))?;
        Ok(Self { params })
    }

    pub fn new_shared(time_cost: u32, memory_kib: u32) -> Result<SharedPasswordHasher> {
        Ok(Arc::new(Self::new(time_cost, memory_kib)?))
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl Default for Argon2Hasher {
    fn default() -> Self {
        Self {
            params: Params::default(),
        }
    }
}

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        Ok(self
            .argon2()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AuctionSiteError::ArgumentInvalid(format!("password cannot be hashed: {e}")))?
            .to_string())
    }

    fn verify(&self, password: &str, stored: &str) -> bool {
        let Ok(hash) = PasswordHash::new(stored) else {
            return false;
        };
        self.argon2()
            .verify_password(password.as_bytes(), &hash)
            .is_ok()
    }
}
