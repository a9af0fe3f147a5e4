/// Password hashing and verification using Argon2id
///
/// The credential store owns nothing but its work factor:
/// - Algorithm: Argon2id (memory-hard)
/// - Memory / iterations / lanes: taken from `AuthConfig`
/// - Salt: 16 bytes random, embedded in the PHC string
///
/// Hashing is CPU bound, so the async entry points run it on the blocking pool.
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params,
};
use devforge_core::AuthConfig;
use thiserror::Error;

/// Characters accepted as the "special character" class of the password policy
pub const PASSWORD_SPECIAL_CHARS: &str = "@$!%*?&";

/// Minimum password length in characters
pub const PASSWORD_MIN_LENGTH: usize = 8;

/// Password hashing and verification errors
#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("Failed to hash password: {0}")]
    HashingFailed(String),

    #[error("Failed to verify password: {0}")]
    VerificationFailed(String),

    #[error("Invalid password hash format")]
    InvalidHashFormat,

    #[error("Password worker failed: {0}")]
    WorkerFailed(String),
}

/// Password hashing configuration
#[derive(Debug, Clone)]
pub struct PasswordConfig {
    /// Memory cost in KiB (default: 65536 = 64 MB)
    pub memory_cost: u32,
    /// Time cost (iterations, default: 3)
    pub time_cost: u32,
    /// Parallelism (lanes, default: 4)
    pub parallelism: u32,
    /// Output length in bytes (default: 32)
    pub output_len: Option<usize>,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_cost: 65536, // 64 MB
            time_cost: 3,
            parallelism: 4,
            output_len: Some(32),
        }
    }
}

impl PasswordConfig {
    pub fn from_auth_config(auth: &AuthConfig) -> Self {
        Self {
            memory_cost: auth.password_memory_kib,
            time_cost: auth.password_time_cost,
            parallelism: auth.password_parallelism,
            output_len: Some(32),
        }
    }

    /// Create Argon2 parameters from this configuration
    fn to_params(&self) -> Result<Params, PasswordError> {
        Params::new(
            self.memory_cost,
            self.time_cost,
            self.parallelism,
            self.output_len,
        )
        .map_err(|e| PasswordError::HashingFailed(e.to_string()))
    }
}

/// Adaptive password hashing service
///
/// Cheap to clone; hashing happens on tokio's blocking pool so unrelated
/// requests keep being served while a hash is computed.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    config: PasswordConfig,
}

impl CredentialStore {
    pub fn new(config: PasswordConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PasswordConfig {
        &self.config
    }

    /// Hash a plaintext password into a PHC string
    pub async fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let password = password.to_owned();
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || hash_password_with_config(&password, &config))
            .await
            .map_err(|e| PasswordError::WorkerFailed(e.to_string()))?
    }

    /// Verify a plaintext password against a stored PHC string
    pub async fn verify(&self, password: &str, hash: &str) -> Result<bool, PasswordError> {
        let password = password.to_owned();
        let hash = hash.to_owned();
        tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| PasswordError::WorkerFailed(e.to_string()))?
    }
}

/// Hash a password with custom configuration
///
/// # Returns
///
/// * `Ok(String)` - PHC string format hash (algorithm, parameters, salt, and hash)
/// * `Err(PasswordError)` - If hashing fails
pub fn hash_password_with_config(
    password: &str,
    config: &PasswordConfig,
) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);

    let params = config.to_params()?;
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| PasswordError::HashingFailed(e.to_string()))?;

    Ok(password_hash.to_string())
}

/// Verify a plaintext password against a stored hash
///
/// Parameters are read back from the PHC string, so hashes produced with an
/// older work factor keep verifying after the configuration changes.
///
/// # Returns
///
/// * `Ok(true)` - Password matches
/// * `Ok(false)` - Password does not match
/// * `Err(PasswordError)` - If the stored hash is malformed
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| PasswordError::InvalidHashFormat)?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::VerificationFailed(e.to_string())),
    }
}

/// Validate password strength
///
/// Checks if a password meets the account policy:
/// - At least 8 characters
/// - At least 1 lowercase and 1 uppercase ASCII letter
/// - At least 1 digit
/// - At least 1 special character from `@$!%*?&`
///
/// # Example
///
/// ```
/// use devforge_api::auth::password::validate_password_strength;
///
/// assert!(validate_password_strength("Abcdef1!").is_ok());
/// assert!(validate_password_strength("weak").is_err());
/// ```
pub fn validate_password_strength(password: &str) -> Result<(), String> {
    if password.chars().count() < PASSWORD_MIN_LENGTH {
        return Err("Password must be at least 8 characters long".to_string());
    }

    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err("Password must contain at least one lowercase letter".to_string());
    }

    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err("Password must contain at least one uppercase letter".to_string());
    }

    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain at least one number".to_string());
    }

    if !password.chars().any(|c| PASSWORD_SPECIAL_CHARS.contains(c)) {
        return Err(format!(
            "Password must contain at least one special character ({PASSWORD_SPECIAL_CHARS})"
        ));
    }

    Ok(())
}
