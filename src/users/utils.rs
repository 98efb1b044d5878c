use diesel::dsl::exists;
use diesel::prelude::*;
use regex::Regex;
use sha2::{Digest, Sha256};

use super::models::PasswordHasher;
use crate::db::schema::users;
use crate::db::ReadTx;
use crate::types::{CoreResult, UserId, ValidationError};

lazy_static! {
    static ref EMAIL_RE: Regex = {
        let pattern = r"\A[a-z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[a-z0-9!#$%&'*+/=?^_`{|}~-]+)*@(?:[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\.)+[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\z";
        Regex::new(pattern).unwrap()
    };
}

pub fn validate_email_re(email: &str) -> Result<(), ValidationError> {
    if !EMAIL_RE.is_match(email) {
        Err(ValidationError::from(
            "email",
            format!("Invalid email: {}", email),
        ))
    } else {
        Ok(())
    }
}

pub fn validate_username_re(username: &str) -> Result<(), ValidationError> {
    if username.trim().is_empty() {
        Err(ValidationError::from("username", "username is required"))
    } else if username.chars().count() < 3 {
        Err(ValidationError::from(
            "username",
            format!("username too short: {}", username),
        ))
    } else {
        Ok(())
    }
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.len() < 5 {
        Err(ValidationError::from("password", "password too short"))
    } else {
        Ok(())
    }
}

/// Whether another user (not `except`) already holds this email.
pub fn email_taken(tx: &mut ReadTx<'_>, email: &str, except: Option<UserId>) -> CoreResult<bool> {
    let query = users::table
        .filter(users::email.eq(email))
        .filter(users::id.ne(except.unwrap_or(0)));
    Ok(diesel::select(exists(query)).get_result(tx.conn())?)
}

pub fn username_taken(
    tx: &mut ReadTx<'_>,
    username: &str,
    except: Option<UserId>,
) -> CoreResult<bool> {
    let query = users::table
        .filter(users::username.eq(username))
        .filter(users::id.ne(except.unwrap_or(0)));
    Ok(diesel::select(exists(query)).get_result(tx.conn())?)
}

/// Salted SHA-256 digest of a password.
#[derive(Debug, Clone)]
pub struct Sha256Hasher {
    salt: String,
}

impl Sha256Hasher {
    pub fn new<S: Into<String>>(salt: S) -> Self {
        Sha256Hasher { salt: salt.into() }
    }
}

impl PasswordHasher for Sha256Hasher {
    fn hash(&self, password: &str) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(self.salt.as_bytes());
        hasher.update(password.as_bytes());
        hasher.finalize().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shape_is_checked() {
        assert!(validate_email_re("admin@example.com").is_ok());
        assert!(validate_email_re("admin@").is_err());
        assert!(validate_email_re("not an email").is_err());
    }

    #[test]
    fn short_usernames_and_passwords_are_rejected() {
        assert!(validate_username_re("ab").is_err());
        assert!(validate_username_re("   ").is_err());
        assert!(validate_username_re("abc").is_ok());
        assert!(validate_password("1234").is_err());
        assert!(validate_password("12345").is_ok());
    }

    #[test]
    fn digest_depends_on_salt() {
        let a = Sha256Hasher::new("a").hash("secret");
        let b = Sha256Hasher::new("b").hash("secret");
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
        assert_eq!(a, Sha256Hasher::new("a").hash("secret"));
    }
}
