use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde_derive::Serialize;

use crate::db::{self, ReadTx};

pub type EntityId = i64;
pub type UserId = EntityId;
pub type ArticleId = EntityId;
pub type TagId = EntityId;
pub type CommentId = EntityId;

/// Checks a piece of caller input before it reaches a store.
pub trait Validate
where
    Self: Sized,
{
    fn validate(self, tx: &mut ReadTx<'_>) -> CoreResult<Self>;
}

#[derive(Debug)]
pub enum CoreError {
    Validation(ValidationError),
    NotFound(String),
    Authorization(String),
    Conflict(String),
    Storage(db::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn not_found<S: Into<String>>(what: S) -> Self {
        CoreError::NotFound(what.into())
    }

    pub fn invalid<K: Into<String>, V: Into<String>>(key: K, val: V) -> Self {
        CoreError::Validation(ValidationError::from(key, val))
    }
}

impl From<DieselError> for CoreError {
    fn from(err: DieselError) -> CoreError {
        match err {
            DieselError::NotFound => CoreError::NotFound("record not found".to_owned()),
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                CoreError::Conflict(info.message().to_owned())
            }
            DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info) => {
                CoreError::NotFound(format!("referenced entity does not exist ({})", info.message()))
            }
            other => CoreError::Storage(other.into()),
        }
    }
}

impl From<db::Error> for CoreError {
    fn from(err: db::Error) -> CoreError {
        CoreError::Storage(err)
    }
}

impl From<ValidationError> for CoreError {
    fn from(err: ValidationError) -> CoreError {
        CoreError::Validation(err)
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CoreError::Validation(e) => write!(f, "invalid input: {}", e),
            CoreError::NotFound(what) => write!(f, "not found: {}", what),
            CoreError::Authorization(why) => write!(f, "not allowed: {}", why),
            CoreError::Conflict(what) => write!(f, "conflict: {}", what),
            CoreError::Storage(e) => write!(f, "storage failure: {}", e),
        }
    }
}

impl StdError for CoreError {}

/// Field name to the messages collected for it.
#[derive(Debug, Serialize, Default, PartialEq)]
pub struct ValidationError(BTreeMap<String, Vec<String>>);

impl ValidationError {
    pub fn add_error<K: Into<String>, V: Into<String>>(&mut self, key: K, val: V) {
        let entry = self.0.entry(key.into()).or_default();
        entry.push(val.into());
    }

    pub fn from<K: Into<String>, V: Into<String>>(key: K, val: V) -> Self {
        let mut error = ValidationError::default();
        error.add_error(key, val);
        error
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn merge(&mut self, other: ValidationError) {
        for (key, errors) in other.0.into_iter() {
            let entry = self.0.entry(key).or_default();
            entry.extend(errors);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn messages(&self, key: &str) -> &[String] {
        self.0.get(key).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// `Ok(())` when nothing was collected, otherwise the collected errors.
    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{}: {}", field, message)?;
                first = false;
            }
        }
        Ok(())
    }
}
