use diesel::prelude::*;
use serde_derive::Serialize;

use crate::db::schema::users;
use crate::db::{ReadTx, WriteTx};
use crate::types::{CoreError, CoreResult, UserId};

/// Turns a plaintext password into the stored credential.
pub trait PasswordHasher {
    fn hash(&self, password: &str) -> Vec<u8>;

    fn verify(&self, password: &str, stored: &[u8]) -> bool {
        self.hash(password) == stored
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize, AsChangeset)]
#[diesel(table_name = users)]
#[diesel(treat_none_as_null = true)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Vec<u8>,
    pub bio: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub password_hash: Vec<u8>,
    pub bio: Option<String>,
    pub image: Option<String>,
}

impl User {
    /// Inserts the row. A taken username or email is a `Conflict`.
    pub fn create(tx: &mut WriteTx<'_>, new_user: &NewUser) -> CoreResult<User> {
        diesel::insert_into(users::table)
            .values(new_user)
            .execute(tx.conn())?;
        User::get_by_id(tx, new_user.id)
    }

    pub fn get_by_id(tx: &mut ReadTx<'_>, user_id: UserId) -> CoreResult<User> {
        users::table
            .find(user_id)
            .select(User::as_select())
            .first(tx.conn())
            .optional()?
            .ok_or_else(|| CoreError::not_found(format!("user {}", user_id)))
    }

    pub fn by_username(tx: &mut ReadTx<'_>, name: &str) -> CoreResult<Option<User>> {
        Ok(users::table
            .filter(users::username.eq(name))
            .select(User::as_select())
            .first(tx.conn())
            .optional()?)
    }

    pub fn by_email(tx: &mut ReadTx<'_>, email: &str) -> CoreResult<Option<User>> {
        Ok(users::table
            .filter(users::email.eq(email))
            .select(User::as_select())
            .first(tx.conn())
            .optional()?)
    }

    pub fn exists(tx: &mut ReadTx<'_>, user_id: UserId) -> CoreResult<bool> {
        Ok(diesel::select(diesel::dsl::exists(users::table.find(user_id))).get_result(tx.conn())?)
    }

    pub fn count(tx: &mut ReadTx<'_>) -> CoreResult<i64> {
        Ok(users::table.count().get_result(tx.conn())?)
    }

    pub(crate) fn save(&self, tx: &mut WriteTx<'_>) -> CoreResult<()> {
        diesel::update(self).set(self).execute(tx.conn())?;
        Ok(())
    }
}
