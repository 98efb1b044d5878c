use serde_derive::Serialize;

use crate::db::ReadTx;
use crate::engagement;
use crate::types::{CoreResult, UserId};
use crate::users::User;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Profile {
    pub id: UserId,
    pub username: String,
    pub bio: Option<String>,
    pub image: Option<String>,
    pub following: bool,
}

impl Profile {
    /// `user_id` as seen by `viewer`; anonymous viewers never follow anyone.
    pub fn load(tx: &mut ReadTx<'_>, viewer: Option<UserId>, user_id: UserId) -> CoreResult<Profile> {
        let user = User::get_by_id(tx, user_id)?;
        let following = match viewer {
            Some(viewer) => engagement::is_following(tx, viewer, user.id)?,
            None => false,
        };
        Ok(Profile::of(user, following))
    }

    pub fn of(user: User, following: bool) -> Profile {
        Profile {
            id: user.id,
            username: user.username,
            bio: user.bio,
            image: user.image,
            following,
        }
    }
}
