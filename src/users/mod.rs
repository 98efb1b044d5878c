use tracing::{debug, info, warn};

use crate::db::{ReadTx, WriteTx};
use crate::id::next_id;
use crate::types::{CoreError, CoreResult, UserId, Validate, ValidationError};

pub mod models;
pub mod utils;

pub use self::models::{NewUser, PasswordHasher, User};
use self::utils::*;

#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl Validate for Registration {
    fn validate(self, tx: &mut ReadTx<'_>) -> CoreResult<Self> {
        let registration = Registration {
            username: self.username.trim().to_owned(),
            email: self.email.trim().to_owned(),
            password: self.password,
        };
        let mut errors = ValidationError::default();

        if let Err(e) = validate_username_re(&registration.username) {
            errors.merge(e);
        } else if username_taken(tx, &registration.username, None)? {
            errors.add_error("username", "username already exists");
        }

        if let Err(e) = validate_email_re(&registration.email) {
            errors.merge(e);
        } else if email_taken(tx, &registration.email, None)? {
            errors.add_error("email", "email already exists");
        }

        if let Err(e) = validate_password(&registration.password) {
            errors.merge(e);
        }

        errors.into_result()?;
        Ok(registration)
    }
}

/// Creates an account after validating the registration.
pub fn register(
    tx: &mut WriteTx<'_>,
    registration: Registration,
    hasher: &dyn PasswordHasher,
) -> CoreResult<User> {
    let registration = registration.validate(tx)?;
    let id = next_id();
    let new_user = NewUser {
        id,
        username: registration.username,
        email: registration.email,
        password_hash: hasher.hash(&registration.password),
        bio: None,
        image: Some(format!("https://i.pravatar.cc/150?u={}", id)),
    };
    let user = User::create(tx, &new_user)?;
    info!("registered user {} ({})", user.username, user.id);
    Ok(user)
}

/// Looks a user up by email and checks the password. Unknown emails and wrong
/// passwords are reported the same way.
pub fn authenticate(
    tx: &mut ReadTx<'_>,
    email: &str,
    password: &str,
    hasher: &dyn PasswordHasher,
) -> CoreResult<User> {
    match User::by_email(tx, email.trim())? {
        Some(user) if hasher.verify(password, &user.password_hash) => {
            debug!("user {} signed in", user.id);
            Ok(user)
        }
        _ => {
            warn!("failed sign-in for {:?}", email);
            Err(CoreError::Authorization("invalid email or password".to_owned()))
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SettingsUpdate {
    pub username: String,
    pub email: String,
    pub image: Option<String>,
    pub bio: Option<String>,
    /// `None` keeps the current credential.
    pub password: Option<String>,
}

/// Applies a settings form to `user_id`. Only the owner may change their
/// own settings.
pub fn update_settings(
    tx: &mut WriteTx<'_>,
    caller: UserId,
    user_id: UserId,
    update: SettingsUpdate,
    hasher: &dyn PasswordHasher,
) -> CoreResult<User> {
    if caller != user_id {
        warn!("user {} tried to change settings of user {}", caller, user_id);
        return Err(CoreError::Authorization(
            "only the account owner may change its settings".to_owned(),
        ));
    }

    let mut user = User::get_by_id(tx, user_id)?;
    let mut errors = ValidationError::default();

    let username = update.username.trim();
    match validate_username_re(username) {
        Err(e) => errors.merge(e),
        Ok(_) if username_taken(tx, username, Some(user.id))? => {
            errors.add_error("username", format!("Username already chosen: {}", username));
        }
        Ok(_) => user.username = username.to_owned(),
    }

    let email = update.email.trim();
    match validate_email_re(email) {
        Err(e) => errors.merge(e),
        Ok(_) if email_taken(tx, email, Some(user.id))? => {
            errors.add_error("email", format!("Email already chosen: {}", email));
        }
        Ok(_) => user.email = email.to_owned(),
    }

    if let Some(password) = update.password {
        match validate_password(&password) {
            Err(e) => errors.merge(e),
            Ok(_) => user.password_hash = hasher.hash(&password),
        }
    }

    errors.into_result()?;

    user.bio = update.bio;
    user.image = update.image;
    user.save(tx)?;
    Ok(user)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::utils::Sha256Hasher;
    use super::*;
    use crate::db::testing::{db, ScratchDb};

    fn alice() -> Registration {
        Registration {
            username: "alice".into(),
            email: "alice@example.com".into(),
            password: "hunter22".into(),
        }
    }

    #[rstest]
    fn registration_creates_a_user(db: ScratchDb) {
        let hasher = Sha256Hasher::new("test");
        let user = db.write_tx(|tx| register(tx, alice(), &hasher)).unwrap();

        let stored = db.read_tx(|tx| User::by_email(tx, "alice@example.com")).unwrap();
        assert_eq!(stored.map(|u| u.id), Some(user.id));
        assert_eq!(user.password_hash, hasher.hash("hunter22"));
    }

    #[rstest]
    fn duplicate_registration_reports_each_field(db: ScratchDb) {
        let hasher = Sha256Hasher::new("test");
        db.write_tx(|tx| register(tx, alice(), &hasher)).unwrap();

        match db.write_tx(|tx| register(tx, alice(), &hasher)) {
            Err(CoreError::Validation(e)) => {
                assert_eq!(e.messages("username"), ["username already exists"]);
                assert_eq!(e.messages("email"), ["email already exists"]);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(db.read_tx(|tx| User::count(tx)).unwrap(), 1);
    }

    #[rstest]
    fn sign_in_checks_email_and_password(db: ScratchDb) {
        let hasher = Sha256Hasher::new("test");
        let alice = db.write_tx(|tx| register(tx, alice(), &hasher)).unwrap();

        let signed_in = db
            .read_tx(|tx| authenticate(tx, " alice@example.com ", "hunter22", &hasher))
            .unwrap();
        assert_eq!(signed_in.id, alice.id);

        for (email, password) in [
            ("alice@example.com", "hunter23"),
            ("bob@example.com", "hunter22"),
        ] {
            match db.read_tx(|tx| authenticate(tx, email, password, &hasher)) {
                Err(CoreError::Authorization(message)) => {
                    assert_eq!(message, "invalid email or password")
                }
                other => panic!("unexpected {:?}", other),
            }
        }

        let other_salt = Sha256Hasher::new("other");
        assert!(db
            .read_tx(|tx| authenticate(tx, "alice@example.com", "hunter22", &other_salt))
            .is_err());
    }

    #[rstest]
    fn settings_belong_to_their_owner(db: ScratchDb) {
        let hasher = Sha256Hasher::new("test");
        let alice = db.write_tx(|tx| register(tx, alice(), &hasher)).unwrap();
        let mallory = db
            .write_tx(|tx| {
                register(
                    tx,
                    Registration {
                        username: "mallory".into(),
                        email: "mallory@example.com".into(),
                        password: "hunter22".into(),
                    },
                    &hasher,
                )
            })
            .unwrap();

        let update = SettingsUpdate {
            username: "pwned".into(),
            email: "alice@example.com".into(),
            ..Default::default()
        };
        match db.write_tx(|tx| update_settings(tx, mallory.id, alice.id, update, &hasher)) {
            Err(CoreError::Authorization(_)) => {}
            other => panic!("unexpected {:?}", other),
        }

        let unchanged = db.read_tx(|tx| User::get_by_id(tx, alice.id)).unwrap();
        assert_eq!(unchanged.username, "alice");
    }

    #[rstest]
    fn settings_update_keeps_unique_names(db: ScratchDb) {
        let hasher = Sha256Hasher::new("test");
        let alice = db.write_tx(|tx| register(tx, alice(), &hasher)).unwrap();
        db.write_tx(|tx| {
            register(
                tx,
                Registration {
                    username: "bob".into(),
                    email: "bob@example.com".into(),
                    password: "hunter22".into(),
                },
                &hasher,
            )
        })
        .unwrap();

        let clash = SettingsUpdate {
            username: "bob".into(),
            email: "alice@example.com".into(),
            ..Default::default()
        };
        assert!(matches!(
            db.write_tx(|tx| update_settings(tx, alice.id, alice.id, clash, &hasher)),
            Err(CoreError::Validation(_))
        ));

        let fine = SettingsUpdate {
            username: "alice2".into(),
            email: "alice@example.com".into(),
            bio: Some("hello".into()),
            ..Default::default()
        };
        let updated = db
            .write_tx(|tx| update_settings(tx, alice.id, alice.id, fine, &hasher))
            .unwrap();
        assert_eq!(updated.username, "alice2");
        assert_eq!(updated.bio.as_deref(), Some("hello"));
        assert_eq!(updated.password_hash, hasher.hash("hunter22"));
    }
}
