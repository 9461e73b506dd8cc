use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand_core::OsRng;

use crate::error::{FsError, FsResult};

/// A row in the in-memory password table. Passwords are never stored in
/// the clear, only their Argon2 hash.
pub struct User {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    password_hash: String,
}

fn hash_password(password: &str) -> FsResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| FsError::Invalid(format!("password hashing failed: {e}")))
}

fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Two hardcoded identities: `root` (0:0) and `user` (1000:1000).
pub fn default_users() -> FsResult<Vec<User>> {
    Ok(vec![
        User {
            name: "root".into(),
            uid: 0,
            gid: 0,
            password_hash: hash_password("root")?,
        },
        User {
            name: "user".into(),
            uid: 1000,
            gid: 1000,
            password_hash: hash_password("user")?,
        },
    ])
}

pub fn find<'a>(users: &'a [User], name: &str) -> Option<&'a User> {
    users.iter().find(|u| u.name == name)
}

pub fn authenticate(users: &[User], name: &str, password: &str) -> bool {
    match find(users, name) {
        Some(u) => verify_password(password, &u.password_hash),
        None => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn authenticate_accepts_correct_password() {
        let users = default_users().unwrap();
        assert!(authenticate(&users, "root", "root"));
        assert!(authenticate(&users, "user", "user"));
    }

    #[test]
    fn authenticate_rejects_wrong_password_or_user() {
        let users = default_users().unwrap();
        assert!(!authenticate(&users, "root", "user"));
        assert!(!authenticate(&users, "nobody", "root"));
    }
}
