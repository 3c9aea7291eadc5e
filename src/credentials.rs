//! User accounts and login sessions.
//!
//! Secrets are stored as salted Argon2 PHC strings. Login failures do not say
//! whether the username exists.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::Utc;
use log::{info, warn};
use rand_core::OsRng;
use rusqlite::{Connection, ErrorCode};
use uuid::Uuid;

use crate::db;
use crate::error::{LedgerError, LedgerResult};
use crate::models::User;

pub fn hash_password(password: &str) -> LedgerResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| LedgerError::Hash(err.to_string()))?;
    Ok(hash.to_string())
}

pub fn verify_password(hash: &str, password: &str) -> bool {
    let parsed = match PasswordHash::new(hash) {
        Ok(parsed) => parsed,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

pub fn create_user(conn: &Connection, username: &str, secret: &str) -> LedgerResult<i64> {
    let username = username.trim();
    if username.is_empty() || secret.is_empty() {
        return Err(LedgerError::InvalidInput(
            "Fields cannot be empty".to_string(),
        ));
    }

    let credential_hash = hash_password(secret)?;
    let created_at = Utc::now().to_rfc3339();
    match db::insert_user(conn, username, &credential_hash, &created_at) {
        Ok(user_id) => {
            info!("created user {username} ({user_id})");
            Ok(user_id)
        }
        Err(rusqlite::Error::SqliteFailure(err, _)) if err.code == ErrorCode::ConstraintViolation => {
            Err(LedgerError::DuplicateUsername(username.to_string()))
        }
        Err(err) => Err(err.into()),
    }
}

/// Sign-up as submitted from the form: the confirmation must match before
/// the account is created.
pub fn register(
    conn: &Connection,
    username: &str,
    secret: &str,
    confirmation: &str,
) -> LedgerResult<i64> {
    if username.trim().is_empty() || secret.is_empty() {
        return Err(LedgerError::InvalidInput(
            "Fields cannot be empty".to_string(),
        ));
    }
    if secret != confirmation {
        return Err(LedgerError::InvalidInput(
            "Passwords do not match".to_string(),
        ));
    }
    create_user(conn, username, secret)
}

pub fn authenticate(conn: &Connection, username: &str, secret: &str) -> LedgerResult<i64> {
    let username = username.trim();
    if username.is_empty() || secret.is_empty() {
        return Err(LedgerError::InvalidInput(
            "Enter a username and password".to_string(),
        ));
    }

    let Some((user_id, hash)) = db::user_credentials(conn, username)? else {
        warn!("login rejected for {username}");
        return Err(LedgerError::AuthFailure);
    };
    if !verify_password(&hash, secret) {
        warn!("login rejected for {username}");
        return Err(LedgerError::AuthFailure);
    }
    Ok(user_id)
}

/// Creates a session token for the user, dropping all but the newest
/// `max_sessions` sessions.
pub fn open_session(conn: &Connection, user_id: i64, max_sessions: i64) -> LedgerResult<String> {
    let token = Uuid::new_v4().to_string();
    let created_at = Utc::now().to_rfc3339();
    db::create_session(conn, user_id, &token, &created_at)?;
    db::prune_sessions(conn, user_id, max_sessions)?;
    Ok(token)
}

pub fn session_user(conn: &Connection, token: &str) -> LedgerResult<Option<User>> {
    Ok(db::user_by_session(conn, token)?)
}

pub fn close_session(conn: &Connection, token: &str) -> LedgerResult<()> {
    Ok(db::delete_session(conn, token)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_connection;

    #[test]
    fn test_authenticate_after_create() {
        let conn = test_connection();
        let id = create_user(&conn, "alice", "s3cret").unwrap();
        assert_eq!(authenticate(&conn, "alice", "s3cret").unwrap(), id);
        assert!(matches!(
            authenticate(&conn, "alice", "wrong"),
            Err(LedgerError::AuthFailure)
        ));
    }

    #[test]
    fn test_unknown_user_is_auth_failure() {
        let conn = test_connection();
        assert!(matches!(
            authenticate(&conn, "nobody", "pw"),
            Err(LedgerError::AuthFailure)
        ));
    }

    #[test]
    fn test_duplicate_username_rejected_regardless_of_secret() {
        let conn = test_connection();
        create_user(&conn, "alice", "one").unwrap();
        for secret in ["one", "two"] {
            assert!(matches!(
                create_user(&conn, "alice", secret),
                Err(LedgerError::DuplicateUsername(name)) if name == "alice"
            ));
        }
    }

    #[test]
    fn test_empty_fields_rejected() {
        let conn = test_connection();
        assert!(matches!(
            create_user(&conn, "  ", "pw"),
            Err(LedgerError::InvalidInput(_))
        ));
        assert!(matches!(
            create_user(&conn, "alice", ""),
            Err(LedgerError::InvalidInput(_))
        ));
        assert!(matches!(
            authenticate(&conn, "", "pw"),
            Err(LedgerError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_register_checks_confirmation() {
        let conn = test_connection();
        let err = register(&conn, "alice", "pw", "pw2").unwrap_err();
        assert_eq!(err.to_string(), "Passwords do not match");
        assert!(db::user_credentials(&conn, "alice").unwrap().is_none());
        register(&conn, "alice", "pw", "pw").unwrap();
    }

    #[test]
    fn test_hash_is_salted_and_not_plaintext() {
        let first = hash_password("pw").unwrap();
        let second = hash_password("pw").unwrap();
        assert_ne!(first, "pw");
        assert_ne!(first, second);
        assert!(verify_password(&first, "pw"));
        assert!(!verify_password("not a phc string", "pw"));
    }

    #[test]
    fn test_session_lifecycle() {
        let conn = test_connection();
        let id = create_user(&conn, "alice", "pw").unwrap();
        let token = open_session(&conn, id, 5).unwrap();
        assert_eq!(session_user(&conn, &token).unwrap().unwrap().id, id);
        close_session(&conn, &token).unwrap();
        assert!(session_user(&conn, &token).unwrap().is_none());
    }

    #[test]
    fn test_session_timestamps_are_utc() {
        let conn = test_connection();
        let id = create_user(&conn, "alice", "pw").unwrap();
        let tokens: Vec<String> = (0..3).map(|_| open_session(&conn, id, 2).unwrap()).collect();

        let stamps: Vec<String> = conn
            .prepare("SELECT created_at FROM sessions ORDER BY id")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(stamps.len(), 2);
        assert!(stamps.iter().all(|stamp| stamp.ends_with("+00:00")));
        assert!(session_user(&conn, &tokens[0]).unwrap().is_none());
        assert!(session_user(&conn, &tokens[2]).unwrap().is_some());
    }
}
