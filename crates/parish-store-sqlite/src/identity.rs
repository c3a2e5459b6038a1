//! [`IdentityProvider`] implementation: password and federated accounts
//! with opaque bearer sessions.

use argon2::{
  Argon2,
  password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString},
};
use chrono::{DateTime, Utc};
use parish_core::store::{
  AuthSession, Credentials, IdentityChange, IdentityProvider, Principal,
  SessionToken, SignInMethod,
};
use rand_core::OsRng;
use rusqlite::OptionalExtension as _;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{Error, Result, SqliteStore, blobs::random_token, encode::encode_dt};

const PASSWORD_PROVIDER: &str = "password";

fn hash_password(password: &str) -> Result<String> {
  let salt = SaltString::generate(&mut OsRng);
  Argon2::default()
    .hash_password(password.as_bytes(), &salt)
    .map(|hash| hash.to_string())
    .map_err(|e| Error::PasswordHash(e.to_string()))
}

fn verify_password(password: &str, phc: &str) -> bool {
  PasswordHash::new(phc).is_ok_and(|parsed| {
    Argon2::default()
      .verify_password(password.as_bytes(), &parsed)
      .is_ok()
  })
}

fn method_for(provider: &str) -> SignInMethod {
  if provider == PASSWORD_PROVIDER {
    SignInMethod::Password
  } else {
    SignInMethod::Federated
  }
}

/// Emails compare case-insensitively.
fn normalize_email(email: &str) -> String { email.trim().to_lowercase() }

struct AccountRow {
  uid:           String,
  email:         Option<String>,
  password_hash: Option<String>,
  provider:      String,
}

impl AccountRow {
  fn principal(&self) -> Principal {
    Principal {
      uid:    self.uid.clone(),
      email:  self.email.clone(),
      method: method_for(&self.provider),
    }
  }
}

impl SqliteStore {
  async fn password_account(&self, email: String) -> Result<Option<AccountRow>> {
    Ok(
      self
        .conn
        .call(move |conn| {
          Ok(
            conn
              .query_row(
                "SELECT uid, email, password_hash, provider FROM accounts
                 WHERE provider = ?1 AND email = ?2",
                rusqlite::params![PASSWORD_PROVIDER, email],
                |row| {
                  Ok(AccountRow {
                    uid:           row.get(0)?,
                    email:         row.get(1)?,
                    password_hash: row.get(2)?,
                    provider:      row.get(3)?,
                  })
                },
              )
              .optional()?,
          )
        })
        .await?,
    )
  }

  /// Find the federated account for `(provider, subject)`, creating it on
  /// first use.
  async fn federated_account(
    &self,
    provider: String,
    subject: String,
    email: Option<String>,
  ) -> Result<AccountRow> {
    let uid = Uuid::new_v4().simple().to_string();
    let at_str = encode_dt(Utc::now());
    let email = email.as_deref().map(normalize_email);

    Ok(
      self
        .conn
        .call(move |conn| {
          conn.execute(
            "INSERT INTO accounts (uid, email, provider, federated_subject, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (provider, federated_subject) DO NOTHING",
            rusqlite::params![uid, email, provider, subject, at_str],
          )?;
          Ok(conn.query_row(
            "SELECT uid, email, password_hash, provider FROM accounts
             WHERE provider = ?1 AND federated_subject = ?2",
            rusqlite::params![provider, subject],
            |row| {
              Ok(AccountRow {
                uid:           row.get(0)?,
                email:         row.get(1)?,
                password_hash: row.get(2)?,
                provider:      row.get(3)?,
              })
            },
          )?)
        })
        .await?,
    )
  }

  /// Sessions created at or before this instant have expired.
  fn session_cutoff(&self) -> String {
    let cutoff = Utc::now()
      .checked_sub_signed(self.session_ttl)
      .unwrap_or(DateTime::<Utc>::MIN_UTC);
    encode_dt(cutoff)
  }

  async fn open_session(&self, principal: Principal) -> Result<AuthSession> {
    let token = SessionToken(random_token());
    let token_str = token.as_str().to_owned();
    let uid = principal.uid.clone();
    let at_str = encode_dt(Utc::now());
    let cutoff = self.session_cutoff();

    let expired = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let expired = tx.execute(
          "DELETE FROM sessions WHERE created_at <= ?1",
          rusqlite::params![cutoff],
        )?;
        tx.execute(
          "INSERT INTO sessions (token, uid, created_at) VALUES (?1, ?2, ?3)",
          rusqlite::params![token_str, uid, at_str],
        )?;
        tx.commit()?;
        Ok(expired)
      })
      .await?;
    if expired > 0 {
      tracing::debug!(expired, "expired sessions removed");
    }

    // No subscribers is fine.
    let _ = self.changes.send(IdentityChange::SignedIn {
      token:     token.clone(),
      principal: principal.clone(),
    });
    Ok(AuthSession { token, principal })
  }
}

impl IdentityProvider for SqliteStore {
  async fn sign_up(&self, email: &str, password: &str) -> Result<Option<AuthSession>> {
    let email = normalize_email(email);
    if self.password_account(email.clone()).await?.is_some() {
      return Ok(None);
    }

    let password = password.to_owned();
    let hash = tokio::task::spawn_blocking(move || hash_password(&password)).await??;

    let uid = Uuid::new_v4().simple().to_string();
    let uid_str = uid.clone();
    let email_str = email.clone();
    let at_str = encode_dt(Utc::now());

    let inserted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "INSERT INTO accounts (uid, email, password_hash, provider, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT DO NOTHING",
          rusqlite::params![uid_str, email_str, hash, PASSWORD_PROVIDER, at_str],
        )?)
      })
      .await?;
    // Lost a race with a concurrent sign-up for the same email.
    if inserted == 0 {
      return Ok(None);
    }

    tracing::info!(%uid, %email, "account created");
    let principal = Principal {
      uid,
      email: Some(email),
      method: SignInMethod::Password,
    };
    self.open_session(principal).await.map(Some)
  }

  async fn sign_in(&self, credentials: Credentials) -> Result<Option<AuthSession>> {
    let account = match credentials {
      Credentials::EmailPassword { email, password } => {
        let Some(account) = self.password_account(normalize_email(&email)).await?
        else {
          return Ok(None);
        };
        let Some(phc) = account.password_hash.clone() else {
          return Ok(None);
        };
        let verified =
          tokio::task::spawn_blocking(move || verify_password(&password, &phc))
            .await?;
        if !verified {
          return Ok(None);
        }
        account
      }
      Credentials::Federated {
        provider,
        subject,
        email,
      } => {
        if provider == PASSWORD_PROVIDER || subject.is_empty() {
          return Ok(None);
        }
        self.federated_account(provider, subject, email).await?
      }
    };

    self.open_session(account.principal()).await.map(Some)
  }

  async fn sign_out(&self, token: &SessionToken) -> Result<()> {
    let token_str = token.as_str().to_owned();
    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM sessions WHERE token = ?1",
          rusqlite::params![token_str],
        )?)
      })
      .await?;

    if removed > 0 {
      let _ = self.changes.send(IdentityChange::SignedOut {
        token: token.clone(),
      });
    }
    Ok(())
  }

  async fn current(&self, token: &SessionToken) -> Result<Option<Principal>> {
    let token_str = token.as_str().to_owned();
    let cutoff = self.session_cutoff();
    let account: Option<AccountRow> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT a.uid, a.email, a.password_hash, a.provider
               FROM sessions s JOIN accounts a ON a.uid = s.uid
               WHERE s.token = ?1 AND s.created_at > ?2",
              rusqlite::params![token_str, cutoff],
              |row| {
                Ok(AccountRow {
                  uid:           row.get(0)?,
                  email:         row.get(1)?,
                  password_hash: row.get(2)?,
                  provider:      row.get(3)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    Ok(account.as_ref().map(AccountRow::principal))
  }

  fn subscribe(&self) -> broadcast::Receiver<IdentityChange> {
    self.changes.subscribe()
  }
}
