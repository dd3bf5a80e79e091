//! In-process backend for tests and local demos.
//!
//! Writes inside a transaction are staged on the handle and applied under one
//! lock on commit, so a dropped handle leaves the store untouched.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::{Duration, Instant},
};
use tracing::debug;
use uuid::Uuid;

use crate::auth::{
    role::Role,
    session::Session,
    store::{
        CredentialRecord, CredentialRecordUpdate, LoginRecord, PersistenceLayer, PersistenceTx,
        ProviderKind, SessionStore, UserRecordUpdate,
    },
};

/// Stored user row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub must_change_password: bool,
    pub password_hash: Option<String>,
    pub image: Option<String>,
}

/// Input for [`MemoryStore::add_user`].
#[derive(Clone, Debug)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub role: Role,
    pub must_change_password: bool,
    pub password_hash: Option<String>,
    pub image: Option<String>,
}

/// Ordered copy of all user and account rows, for before/after comparisons.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub users: Vec<UserRow>,
    pub credentials: Vec<CredentialRecord>,
}

struct SessionRow {
    user_id: Uuid,
    expires_at: Instant,
    last_seen_at: Option<Instant>,
}

#[derive(Default)]
struct State {
    users: HashMap<Uuid, UserRow>,
    credentials: HashMap<Uuid, CredentialRecord>,
    sessions: HashMap<Vec<u8>, SessionRow>,
}

#[derive(Default)]
struct Faults {
    session_store: AtomicBool,
    credential_updates: AtomicBool,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    faults: Arc<Faults>,
    session_lookups: AtomicUsize,
    credential_lookups: AtomicUsize,
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a user; a `credential` account is linked when a hash is given.
    pub fn add_user(&self, user: NewUser) -> Uuid {
        let id = Uuid::now_v7();
        let mut state = lock(&self.state);
        if let Some(hash) = &user.password_hash {
            let account_id = Uuid::now_v7();
            state.credentials.insert(
                account_id,
                CredentialRecord {
                    id: account_id,
                    owner_user_id: id,
                    provider: ProviderKind::Credential,
                    password_hash: Some(hash.clone()),
                },
            );
        }
        state.users.insert(
            id,
            UserRow {
                id,
                email: user.email,
                name: user.name,
                role: user.role,
                must_change_password: user.must_change_password,
                password_hash: user.password_hash,
                image: user.image,
            },
        );
        id
    }

    #[must_use]
    pub fn user(&self, user_id: Uuid) -> Option<UserRow> {
        lock(&self.state).users.get(&user_id).cloned()
    }

    #[must_use]
    pub fn credential_for(&self, user_id: Uuid) -> Option<CredentialRecord> {
        lock(&self.state)
            .credentials
            .values()
            .find(|record| {
                record.owner_user_id == user_id && record.provider == ProviderKind::Credential
            })
            .cloned()
    }

    /// Unlink every `credential` account owned by `user_id`.
    pub fn remove_credential(&self, user_id: Uuid) {
        lock(&self.state).credentials.retain(|_, record| {
            record.owner_user_id != user_id || record.provider != ProviderKind::Credential
        });
    }

    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let state = lock(&self.state);
        let mut users: Vec<UserRow> = state.users.values().cloned().collect();
        users.sort_by_key(|user| user.id);
        let mut credentials: Vec<CredentialRecord> = state.credentials.values().cloned().collect();
        credentials.sort_by_key(|record| record.id);
        Snapshot { users, credentials }
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        lock(&self.state).sessions.len()
    }

    /// Number of `get_session` calls served so far.
    /// When the session was last resolved, if ever.
    #[must_use]
    pub fn session_last_seen(&self, token_hash: &[u8]) -> Option<Instant> {
        lock(&self.state)
            .sessions
            .get(token_hash)
            .and_then(|row| row.last_seen_at)
    }

    #[must_use]
    pub fn session_lookups(&self) -> usize {
        self.session_lookups.load(Ordering::SeqCst)
    }

    /// Number of `find_credential_record` calls served so far.
    #[must_use]
    pub fn credential_lookups(&self) -> usize {
        self.credential_lookups.load(Ordering::SeqCst)
    }

    /// Make every session store call fail.
    pub fn fail_session_store(&self, fail: bool) {
        self.faults.session_store.store(fail, Ordering::SeqCst);
    }

    /// Make credential row updates fail inside transactions.
    pub fn fail_credential_updates(&self, fail: bool) {
        self.faults.credential_updates.store(fail, Ordering::SeqCst);
    }

    fn check_session_store(&self) -> Result<()> {
        if self.faults.session_store.load(Ordering::SeqCst) {
            bail!("session store unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get_session(&self, token_hash: &[u8]) -> Result<Option<Session>> {
        self.session_lookups.fetch_add(1, Ordering::SeqCst);
        self.check_session_store()?;

        let mut state = lock(&self.state);
        let now = Instant::now();
        let Some(row) = state.sessions.get_mut(token_hash) else {
            return Ok(None);
        };
        if row.expires_at <= now {
            debug!("dropping expired session");
            state.sessions.remove(token_hash);
            return Ok(None);
        }
        row.last_seen_at = Some(now);
        let user_id = row.user_id;
        Ok(state.users.get(&user_id).map(|user| Session {
            user_id: user.id,
            email: user.email.clone(),
            role: user.role,
            must_change_password: user.must_change_password,
            display_name: user.name.clone(),
            avatar_ref: user.image.clone(),
        }))
    }

    async fn create_session(
        &self,
        user_id: Uuid,
        token_hash: &[u8],
        ttl_seconds: i64,
    ) -> Result<()> {
        self.check_session_store()?;
        let ttl = Duration::from_secs(u64::try_from(ttl_seconds).unwrap_or_default());
        let mut state = lock(&self.state);
        if !state.users.contains_key(&user_id) {
            bail!("unknown user {user_id}");
        }
        state.sessions.insert(
            token_hash.to_vec(),
            SessionRow {
                user_id,
                expires_at: Instant::now() + ttl,
                last_seen_at: None,
            },
        );
        Ok(())
    }

    async fn delete_session(&self, token_hash: &[u8]) -> Result<()> {
        self.check_session_store()?;
        lock(&self.state).sessions.remove(token_hash);
        Ok(())
    }
}

#[async_trait]
impl PersistenceLayer for MemoryStore {
    async fn find_login_record(&self, email: &str) -> Result<Option<LoginRecord>> {
        let state = lock(&self.state);
        let Some(user) = state.users.values().find(|user| user.email == email) else {
            return Ok(None);
        };
        let hash = state
            .credentials
            .values()
            .filter(|record| {
                record.owner_user_id == user.id && record.provider == ProviderKind::Credential
            })
            .find_map(|record| record.password_hash.clone());
        Ok(hash.map(|password_hash| LoginRecord {
            user_id: user.id,
            role: user.role,
            must_change_password: user.must_change_password,
            password_hash,
        }))
    }

    async fn find_credential_record(
        &self,
        user_id: Uuid,
        provider: &ProviderKind,
    ) -> Result<Option<CredentialRecord>> {
        self.credential_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.state)
            .credentials
            .values()
            .find(|record| record.owner_user_id == user_id && &record.provider == provider)
            .cloned())
    }

    async fn begin(&self) -> Result<Box<dyn PersistenceTx>> {
        Ok(Box::new(MemoryTx {
            state: Arc::clone(&self.state),
            faults: Arc::clone(&self.faults),
            users: Vec::new(),
            credentials: Vec::new(),
        }))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

struct MemoryTx {
    state: Arc<Mutex<State>>,
    faults: Arc<Faults>,
    users: Vec<(Uuid, UserRecordUpdate)>,
    credentials: Vec<(Uuid, CredentialRecordUpdate)>,
}

#[async_trait]
impl PersistenceTx for MemoryTx {
    async fn update_user_record(&mut self, user_id: Uuid, update: &UserRecordUpdate) -> Result<()> {
        if !lock(&self.state).users.contains_key(&user_id) {
            bail!("user {user_id} not found");
        }
        self.users.push((user_id, update.clone()));
        Ok(())
    }

    async fn update_credential_record(
        &mut self,
        credential_id: Uuid,
        update: &CredentialRecordUpdate,
    ) -> Result<()> {
        if self.faults.credential_updates.load(Ordering::SeqCst) {
            bail!("credential update rejected");
        }
        if !lock(&self.state).credentials.contains_key(&credential_id) {
            bail!("credential account {credential_id} not found");
        }
        self.credentials.push((credential_id, update.clone()));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut state = lock(&self.state);
        // Every target must still exist before anything is applied.
        for (user_id, _) in &self.users {
            if !state.users.contains_key(user_id) {
                bail!("user {user_id} vanished before commit");
            }
        }
        for (credential_id, _) in &self.credentials {
            if !state.credentials.contains_key(credential_id) {
                bail!("credential account {credential_id} vanished before commit");
            }
        }

        for (user_id, update) in &self.users {
            if let Some(user) = state.users.get_mut(user_id) {
                if let Some(hash) = &update.password_hash {
                    user.password_hash = Some(hash.clone());
                }
                if let Some(flag) = update.must_change_password {
                    user.must_change_password = flag;
                }
            }
        }
        for (credential_id, update) in &self.credentials {
            if let Some(record) = state.credentials.get_mut(credential_id) {
                record.password_hash = Some(update.password_hash.clone());
            }
        }
        Ok(())
    }
}
