//! Account creation, password sign-in and session restore.
//!
//! An account lives in the graph as two records: the alias claim
//! `~@<username>` pointing at a public key, and the account node `~<pub>`
//! holding the keypair sealed under the password. Signing in opens the seal;
//! restoring a session skips the password by reading the credential back
//! from the session slots.

use std::sync::Arc;

use tracing::{debug, info, warn};

use anontalk_graph::{GraphClient, GraphError};
use anontalk_shared::crypto::{open_with_password, seal_with_password, SealedBox};
use anontalk_shared::identity::{Identity, Keypair, KeypairExport, SessionCredential};
use anontalk_shared::records::{
    account_path, alias_path, presence_path, AccountRecord, AliasRecord, PresenceRecord,
};
use anontalk_shared::{now_millis, Username};
use anontalk_store::SessionStore;

use crate::error::AuthError;

pub struct IdentityManager<G: GraphClient> {
    graph: G,
    sessions: Arc<dyn SessionStore>,
}

impl<G: GraphClient> Clone for IdentityManager<G> {
    fn clone(&self) -> Self {
        Self {
            graph: self.graph.clone(),
            sessions: self.sessions.clone(),
        }
    }
}

impl<G: GraphClient> IdentityManager<G> {
    pub fn new(graph: G, sessions: Arc<dyn SessionStore>) -> Self {
        Self { graph, sessions }
    }

    /// Create an account and sign into it.
    ///
    /// Fails with `DuplicateUsername` when the alias is already claimed,
    /// including when another client claims it between our check and our
    /// write.
    pub async fn sign_up(&self, username: &str, password: &str) -> Result<Identity, AuthError> {
        let username = validate(username, password)?;

        if self.graph.once(&alias_path(&username)).await?.is_some() {
            debug!(user = %username, "Sign-up refused, alias exists");
            return Err(AuthError::DuplicateUsername);
        }

        let keypair = Keypair::generate();
        let export = serde_json::to_vec(&keypair.to_export())
            .map_err(|e| AuthError::Sealing(e.to_string()))?;
        let sealed =
            seal_with_password(password, &export).map_err(|e| AuthError::Sealing(e.to_string()))?;

        // Claim the name first: losing the race must not leave an account
        // node behind.
        let public_key = keypair.public_key_hex();
        let alias = AliasRecord {
            public_key: public_key.clone(),
        };
        match self.graph.put(&alias_path(&username), alias.to_node()).await {
            Ok(()) => {}
            Err(GraphError::Rejected(reason)) => {
                debug!(user = %username, %reason, "Alias claimed concurrently");
                return Err(AuthError::DuplicateUsername);
            }
            Err(e) => return Err(e.into()),
        }

        let account = AccountRecord {
            alias: username.as_str().to_string(),
            encryption_public_key: keypair.encryption_public_key_hex(),
            salt: sealed.salt,
            auth: sealed.ciphertext,
        };
        self.graph
            .put(&account_path(&public_key), account.to_node())
            .await?;

        info!(user = %username, public_key = %public_key, "Account created");
        self.sign_in(username.as_str(), password).await
    }

    /// Open the account sealed under `password` and persist the session.
    pub async fn sign_in(&self, username: &str, password: &str) -> Result<Identity, AuthError> {
        let username = validate(username, password)?;

        let alias = self.read_alias(&username).await?;
        let Some(account_node) = self.graph.once(&account_path(&alias.public_key)).await? else {
            return Err(AuthError::InvalidCredentials);
        };
        let account =
            AccountRecord::from_node(&account_node).map_err(|_| AuthError::InvalidCredentials)?;

        let sealed = SealedBox {
            salt: account.salt,
            ciphertext: account.auth,
        };
        let plaintext =
            open_with_password(password, &sealed).map_err(|_| AuthError::InvalidCredentials)?;
        let export: KeypairExport =
            serde_json::from_slice(&plaintext).map_err(|_| AuthError::InvalidCredentials)?;
        let keypair = Keypair::from_export(&export).map_err(|_| AuthError::InvalidCredentials)?;

        if keypair.public_key_hex() != alias.public_key {
            warn!(user = %username, "Account key does not match alias claim");
            return Err(AuthError::InvalidCredentials);
        }

        let identity = Identity::new(keypair, username);
        self.persist(&identity);
        info!(user = %identity.display_name(), "Signed in");
        Ok(identity)
    }

    /// Re-authenticate from the session slots.
    ///
    /// `Ok(None)` when there is nothing to restore. Malformed or stale slots
    /// are cleared and reported as `InvalidCredentials`; a store failure
    /// leaves them in place for the next attempt.
    pub async fn restore_session(&self) -> Result<Option<Identity>, AuthError> {
        let saved = match self.sessions.load_session() {
            Ok(Some(saved)) => saved,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!(error = %e, "Could not read session slots");
                return Ok(None);
            }
        };

        let Some(username) = Username::parse(&saved.username) else {
            self.discard("invalid username slot");
            return Err(AuthError::InvalidCredentials);
        };
        let keypair = match SessionCredential::from_persisted(saved.credential).to_keypair() {
            Ok(keypair) => keypair,
            Err(e) => {
                self.discard(&e.to_string());
                return Err(AuthError::InvalidCredentials);
            }
        };

        let alias = match self.graph.once(&alias_path(&username)).await? {
            Some(node) => AliasRecord::from_node(&node).ok(),
            None => None,
        };
        match alias {
            Some(alias) if alias.public_key == keypair.public_key_hex() => {
                info!(user = %username, "Session restored");
                Ok(Some(Identity::new(keypair, username)))
            }
            _ => {
                self.discard("credential does not match alias claim");
                Err(AuthError::InvalidCredentials)
            }
        }
    }

    /// Mark the user offline without waiting for the write, then forget
    /// the saved session.
    pub fn sign_out(&self, identity: &Identity) {
        let graph = self.graph.clone();
        let path = presence_path(identity.display_name());
        let node = PresenceRecord::offline(now_millis()).to_node();
        tokio::spawn(async move {
            if let Err(e) = graph.put(&path, node).await {
                debug!(error = %e, "Offline presence write failed");
            }
        });
        self.forget_session();
        info!(user = %identity.display_name(), "Signed out");
    }

    /// Clear both session slots.
    pub fn forget_session(&self) {
        if let Err(e) = self.sessions.clear_session() {
            warn!(error = %e, "Failed to clear session slots");
        }
    }

    async fn read_alias(&self, username: &Username) -> Result<AliasRecord, AuthError> {
        let node = self
            .graph
            .once(&alias_path(username))
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        AliasRecord::from_node(&node).map_err(|_| AuthError::InvalidCredentials)
    }

    fn persist(&self, identity: &Identity) {
        let credential = match identity.credential() {
            Ok(credential) => credential,
            Err(e) => {
                warn!(error = %e, "Could not encode session credential");
                return;
            }
        };
        if let Err(e) = self
            .sessions
            .save_session(identity.display_name().as_str(), credential.expose())
        {
            warn!(error = %e, "Session will not be restorable");
        }
    }

    fn discard(&self, reason: &str) {
        warn!(reason, "Discarding saved session");
        self.forget_session();
    }
}

fn validate(username: &str, password: &str) -> Result<Username, AuthError> {
    if password.is_empty() {
        return Err(AuthError::InvalidCredentials);
    }
    Username::parse(username).ok_or(AuthError::InvalidCredentials)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anontalk_graph::MemoryGraph;
    use anontalk_store::{MemorySessionStore, SLOT_CREDENTIAL, SLOT_USERNAME};

    fn manager() -> (IdentityManager<MemoryGraph>, Arc<MemorySessionStore>, MemoryGraph) {
        let graph = MemoryGraph::new();
        let sessions = Arc::new(MemorySessionStore::new());
        let manager = IdentityManager::new(graph.clone(), sessions.clone());
        (manager, sessions, graph)
    }

    #[tokio::test]
    async fn test_sign_up_then_sign_in() {
        let (manager, sessions, _) = manager();

        let created = manager.sign_up("alice", "hunter2").await.unwrap();
        assert_eq!(created.display_name().as_str(), "alice");
        assert!(sessions.load_session().unwrap().is_some());

        let again = manager.sign_in(" alice ", "hunter2").await.unwrap();
        assert_eq!(again.public_key(), created.public_key());
    }

    #[tokio::test]
    async fn test_duplicate_username() {
        let (manager, _, _) = manager();
        manager.sign_up("alice", "pw").await.unwrap();
        assert_eq!(
            manager.sign_up("alice", "other").await.unwrap_err(),
            AuthError::DuplicateUsername
        );
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_user() {
        let (manager, _, _) = manager();
        manager.sign_up("alice", "pw").await.unwrap();

        assert_eq!(
            manager.sign_in("alice", "nope").await.unwrap_err(),
            AuthError::InvalidCredentials
        );
        assert_eq!(
            manager.sign_in("bob", "pw").await.unwrap_err(),
            AuthError::InvalidCredentials
        );
        assert_eq!(
            manager.sign_in("  ", "pw").await.unwrap_err(),
            AuthError::InvalidCredentials
        );
        assert_eq!(
            manager.sign_in("alice", "").await.unwrap_err(),
            AuthError::InvalidCredentials
        );
    }

    #[tokio::test]
    async fn test_password_never_persisted() {
        let (manager, sessions, _) = manager();
        manager.sign_up("alice", "correct horse").await.unwrap();

        let saved = sessions.load_session().unwrap().unwrap();
        assert_eq!(saved.username, "alice");
        assert!(!saved.credential.contains("correct horse"));
    }

    #[tokio::test]
    async fn test_restore_session() {
        let (manager, _, _) = manager();
        let created = manager.sign_up("alice", "pw").await.unwrap();

        let restored = manager.restore_session().await.unwrap().unwrap();
        assert_eq!(restored.public_key(), created.public_key());
    }

    #[tokio::test]
    async fn test_restore_without_slots() {
        let (manager, sessions, _) = manager();
        assert!(manager.restore_session().await.unwrap().is_none());

        sessions.set(SLOT_USERNAME, "alice").unwrap();
        assert!(manager.restore_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_restore_malformed_credential_clears_slots() {
        let (manager, sessions, _) = manager();
        sessions.save_session("alice", "garbage{").unwrap();

        assert_eq!(
            manager.restore_session().await.unwrap_err(),
            AuthError::InvalidCredentials
        );
        assert_eq!(sessions.get(SLOT_USERNAME).unwrap(), None);
        assert_eq!(sessions.get(SLOT_CREDENTIAL).unwrap(), None);
    }

    #[tokio::test]
    async fn test_restore_stale_credential_clears_slots() {
        let (manager, sessions, _) = manager();
        manager.sign_up("alice", "pw").await.unwrap();

        // A credential for a different key under the same name.
        let foreign = SessionCredential::from_keypair(&Keypair::generate()).unwrap();
        sessions.save_session("alice", foreign.expose()).unwrap();

        assert_eq!(
            manager.restore_session().await.unwrap_err(),
            AuthError::InvalidCredentials
        );
        assert!(sessions.load_session().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sign_out_clears_slots_and_marks_offline() {
        let (manager, sessions, graph) = manager();
        let identity = manager.sign_up("alice", "pw").await.unwrap();
        let path = presence_path(identity.display_name());
        let mut sub = graph.on(&path);

        manager.sign_out(&identity);
        assert!(sessions.load_session().unwrap().is_none());

        let event = sub.next().await.unwrap();
        assert_eq!(event.node.unwrap().get_bool("online"), Some(false));
    }

    /// Reads of alias claims always miss, as if another client claimed the
    /// name right after our check. Every write is recorded.
    #[derive(Clone)]
    struct LateClaimGraph {
        inner: MemoryGraph,
        writes: Arc<std::sync::Mutex<Vec<String>>>,
    }

    impl GraphClient for LateClaimGraph {
        async fn put(
            &self,
            path: &anontalk_shared::GraphPath,
            node: anontalk_shared::Node,
        ) -> anontalk_graph::Result<()> {
            self.writes.lock().unwrap().push(path.as_str().to_string());
            self.inner.put(path, node).await
        }

        async fn once(
            &self,
            path: &anontalk_shared::GraphPath,
        ) -> anontalk_graph::Result<Option<anontalk_shared::Node>> {
            if path.as_str().starts_with("~@") {
                return Ok(None);
            }
            self.inner.once(path).await
        }

        async fn once_children(
            &self,
            path: &anontalk_shared::GraphPath,
        ) -> anontalk_graph::Result<Vec<(String, anontalk_shared::Node)>> {
            self.inner.once_children(path).await
        }

        fn on(&self, path: &anontalk_shared::GraphPath) -> anontalk_graph::Subscription {
            self.inner.on(path)
        }

        fn map_on(&self, path: &anontalk_shared::GraphPath) -> anontalk_graph::Subscription {
            self.inner.map_on(path)
        }

        fn peer_events(&self) -> tokio::sync::broadcast::Receiver<anontalk_graph::PeerEvent> {
            self.inner.peer_events()
        }
    }

    #[tokio::test]
    async fn test_lost_alias_race_writes_no_account_node() {
        let memory = MemoryGraph::new();
        IdentityManager::new(memory.clone(), Arc::new(MemorySessionStore::new()))
            .sign_up("alice", "first")
            .await
            .unwrap();

        let graph = LateClaimGraph {
            inner: memory,
            writes: Arc::default(),
        };
        let late = IdentityManager::new(graph.clone(), Arc::new(MemorySessionStore::new()));

        assert_eq!(
            late.sign_up("alice", "second").await.unwrap_err(),
            AuthError::DuplicateUsername
        );
        let writes = graph.writes.lock().unwrap().clone();
        assert_eq!(writes, vec!["~@alice".to_string()]);
    }
}
