//! Cached list screens over a backend collection.
//!
//! A screen never merges a mutation into its cache: every successful
//! create, update or delete is followed by a full re-fetch, so what is
//! displayed is always what the backend returned last.

use async_trait::async_trait;
use tracing::{debug, info};

use sinistres_core::models::Resource;
use sinistres_core::search::filter;

use crate::api::ApiClient;
use crate::error::Result;

/// Collection operations a screen needs from the backend.
#[async_trait]
pub trait ResourceStore<R: Resource>: Send + Sync {
    async fn list(&self) -> Result<Vec<R>>;
    async fn create(&self, draft: &R::Draft) -> Result<R>;
    async fn update(&self, id: &str, draft: &R::Draft) -> Result<R>;
    async fn delete(&self, id: &str) -> Result<()>;
}

#[async_trait]
impl<R: Resource> ResourceStore<R> for ApiClient {
    async fn list(&self) -> Result<Vec<R>> {
        ApiClient::list::<R>(self).await
    }

    async fn create(&self, draft: &R::Draft) -> Result<R> {
        ApiClient::create::<R>(self, draft).await
    }

    async fn update(&self, id: &str, draft: &R::Draft) -> Result<R> {
        ApiClient::update::<R>(self, id, draft).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        ApiClient::delete::<R>(self, id).await
    }
}

/// Asks the user to confirm a destructive action.
pub trait Confirm {
    fn confirm(&mut self, question: &str) -> bool;
}

/// Accepts everything; used for `--yes`.
pub struct AlwaysConfirm;

impl Confirm for AlwaysConfirm {
    fn confirm(&mut self, _question: &str) -> bool {
        true
    }
}

impl<F: FnMut(&str) -> bool> Confirm for F {
    fn confirm(&mut self, question: &str) -> bool {
        self(question)
    }
}

pub fn delete_question<R: Resource>(item: &R) -> String {
    format!("Êtes-vous sûr de vouloir supprimer {} ?", item.label())
}

pub struct ResourceScreen<'a, R: Resource, S: ResourceStore<R> + ?Sized> {
    store: &'a S,
    items: Vec<R>,
}

impl<'a, R: Resource, S: ResourceStore<R> + ?Sized> ResourceScreen<'a, R, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            items: Vec::new(),
        }
    }

    pub fn items(&self) -> &[R] {
        &self.items
    }

    pub fn find(&self, id: &str) -> Option<&R> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn filtered(&self, term: &str) -> Vec<&R> {
        filter(&self.items, term)
    }

    pub async fn refresh(&mut self) -> Result<&[R]> {
        self.items = self.store.list().await?;
        debug!(resource = R::COLLECTION, count = self.items.len(), "screen refreshed");
        Ok(&self.items)
    }

    pub async fn create(&mut self, draft: &R::Draft) -> Result<R> {
        let created = self.store.create(draft).await?;
        self.refresh().await?;
        Ok(created)
    }

    pub async fn update(&mut self, id: &str, draft: &R::Draft) -> Result<R> {
        let updated = self.store.update(id, draft).await?;
        self.refresh().await?;
        Ok(updated)
    }

    /// Deletes `item` after confirmation. Returns `false` when the user declined.
    pub async fn delete(&mut self, item: &R, confirm: &mut dyn Confirm) -> Result<bool> {
        if !confirm.confirm(&delete_question(item)) {
            info!(resource = R::COLLECTION, id = %item.id(), "deletion declined");
            return Ok(false);
        }
        self.store.delete(item.id()).await?;
        self.refresh().await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use sinistres_core::models::{Client, ClientDraft};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MemoryStore {
        clients: Mutex<Vec<Client>>,
        lists: AtomicUsize,
        mutations: AtomicUsize,
        fail_next: Mutex<Option<u16>>,
    }

    fn client_from(id: &str, draft: &ClientDraft) -> Client {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "matricule": draft.matricule,
            "nom": draft.nom,
            "prenom": draft.prenom,
        }))
        .unwrap()
    }

    #[async_trait]
    impl ResourceStore<Client> for MemoryStore {
        async fn list(&self) -> Result<Vec<Client>> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            Ok(self.clients.lock().unwrap().clone())
        }

        async fn create(&self, draft: &ClientDraft) -> Result<Client> {
            self.mutations.fetch_add(1, Ordering::SeqCst);
            if let Some(status) = self.fail_next.lock().unwrap().take() {
                return Err(ClientError::Status {
                    status,
                    body: "Matricule déjà existant".into(),
                });
            }
            let mut clients = self.clients.lock().unwrap();
            let client = client_from(&format!("c{}", clients.len() + 1), draft);
            clients.push(client.clone());
            Ok(client)
        }

        async fn update(&self, id: &str, draft: &ClientDraft) -> Result<Client> {
            self.mutations.fetch_add(1, Ordering::SeqCst);
            let mut clients = self.clients.lock().unwrap();
            let client = client_from(id, draft);
            for slot in clients.iter_mut().filter(|c| c.id == id) {
                *slot = client.clone();
            }
            Ok(client)
        }

        async fn delete(&self, id: &str) -> Result<()> {
            self.mutations.fetch_add(1, Ordering::SeqCst);
            self.clients.lock().unwrap().retain(|c| c.id != id);
            Ok(())
        }
    }

    fn draft(matricule: &str, nom: &str) -> ClientDraft {
        ClientDraft {
            matricule: matricule.into(),
            nom: nom.into(),
            prenom: "Jean".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_mutations_refetch_the_list() {
        let store = MemoryStore::default();
        let mut screen: ResourceScreen<Client, _> = ResourceScreen::new(&store);

        screen.refresh().await.unwrap();
        assert!(screen.items().is_empty());

        screen.create(&draft("M001", "Dupont")).await.unwrap();
        assert_eq!(store.lists.load(Ordering::SeqCst), 2);
        assert_eq!(screen.items().len(), 1);
        assert_eq!(screen.items()[0].matricule, "M001");

        screen.update("c1", &draft("M001", "Durand")).await.unwrap();
        assert_eq!(store.lists.load(Ordering::SeqCst), 3);
        assert_eq!(screen.find("c1").unwrap().nom, "Durand");
        assert_eq!(screen.filtered("durand").len(), 1);
        assert_eq!(screen.filtered("dupont").len(), 0);
    }

    #[tokio::test]
    async fn test_declined_delete_sends_nothing() {
        let store = MemoryStore::default();
        let mut screen: ResourceScreen<Client, _> = ResourceScreen::new(&store);
        let created = screen.create(&draft("M002", "Martin")).await.unwrap();
        let before = store.mutations.load(Ordering::SeqCst);

        let mut asked = Vec::new();
        let mut decline = |q: &str| {
            asked.push(q.to_string());
            false
        };
        assert!(!screen.delete(&created, &mut decline).await.unwrap());
        assert_eq!(store.mutations.load(Ordering::SeqCst), before);
        assert_eq!(asked, vec!["Êtes-vous sûr de vouloir supprimer le client M002 ?"]);
        assert_eq!(screen.items().len(), 1);

        assert!(screen.delete(&created, &mut AlwaysConfirm).await.unwrap());
        assert!(screen.items().is_empty());
    }

    #[tokio::test]
    async fn test_backend_error_surfaces_without_refetch() {
        let store = MemoryStore::default();
        *store.fail_next.lock().unwrap() = Some(409);
        let mut screen: ResourceScreen<Client, _> = ResourceScreen::new(&store);

        let err = screen.create(&draft("M001", "Dupont")).await.unwrap_err();
        assert_eq!(err.status(), Some(409));
        assert_eq!(store.lists.load(Ordering::SeqCst), 0);
    }
}
