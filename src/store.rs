//! Local mirrors of server-owned collections.
//!
//! A [`ResourceStore`] never inserts anything the server has not
//! acknowledged. Reconciliation happens only after a response has arrived,
//! so a dropped (cancelled) future leaves the mirror as it was.
//!
//! | operation | on success                         | on failure |
//! |-----------|------------------------------------|------------|
//! | list      | replace the whole mirror           | untouched  |
//! | create    | prepend the server's item          | untouched  |
//! | update    | replace item by id, same position  | untouched  |
//! | delete    | remove item by id                  | untouched  |

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::transport::{Transport, TransportError};

/// A server-owned collection member with a server-assigned id.
pub trait Resource: Clone + DeserializeOwned + Send + Sync + 'static {
    /// Body sent to create a new member.
    type Draft: Serialize + Send + Sync;

    /// Used in log fields.
    const KIND: &'static str;

    fn id(&self) -> &str;

    /// Path for listing; `skip`/`limit` are appended.
    fn list_path() -> &'static str;

    /// Path that creates a new member.
    fn create_path() -> &'static str;

    /// Case-insensitive text match; `needle` is already lowercased.
    fn matches(&self, needle: &str) -> bool;

    /// Reject a draft before it reaches the network.
    fn validate_draft(_draft: &Self::Draft) -> Result<(), String> {
        Ok(())
    }
}

/// Resources the client may modify after creation.
pub trait Editable: Resource {
    type Patch: Serialize + Send + Sync;

    fn item_path(id: &str) -> String;

    fn validate_patch(_patch: &Self::Patch) -> Result<(), String> {
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("invalid draft: {0}")]
    InvalidDraft(String),
}

impl StoreError {
    pub fn display_message(&self) -> String {
        match self {
            StoreError::Transport(e) => e.display_message(),
            StoreError::InvalidDraft(reason) => reason.clone(),
        }
    }

    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            StoreError::Transport(e) => Some(e),
            StoreError::InvalidDraft(_) => None,
        }
    }
}

/// Offset pagination as understood by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub skip: u32,
    pub limit: u32,
}

impl Page {
    pub fn first(limit: u32) -> Self {
        Self { skip: 0, limit }
    }

    pub fn next(&self) -> Self {
        Self {
            skip: self.skip + self.limit,
            limit: self.limit,
        }
    }

    pub fn query(&self) -> String {
        format!("skip={}&limit={}", self.skip, self.limit)
    }
}

/// Ordered local copy of a collection and its reconciliation rules.
#[derive(Debug, Clone)]
pub struct Mirror<T> {
    items: Vec<T>,
}

impl<T> Default for Mirror<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Resource> Mirror<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn find(&self, id: &str) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|item| item.id() == id)
    }

    /// All items matching `text`. Blank text matches everything.
    pub fn search(&self, text: &str) -> Vec<&T> {
        let needle = text.trim().to_lowercase();
        if needle.is_empty() {
            return self.items.iter().collect();
        }
        self.items.iter().filter(|item| item.matches(&needle)).collect()
    }

    pub fn replace_all(&mut self, items: Vec<T>) {
        self.items = items;
    }

    pub fn prepend(&mut self, item: T) {
        self.items.insert(0, item);
    }

    /// Returns false when no item with that id is mirrored.
    pub fn replace(&mut self, item: T) -> bool {
        match self.position(item.id()) {
            Some(index) => {
                self.items[index] = item;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<T> {
        self.position(id).map(|index| self.items.remove(index))
    }
}

/// List/create/update/delete against the backend, reconciled into a [`Mirror`].
pub struct ResourceStore<T: Resource> {
    transport: Transport,
    mirror: Mirror<T>,
}

impl<T: Resource> ResourceStore<T> {
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            mirror: Mirror::new(),
        }
    }

    pub fn items(&self) -> &[T] {
        self.mirror.items()
    }

    pub fn mirror(&self) -> &Mirror<T> {
        &self.mirror
    }

    pub fn find(&self, id: &str) -> Option<&T> {
        self.mirror.find(id)
    }

    pub fn search(&self, text: &str) -> Vec<&T> {
        self.mirror.search(text)
    }

    /// Fetch one page and make it the whole mirror.
    pub async fn list(&mut self, page: Page) -> Result<&[T], StoreError> {
        let items = fetch_page::<T>(&self.transport, page).await?;
        debug!(kind = T::KIND, count = items.len(), skip = page.skip, "mirror replaced");
        self.mirror.replace_all(items);
        Ok(self.mirror.items())
    }

    /// Send a draft; prepend the server's copy on success.
    pub async fn create(&mut self, draft: &T::Draft) -> Result<T, StoreError> {
        let item = create_remote::<T>(&self.transport, draft).await?;
        info!(kind = T::KIND, id = %item.id(), "created");
        self.mirror.prepend(item.clone());
        Ok(item)
    }
}

impl<T: Editable> ResourceStore<T> {
    /// Fetch one member. Refreshes the mirrored copy in place if present.
    pub async fn fetch(&mut self, id: &str) -> Result<T, StoreError> {
        let item: T = self.transport.get(&T::item_path(id)).await?;
        self.mirror.replace(item.clone());
        Ok(item)
    }

    /// Send a partial patch; replace the mirrored item in place on success.
    pub async fn update(&mut self, id: &str, patch: &T::Patch) -> Result<T, StoreError> {
        T::validate_patch(patch).map_err(StoreError::InvalidDraft)?;
        let item: T = self.transport.put(&T::item_path(id), patch).await?;
        if !self.mirror.replace(item.clone()) {
            warn!(kind = T::KIND, id = %id, "updated item was not mirrored");
        }
        info!(kind = T::KIND, id = %id, "updated");
        Ok(item)
    }

    /// Delete on the server; drop the mirrored item on success.
    pub async fn delete(&mut self, id: &str) -> Result<(), StoreError> {
        self.transport.delete(&T::item_path(id)).await?;
        self.mirror.remove(id);
        info!(kind = T::KIND, id = %id, "deleted");
        Ok(())
    }
}

pub(crate) async fn fetch_page<T: Resource>(transport: &Transport, page: Page) -> Result<Vec<T>, StoreError> {
    let path = format!("{}?{}", T::list_path(), page.query());
    Ok(transport.get(&path).await?)
}

pub(crate) async fn create_remote<T: Resource>(transport: &Transport, draft: &T::Draft) -> Result<T, StoreError> {
    T::validate_draft(draft).map_err(StoreError::InvalidDraft)?;
    Ok(transport.post(T::create_path(), draft).await?)
}
