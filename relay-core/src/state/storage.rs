//! Client Storage
//!
//! Fields can be persisted in the browser: as cookies, in local storage or in
//! session storage. The server only declares the binding and its options; the
//! client reads the stored value on hydration and writes it back on change.
//!
//! [`AppSchema::client_storage`](super::AppSchema::client_storage) compiles
//! the bindings of a whole tree into a [`ClientStorageManifest`] keyed by
//! `"<container path>.<field>"`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Options for a cookie-backed field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieOptions {
    /// Cookie name. Defaults to the field key when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_age: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    pub secure: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            name: None,
            path: "/".to_string(),
            max_age: None,
            domain: None,
            secure: false,
            same_site: None,
        }
    }
}

/// Options for a local storage field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalStorageOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Propagate changes made in other tabs.
    pub sync: bool,
}

/// Options for a session storage field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStorageOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Where a field is persisted on the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientStorage {
    Cookie(CookieOptions),
    Local(LocalStorageOptions),
    Session(SessionStorageOptions),
}

impl ClientStorage {
    pub fn cookie() -> Self {
        ClientStorage::Cookie(CookieOptions::default())
    }

    pub fn local() -> Self {
        ClientStorage::Local(LocalStorageOptions::default())
    }

    pub fn session() -> Self {
        ClientStorage::Session(SessionStorageOptions::default())
    }
}

/// Compiled client storage bindings of a whole tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientStorageManifest {
    pub cookies: BTreeMap<String, CookieOptions>,
    pub local_storage: BTreeMap<String, LocalStorageOptions>,
    pub session_storage: BTreeMap<String, SessionStorageOptions>,
}

impl ClientStorageManifest {
    pub(crate) fn insert(&mut self, key: String, storage: &ClientStorage) {
        match storage {
            ClientStorage::Cookie(options) => {
                self.cookies.insert(key, options.clone());
            }
            ClientStorage::Local(options) => {
                self.local_storage.insert(key, options.clone());
            }
            ClientStorage::Session(options) => {
                self.session_storage.insert(key, options.clone());
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty() && self.local_storage.is_empty() && self.session_storage.is_empty()
    }
}
