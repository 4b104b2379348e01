//! Clients API (`self.clients`).

use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use tracing::debug;
use url::Url;

/// A client (controlled page).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    /// Client ID.
    pub id: String,

    /// Client URL.
    pub url: Url,

    /// Client type.
    pub client_type: ClientType,

    /// Whether focused.
    pub focused: bool,

    /// Whether this worker controls the client.
    pub controlled: bool,
}

/// Client type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientType {
    #[default]
    Window,
    Worker,
    SharedWorker,
    All,
}

/// Options for `clients.matchAll()`.
#[derive(Debug, Clone, Default)]
pub struct ClientMatchOptions {
    pub include_uncontrolled: bool,
    pub client_type: ClientType,
}

/// Clients known to the worker.
#[derive(Debug, Default)]
pub struct Clients {
    clients: HashMap<String, Client>,
    /// Insertion order, for stable `match_all` results.
    order: Vec<String>,
}

impl Clients {
    /// Create new clients manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a client by ID.
    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    /// Number of known clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Match clients in the order they appeared.
    pub fn match_all(&self, options: &ClientMatchOptions) -> Vec<&Client> {
        self.order
            .iter()
            .filter_map(|id| self.clients.get(id))
            .filter(|c| options.include_uncontrolled || c.controlled)
            .filter(|c| match options.client_type {
                ClientType::All => true,
                t => c.client_type == t,
            })
            .collect()
    }

    /// Open a new focused window at `url`.
    pub fn open_window(&mut self, url: Url) -> Client {
        let client = Client {
            id: next_client_id(),
            url,
            client_type: ClientType::Window,
            focused: true,
            controlled: true,
        };
        debug!(client = %client.id, url = %client.url, "Opened window");

        for other in self.clients.values_mut() {
            other.focused = false;
        }
        self.add(client.clone());
        client
    }

    /// Take control of every client. Returns how many changed.
    pub fn claim(&mut self) -> usize {
        let mut claimed = 0;
        for client in self.clients.values_mut().filter(|c| !c.controlled) {
            client.controlled = true;
            claimed += 1;
        }
        debug!(claimed, "Claimed clients");
        claimed
    }

    /// Add a client.
    pub fn add(&mut self, client: Client) {
        if !self.clients.contains_key(&client.id) {
            self.order.push(client.id.clone());
        }
        self.clients.insert(client.id.clone(), client);
    }

    /// Remove a client.
    pub fn remove(&mut self, id: &str) -> Option<Client> {
        self.order.retain(|o| o != id);
        self.clients.remove(id)
    }
}

fn next_client_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    format!("client-{}", COUNTER.fetch_add(1, Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(id: &str) -> Client {
        Client {
            id: id.to_string(),
            url: Url::parse("https://turf.example/admin.html").unwrap(),
            client_type: ClientType::Window,
            focused: false,
            controlled: false,
        }
    }

    #[test]
    fn test_open_window() {
        let mut clients = Clients::new();
        clients.add(Client {
            focused: true,
            ..page("existing")
        });

        let client = clients.open_window(Url::parse("https://turf.example/admin.html").unwrap());
        assert_eq!(client.client_type, ClientType::Window);
        assert!(client.focused);
        assert!(clients.get(&client.id).is_some());
        assert!(!clients.get("existing").unwrap().focused);
        assert_eq!(clients.len(), 2);
    }

    #[test]
    fn test_claim() {
        let mut clients = Clients::new();
        clients.add(page("a"));
        clients.add(page("b"));

        let controlled = ClientMatchOptions::default();
        assert!(clients.match_all(&controlled).is_empty());

        assert_eq!(clients.claim(), 2);
        assert_eq!(clients.claim(), 0);
        let ids: Vec<_> = clients
            .match_all(&controlled)
            .into_iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_match_all_by_type() {
        let mut clients = Clients::new();
        clients.add(page("window"));
        clients.add(Client {
            client_type: ClientType::Worker,
            ..page("worker")
        });

        let options = ClientMatchOptions {
            include_uncontrolled: true,
            client_type: ClientType::Worker,
        };
        let found = clients.match_all(&options);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "worker");

        let all = ClientMatchOptions {
            include_uncontrolled: true,
            client_type: ClientType::All,
        };
        assert_eq!(clients.match_all(&all).len(), 2);
    }

    #[test]
    fn test_remove() {
        let mut clients = Clients::new();
        clients.add(page("a"));
        assert!(clients.remove("a").is_some());
        assert!(clients.remove("a").is_none());
        assert!(clients.is_empty());
    }
}
