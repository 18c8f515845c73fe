use crate::client::link::PeerLink;
use crate::common::PeerEndpoint;
use crate::error::RegistryError;

/// Known peers for the sidebar, which one is selected and which one is active.
///
/// Holds no sockets, only endpoint metadata.
#[derive(Debug, Default, Clone)]
pub struct ConnectionRegistry {
    endpoints: Vec<PeerEndpoint>,
    active: Option<usize>,
    selected: usize,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `endpoint` unless an equal one is already known. Returns its index.
    pub fn register(&mut self, endpoint: PeerEndpoint) -> usize {
        if let Some(index) = self.position(&endpoint) {
            return index;
        }
        self.endpoints.push(endpoint);
        self.endpoints.len() - 1
    }

    /// Marks the peer behind `link` as active. The endpoint has to be registered
    /// and the link connected.
    pub fn set_active(&mut self, link: &PeerLink) -> Result<(), RegistryError> {
        let endpoint = link.endpoint();
        let index = self
            .position(endpoint)
            .ok_or_else(|| RegistryError::NotRegistered(endpoint.to_string()))?;
        if !link.is_connected() {
            return Err(RegistryError::NotConnected(endpoint.to_string()));
        }
        self.active = Some(index);
        Ok(())
    }

    /// Clears the active marker only if it points at `endpoint`
    pub fn deactivate(&mut self, endpoint: &PeerEndpoint) {
        if self.active() == Some(endpoint) {
            self.active = None;
        }
    }

    pub fn active(&self) -> Option<&PeerEndpoint> {
        self.active.and_then(|i| self.endpoints.get(i))
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    pub fn endpoints(&self) -> &[PeerEndpoint] {
        &self.endpoints
    }

    pub fn selected(&self) -> Option<&PeerEndpoint> {
        self.endpoints.get(self.selected)
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn select(&mut self, endpoint: &PeerEndpoint) -> Result<(), RegistryError> {
        let index = self
            .position(endpoint)
            .ok_or_else(|| RegistryError::NotRegistered(endpoint.to_string()))?;
        self.selected = index;
        Ok(())
    }

    pub fn select_next(&mut self) {
        if self.selected + 1 < self.endpoints.len() {
            self.selected += 1;
        }
    }

    pub fn select_previous(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    fn position(&self, endpoint: &PeerEndpoint) -> Option<usize> {
        self.endpoints.iter().position(|e| e == endpoint)
    }
}
