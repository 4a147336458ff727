//! In-process host: documents live in memory, each with an optional agent.
//!
//! Used by the CLI to drive a full request end to end and by the tests to
//! simulate reloads, closed tabs and pages the agent was never loaded into.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use phrasemark_agent::{DocumentSpec, SourceAgent};
use phrasemark_core::{AgentRequest, AgentResponse, DocumentHandle};
use tracing::debug;

use crate::host::{DeliveryError, DocumentHost, OpenDocument};

struct Tab {
    url: String,
    spec: DocumentSpec,
    agent: Option<Arc<Mutex<SourceAgent>>>,
    injectable: bool,
}

struct HostState {
    tabs: BTreeMap<DocumentHandle, Tab>,
    next_handle: u64,
    viewers: Vec<String>,
}

pub struct LocalHost {
    state: Mutex<HostState>,
}

impl Default for LocalHost {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalHost {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HostState {
                tabs: BTreeMap::new(),
                next_handle: 1,
                viewers: Vec::new(),
            }),
        }
    }

    /// Opens a document. With `with_agent` false the page behaves like a
    /// tab the agent was never loaded into.
    pub fn open(&self, spec: DocumentSpec, url: &str, with_agent: bool) -> DocumentHandle {
        let mut state = self.state.lock();
        let handle = DocumentHandle(state.next_handle);
        state.next_handle += 1;
        let agent = with_agent.then(|| Arc::new(Mutex::new(SourceAgent::from_spec(&spec))));
        state.tabs.insert(
            handle,
            Tab {
                url: url.to_string(),
                spec,
                agent,
                injectable: true,
            },
        );
        debug!(%handle, url, "document opened");
        handle
    }

    pub fn close(&self, handle: DocumentHandle) -> bool {
        self.state.lock().tabs.remove(&handle).is_some()
    }

    /// Closes the document and opens the same page again under a new handle.
    pub fn reload(&self, handle: DocumentHandle) -> Option<DocumentHandle> {
        let tab = self.state.lock().tabs.remove(&handle)?;
        Some(self.open(tab.spec, &tab.url, true))
    }

    /// Tears down the agent while leaving the document open.
    pub fn unload_agent(&self, handle: DocumentHandle) {
        if let Some(tab) = self.state.lock().tabs.get_mut(&handle) {
            tab.agent = None;
        }
    }

    /// Marks a document as refusing injection, like a privileged page.
    pub fn block_injection(&self, handle: DocumentHandle) {
        if let Some(tab) = self.state.lock().tabs.get_mut(&handle) {
            tab.injectable = false;
        }
    }

    pub fn has_agent(&self, handle: DocumentHandle) -> bool {
        self.state
            .lock()
            .tabs
            .get(&handle)
            .is_some_and(|tab| tab.agent.is_some())
    }

    pub fn with_agent<R>(&self, handle: DocumentHandle, f: impl FnOnce(&SourceAgent) -> R) -> Option<R> {
        let agent = self.state.lock().tabs.get(&handle)?.agent.clone()?;
        let guard = agent.lock();
        Some(f(&guard))
    }

    pub fn viewers(&self) -> Vec<String> {
        self.state.lock().viewers.clone()
    }
}

#[async_trait]
impl DocumentHost for LocalHost {
    async fn resolve(&self, handle: DocumentHandle) -> Result<String, DeliveryError> {
        self.state
            .lock()
            .tabs
            .get(&handle)
            .map(|tab| tab.url.clone())
            .ok_or(DeliveryError::HandleGone(handle))
    }

    async fn send(
        &self,
        handle: DocumentHandle,
        request: AgentRequest,
    ) -> Result<AgentResponse, DeliveryError> {
        let agent = {
            let state = self.state.lock();
            let tab = state
                .tabs
                .get(&handle)
                .ok_or(DeliveryError::HandleGone(handle))?;
            tab.agent.clone().ok_or(DeliveryError::NoListener)?
        };
        let response = agent.lock().handle(request);
        Ok(response)
    }

    async fn inject(&self, handle: DocumentHandle) -> Result<(), DeliveryError> {
        let mut state = self.state.lock();
        let tab = state
            .tabs
            .get_mut(&handle)
            .ok_or(DeliveryError::HandleGone(handle))?;
        if !tab.injectable {
            return Err(DeliveryError::Transport(
                "cannot load the agent into this page".into(),
            ));
        }
        if tab.agent.is_none() {
            tab.agent = Some(Arc::new(Mutex::new(SourceAgent::from_spec(&tab.spec))));
            debug!(%handle, "agent injected");
        }
        Ok(())
    }

    async fn documents(&self) -> Vec<OpenDocument> {
        self.state
            .lock()
            .tabs
            .iter()
            .map(|(handle, tab)| OpenDocument {
                handle: *handle,
                url: tab.url.clone(),
            })
            .collect()
    }

    async fn open_viewer(&self, url: &str) -> Result<()> {
        self.state.lock().viewers.push(url.to_string());
        Ok(())
    }
}
