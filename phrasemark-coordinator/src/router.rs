//! Delivery of a request to the source document, with bounded recovery.
//!
//! The ladder is strictly sequential: the known handle first, then one
//! inject-and-retry when nothing was listening, then one retry against a
//! document found by url. Each rung reads the identity current at the time
//! it runs.

use std::time::Duration;

use phrasemark_core::{Ack, AgentRequest, AgentResponse, DocumentHandle};
use tracing::{debug, info, warn};

use crate::error::RouteError;
use crate::host::{DeliveryError, DocumentHost};
use crate::resolve::find_by_url;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetIdentity {
    pub handle: Option<DocumentHandle>,
    pub url: Option<String>,
}

impl TargetIdentity {
    pub fn is_lost(&self) -> bool {
        self.handle.is_none() && self.url.is_none()
    }
}

/// Where the router reads and records the target document.
pub trait IdentitySource: Send + Sync {
    /// Current identity, recovered from wherever it can be found.
    fn current(&self) -> TargetIdentity;

    /// Records a handle found by url search; handle and url move together.
    fn adopt(&self, handle: DocumentHandle, url: &str);
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouteStep {
    Idle,
    TryHandle(DocumentHandle),
    TryInject(DocumentHandle),
    TryUrlFallback,
    Done(RouteOutcome),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    Delivered {
        handle: DocumentHandle,
        response: AgentResponse,
    },
    Failed(RouteError),
}

impl RouteOutcome {
    pub fn into_ack(self) -> Ack {
        match self {
            Self::Delivered { response, .. } => response.into_ack(),
            Self::Failed(err) => Ack::failure(err.kind(), err.to_string()),
        }
    }
}

pub struct RouteMachine<'a> {
    host: &'a dyn DocumentHost,
    identity: &'a dyn IdentitySource,
    request: AgentRequest,
    injection_delay: Duration,
    step: RouteStep,
    last_error: Option<DeliveryError>,
    tried: Option<DocumentHandle>,
}

impl<'a> RouteMachine<'a> {
    pub fn new(
        host: &'a dyn DocumentHost,
        identity: &'a dyn IdentitySource,
        request: AgentRequest,
        injection_delay: Duration,
    ) -> Self {
        Self {
            host,
            identity,
            request,
            injection_delay,
            step: RouteStep::Idle,
            last_error: None,
            tried: None,
        }
    }

    pub fn step(&self) -> &RouteStep {
        &self.step
    }

    pub fn is_done(&self) -> bool {
        matches!(self.step, RouteStep::Done(_))
    }

    pub async fn run(mut self) -> RouteOutcome {
        while !self.is_done() {
            self.advance().await;
        }
        match self.step {
            RouteStep::Done(outcome) => outcome,
            _ => unreachable!("loop exits only when done"),
        }
    }

    /// Performs the work of the current step and moves to the next one.
    pub async fn advance(&mut self) -> &RouteStep {
        let next = match std::mem::replace(&mut self.step, RouteStep::Idle) {
            RouteStep::Idle => self.start(),
            RouteStep::TryHandle(handle) => self.try_handle(handle).await,
            RouteStep::TryInject(handle) => self.try_inject(handle).await,
            RouteStep::TryUrlFallback => self.try_url_fallback().await,
            done @ RouteStep::Done(_) => done,
        };
        debug!(step = ?next, "route step");
        self.step = next;
        &self.step
    }

    fn start(&mut self) -> RouteStep {
        let identity = self.identity.current();
        if identity.is_lost() {
            warn!("no document identity available, not attempting delivery");
            return RouteStep::Done(RouteOutcome::Failed(RouteError::IdentityLost));
        }
        match identity.handle {
            Some(handle) => RouteStep::TryHandle(handle),
            None => RouteStep::TryUrlFallback,
        }
    }

    async fn try_handle(&mut self, handle: DocumentHandle) -> RouteStep {
        self.tried = Some(handle);
        match self.deliver(handle).await {
            Ok(response) => delivered(handle, response),
            Err(err) if err.is_no_listener() => {
                debug!(%handle, "no listener in document, will inject");
                self.last_error = Some(err);
                RouteStep::TryInject(handle)
            }
            Err(err) => {
                debug!(%handle, %err, "delivery to known handle failed");
                self.last_error = Some(err);
                RouteStep::TryUrlFallback
            }
        }
    }

    async fn try_inject(&mut self, handle: DocumentHandle) -> RouteStep {
        if let Err(err) = self.host.inject(handle).await {
            warn!(%handle, %err, "agent injection failed");
            self.last_error = Some(err);
            return RouteStep::TryUrlFallback;
        }
        tokio::time::sleep(self.injection_delay).await;
        match self.deliver(handle).await {
            Ok(response) => {
                info!(%handle, "delivered after injecting agent");
                delivered(handle, response)
            }
            Err(err) => {
                debug!(%handle, %err, "delivery after injection failed");
                self.last_error = Some(err);
                RouteStep::TryUrlFallback
            }
        }
    }

    async fn try_url_fallback(&mut self) -> RouteStep {
        let identity = self.identity.current();
        let Some(url) = identity.url else {
            return self.fail("no page address to search for");
        };

        let documents = self.host.documents().await;
        let Some(found) = find_by_url(&documents, &url).cloned() else {
            info!(%url, "no open document matches the session url");
            return self.fail("the page is no longer open");
        };

        info!(handle = %found.handle, url = %found.url, "re-resolved document by url");
        self.identity.adopt(found.handle, &found.url);
        self.tried = Some(found.handle);
        match self.deliver(found.handle).await {
            Ok(response) => delivered(found.handle, response),
            Err(err) => {
                warn!(handle = %found.handle, %err, "delivery after url fallback failed");
                self.last_error = Some(err);
                self.fail("the page did not respond")
            }
        }
    }

    async fn deliver(&self, handle: DocumentHandle) -> Result<AgentResponse, DeliveryError> {
        self.host.resolve(handle).await?;
        self.host.send(handle, self.request.clone()).await
    }

    fn fail(&self, summary: &str) -> RouteStep {
        let reason = match &self.last_error {
            Some(err) => format!("{summary}: {err}"),
            None => summary.to_string(),
        };
        RouteStep::Done(RouteOutcome::Failed(RouteError::DeliveryFailed {
            handle: self.tried,
            reason,
        }))
    }
}

fn delivered(handle: DocumentHandle, response: AgentResponse) -> RouteStep {
    RouteStep::Done(RouteOutcome::Delivered { handle, response })
}
