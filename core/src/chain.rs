//! The ordered pre-request handler chain.

use std::fmt;
use std::sync::Arc;

use crate::options::NormalizedRequest;
use crate::{Error, Result};

/// A request transform run by the chain.
///
/// Handlers are pure functions over the request value: they receive one
/// [`NormalizedRequest`] and return the next version. Failing a handler
/// fails the call.
pub type Handler = Arc<dyn Fn(NormalizedRequest) -> Result<NormalizedRequest> + Send + Sync>;

/// Wrap a closure into a [`Handler`].
pub fn handler_fn<F>(f: F) -> Handler
where
    F: Fn(NormalizedRequest) -> Result<NormalizedRequest> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// The stages of the chain, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Headers every call gets (user agent, accept, content type).
    CommonHeaders,
    /// The per-call handler supplied on the descriptor.
    OneShot,
    /// The ordered middleware list, executed most-recently-added first.
    Middleware,
    /// Reserved for the signer.
    Signing,
    /// Final fix-ups immediately before the transport.
    Final,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::CommonHeaders => write!(f, "common-headers"),
            Stage::OneShot => write!(f, "one-shot"),
            Stage::Middleware => write!(f, "middleware"),
            Stage::Signing => write!(f, "signing"),
            Stage::Final => write!(f, "final"),
        }
    }
}

/// The ordered, pluggable pre-request pipeline.
///
/// `CommonHeaders`, `Signing` and `Final` hold at most one handler each and
/// may be set once per chain; re-setting is rejected when it happens, not
/// when the next request runs. `Middleware` is an append-only list run in
/// reverse insertion order. The `OneShot` stage is never stored here; its
/// handler arrives with each descriptor.
#[derive(Default)]
pub struct HandlerChain {
    common_headers: Option<Handler>,
    middleware: Vec<Handler>,
    signing: Option<Handler>,
    finalizer: Option<Handler>,
}

impl HandlerChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a handler into a stage.
    ///
    /// Single-assignment stages reject a second handler with a
    /// configuration error; `Stage::Middleware` appends, exactly like
    /// [`HandlerChain::push_middleware`].
    pub fn set(&mut self, stage: Stage, handler: Handler) -> Result<()> {
        let slot = match stage {
            Stage::CommonHeaders => &mut self.common_headers,
            Stage::Signing => &mut self.signing,
            Stage::Final => &mut self.finalizer,
            Stage::Middleware => {
                self.middleware.push(handler);
                return Ok(());
            }
            Stage::OneShot => {
                return Err(Error::config_invalid(
                    "one-shot handlers are supplied per call, not configured on the chain",
                ));
            }
        };

        if slot.is_some() {
            return Err(Error::config_invalid(format!(
                "stage {stage} is already configured"
            )));
        }
        *slot = Some(handler);
        Ok(())
    }

    /// Append to the middleware list.
    pub fn push_middleware(&mut self, handler: Handler) {
        self.middleware.push(handler);
    }

    /// Run the stages strictly in order on one request:
    /// common headers, the per-call handler, middleware in reverse
    /// insertion order, signing, final.
    pub fn apply(
        &self,
        mut req: NormalizedRequest,
        one_shot: Option<&Handler>,
    ) -> Result<NormalizedRequest> {
        if let Some(handler) = &self.common_headers {
            req = handler(req)?;
        }
        if let Some(handler) = one_shot {
            req = handler(req)?;
        }
        for handler in self.middleware.iter().rev() {
            req = handler(req)?;
        }
        if let Some(handler) = &self.signing {
            req = handler(req)?;
        }
        if let Some(handler) = &self.finalizer {
            req = handler(req)?;
        }
        Ok(req)
    }
}

impl fmt::Debug for HandlerChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerChain")
            .field("common_headers", &self.common_headers.is_some())
            .field("middleware", &self.middleware.len())
            .field("signing", &self.signing.is_some())
            .field("final", &self.finalizer.is_some())
            .finish()
    }
}
