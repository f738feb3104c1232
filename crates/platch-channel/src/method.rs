//! Request/response channels.

use std::sync::Arc;
use std::time::Duration;

use platch_wire::WireValue;

use crate::error::Result;
use crate::host::Host;
use crate::message::{MethodCall, MethodResult};

/// Serves inbound method calls on one channel.
///
/// Calls on the same channel are dispatched one at a time in arrival
/// order, so implementations only need `Send + Sync`, not reentrancy.
/// Return [`MethodResult::NotImplemented`] for method names the
/// handler does not recognize.
pub trait MethodHandler: Send + Sync {
    fn on_call(&self, call: MethodCall) -> MethodResult;
}

impl<F> MethodHandler for F
where
    F: Fn(MethodCall) -> MethodResult + Send + Sync,
{
    fn on_call(&self, call: MethodCall) -> MethodResult {
        self(call)
    }
}

/// Caller-side handle for one named method channel.
///
/// Cheap to clone and to recreate; all state lives in the [`Host`].
#[derive(Clone)]
pub struct MethodChannel {
    host: Host,
    name: String,
}

impl MethodChannel {
    pub fn new(host: &Host, name: impl Into<String>) -> Self {
        Self {
            host: host.clone(),
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register `handler` for inbound calls on this channel.
    pub fn set_handler(&self, handler: Arc<dyn MethodHandler>) -> Result<()> {
        self.host.register_method_handler(&self.name, handler)
    }

    /// Invoke `method` on the peer and block until its single result
    /// arrives.
    pub fn invoke(&self, method: &str, arguments: WireValue) -> Result<MethodResult> {
        self.host
            .invoke(&self.name, MethodCall::new(method, arguments))
    }

    /// Like [`invoke`], but give up with [`crate::ChannelError::Timeout`]
    /// if no result arrives within `timeout`. The peer may still
    /// execute the call; only the wait is bounded.
    ///
    /// [`invoke`]: MethodChannel::invoke
    pub fn invoke_with_timeout(
        &self,
        method: &str,
        arguments: WireValue,
        timeout: Duration,
    ) -> Result<MethodResult> {
        self.host
            .invoke_with_timeout(&self.name, MethodCall::new(method, arguments), timeout)
    }
}
