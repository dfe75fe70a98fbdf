//! Modifier capability traits.
//!
//! A modifier is a named function over pipeline state. Request modifiers run
//! before dispatch, response modifiers after. Both see the whole chain, so a
//! request modifier can install a one-shot client or enqueue more work, and a
//! response modifier can edit headers or queue HTML token rewriters.

use std::borrow::Cow;
use std::sync::Arc;

use super::chain::ProxyChain;
use super::error::ModifierError;

pub trait RequestModifier: Send + Sync {
    /// Name used in logs and abort messages.
    fn name(&self) -> &str;

    fn apply(&self, chain: &mut ProxyChain) -> Result<(), ModifierError>;
}

pub trait ResponseModifier: Send + Sync {
    /// Name used in logs and abort messages.
    fn name(&self) -> &str;

    fn apply(&self, chain: &mut ProxyChain) -> Result<(), ModifierError>;
}

/// Request modifier backed by a closure.
pub struct RequestFn<F> {
    name: Cow<'static, str>,
    f: F,
}

/// Response modifier backed by a closure.
pub struct ResponseFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> RequestModifier for RequestFn<F>
where
    F: Fn(&mut ProxyChain) -> Result<(), ModifierError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, chain: &mut ProxyChain) -> Result<(), ModifierError> {
        (self.f)(chain)
    }
}

impl<F> ResponseModifier for ResponseFn<F>
where
    F: Fn(&mut ProxyChain) -> Result<(), ModifierError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, chain: &mut ProxyChain) -> Result<(), ModifierError> {
        (self.f)(chain)
    }
}

/// Wrap a closure as a shared request modifier.
pub fn request_modifier<F>(name: impl Into<Cow<'static, str>>, f: F) -> Arc<dyn RequestModifier>
where
    F: Fn(&mut ProxyChain) -> Result<(), ModifierError> + Send + Sync + 'static,
{
    Arc::new(RequestFn {
        name: name.into(),
        f,
    })
}

/// Wrap a closure as a shared response modifier.
pub fn response_modifier<F>(name: impl Into<Cow<'static, str>>, f: F) -> Arc<dyn ResponseModifier>
where
    F: Fn(&mut ProxyChain) -> Result<(), ModifierError> + Send + Sync + 'static,
{
    Arc::new(ResponseFn {
        name: name.into(),
        f,
    })
}
