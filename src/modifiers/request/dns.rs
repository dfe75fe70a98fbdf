//! Resolve the target through DNS-over-HTTPS for one request.

use std::sync::Arc;

use crate::proxychain::{request_modifier, DohResolver, ModifierError, RequestModifier};

/// Dispatch this request through a client that resolves via Google DoH.
pub fn resolve_with_google_doh() -> Arc<dyn RequestModifier> {
    request_modifier("ResolveWithGoogleDoH", |chain| {
        let resolver = DohResolver::google().map_err(|err| ModifierError::Other(err.to_string()))?;
        let client = chain.client().with_dns_resolver(Arc::new(resolver))?;
        chain.set_once_client(client);
        Ok(())
    })
}
