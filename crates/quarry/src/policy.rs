use crate::Request;

/// Permission collaborator consulted before any connection is handed out.
/// Denial is not an error: `get_connection` returns `None` and the caller
/// decides how to surface it.
pub trait AccessPolicy: Send + Sync + 'static {
    fn is_resource_allowed(&self, resource: &str, request: &Request) -> bool;
}

impl<F> AccessPolicy for F
where
    F: Fn(&str, &Request) -> bool + Send + Sync + 'static,
{
    fn is_resource_allowed(&self, resource: &str, request: &Request) -> bool {
        self(resource, request)
    }
}

/// Default policy: every datasource is reachable from every request.
#[derive(Debug, Default)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn is_resource_allowed(&self, _resource: &str, _request: &Request) -> bool {
        true
    }
}
