use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::http::{HttpRequest, HttpResponse, Method, StatusCode};

/// A request handler.
///
/// Handlers are shared by every worker thread, so they must be both `Send`
/// and `Sync`. A handler runs synchronously on the worker that owns the
/// connection, at most once per routed request.
pub type Handler = Arc<dyn Fn(&HttpRequest) -> HttpResponse + Send + Sync>;

/// Route table keyed by path, then method.
#[derive(Clone, Default)]
pub struct Router {
    routes: HashMap<String, HashMap<Method, Handler>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `(path, method)`.
    ///
    /// A missing leading `/` is added. Registering the same pair again
    /// replaces the earlier handler.
    pub fn register<F>(&mut self, path: &str, method: Method, handler: F)
    where
        F: Fn(&HttpRequest) -> HttpResponse + Send + Sync + 'static,
    {
        let path = if path.starts_with('/') {
            path.to_owned()
        } else {
            format!("/{}", path)
        };

        self.routes
            .entry(path)
            .or_default()
            .insert(method, Arc::new(handler));
    }

    /// Routes a request to its handler.
    ///
    /// Unknown paths get `404 Not Found`; known paths without a handler for
    /// the method get `405 Method Not Allowed`. Otherwise the handler's
    /// response is returned unchanged.
    pub fn dispatch(&self, request: &HttpRequest) -> HttpResponse {
        let Some(methods) = self.routes.get(request.uri().path()) else {
            return HttpResponse::new(StatusCode::NotFound);
        };

        match methods.get(&request.method()) {
            Some(handler) => handler(request),
            None => HttpResponse::new(StatusCode::MethodNotAllowed),
        }
    }

    pub fn len(&self) -> usize {
        self.routes.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut routes: Vec<_> = self
            .routes
            .iter()
            .flat_map(|(path, methods)| methods.keys().map(move |method| (path, method)))
            .collect();
        routes.sort();
        f.debug_struct("Router").field("routes", &routes).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMessage;

    fn text(body: &'static str) -> impl Fn(&HttpRequest) -> HttpResponse + Send + Sync {
        move |_| HttpResponse::with_content(StatusCode::Ok, body)
    }

    #[test]
    fn test_dispatch_to_registered_handler() {
        let mut router = Router::new();
        router.register("/", Method::Get, text("root"));
        router.register("items", Method::Post, text("created"));

        let response = router.dispatch(&HttpRequest::new(Method::Get, "/"));
        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(response.content(), b"root");

        let response = router.dispatch(&HttpRequest::new(Method::Post, "/items"));
        assert_eq!(response.content(), b"created");
        assert_eq!(router.len(), 2);
    }

    #[test]
    fn test_unknown_path_is_not_found() {
        let router = Router::new();
        let response = router.dispatch(&HttpRequest::new(Method::Get, "/missing"));
        assert_eq!(response.status(), StatusCode::NotFound);
        assert_eq!(response.header("Content-Length"), Some("0"));
    }

    #[test]
    fn test_unknown_method_is_not_allowed() {
        let mut router = Router::new();
        router.register("/", Method::Get, text("root"));
        router.register("/", Method::Head, text("root"));

        let response = router.dispatch(&HttpRequest::new(Method::Post, "/"));
        assert_eq!(response.status(), StatusCode::MethodNotAllowed);
    }

    /// The last registration for a pair wins.
    #[test]
    fn test_reregistration_replaces_handler() {
        let mut router = Router::new();
        router.register("/v", Method::Get, text("one"));
        router.register("/v", Method::Get, text("two"));

        let response = router.dispatch(&HttpRequest::new(Method::Get, "/v"));
        assert_eq!(response.content(), b"two");
        assert_eq!(router.len(), 1);
    }

    /// Request paths are lower-cased by the URI parser, registered paths are not.
    #[test]
    fn test_registered_path_case_is_kept() {
        let mut router = Router::new();
        router.register("/Upper", Method::Get, text("never"));

        let response = router.dispatch(&HttpRequest::new(Method::Get, "/Upper"));
        assert_eq!(response.status(), StatusCode::NotFound);
    }
}
