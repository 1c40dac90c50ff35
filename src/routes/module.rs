use axum::{
    Router,
    handler::Handler,
    http::Method,
    routing::{MethodFilter, MethodRouter, on},
};

pub(super) type RouterWrap<S> = Box<dyn FnOnce(Router<S>) -> Router<S> + Send>;
pub(super) type MethodRouterWrap<S> = Box<dyn FnOnce(MethodRouter<S>) -> MethodRouter<S> + Send>;
pub(super) type HandlerFactory<S> = Box<dyn FnOnce(MethodFilter) -> MethodRouter<S> + Send>;

/// A group of routes mounted under a common path.
pub struct Module<S = ()> {
    pub path: String,
    pub(super) middleware: Vec<RouterWrap<S>>,
    pub(super) routes: Vec<Route<S>>,
}

impl<S> Module<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            middleware: Vec::new(),
            routes: Vec::new(),
        }
    }

    /// Adds middleware for every route of the module, e.g.
    /// `|r| r.route_layer(from_fn(auth))`. Middleware runs in the order it
    /// was added.
    pub fn middleware<F>(mut self, wrap: F) -> Self
    where
        F: FnOnce(Router<S>) -> Router<S> + Send + 'static,
    {
        self.middleware.push(Box::new(wrap));
        self
    }

    pub fn route(mut self, route: Route<S>) -> Self {
        self.routes.push(route);
        self
    }
}

/// A single handler bound to a method and path.
pub struct Route<S = ()> {
    pub path: String,
    pub method: Method,
    pub(super) middleware: Vec<MethodRouterWrap<S>>,
    pub(super) handler: HandlerFactory<S>,
}

impl<S> Route<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new<H, T>(method: Method, path: impl Into<String>, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        Self {
            path: path.into(),
            method,
            middleware: Vec::new(),
            handler: Box::new(move |filter| on(filter, handler)),
        }
    }

    pub fn get<H, T>(path: impl Into<String>, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        Self::new(Method::GET, path, handler)
    }

    pub fn post<H, T>(path: impl Into<String>, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        Self::new(Method::POST, path, handler)
    }

    /// Adds middleware for this route only, e.g. `|r| r.layer(from_fn(f))`.
    /// Middleware runs in the order it was added.
    pub fn middleware<F>(mut self, wrap: F) -> Self
    where
        F: FnOnce(MethodRouter<S>) -> MethodRouter<S> + Send + 'static,
    {
        self.middleware.push(Box::new(wrap));
        self
    }
}
