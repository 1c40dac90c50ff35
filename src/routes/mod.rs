mod module;

use axum::{Router, http::Method, routing::MethodFilter};

pub use module::{Module, Route};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModuleError {
    #[error("empty modules")]
    EmptyModules,
    #[error("unsupported method {0}")]
    Method(Method),
}

fn absolute(path: &str) -> String {
    format!("/{}", path.trim_start_matches('/'))
}

/// Mounts every module on `router`.
///
/// Each module lives under `/<module.path>` (merged at the root when the path
/// is empty or `/`). Route paths are relative to the module.
pub fn init<S>(router: Router<S>, modules: Vec<Module<S>>) -> Result<Router<S>, ModuleError>
where
    S: Clone + Send + Sync + 'static,
{
    if modules.is_empty() {
        return Err(ModuleError::EmptyModules);
    }

    let mut router = router;

    for module in modules {
        let mut group = Router::new();

        for route in module.routes {
            let filter = MethodFilter::try_from(route.method.clone())
                .map_err(|_| ModuleError::Method(route.method.clone()))?;

            // 先添加的中间件在最外层
            let handler = route
                .middleware
                .into_iter()
                .rev()
                .fold((route.handler)(filter), |handler, wrap| wrap(handler));

            group = group.route(&absolute(&route.path), handler);
        }

        let group = module
            .middleware
            .into_iter()
            .rev()
            .fold(group, |group, wrap| wrap(group));

        let prefix = absolute(&module.path);
        router = if prefix == "/" {
            router.merge(group)
        } else {
            router.nest(&prefix, group)
        };

        tracing::debug!("module mounted at {}", prefix);
    }

    Ok(router)
}
