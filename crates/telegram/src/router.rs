use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::warn;

use crate::handlers::{CallbackRequest, HandlerContext};
use crate::error::Result;

type BoxFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// A callback/command handler: takes the shared bot context and the parsed
/// request, returns once its chat replies (if any) are sent.
pub type Handler = Arc<dyn Fn(Arc<HandlerContext>, CallbackRequest) -> BoxFuture<'static> + Send + Sync>;

/// Maps a callback-data or command name to the handler that serves it, with
/// an explicit fallback for anything unrecognized. Route names are matched
/// against the segment before the first `?` in callback data (see
/// [`crate::handlers::parse_callback`]).
#[derive(Clone, Default)]
pub struct Router {
    routes: HashMap<&'static str, Handler>,
}

impl Router {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &'static str, handler: Handler) {
        self.routes.insert(name, handler);
    }

    pub async fn dispatch(&self, ctx: Arc<HandlerContext>, name: &str, request: CallbackRequest) {
        match self.routes.get(name) {
            Some(handler) => {
                if let Err(err) = handler(ctx, request).await {
                    warn!(route = name, %err, "handler failed");
                }
            },
            None => {
                warn!(route = name, "unknown route, ignoring");
            },
        }
    }
}

/// Builds the router wiring every known callback name to its handler. New
/// routes are added here and nowhere else.
#[must_use]
pub fn default_router() -> Router {
    let mut router = Router::new();
    router.register("status", Arc::new(|ctx, req| Box::pin(async move { crate::handlers::status(&ctx, &req).await })));
    router.register(
        "lightControl",
        Arc::new(|ctx, req| Box::pin(async move { crate::handlers::light_control(&ctx, &req).await })),
    );
    router.register(
        "lampMenu",
        Arc::new(|ctx, req| Box::pin(async move { crate::handlers::lamp_menu(&ctx, &req).await })),
    );
    router.register(
        "lampSwitch",
        Arc::new(|ctx, req| Box::pin(async move { crate::handlers::lamp_switch(&ctx, &req).await })),
    );
    router
}
