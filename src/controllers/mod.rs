mod route;
mod secret;

pub use route::RouteWatcherService;
pub use secret::SecretWatcherService;
