mod app;
mod greet;

pub use app::GreeterHooks;
