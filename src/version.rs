pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
