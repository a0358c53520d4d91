#[path = "../support/mod.rs"]
mod support;

mod http_feed;
