#![allow(dead_code)]

use calc_service::build_root;
use callport_core::bytes::Bytes;
use callport_core::config::RootConfig;
use callport_core::http::{Request, Response};
use callport_core::root::Root;

pub fn root() -> Root {
    build_root(RootConfig::default()).unwrap()
}

pub fn debug_root() -> Root {
    build_root(RootConfig::default().with_debug(true)).unwrap()
}

pub fn get(uri: &str) -> Request<Bytes> {
    Request::get(uri).body(Bytes::new()).unwrap()
}

pub fn get_with(uri: &str, headers: &[(&str, &str)]) -> Request<Bytes> {
    let mut builder = Request::get(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Bytes::new()).unwrap()
}

pub fn post(uri: &str, content_type: Option<&str>, body: &str) -> Request<Bytes> {
    let mut builder = Request::post(uri);
    if let Some(content_type) = content_type {
        builder = builder.header("content-type", content_type);
    }
    builder.body(Bytes::from(body.to_string())).unwrap()
}

pub fn post_json(uri: &str, payload: serde_json::Value) -> Request<Bytes> {
    post(uri, Some("application/json"), &payload.to_string())
}

pub fn json_body(response: &Response<Bytes>) -> serde_json::Value {
    serde_json::from_slice(response.body()).unwrap()
}

pub fn text_body(response: &Response<Bytes>) -> String {
    String::from_utf8(response.body().to_vec()).unwrap()
}

pub fn content_type(response: &Response<Bytes>) -> &str {
    response.headers()["content-type"].to_str().unwrap()
}
