use calc_client::{content_type, get, get_with, json_body, post, root, text_body};
use calc_service::build_root;
use callport_core::config::RootConfig;
use callport_core::http::StatusCode;

mod calc_client;

#[test]
fn test_xml_body_and_result() {
    let response = root().dispatch(&post(
        "/multiply",
        Some("text/xml"),
        "<parameters><a>4</a><b>5</b></parameters>",
    ));

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(content_type(&response), "text/xml; charset=UTF-8");
    assert_eq!(text_body(&response), "<result>20</result>");
}

#[test]
fn test_xml_fault() {
    let response = root().dispatch(&post(
        "/multiply",
        Some("application/xml"),
        "<parameters><a>x</a><b>5</b></parameters>",
    ));

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        text_body(&response),
        "<error><faultcode>Client</faultcode>\
         <faultstring>Invalid input for field/attribute a. Value: &apos;x&apos;. \
         Expected an integer</faultstring>\
         <debuginfo /></error>"
    );
}

#[test]
fn test_extension_wins_over_accept() {
    let response =
        root().dispatch(&get_with("/multiply.xml?a=2&b=3", &[("accept", "application/json")]));

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(text_body(&response), "<result>6</result>");
}

#[test]
fn test_accept_header_selects_format() {
    let root = root();

    let response = root.dispatch(&get_with("/multiply?a=2&b=3", &[("accept", "text/xml")]));
    assert_eq!(text_body(&response), "<result>6</result>");

    let response = root.dispatch(&get_with(
        "/multiply?a=2&b=3",
        &[("accept", "text/xml;q=0.5, application/json")],
    ));
    assert_eq!(json_body(&response), serde_json::json!({ "result": 6 }));
}

#[test]
fn test_not_acceptable() {
    let response = root().dispatch(&get_with("/multiply?a=2&b=3", &[("accept", "image/png")]));

    assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
    assert_eq!(content_type(&response), "text/plain; charset=UTF-8");
    assert_eq!(text_body(&response), "Unacceptable media type: image/png");
}

#[test]
fn test_unsupported_media_type() {
    let root = root();

    let response = root.dispatch(&post("/multiply", Some("application/yaml"), "a: 1"));
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let response = root.dispatch(&post("/multiply", None, r#"{"a": 1, "b": 2}"#));
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[test]
fn test_unknown_function() {
    let response = root().dispatch(&get("/nope"));

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        json_body(&response),
        serde_json::json!({
            "faultcode": "Client",
            "faultstring": "Unknown function path: nope",
            "debuginfo": null,
        })
    );
}

#[test]
fn test_protocol_override() {
    let root = root();

    let response = root.dispatch(&get("/multiply?a=2&b=3&_protocol=rest"));
    assert_eq!(json_body(&response), serde_json::json!({ "result": 6 }));

    let response = root.dispatch(&get("/multiply?a=2&b=3&_protocol=soap"));
    assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
}

#[test]
fn test_webpath_prefix() {
    let root = build_root(RootConfig::default().with_webpath("/api/")).unwrap();

    let response = root.dispatch(&get("/api/multiply?a=2&b=3"));
    assert_eq!(json_body(&response), serde_json::json!({ "result": 6 }));

    let response = root.dispatch(&get("/multiply?a=2&b=3"));
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = root.dispatch(&get("/apimultiply?a=2&b=3"));
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(&response)["faultstring"], "Unknown function path: /apimultiply");
}
