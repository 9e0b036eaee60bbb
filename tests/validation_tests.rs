#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use brrtguard::{HttpError, Request, Response, Settings, ViewError, ViewOptions};
use common::apps::{build, configurator, HELLO_SPEC};
use common::logs::capture;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn hello_app(settings: Settings, calls: Arc<AtomicUsize>) -> brrtguard::App {
    let (mut config, path) = configurator(HELLO_SPEC, settings);
    config.add_route("hello", "/hello").unwrap();
    config.add_view("hello", ViewOptions::openapi(), move |request| {
        calls.fetch_add(1, Ordering::SeqCst);
        let validated = request
            .openapi_validated()
            .map_err(|e| HttpError::new(500, e.to_string()))?;
        Ok(Response::json(
            200,
            &json!({ "hello": validated.parameters.query["name"] }),
        ))
    });
    build(config, path)
}

#[test]
fn test_missing_required_parameter() {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = hello_app(Settings::default(), Arc::clone(&calls));
    let response = app.call(Request::get("/hello"));
    assert_eq!(response.status, 400);
    assert_eq!(
        response.json_body().unwrap(),
        json!([{
            "exception": "MissingRequiredParameter",
            "message": "Missing required parameter: name",
            "field": "name"
        }])
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_parameter_too_short() {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = hello_app(Settings::default(), Arc::clone(&calls));
    let response = app.call(Request::get("/hello?name=yo"));
    assert_eq!(response.status, 400);
    assert_eq!(
        response.json_body().unwrap(),
        json!([{"exception": "ValidationError", "message": "'yo' is too short", "field": "name"}])
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_valid_request_reaches_handler_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = hello_app(Settings::default(), Arc::clone(&calls));
    let response = app.call(Request::get("/hello?name=john"));
    assert_eq!(response.status, 200);
    assert_eq!(response.content_type(), Some("application/json"));
    assert_eq!(response.json_body().unwrap(), json!({"hello": "john"}));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_undeclared_http_error_becomes_500() {
    let (mut config, path) = configurator(HELLO_SPEC, Settings::default());
    config.add_route("hello", "/hello").unwrap();
    config.add_view("hello", ViewOptions::openapi(), |_| Err(HttpError::forbidden()));
    let app = build(config, path);

    let response = app.call(Request::get("/hello?name=john"));
    assert_eq!(response.status, 500);
    assert_eq!(
        response.json_body().unwrap(),
        json!([{"exception": "InvalidResponse", "message": "Unknown response http status: 403"}])
    );
}

#[test]
fn test_declared_http_error_passes_through() {
    let (mut config, path) = configurator(HELLO_SPEC, Settings::default());
    config.add_route("hello", "/hello").unwrap();
    config.add_view("hello", ViewOptions::openapi(), |_| {
        Err(HttpError::new(400, "name is reserved"))
    });
    let app = build(config, path);

    let response = app.call(Request::get("/hello?name=john"));
    assert_eq!(response.status, 400);
    assert_eq!(response.json_body().unwrap(), json!({"error": "name is reserved"}));
}

#[test]
fn test_undocumented_request_error_is_flagged() {
    const SPEC: &str = r#"
openapi: "3.0.0"
info: {title: Hello, version: "1.0"}
paths:
  /hello:
    get:
      parameters:
        - {name: name, in: query, required: true, schema: {type: string}}
      responses:
        "200": {description: OK}
"#;
    let (mut config, path) = configurator(SPEC, Settings::default());
    config.add_route("hello", "/hello").unwrap();
    config.add_view("hello", ViewOptions::openapi(), |_| Ok(Response::new(200)));
    let app = build(config, path);

    let (response, logs) = capture(|| app.call(Request::get("/hello")));
    assert_eq!(response.status, 500);
    assert_eq!(
        response.json_body().unwrap(),
        json!([{"exception": "InvalidResponse", "message": "Unknown response http status: 400"}])
    );
    assert!(logs.contains("ImproperAPISpecificationWarning"), "logs: {logs}");
    assert!(logs.contains("Request validation failed"));
    assert!(logs.contains("Response validation failed"));
}

#[test]
fn test_valid_request_does_not_flag_specification() {
    let app = hello_app(Settings::default(), Arc::new(AtomicUsize::new(0)));
    let (_, logs) = capture(|| app.call(Request::get("/hello?name=john")));
    assert!(!logs.contains("ImproperAPISpecificationWarning"));
}

#[test]
fn test_without_exception_views_errors_propagate() {
    let settings = Settings {
        add_exception_views: false,
        ..Settings::default()
    };
    let app = hello_app(settings, Arc::new(AtomicUsize::new(0)));

    let mut request = Request::get("/hello?name=yo");
    match app.handle(&mut request) {
        Err(ViewError::RequestValidation(err)) => {
            assert_eq!(err.status(), 400);
            assert_eq!(err.to_string(), "Value of name not valid for schema: 1 error(s)");
        }
        other => panic!("expected request validation error, got {other:?}"),
    }

    let response = app.call(Request::get("/hello?name=yo"));
    assert_eq!(response.status, 500);
    assert_eq!(response.text_body(), "Internal Server Error");
}

#[test]
fn test_response_validation_error_propagates_without_view() {
    let settings = Settings {
        add_exception_views: false,
        ..Settings::default()
    };
    let (mut config, path) = configurator(HELLO_SPEC, settings);
    config.add_route("hello", "/hello").unwrap();
    config.add_view("hello", ViewOptions::openapi(), |_| Ok(Response::new(412)));
    let app = build(config, path);

    let mut request = Request::get("/hello?name=john");
    match app.handle(&mut request) {
        Err(ViewError::ResponseValidation(err)) => {
            assert_eq!(err.status(), 500);
            assert_eq!(err.response.status, 412);
            assert_eq!(err.to_string(), "Unknown response http status: 412");
        }
        other => panic!("expected response validation error, got {other:?}"),
    }
}

#[test]
fn test_response_schema_violation() {
    const SPEC: &str = r#"
openapi: "3.0.0"
info: {title: Greeting, version: "1.0"}
paths:
  /greeting:
    get:
      responses:
        "200":
          description: A greeting
          content:
            application/json:
              schema:
                type: object
                required: [hello]
                properties:
                  hello: {type: string}
"#;
    let (mut config, path) = configurator(SPEC, Settings::default());
    config.add_route("greeting", "/greeting").unwrap();
    config.add_view("greeting", ViewOptions::openapi(), |_| {
        Ok(Response::json(200, &json!({"bye": "now"})))
    });
    let app = build(config, path);

    let response = app.call(Request::get("/greeting"));
    assert_eq!(response.status, 500);
    assert_eq!(
        response.json_body().unwrap(),
        json!([{
            "exception": "ValidationError",
            "message": "'hello' is a required property",
            "field": "hello"
        }])
    );
}

#[test]
fn test_security_failure_is_401() {
    const SPEC: &str = r#"
openapi: "3.0.0"
info: {title: Secure, version: "1.0"}
components:
  securitySchemes:
    apiKey:
      type: apiKey
      in: header
      name: X-API-Key
security:
  - apiKey: []
paths:
  /secret:
    get:
      responses:
        "200": {description: OK}
        "401": {description: Unauthorized}
"#;
    let (mut config, path) = configurator(SPEC, Settings::default());
    config.add_route("secret", "/secret").unwrap();
    config.add_view("secret", ViewOptions::openapi(), |_| {
        Ok(Response::text(200, "shh"))
    });
    let app = build(config, path);

    let response = app.call(Request::get("/secret"));
    assert_eq!(response.status, 401);
    assert_eq!(
        response.json_body().unwrap(),
        json!([{"exception": "InvalidSecurity", "message": "Security not valid for any requirement"}])
    );

    let response = app.call(Request::get("/secret").with_header("X-API-Key", "k"));
    assert_eq!(response.status, 200);
    assert_eq!(response.text_body(), "shh");
}

#[test]
fn test_validated_parameters_are_cast() {
    const SPEC: &str = r#"
openapi: "3.0.0"
info: {title: Items, version: "1.0"}
paths:
  /items/{id}:
    parameters:
      - {name: id, in: path, required: true, schema: {type: integer}}
    get:
      parameters:
        - {name: limit, in: query, schema: {type: integer, default: 10}}
        - {name: tags, in: query, schema: {type: array, items: {type: string}}}
        - {name: X-Trace, in: header, schema: {type: boolean}}
      responses:
        "200": {description: OK}
        "400": {description: Bad Request}
"#;
    let (mut config, path) = configurator(SPEC, Settings::default());
    config.add_route("item", "/items/{id}").unwrap();
    config.add_view("item", ViewOptions::openapi(), |request| {
        let validated = request.openapi_validated().unwrap();
        Ok(Response::json(200, &serde_json::to_value(validated).unwrap()))
    });
    let app = build(config, path);

    let response = app.call(
        Request::get("/items/42?tags=a&tags=b").with_header("X-Trace", "true"),
    );
    assert_eq!(response.status, 200);
    let body = response.json_body().unwrap();
    assert_eq!(body["parameters"]["path"], json!({"id": 42}));
    assert_eq!(body["parameters"]["query"], json!({"limit": 10, "tags": ["a", "b"]}));
    assert_eq!(body["parameters"]["header"], json!({"X-Trace": true}));
    assert_eq!(body["body"], json!(null));

    let response = app.call(Request::get("/items/abc"));
    assert_eq!(response.status, 400);
    assert_eq!(
        response.json_body().unwrap(),
        json!([{"exception": "CastError", "message": "Failed to cast value abc to type integer"}])
    );
}

#[test]
fn test_per_view_overrides() {
    let (mut config, path) = configurator(HELLO_SPEC, Settings::default());
    config.add_route("hello", "/hello").unwrap();
    config.add_view(
        "hello",
        ViewOptions::openapi().validate_request(false).validate_response(false),
        |request| {
            let validated = request.openapi_validated().unwrap();
            assert!(validated.parameters.query.is_empty());
            Ok(Response::new(418))
        },
    );
    let app = build(config, path);
    assert_eq!(app.call(Request::get("/hello?name=yo")).status, 418);
}

#[test]
fn test_settings_disable_validation() {
    let settings = Settings {
        enable_request_validation: false,
        enable_response_validation: false,
        ..Settings::default()
    };
    let (mut config, path) = configurator(HELLO_SPEC, settings);
    config.add_route("hello", "/hello").unwrap();
    config.add_view("hello", ViewOptions::openapi(), |_| Err(HttpError::forbidden()));
    let app = build(config, path);
    assert_eq!(app.call(Request::get("/hello")).status, 403);
}

#[test]
fn test_plain_view_is_not_validated() {
    let (mut config, path) = configurator(HELLO_SPEC, Settings::default());
    config.add_route("hello", "/hello").unwrap();
    config.add_route("health", "/health").unwrap();
    config.add_view("hello", ViewOptions::openapi(), |_| Ok(Response::new(200)));
    config.add_view("health", ViewOptions::default(), |request| {
        assert!(request.openapi_validated().is_err());
        Ok(Response::new(204))
    });
    let app = build(config, path);
    assert_eq!(app.call(Request::get("/health")).status, 204);
}

#[test]
fn test_unmatched_route_is_404() {
    let app = hello_app(Settings::default(), Arc::new(AtomicUsize::new(0)));
    let response = app.call(Request::get("/nope"));
    assert_eq!(response.status, 404);
    assert_eq!(response.json_body().unwrap(), json!({"error": "Not Found"}));
}

#[test]
fn test_custom_validation_error_view() {
    let (mut config, path) = configurator(HELLO_SPEC, Settings::default());
    config.add_route("hello", "/hello").unwrap();
    config.add_view("hello", ViewOptions::openapi(), |_| Ok(Response::new(200)));
    config.set_validation_error_view(|_request, err| match err {
        ViewError::RequestValidation(e) => {
            Response::text(e.status(), &format!("custom: {} error(s)", e.errors.len()))
        }
        other => Response::text(500, &other.to_string()),
    });
    let app = build(config, path);

    let response = app.call(Request::get("/hello"));
    assert_eq!(response.status, 400);
    assert_eq!(response.text_body(), "custom: 1 error(s)");
}

#[test]
fn test_custom_extract_errors() {
    let (mut config, path) = configurator(HELLO_SPEC, Settings::default());
    config.add_route("hello", "/hello").unwrap();
    config.add_view("hello", ViewOptions::openapi(), |_| Ok(Response::new(200)));
    config.set_extract_errors(|errors| {
        brrtguard::collect_errors(errors)
            .into_iter()
            .map(|mut record| {
                record.message = record.message.to_uppercase();
                record
            })
            .collect()
    });
    let app = build(config, path);

    let response = app.call(Request::get("/hello?name=yo"));
    assert_eq!(response.status, 400);
    assert_eq!(response.json_body().unwrap()[0]["message"], json!("'YO' IS TOO SHORT"));
}

#[test]
fn test_operation_not_declared_for_method() {
    let (mut config, path) = configurator(HELLO_SPEC, Settings::default());
    config.add_route("hello", "/hello").unwrap();
    config.add_view("hello", ViewOptions::openapi(), |_| Ok(Response::new(200)));
    let app = build(config, path);

    let response = app.call(Request::post("/hello?name=john"));
    // Neither the request nor the rendered error matches a declared operation.
    assert_eq!(response.status, 500);
    assert_eq!(
        response.json_body().unwrap(),
        json!([{
            "exception": "OperationNotFound",
            "message": "Operation post not found for http://localhost/hello"
        }])
    );
}
