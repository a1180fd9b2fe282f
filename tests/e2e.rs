//! End-to-end tests driving the full pipeline through the axum router.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use parametra::prelude::*;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tower::ServiceExt;

fn test_app() -> App {
    static TRACING: std::sync::Once = std::sync::Once::new();
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
    App::with_settings(Settings {
        debug: false,
        max_body_size: 1024 * 1024,
        worker_threads: 1,
    })
}

async fn send(app: App, request: Request<Body>) -> Response {
    app.into_router().oneshot(request).await.unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn path_param_resolves_and_validates() {
    let app = test_app()
        .route(
            Route::get("/items/{item_id}")
                .param("item_id", Param::auto(FieldType::Integer))
                .handle(handler_fn(|args: Args| async move {
                    let item_id: i64 = args.parse("item_id")?;
                    Ok(HandlerOutput::json(json!(item_id)))
                })),
        )
        .unwrap();

    let response = send(
        app,
        Request::get("/items/5").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!(5));
}

#[tokio::test]
async fn invalid_path_param_is_422_with_detail() {
    let app = test_app()
        .route(
            Route::get("/items/{item_id}")
                .param("item_id", Param::auto(FieldType::Integer))
                .handle(handler_fn(|args: Args| async move {
                    let item_id: i64 = args.parse("item_id")?;
                    Ok(HandlerOutput::json(json!(item_id)))
                })),
        )
        .unwrap();

    let response = send(
        app,
        Request::get("/items/abc").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body_json(response).await,
        json!({
            "detail": {"path": {"item_id": ["Not a valid integer."]}},
            "error": "ValidationError",
            "status_code": 422,
        })
    );
}

#[tokio::test]
async fn missing_form_fields_aggregate() {
    let app = test_app()
        .route(
            Route::post("/login")
                .param("username", Param::form(FieldType::String))
                .param("password", Param::form(FieldType::String))
                .param("grant_type", Param::form(FieldType::String))
                .handle(handler_fn(|args: Args| async move {
                    let username: String = args.parse("username")?;
                    Ok(HandlerOutput::json(json!({"user": username})))
                })),
        )
        .unwrap();

    let response = send(
        app,
        Request::post("/login")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    let form_errors = body["detail"]["form"].as_object().unwrap();
    assert_eq!(form_errors.len(), 3);
    assert_eq!(
        form_errors["username"],
        json!(["Missing data for required field."])
    );
}

#[tokio::test]
async fn login_form_succeeds() {
    let app = test_app()
        .route(
            Route::post("/login")
                .param("username", Param::form(FieldType::String))
                .param("password", Param::form(FieldType::String))
                .handle(handler_fn(|args: Args| async move {
                    let username: String = args.parse("username")?;
                    Ok(HandlerOutput::json(json!({"user": username})))
                })),
        )
        .unwrap();

    let response = send(
        app,
        Request::post("/login")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from("username=ana&password=pw"))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"user": "ana"}));
}

#[tokio::test]
async fn missing_api_key_is_403() {
    let scheme: Arc<dyn Resolve> = Arc::new(ApiKeyHeader::new("x-api-key"));
    let app = test_app()
        .route(
            Route::get("/secure")
                .security("key", scheme)
                .param("q", Param::query(FieldType::String))
                .handle(handler_fn(|args: Args| async move {
                    let key: String = args.parse("key")?;
                    Ok(HandlerOutput::json(json!(key)))
                })),
        )
        .unwrap();

    let response = send(app, Request::get("/secure").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body, json!({"detail": "Not authenticated"}));
}

#[tokio::test]
async fn security_failure_masks_validation_errors() {
    let scheme: Arc<dyn Resolve> = Arc::new(ApiKeyHeader::new("x-api-key"));
    let app = test_app()
        .route(
            Route::get("/secure")
                .security("key", scheme)
                .param("q", Param::query(FieldType::String))
                .handle(handler_fn(|_| async { Ok(HandlerOutput::json(json!(null))) })),
        )
        .unwrap();

    // `q` is missing too, but the security phase runs first.
    let response = send(app, Request::get("/secure").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert!(body.get("detail").unwrap().is_string());
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn api_key_flows_to_handler() {
    let scheme: Arc<dyn Resolve> = Arc::new(ApiKeyHeader::new("x-api-key"));
    let app = test_app()
        .route(
            Route::get("/secure")
                .security("key", scheme)
                .handle(handler_fn(|args: Args| async move {
                    let key: String = args.parse("key")?;
                    Ok(HandlerOutput::json(json!({"key": key})))
                })),
        )
        .unwrap();

    let response = send(
        app,
        Request::get("/secure")
            .header("x-api-key", "secret")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"key": "secret"}));
}

#[tokio::test]
async fn nested_dependencies_combine() {
    let paging = resolver_fn(
        "paging",
        vec![
            ParamDecl::field(
                "offset",
                Param::query(FieldType::Integer).default_value(json!(0)),
            ),
            ParamDecl::field(
                "limit",
                Param::query(FieldType::Integer).default_value(json!(100)),
            ),
        ],
        |args: Args| async move {
            let offset: i64 = args.parse("offset")?;
            let limit: i64 = args.parse("limit")?;
            Ok(Resolved::json(json!({"offset": offset, "limit": limit})))
        },
    );
    let search = resolver_fn(
        "search",
        vec![
            ParamDecl::field(
                "q",
                Param::query(FieldType::Optional(Box::new(FieldType::String))),
            ),
            ParamDecl::depends("paging", paging),
        ],
        |args: Args| async move {
            let q = args.json("q").cloned().unwrap_or(Value::Null);
            let paging = args.json("paging").cloned().unwrap_or(Value::Null);
            Ok(Resolved::json(json!({"q": q, "paging": paging})))
        },
    );

    let app = test_app()
        .route(
            Route::get("/items")
                .depends("search", search)
                .handle(handler_fn(|args: Args| async move {
                    Ok(HandlerOutput::json(
                        args.json("search").cloned().unwrap_or(Value::Null),
                    ))
                })),
        )
        .unwrap();

    let response = send(
        app,
        Request::get("/items?q=pens&offset=20")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"q": "pens", "paging": {"offset": 20, "limit": 100}})
    );
}

#[tokio::test]
async fn nested_resolver_binds_path_param() {
    let paging = resolver_fn(
        "paging",
        vec![
            ParamDecl::field(
                "offset",
                Param::query(FieldType::Integer).default_value(json!(0)),
            ),
            ParamDecl::field(
                "limit",
                Param::query(FieldType::Integer).default_value(json!(100)),
            ),
        ],
        |args: Args| async move {
            let offset: i64 = args.parse("offset")?;
            let limit: i64 = args.parse("limit")?;
            Ok(Resolved::json(json!({"offset": offset, "limit": limit})))
        },
    );
    // `q` has no explicit kind; against this route it matches the `{q}`
    // placeholder and classifies as a path parameter.
    let search = resolver_fn(
        "search",
        vec![
            ParamDecl::field("q", Param::auto(FieldType::String)),
            ParamDecl::depends("paging", paging),
        ],
        |args: Args| async move {
            let q: String = args.parse("q")?;
            let paging = args.json("paging").cloned().unwrap_or(Value::Null);
            Ok(Resolved::json(json!({"q": q, "paging": paging})))
        },
    );

    let app = test_app()
        .route(
            Route::get("/filtered/{q}")
                .depends("search", search)
                .handle(handler_fn(|args: Args| async move {
                    Ok(HandlerOutput::json(
                        args.json("search").cloned().unwrap_or(Value::Null),
                    ))
                })),
        )
        .unwrap();

    let response = send(
        app,
        Request::get("/filtered/foo?offset=20")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"q": "foo", "paging": {"offset": 20, "limit": 100}})
    );
}

#[tokio::test]
async fn scheme_declared_as_dependency_still_runs_first() {
    let scheme: Arc<dyn Resolve> = Arc::new(ApiKeyHeader::new("x-api-key"));
    let app = test_app()
        .route(
            Route::get("/secure")
                .depends("key", scheme)
                .param("q", Param::query(FieldType::String))
                .handle(handler_fn(|_| async { Ok(HandlerOutput::json(json!(null))) })),
        )
        .unwrap();

    // `q` is missing too; the scheme's capability puts it in the security
    // phase, so the 403 wins over the would-be 422.
    let response = send(app, Request::get("/secure").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        body_json(response).await,
        json!({"detail": "Not authenticated"})
    );
}

#[tokio::test]
async fn diamond_shared_dependency_registers_and_caches() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let db = resolver_fn("db", vec![], move |_| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Resolved::json(json!("conn")))
        }
    });
    let users = resolver_fn(
        "users",
        vec![ParamDecl::depends("db", Arc::clone(&db))],
        |args: Args| async move {
            Ok(Resolved::json(json!({"users": args.json("db").cloned()})))
        },
    );
    let items = resolver_fn(
        "items",
        vec![ParamDecl::depends("db", db)],
        |args: Args| async move {
            Ok(Resolved::json(json!({"items": args.json("db").cloned()})))
        },
    );

    let app = test_app()
        .route(
            Route::get("/report")
                .depends("users", users)
                .depends("items", items)
                .handle(handler_fn(|_| async { Ok(HandlerOutput::json(json!("ok"))) })),
        )
        .unwrap();

    let response = send(app, Request::get("/report").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn shared_dependency_resolves_once_per_request() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let session = resolver_fn("session", vec![], move |_| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Resolved::json(json!("session")))
        }
    });

    let app = test_app()
        .route(
            Route::get("/items")
                .depends("first", Arc::clone(&session))
                .depends("second", session)
                .handle(handler_fn(|args: Args| async move {
                    Ok(HandlerOutput::json(json!([
                        args.json("first").cloned(),
                        args.json("second").cloned(),
                    ])))
                })),
        )
        .unwrap();

    let response = send(app, Request::get("/items").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn teardown_runs_after_response() {
    let closed = Arc::new(AtomicUsize::new(0));
    let marker = Arc::clone(&closed);
    let conn = resolver_fn("conn", vec![], move |_| {
        let marker = Arc::clone(&marker);
        async move {
            Ok(
                Resolved::json(json!("conn")).with_teardown(move |outcome| async move {
                    assert_eq!(outcome, TeardownOutcome::Success);
                    marker.fetch_add(1, Ordering::SeqCst);
                }),
            )
        }
    });

    let app = test_app()
        .route(
            Route::get("/items")
                .depends("conn", conn)
                .handle(handler_fn(|_| async { Ok(HandlerOutput::json(json!(1))) })),
        )
        .unwrap();

    let response = send(app, Request::get("/items").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn teardown_sees_failure_outcome() {
    let seen = Arc::new(std::sync::Mutex::new(None));
    let marker = Arc::clone(&seen);
    let conn = resolver_fn("conn", vec![], move |_| {
        let marker = Arc::clone(&marker);
        async move {
            Ok(
                Resolved::json(json!("conn")).with_teardown(move |outcome| async move {
                    *marker.lock().unwrap() = Some(outcome);
                }),
            )
        }
    });

    let app = test_app()
        .route(
            Route::get("/items")
                .depends("conn", conn)
                .handle(handler_fn(|_| async {
                    Err::<HandlerOutput, _>(HttpException::not_found("missing"))
                })),
        )
        .unwrap();

    let response = send(app, Request::get("/items").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(*seen.lock().unwrap(), Some(TeardownOutcome::Failure));
}

#[tokio::test]
async fn resolver_override_swaps_value() {
    let real = resolver_fn("real", vec![], |_| async {
        Ok(Resolved::json(json!("real")))
    });
    let fake = resolver_fn("fake", vec![], |_| async {
        Ok(Resolved::json(json!("fake")))
    });

    let app = test_app()
        .route(
            Route::get("/items")
                .depends("value", Arc::clone(&real))
                .handle(handler_fn(|args: Args| async move {
                    Ok(HandlerOutput::json(
                        args.json("value").cloned().unwrap_or(Value::Null),
                    ))
                })),
        )
        .unwrap();
    app.overrides().insert(&real, fake);

    let response = send(app, Request::get("/items").body(Body::empty()).unwrap()).await;
    assert_eq!(body_json(response).await, json!("fake"));
}

#[tokio::test]
async fn json_body_validates_against_schema() {
    let item = Schema::new("Item")
        .field("name", Field::new(FieldType::String))
        .field("price", Field::new(FieldType::Number));
    let app = test_app()
        .route(
            Route::post("/items")
                .param("item", Param::body(FieldType::Object(item)))
                .status(StatusCode::CREATED)
                .handle(handler_fn(|args: Args| async move {
                    Ok(HandlerOutput::json(
                        args.json("item").cloned().unwrap_or(Value::Null),
                    ))
                })),
        )
        .unwrap();

    let response = send(
        app,
        Request::post("/items")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"name": "pen", "price": 1.5}"#))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(
        body_json(response).await,
        json!({"name": "pen", "price": 1.5})
    );
}

#[tokio::test]
async fn malformed_json_body_is_400() {
    let app = test_app()
        .route(
            Route::post("/items")
                .param("item", Param::body(FieldType::Any))
                .handle(handler_fn(|_| async { Ok(HandlerOutput::json(json!(1))) })),
        )
        .unwrap();

    let response = send(
        app,
        Request::post("/items")
            .header("content-type", "application/json")
            .body(Body::from("{broken"))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await,
        json!({"detail": "There was an error parsing the body"})
    );
}

#[tokio::test]
async fn header_and_cookie_params_resolve() {
    let app = test_app()
        .route(
            Route::get("/me")
                .param("x_token", Param::header(FieldType::String))
                .param("session", Param::cookie(FieldType::String))
                .handle(handler_fn(|args: Args| async move {
                    let token: String = args.parse("x_token")?;
                    let session: String = args.parse("session")?;
                    Ok(HandlerOutput::json(json!({
                        "token": token,
                        "session": session,
                    })))
                })),
        )
        .unwrap();

    let response = send(
        app,
        Request::get("/me")
            .header("x-token", "t1")
            .header("cookie", "session=s1; theme=dark")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"token": "t1", "session": "s1"})
    );
}

#[tokio::test]
async fn validator_bounds_reported() {
    let app = test_app()
        .route(
            Route::get("/items")
                .param("limit", Param::query(FieldType::Integer).ge(1.0).le(100.0))
                .handle(handler_fn(|_| async { Ok(HandlerOutput::json(json!(1))) })),
        )
        .unwrap();

    let response = send(
        app,
        Request::get("/items?limit=0").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body_json(response).await["detail"]["query"]["limit"],
        json!(["Must be greater than or equal to 1."])
    );
}

#[tokio::test]
async fn ambient_response_and_background_tasks() {
    let ran = Arc::new(AtomicUsize::new(0));
    let marker = Arc::clone(&ran);
    let app = test_app()
        .route(
            Route::post("/notify")
                .ambient("response", AmbientKind::Response)
                .ambient("tasks", AmbientKind::BackgroundTasks)
                .handle(handler_fn(move |args: Args| {
                    let marker = Arc::clone(&marker);
                    async move {
                        let response = args.response("response").unwrap();
                        response.set_status(StatusCode::ACCEPTED);
                        response.insert_header("x-queued", "1");
                        let tasks = args.background("tasks").unwrap();
                        tasks.add_task(async move {
                            marker.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        });
                        Ok(HandlerOutput::json(json!({"queued": true})))
                    }
                })),
        )
        .unwrap();

    let response = send(app, Request::post("/notify").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(response.headers().get("x-queued").unwrap(), "1");
    // Give the spawned task a chance to run.
    tokio::task::yield_now().await;
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn response_model_filters_and_no_content_strips() {
    let public = Schema::new("PublicUser").field("name", Field::new(FieldType::String));
    let app = test_app()
        .route(
            Route::get("/user")
                .response_model(public)
                .handle(handler_fn(|_| async {
                    Ok(HandlerOutput::json(
                        json!({"name": "ana", "password": "pw"}),
                    ))
                })),
        )
        .unwrap()
        .route(
            Route::delete("/user")
                .status(StatusCode::NO_CONTENT)
                .handle(handler_fn(|_| async {
                    Ok(HandlerOutput::json(json!(null)))
                })),
        )
        .unwrap();
    let router = app.into_router();

    let response = router
        .clone()
        .oneshot(Request::get("/user").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(body_json(response).await, json!({"name": "ana"}));

    let response = router
        .oneshot(Request::delete("/user").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    assert!(bytes.is_empty());
}

#[tokio::test]
async fn oauth2_challenge_header() {
    let scheme: Arc<dyn Resolve> = Arc::new(OAuth2PasswordBearer::new("/token"));
    let app = test_app()
        .route(
            Route::get("/profile")
                .security("token", scheme)
                .handle(handler_fn(|_| async { Ok(HandlerOutput::json(json!(1))) })),
        )
        .unwrap();

    let response = send(app, Request::get("/profile").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers().get("www-authenticate").unwrap(), "Bearer");
}

#[tokio::test]
async fn blocking_handler_end_to_end() {
    let app = test_app()
        .route(
            Route::get("/report")
                .param("n", Param::query(FieldType::Integer))
                .handle_blocking(|args: Args| {
                    let n: i64 = args.parse("n")?;
                    Ok(HandlerOutput::json(json!(n * 2)))
                }),
        )
        .unwrap();

    let response = send(
        app,
        Request::get("/report?n=21").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(body_json(response).await, json!(42));
}
