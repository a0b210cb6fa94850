use depwire_tutorial::Tutorial;
use futures::executor::block_on;
use http::Request;
use tracing_subscriber::EnvFilter;

/// Requests replayed against the tutorial: method, uri, headers and body
const SCRIPT: &[(&str, &str, &[(&str, &str)], &str)] = &[
    ("GET", "/items/?q=foo&skip=1", &[], ""),
    ("GET", "/users/?limit=abc", &[], ""),
    ("GET", "/query/", &[("cookie", "last_query=bar")], ""),
    ("GET", "/needy/", &[], ""),
    ("GET", "/protected-items/", &[("x-token", "fake-super-secret-token")], ""),
    (
        "GET",
        "/protected-items/",
        &[
            ("x-token", "fake-super-secret-token"),
            ("x-key", "fake-super-secret-key"),
        ],
        "",
    ),
    ("GET", "/users/me", &[("authorization", "Bearer johndoe")], ""),
    ("GET", "/users/me", &[("authorization", "Bearer alice")], ""),
    ("POST", "/send-notification/someone@example.com?q=hello", &[], ""),
    (
        "POST",
        "/db/users/",
        &[("content-type", "application/json")],
        r#"{"email": "deadpool@example.com", "password": "chimichangas4life"}"#,
    ),
    (
        "POST",
        "/db/users/",
        &[("content-type", "application/json")],
        r#"{"email": "deadpool@example.com", "password": "chimichangas4life"}"#,
    ),
    (
        "POST",
        "/db/users/1/items/",
        &[("content-type", "application/json")],
        r#"{"title": "Katana"}"#,
    ),
    ("GET", "/db/users/", &[], ""),
    ("GET", "/db/users/2", &[], ""),
    ("GET", "/db/items/", &[], ""),
    ("GET", "/sessions/", &[], ""),
    ("GET", "/catalog/foo", &[("x-token", "coneofsilence")], ""),
    ("GET", "/catalog/foo", &[("x-token", "hailhydra")], ""),
    (
        "POST",
        "/catalog/",
        &[("x-token", "coneofsilence"), ("content-type", "application/json")],
        r#"{"id": "foobar", "title": "Foo Bar", "description": "The Foo Barters"}"#,
    ),
    ("GET", "/errors/items/bar", &[], ""),
    ("GET", "/unicorns/yolo", &[], ""),
    ("GET", "/info", &[], ""),
    ("GET", "/inventory/", &[("x-token", "fake-super-secret-token")], ""),
    ("PUT", "/inventory/bar", &[("x-token", "fake-super-secret-token")], ""),
    ("GET", "/inventory/foo", &[], ""),
    ("GET", "/nowhere", &[], ""),
];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let tutorial = Tutorial::from_env()?;
    tracing::info!(
        "Serving {} operations",
        tutorial.router.operations().count()
    );

    for (method, uri, headers, body) in SCRIPT {
        let mut request = Request::builder().method(*method).uri(*uri);
        for (name, value) in *headers {
            request = request.header(*name, *value);
        }
        let request = request.body(body.as_bytes().to_vec())?;

        let response = block_on(tutorial.router.serve(&tutorial.app, request));
        println!("{method} {uri} -> {}", response.status);
        if let Some(error) = response.header("x-error") {
            println!("  x-error: {error}");
        }
        println!("  {}", response.body);
    }

    println!(
        "Sessions opened: {}, closed: {}",
        tutorial.store.sessions_opened(),
        tutorial.store.sessions_closed()
    );
    print!("Notification log:\n{}", tutorial.notifications.contents());
    Ok(())
}
