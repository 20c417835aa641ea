use http::header::CONTENT_LENGTH;
use http::{Method, Request};
use http_body_util::{BodyExt, Empty};
use hyper::body::Bytes;
use otlp_http_probe::server::handle_request;

#[tokio::test]
async fn echoes_request_uri_with_exact_content_length() {
    let request = Request::builder()
        .method(Method::GET)
        .uri("/?x=1")
        .body(Empty::<Bytes>::new())
        .unwrap();

    let response = handle_request(request).await.unwrap();
    assert_eq!(response.status(), 200);

    let expected = "This is the response at /?x=1";
    let declared: usize = response.headers()[CONTENT_LENGTH]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(declared, expected.len());

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body.as_ref(), expected.as_bytes());
}

#[tokio::test]
async fn responds_to_any_method_on_the_single_route() {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/")
        .header("authorization", "Basic dXNlcjpwdw==")
        .body(Empty::<Bytes>::new())
        .unwrap();

    let response = handle_request(request).await.unwrap();
    assert_eq!(response.status(), 200);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body.as_ref(), b"This is the response at /");
}
